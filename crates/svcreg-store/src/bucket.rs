//! Nested buckets on flat redb tables.
//!
//! Each record type is one table. Rows are keyed by
//! `(record_key, bucket_key, slot, entry_key)`:
//!
//! ```text
//! (key, "",    0, "")  -> []              record presence marker
//! (key, field, 0, "")  -> [tag, payload]  flat scalar or message field
//! (key, field, 0, "")  -> []              nested map bucket marker
//! (key, field, 1, k)   -> raw utf-8       map entry k
//! ```
//!
//! Tuple ordering keeps all rows of one record contiguous, and record keys
//! sort by their bytes.

use std::collections::HashMap;

use redb::{
    ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition, TableError,
    TableHandle, WriteTransaction,
};
use svcreg_codec::mapper::{is_reserved, to_bucket_key, RECORD_MARKER};
use svcreg_codec::{tag, CodecError, EncodedRecord, FieldSource, Value};

use crate::error::{StoreError, StoreResult};

/// Row key of a type table.
pub type EntryKey = (&'static str, &'static str, u8, &'static str);

/// Slot for the marker or flat value of a field.
pub const SLOT_FIELD: u8 = 0;
/// Slot for entries inside a nested map bucket.
pub const SLOT_ENTRY: u8 = 1;

const EMPTY: &[u8] = &[];

/// Table definition for the type bucket `typ`.
///
/// redb refuses empty table names, so callers must reject an empty `typ`
/// before getting here.
pub fn type_table(typ: &str) -> TableDefinition<'_, EntryKey, &'static [u8]> {
    TableDefinition::new(typ)
}

/// A transaction that can read type buckets.
///
/// Implemented for both transaction kinds so reads can happen inside a
/// caller's write transaction.
pub trait ReadScope {
    type Table<'a>: ReadableTable<EntryKey, &'static [u8]>
    where
        Self: 'a;

    /// Open the type bucket `typ`, or `None` if it was never written.
    fn type_bucket<'a>(&'a self, typ: &str) -> StoreResult<Option<Self::Table<'a>>>;
}

impl ReadScope for ReadTransaction {
    type Table<'a> = ReadOnlyTable<EntryKey, &'static [u8]>;

    fn type_bucket<'a>(&'a self, typ: &str) -> StoreResult<Option<Self::Table<'a>>> {
        if typ.is_empty() {
            return Ok(None);
        }
        match self.open_table(type_table(typ)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ReadScope for WriteTransaction {
    type Table<'a> = redb::Table<'a, EntryKey, &'static [u8]>;

    fn type_bucket<'a>(&'a self, typ: &str) -> StoreResult<Option<Self::Table<'a>>> {
        // Opening a table in a write transaction creates it; check first so
        // reads and no-op writes leave no empty type bucket behind.
        if !type_exists(self, typ)? {
            return Ok(None);
        }
        Ok(Some(self.open_table(type_table(typ))?))
    }
}

/// Whether the type bucket `typ` exists in a write transaction.
pub fn type_exists(txn: &WriteTransaction, typ: &str) -> StoreResult<bool> {
    if typ.is_empty() {
        return Ok(false);
    }
    Ok(txn.list_tables()?.any(|handle| handle.name() == typ))
}

/// Names of all type buckets, sorted.
pub fn type_names(txn: &ReadTransaction) -> StoreResult<Vec<String>> {
    let mut names: Vec<String> = txn
        .list_tables()?
        .map(|handle| handle.name().to_string())
        .collect();
    names.sort();
    Ok(names)
}

fn marker(key: &str) -> (&str, &str, u8, &str) {
    (key, RECORD_MARKER, SLOT_FIELD, "")
}

/// Whether a record bucket exists under `key`.
pub fn record_exists<T>(table: &T, key: &str) -> StoreResult<bool>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
{
    Ok(table.get(marker(key))?.is_some())
}

fn is_marker(field: &str, slot: u8, entry: &str) -> bool {
    field == RECORD_MARKER && slot == SLOT_FIELD && entry.is_empty()
}

/// Call `f` with every record bucket of the type, in key byte order.
pub fn for_each_record<T, F>(table: &T, mut f: F) -> StoreResult<()>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
    F: FnMut(RecordBucket<'_, T>) -> StoreResult<()>,
{
    for row in table.iter()? {
        let (k, _) = row?;
        let (record, field, slot, entry) = k.value();
        if is_marker(field, slot, entry) {
            f(RecordBucket { table, key: record })?;
        }
    }
    Ok(())
}

/// All record keys in the type bucket, in key byte order.
pub fn record_keys<T>(table: &T) -> StoreResult<Vec<String>>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
{
    let mut keys = Vec::new();
    for_each_record(table, |bucket| {
        keys.push(bucket.key().to_string());
        Ok(())
    })?;
    Ok(keys)
}

/// Number of record buckets in the type bucket.
pub fn record_count<T>(table: &T) -> StoreResult<usize>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
{
    let mut count = 0;
    for_each_record(table, |_| {
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Read view of one record bucket.
pub struct RecordBucket<'a, T> {
    table: &'a T,
    key: &'a str,
}

impl<'a, T> RecordBucket<'a, T>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
{
    /// Open the record bucket under `key`, or `None` if the record is absent.
    pub fn open(table: &'a T, key: &'a str) -> StoreResult<Option<Self>> {
        if record_exists(table, key)? {
            Ok(Some(Self { table, key }))
        } else {
            Ok(None)
        }
    }

    pub fn key(&self) -> &'a str {
        self.key
    }

    /// Every stored field of this record, without a schema.
    pub fn raw(&self) -> StoreResult<EncodedRecord> {
        let mut out = EncodedRecord::default();
        for row in self.table.range(marker(self.key)..)? {
            let (k, v) = row?;
            let (record, field, slot, entry) = k.value();
            if record != self.key {
                break;
            }
            if field == RECORD_MARKER {
                continue;
            }
            let value = v.value();
            match slot {
                SLOT_FIELD if value.is_empty() => {
                    out.buckets.entry(field.to_string()).or_default();
                }
                SLOT_FIELD => {
                    out.entries.insert(field.to_string(), value.to_vec());
                }
                _ => {
                    let text = utf8(field, value)?;
                    out.buckets
                        .entry(field.to_string())
                        .or_default()
                        .insert(entry.to_string(), text);
                }
            }
        }
        Ok(out)
    }
}

fn utf8(field: &str, raw: &[u8]) -> StoreResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| {
        StoreError::Codec(CodecError::InvalidUtf8 {
            field: field.to_string(),
        })
    })
}

impl<T> FieldSource for RecordBucket<'_, T>
where
    T: ReadableTable<EntryKey, &'static [u8]>,
{
    type Error = StoreError;

    fn flat(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .table
            .get((self.key, key, SLOT_FIELD, ""))?
            .map(|guard| guard.value().to_vec()))
    }

    fn nested(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        match self.table.get((self.key, key, SLOT_FIELD, ""))? {
            Some(guard) if guard.value().is_empty() => {}
            _ => return Ok(None),
        }
        let mut entries = HashMap::new();
        for row in self.table.range((self.key, key, SLOT_ENTRY, "")..)? {
            let (k, v) = row?;
            let (record, field, slot, entry) = k.value();
            if record != self.key || field != key || slot != SLOT_ENTRY {
                break;
            }
            entries.insert(entry.to_string(), utf8(field, v.value())?);
        }
        Ok(Some(entries))
    }
}

/// Remove every row of the record under `key`. Returns whether it existed.
pub fn remove_record(
    table: &mut Table<'_, EntryKey, &'static [u8]>,
    key: &str,
) -> StoreResult<bool> {
    let mut rows: Vec<(String, u8, String)> = Vec::new();
    for row in table.range(marker(key)..)? {
        let (k, _) = row?;
        let (record, field, slot, entry) = k.value();
        if record != key {
            break;
        }
        rows.push((field.to_string(), slot, entry.to_string()));
    }
    let existed = !rows.is_empty();
    for (field, slot, entry) in &rows {
        table.remove((key, field.as_str(), *slot, entry.as_str()))?;
    }
    Ok(existed)
}

/// Write a fresh record bucket. The caller removes any prior rows first.
pub fn write_record(
    table: &mut Table<'_, EntryKey, &'static [u8]>,
    key: &str,
    record: &EncodedRecord,
) -> StoreResult<()> {
    table.insert(marker(key), EMPTY)?;
    for (field, buf) in &record.entries {
        table.insert((key, field.as_str(), SLOT_FIELD, ""), buf.as_slice())?;
    }
    for (field, entries) in &record.buckets {
        write_nested(table, key, field, entries.iter())?;
    }
    Ok(())
}

fn write_nested<'e>(
    table: &mut Table<'_, EntryKey, &'static [u8]>,
    key: &str,
    field: &str,
    entries: impl Iterator<Item = (&'e String, &'e String)>,
) -> StoreResult<()> {
    table.insert((key, field, SLOT_FIELD, ""), EMPTY)?;
    for (k, v) in entries {
        table.insert((key, field, SLOT_ENTRY, k.as_str()), v.as_bytes())?;
    }
    Ok(())
}

/// Remove a field's flat value or nested bucket.
pub fn remove_field(
    table: &mut Table<'_, EntryKey, &'static [u8]>,
    key: &str,
    field: &str,
) -> StoreResult<()> {
    let mut entries: Vec<String> = Vec::new();
    for row in table.range((key, field, SLOT_ENTRY, "")..)? {
        let (k, _) = row?;
        let (record, f, slot, entry) = k.value();
        if record != key || f != field || slot != SLOT_ENTRY {
            break;
        }
        entries.push(entry.to_string());
    }
    for entry in &entries {
        table.remove((key, field, SLOT_ENTRY, entry.as_str()))?;
    }
    table.remove((key, field, SLOT_FIELD, ""))?;
    Ok(())
}

/// Overwrite one field of an existing record with `value`.
///
/// Maps replace the whole nested bucket; an empty map leaves none. Returns
/// `false` and writes nothing for a reserved field name, which would
/// otherwise clobber the record marker.
pub fn write_field(
    table: &mut Table<'_, EntryKey, &'static [u8]>,
    key: &str,
    field: &str,
    value: &Value,
) -> StoreResult<bool> {
    if is_reserved(field) {
        return Ok(false);
    }
    let bucket_key = to_bucket_key(field);
    remove_field(table, key, bucket_key)?;
    match value {
        Value::Map(map) if map.is_empty() => {}
        Value::Map(map) => write_nested(table, key, bucket_key, map.iter())?,
        scalar => {
            if let Some(buf) = tag::encode(scalar) {
                table.insert((key, bucket_key, SLOT_FIELD, ""), buf.as_slice())?;
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use std::collections::BTreeMap;

    fn db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("bucket.redb")).unwrap();
        (dir, db)
    }

    fn encoded() -> EncodedRecord {
        let mut record = EncodedRecord::default();
        record.entries.insert("name".into(), vec![0x01, b'X']);
        let mut tags = BTreeMap::new();
        tags.insert("k1".to_string(), "v1".to_string());
        tags.insert("k2".to_string(), "v2".to_string());
        record.buckets.insert("tags".into(), tags);
        record
    }

    fn rows(txn: &WriteTransaction, typ: &str) -> Vec<(String, String, u8, String, usize)> {
        let table = txn.open_table(type_table(typ)).unwrap();
        table
            .iter()
            .unwrap()
            .map(|row| {
                let (k, v) = row.unwrap();
                let (record, field, slot, entry) = k.value();
                (
                    record.to_string(),
                    field.to_string(),
                    slot,
                    entry.to_string(),
                    v.value().len(),
                )
            })
            .collect()
    }

    #[test]
    fn write_record_lays_out_rows() {
        let (_dir, db) = db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(type_table("svc")).unwrap();
            write_record(&mut table, "a", &encoded()).unwrap();
        }
        let rows = rows(&txn, "svc");
        assert_eq!(
            rows,
            vec![
                ("a".into(), "".into(), SLOT_FIELD, "".into(), 0),
                ("a".into(), "name".into(), SLOT_FIELD, "".into(), 2),
                ("a".into(), "tags".into(), SLOT_FIELD, "".into(), 0),
                ("a".into(), "tags".into(), SLOT_ENTRY, "k1".into(), 2),
                ("a".into(), "tags".into(), SLOT_ENTRY, "k2".into(), 2),
            ]
        );
    }

    #[test]
    fn raw_reads_back_what_was_written() {
        let (_dir, db) = db();
        let txn = db.begin_write().unwrap();
        let mut table = txn.open_table(type_table("svc")).unwrap();
        write_record(&mut table, "a", &encoded()).unwrap();
        write_record(&mut table, "ab", &EncodedRecord::default()).unwrap();

        let bucket = RecordBucket::open(&table, "a").unwrap().unwrap();
        assert_eq!(bucket.raw().unwrap(), encoded());
        assert_eq!(bucket.nested("name").unwrap(), None);
        assert_eq!(bucket.nested("tags").unwrap().unwrap().len(), 2);
        assert!(RecordBucket::open(&table, "b").unwrap().is_none());
        assert_eq!(record_keys(&table).unwrap(), ["a", "ab"]);
        assert_eq!(record_count(&table).unwrap(), 2);
    }

    #[test]
    fn remove_field_leaves_other_fields() {
        let (_dir, db) = db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(type_table("svc")).unwrap();
            write_record(&mut table, "a", &encoded()).unwrap();
            remove_field(&mut table, "a", "tags").unwrap();
        }
        let rows = rows(&txn, "svc");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.1 != "tags"));
    }

    #[test]
    fn remove_record_reports_existence() {
        let (_dir, db) = db();
        let txn = db.begin_write().unwrap();
        let mut table = txn.open_table(type_table("svc")).unwrap();
        write_record(&mut table, "a", &encoded()).unwrap();
        write_record(&mut table, "ab", &encoded()).unwrap();
        assert!(remove_record(&mut table, "a").unwrap());
        assert!(!remove_record(&mut table, "a").unwrap());
        assert_eq!(record_keys(&table).unwrap(), ["ab"]);
    }

    #[test]
    fn write_scope_does_not_create_tables() {
        let (_dir, db) = db();
        let txn = db.begin_write().unwrap();
        assert!(txn.type_bucket("ghost").unwrap().is_none());
        assert!(!type_exists(&txn, "ghost").unwrap());
        txn.commit().unwrap();

        let read = db.begin_read().unwrap();
        assert!(read.type_bucket("ghost").unwrap().is_none());
        assert!(type_names(&read).unwrap().is_empty());
    }
}
