//! Store operations over a caller-owned transaction.
//!
//! [`BucketStore`](crate::BucketStore) wraps each of these in its own
//! transaction. Call them directly inside
//! [`execute_write`](crate::BucketStore::execute_write) to change several
//! records or types atomically.

use std::collections::HashMap;

use redb::{ReadTransaction, WriteTransaction};
use svcreg_codec::{
    deserialize, read_field, read_fields, serialize, EncodedRecord, FieldValues, Record, Value,
};
use tracing::{debug, warn};

use crate::bucket::{self, type_table, ReadScope, RecordBucket};
use crate::error::{StoreError, StoreResult};
use crate::properties::Properties;

/// Replace the record under `key` with `record`, creating the type bucket if
/// needed.
///
/// Fails with [`StoreError::EmptyType`] when `typ` is empty.
pub fn save_value<R: Record>(
    txn: &WriteTransaction,
    typ: &str,
    key: &str,
    record: &R,
) -> StoreResult<()> {
    if typ.is_empty() {
        return Err(StoreError::EmptyType);
    }
    let encoded = serialize(record);
    let mut table = txn.open_table(type_table(typ))?;
    let replaced = bucket::remove_record(&mut table, key)?;
    bucket::write_record(&mut table, key, &encoded)?;
    debug!(
        typ,
        key,
        entries = encoded.entries.len(),
        buckets = encoded.buckets.len(),
        replaced,
        "saved record"
    );
    Ok(())
}

/// Load the records stored under `keys`. Absent keys are left out.
pub fn load_values<R: Record, T: ReadScope>(
    txn: &T,
    typ: &str,
    keys: &[&str],
) -> StoreResult<HashMap<String, R>> {
    let mut values = HashMap::new();
    if keys.is_empty() {
        return Ok(values);
    }
    let Some(table) = txn.type_bucket(typ)? else {
        return Ok(values);
    };
    for &key in keys {
        if let Some(bucket) = RecordBucket::open(&table, key)? {
            values.insert(key.to_string(), deserialize::<R, _>(&bucket)?);
        }
    }
    Ok(values)
}

/// Load every record of the type.
pub fn load_values_all<R: Record, T: ReadScope>(
    txn: &T,
    typ: &str,
) -> StoreResult<HashMap<String, R>> {
    let mut values = HashMap::new();
    let Some(table) = txn.type_bucket(typ)? else {
        return Ok(values);
    };
    bucket::for_each_record(&table, |bucket| {
        values.insert(bucket.key().to_string(), deserialize::<R, _>(&bucket)?);
        Ok(())
    })?;
    Ok(values)
}

/// Load the records for which `filter` accepts the requested `fields`.
///
/// Only `fields` are decoded before the filter runs; a record is fully read
/// only once it matches. An empty field list matches every record without
/// calling the filter.
pub fn load_values_by_filter<R, T, F>(
    txn: &T,
    typ: &str,
    fields: &[&str],
    mut filter: F,
) -> StoreResult<HashMap<String, R>>
where
    R: Record,
    T: ReadScope,
    F: FnMut(&FieldValues) -> bool,
{
    let mut values = HashMap::new();
    let Some(table) = txn.type_bucket(typ)? else {
        return Ok(values);
    };
    let schema = R::schema();
    bucket::for_each_record(&table, |bucket| {
        if !fields.is_empty() {
            let selected = read_fields(&bucket, schema, fields)?;
            if !filter(&selected) {
                return Ok(());
            }
        }
        values.insert(bucket.key().to_string(), deserialize::<R, _>(&bucket)?);
        Ok(())
    })?;
    Ok(values)
}

/// Call `f` with the key and decoded `field` of every record, in key order.
pub fn iterate_field<R, T, F>(txn: &T, typ: &str, field: &str, mut f: F) -> StoreResult<()>
where
    R: Record,
    T: ReadScope,
    F: FnMut(&str, Option<Value>),
{
    let Some(table) = txn.type_bucket(typ)? else {
        return Ok(());
    };
    let schema = R::schema();
    bucket::for_each_record(&table, |bucket| {
        let value = read_field(&bucket, schema, field)?;
        f(bucket.key(), value);
        Ok(())
    })
}

/// Overwrite the named fields of an existing record.
///
/// Returns `false` without writing anything when the type or record does not
/// exist. A property named like the record marker is skipped.
pub fn update_value(
    txn: &WriteTransaction,
    typ: &str,
    key: &str,
    properties: &Properties,
) -> StoreResult<bool> {
    if !bucket::type_exists(txn, typ)? {
        debug!(typ, key, "update skipped: no such type");
        return Ok(false);
    }
    let mut table = txn.open_table(type_table(typ))?;
    if !bucket::record_exists(&table, key)? {
        debug!(typ, key, "update skipped: no such record");
        return Ok(false);
    }
    for (field, value) in properties.iter() {
        if !bucket::write_field(&mut table, key, field, value)? {
            warn!(typ, key, field, "skipped reserved field name in update");
        }
    }
    debug!(typ, key, fields = properties.len(), "updated record");
    Ok(true)
}

/// Remove the records under `keys`, returning how many existed.
pub fn delete_values(txn: &WriteTransaction, typ: &str, keys: &[&str]) -> StoreResult<usize> {
    if keys.is_empty() || !bucket::type_exists(txn, typ)? {
        return Ok(0);
    }
    let mut table = txn.open_table(type_table(typ))?;
    let mut removed = 0;
    for &key in keys {
        if bucket::remove_record(&mut table, key)? {
            removed += 1;
        }
    }
    debug!(typ, requested = keys.len(), removed, "deleted records");
    Ok(removed)
}

/// Number of records of the type.
pub fn count_values<T: ReadScope>(txn: &T, typ: &str) -> StoreResult<usize> {
    match txn.type_bucket(typ)? {
        Some(table) => bucket::record_count(&table),
        None => Ok(0),
    }
}

/// Record keys of the type, in key order.
pub fn record_keys<T: ReadScope>(txn: &T, typ: &str) -> StoreResult<Vec<String>> {
    match txn.type_bucket(typ)? {
        Some(table) => bucket::record_keys(&table),
        None => Ok(Vec::new()),
    }
}

/// Names of all type buckets in the file.
pub fn list_types(txn: &ReadTransaction) -> StoreResult<Vec<String>> {
    bucket::type_names(txn)
}

/// The stored fields of one record as written, without a schema.
pub fn raw_record<T: ReadScope>(
    txn: &T,
    typ: &str,
    key: &str,
) -> StoreResult<Option<EncodedRecord>> {
    let Some(table) = txn.type_bucket(typ)? else {
        return Ok(None);
    };
    match RecordBucket::open(&table, key)? {
        Some(bucket) => Ok(Some(bucket.raw()?)),
        None => Ok(None),
    }
}
