use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use svcreg_codec::{
    deserialize, read_field, read_fields, serialize, EncodedRecord, FieldValues, Record, Value,
};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::properties::Properties;
use crate::traits::RecordStore;

type TypeMap = BTreeMap<String, BTreeMap<String, EncodedRecord>>;

/// In-memory record store.
///
/// Intended for tests and embedding. Records are held in their encoded form
/// behind a `RwLock`, so field reads, filters and partial updates go through
/// the same codec as [`BucketStore`](crate::BucketStore).
///
/// Filter and iterate callbacks run on a snapshot copied out of the lock, so
/// they may write to the same store.
pub struct InMemoryStore {
    types: RwLock<TypeMap>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of records across all types.
    pub fn len(&self) -> usize {
        self.types
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all types holding at least one record.
    pub fn list_types(&self) -> Vec<String> {
        let types = self.types.read().expect("lock poisoned");
        types
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// One record's stored fields as encoded.
    pub fn raw_record(&self, typ: &str, key: &str) -> Option<EncodedRecord> {
        let types = self.types.read().expect("lock poisoned");
        types.get(typ).and_then(|records| records.get(key)).cloned()
    }

    pub fn clear(&self) {
        self.types.write().expect("lock poisoned").clear();
    }

    /// Copy of every record of `typ`, in key order, taken under the read lock.
    fn snapshot(&self, typ: &str) -> Vec<(String, EncodedRecord)> {
        let types = self.types.read().expect("lock poisoned");
        types
            .get(typ)
            .into_iter()
            .flatten()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryStore {
    fn save_value<R: Record>(&self, typ: &str, key: &str, record: &R) -> StoreResult<()> {
        if typ.is_empty() {
            return Err(StoreError::EmptyType);
        }
        let encoded = serialize(record);
        let mut types = self.types.write().expect("lock poisoned");
        types
            .entry(typ.to_string())
            .or_default()
            .insert(key.to_string(), encoded);
        Ok(())
    }

    fn load_values<R: Record>(&self, typ: &str, keys: &[&str]) -> StoreResult<HashMap<String, R>> {
        let types = self.types.read().expect("lock poisoned");
        let mut values = HashMap::new();
        let Some(records) = types.get(typ) else {
            return Ok(values);
        };
        for &key in keys {
            if let Some(record) = records.get(key) {
                values.insert(key.to_string(), deserialize::<R, _>(record)?);
            }
        }
        Ok(values)
    }

    fn load_values_all<R: Record>(&self, typ: &str) -> StoreResult<HashMap<String, R>> {
        let types = self.types.read().expect("lock poisoned");
        let mut values = HashMap::new();
        for (key, record) in types.get(typ).into_iter().flatten() {
            values.insert(key.clone(), deserialize::<R, _>(record)?);
        }
        Ok(values)
    }

    fn load_values_by_filter<R, F>(
        &self,
        typ: &str,
        fields: &[&str],
        mut filter: F,
    ) -> StoreResult<HashMap<String, R>>
    where
        R: Record,
        F: FnMut(&FieldValues) -> bool,
    {
        let schema = R::schema();
        let mut values = HashMap::new();
        for (key, record) in self.snapshot(typ) {
            if !fields.is_empty() && !filter(&read_fields(&record, schema, fields)?) {
                continue;
            }
            values.insert(key, deserialize::<R, _>(&record)?);
        }
        Ok(values)
    }

    fn iterate_field<R, F>(&self, typ: &str, field: &str, mut f: F) -> StoreResult<()>
    where
        R: Record,
        F: FnMut(&str, Option<Value>),
    {
        let schema = R::schema();
        for (key, record) in self.snapshot(typ) {
            f(key.as_str(), read_field(&record, schema, field)?);
        }
        Ok(())
    }

    fn update_value(&self, typ: &str, key: &str, properties: &Properties) -> StoreResult<bool> {
        let mut types = self.types.write().expect("lock poisoned");
        let Some(record) = types.get_mut(typ).and_then(|records| records.get_mut(key)) else {
            return Ok(false);
        };
        for (field, value) in properties.iter() {
            if !record.set_field(field, value) {
                warn!(typ, key, field, "skipped reserved field name in update");
            }
        }
        Ok(true)
    }

    fn delete_values(&self, typ: &str, keys: &[&str]) -> StoreResult<usize> {
        let mut types = self.types.write().expect("lock poisoned");
        let Some(records) = types.get_mut(typ) else {
            return Ok(0);
        };
        let removed = keys.iter().filter(|&&key| records.remove(key).is_some());
        Ok(removed.count())
    }

    fn count_values(&self, typ: &str) -> StoreResult<usize> {
        let types = self.types.read().expect("lock poisoned");
        Ok(types.get(typ).map_or(0, BTreeMap::len))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    svcreg_codec::record! {
        #[derive(Clone, Debug, Default, PartialEq)]
        struct Svc {
            id: String,
            name: String,
            tags: HashMap<String, String>,
        }
    }

    fn svc(id: &str, name: &str) -> Svc {
        Svc {
            id: id.into(),
            name: name.into(),
            tags: HashMap::from([("k1".to_string(), "v1".to_string())]),
        }
    }

    // ---- Basic operations ----

    #[test]
    fn new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.count_values("svc").unwrap(), 0);
        assert!(store.list_types().is_empty());
    }

    #[test]
    fn save_then_load() {
        let store = InMemoryStore::new();
        store.save_value("svc", "a", &svc("a", "X")).unwrap();
        let loaded: HashMap<String, Svc> = store.load_values("svc", &["a", "missing"]).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["a"], svc("a", "X"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_writes_encoded_fields() {
        let store = InMemoryStore::new();
        store.save_value("svc", "a", &svc("a", "X")).unwrap();
        let props = Properties::new().set("tags", Value::Map(HashMap::new()));
        assert!(store.update_value("svc", "a", &props).unwrap());
        let raw = store.raw_record("svc", "a").unwrap();
        assert!(raw.buckets.is_empty());
        assert!(raw.entries.contains_key("name"));
    }

    #[test]
    fn delete_removes_only_present_keys() {
        let store = InMemoryStore::new();
        store.save_value("svc", "a", &svc("a", "X")).unwrap();
        store.save_value("svc", "b", &svc("b", "Y")).unwrap();
        assert_eq!(store.delete_values("svc", &["a", "zzz"]).unwrap(), 1);
        assert_eq!(store.delete_values("other", &["b"]).unwrap(), 0);
        assert_eq!(store.count_values("svc").unwrap(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let store = InMemoryStore::new();
        store.save_value("svc", "a", &svc("a", "X")).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    // ---- Concurrency ----

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let key = format!("k{i}");
                    store.save_value("svc", &key, &svc(&key, "n")).unwrap();
                    store.count_values("svc").unwrap()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap() >= 1);
        }
        assert_eq!(store.count_values("svc").unwrap(), 8);
    }

    #[test]
    fn debug_shows_record_count() {
        let store = InMemoryStore::new();
        store.save_value("svc", "a", &svc("a", "X")).unwrap();
        assert!(format!("{store:?}").contains("record_count: 1"));
    }
}
