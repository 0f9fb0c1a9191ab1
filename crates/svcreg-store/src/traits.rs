use std::collections::HashMap;

use svcreg_codec::{FieldValues, Record, Value};

use crate::error::StoreResult;
use crate::properties::Properties;

/// Typed record store, keyed by record type and record key.
///
/// All implementations must satisfy these invariants:
/// - Save is a full replace: fields absent from the new record are gone.
/// - Loading absent keys or types yields no entry, never an error.
/// - Update touches only the named fields and is a no-op on a missing
///   record; it never creates one.
/// - Each operation is atomic: a failure leaves nothing half-written.
/// - Iteration follows key byte order within a type.
/// - The empty type id names no type: reads find nothing and save fails with
///   [`StoreError::EmptyType`](crate::StoreError::EmptyType).
/// - The empty field name is reserved; updates skip it.
/// - Filter and iterate callbacks may call back into the same store.
pub trait RecordStore: Send + Sync {
    /// Store `record` under `key`, replacing any previous record.
    fn save_value<R: Record>(&self, typ: &str, key: &str, record: &R) -> StoreResult<()>;

    /// Load the records stored under `keys`. Absent keys are omitted.
    fn load_values<R: Record>(&self, typ: &str, keys: &[&str]) -> StoreResult<HashMap<String, R>>;

    /// Load every record of a type.
    fn load_values_all<R: Record>(&self, typ: &str) -> StoreResult<HashMap<String, R>>;

    /// Load the records whose `fields` pass `filter`.
    ///
    /// The filter sees only the requested fields that have a stored value.
    /// An empty field list matches every record.
    fn load_values_by_filter<R, F>(
        &self,
        typ: &str,
        fields: &[&str],
        filter: F,
    ) -> StoreResult<HashMap<String, R>>
    where
        R: Record,
        F: FnMut(&FieldValues) -> bool;

    /// Stream one field of every record, in key order.
    fn iterate_field<R, F>(&self, typ: &str, field: &str, f: F) -> StoreResult<()>
    where
        R: Record,
        F: FnMut(&str, Option<Value>);

    /// Overwrite the named fields of an existing record.
    ///
    /// Returns `false` if the record does not exist.
    fn update_value(&self, typ: &str, key: &str, properties: &Properties) -> StoreResult<bool>;

    /// Delete the records under `keys`. Returns how many existed.
    fn delete_values(&self, typ: &str, keys: &[&str]) -> StoreResult<usize>;

    /// Number of records of a type.
    fn count_values(&self, typ: &str) -> StoreResult<usize>;
}
