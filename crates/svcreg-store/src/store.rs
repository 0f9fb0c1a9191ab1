use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadTransaction, WriteTransaction};
use svcreg_codec::{EncodedRecord, FieldValues, Record, Value};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::properties::Properties;
use crate::traits::RecordStore;
use crate::tx;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Record store backed by a single redb file.
///
/// Every operation runs in its own transaction. One writer at a time; readers
/// see a consistent snapshot and never block on the writer.
pub struct BucketStore {
    db: Database,
    path: PathBuf,
}

impl BucketStore {
    /// Open the store file named by `config`, creating it if missing.
    ///
    /// If another handle holds the file, retries until `config.lock_timeout`
    /// has passed and then fails with [`StoreError::LockTimeout`].
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut builder = Database::builder();
        if let Some(size) = config.cache_size {
            builder.set_cache_size(size);
        }

        let started = Instant::now();
        let db = loop {
            match builder.create(&config.path) {
                Ok(db) => break db,
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    if started.elapsed() >= config.lock_timeout {
                        return Err(StoreError::LockTimeout {
                            path: config.path,
                            timeout: config.lock_timeout,
                        });
                    }
                    debug!(path = %config.path.display(), "store file is locked, waiting");
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(
            path = %config.path.display(),
            waited_ms = started.elapsed().as_millis() as u64,
            "opened bucket store"
        );
        Ok(Self {
            db,
            path: config.path,
        })
    }

    /// Open with default settings at `path`.
    pub fn open_path(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(StoreConfig::at(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a read transaction owned by the caller.
    pub fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction owned by the caller. Nothing is persisted
    /// until it is committed; dropping it aborts.
    pub fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Run `f` inside a read transaction.
    pub fn execute_read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&ReadTransaction) -> Result<T, E>,
    {
        let txn = self.begin_read()?;
        f(&txn)
    }

    /// Run `f` inside a write transaction, committing if it returns `Ok` and
    /// aborting if it returns `Err`.
    pub fn execute_write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&WriteTransaction) -> Result<T, E>,
    {
        let txn = self.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    /// Names of all record types in the file.
    pub fn list_types(&self) -> StoreResult<Vec<String>> {
        self.execute_read(tx::list_types)
    }

    /// Record keys of a type, in key order.
    pub fn record_keys(&self, typ: &str) -> StoreResult<Vec<String>> {
        self.execute_read(|txn| tx::record_keys(txn, typ))
    }

    /// One record's stored fields, decoded by tag only.
    pub fn raw_record(&self, typ: &str, key: &str) -> StoreResult<Option<EncodedRecord>> {
        self.execute_read(|txn| tx::raw_record(txn, typ, key))
    }
}

impl RecordStore for BucketStore {
    fn save_value<R: Record>(&self, typ: &str, key: &str, record: &R) -> StoreResult<()> {
        self.execute_write(|txn| tx::save_value(txn, typ, key, record))
    }

    fn load_values<R: Record>(&self, typ: &str, keys: &[&str]) -> StoreResult<HashMap<String, R>> {
        self.execute_read(|txn| tx::load_values(txn, typ, keys))
    }

    fn load_values_all<R: Record>(&self, typ: &str) -> StoreResult<HashMap<String, R>> {
        self.execute_read(|txn| tx::load_values_all(txn, typ))
    }

    fn load_values_by_filter<R, F>(
        &self,
        typ: &str,
        fields: &[&str],
        filter: F,
    ) -> StoreResult<HashMap<String, R>>
    where
        R: Record,
        F: FnMut(&FieldValues) -> bool,
    {
        self.execute_read(|txn| tx::load_values_by_filter(txn, typ, fields, filter))
    }

    fn iterate_field<R, F>(&self, typ: &str, field: &str, f: F) -> StoreResult<()>
    where
        R: Record,
        F: FnMut(&str, Option<Value>),
    {
        self.execute_read(|txn| tx::iterate_field::<R, _, _>(txn, typ, field, f))
    }

    fn update_value(&self, typ: &str, key: &str, properties: &Properties) -> StoreResult<bool> {
        self.execute_write(|txn| tx::update_value(txn, typ, key, properties))
    }

    fn delete_values(&self, typ: &str, keys: &[&str]) -> StoreResult<usize> {
        self.execute_write(|txn| tx::delete_values(txn, typ, keys))
    }

    fn count_values(&self, typ: &str) -> StoreResult<usize> {
        self.execute_read(|txn| tx::count_values(txn, typ))
    }
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("path", &self.path)
            .finish()
    }
}
