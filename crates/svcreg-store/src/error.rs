use std::path::PathBuf;
use std::time::Duration;

use svcreg_codec::CodecError;

/// Errors from record store operations.
///
/// Storage engine errors are boxed to keep `StoreResult` small.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("database error: {0}")]
    Database(Box<redb::DatabaseError>),

    /// A transaction could not be started.
    #[error("transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),

    /// A type table could not be opened.
    #[error("table error: {0}")]
    Table(Box<redb::TableError>),

    /// I/O or corruption inside the storage engine.
    #[error("storage error: {0}")]
    Storage(Box<redb::StorageError>),

    /// A write transaction failed to commit.
    #[error("commit error: {0}")]
    Commit(Box<redb::CommitError>),

    /// A field could not be encoded or decoded, or did not match the schema.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A record was saved under the empty type id.
    #[error("type id must not be empty")]
    EmptyType,

    /// The store file stayed locked by another handle for the whole timeout.
    #[error("timed out after {timeout:?} waiting for lock on {path}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// I/O error outside the storage engine (config files, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid store configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

macro_rules! boxed_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for StoreError {
                fn from(e: $source) -> Self {
                    StoreError::$variant(Box::new(e))
                }
            }
        )*
    };
}

boxed_from! {
    redb::DatabaseError => Database,
    redb::TransactionError => Transaction,
    redb::TableError => Table,
    redb::StorageError => Storage,
    redb::CommitError => Commit,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
