//! Error types for the model crate.

/// Errors from domain store operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A required parameter was empty or out of range.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] svcreg_store::StoreError),
}

/// Convenience alias for model results.
pub type ModelResult<T> = Result<T, ModelError>;
