use thiserror::Error;

use crate::store::StoreError;

/// Core error type shared across Rowport crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage adapter failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The entity schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by Rowport crates.
pub type Result<T> = std::result::Result<T, Error>;
