//! Error types for the origin cache.

use std::path::PathBuf;
use std::time::Duration;

/// Result alias used throughout the cache.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors returned by cache operations.
///
/// Only [`CacheError::NotFound`] is an expected negative result; every
/// other variant means the operation failed and the caller should fall
/// back to asking the origin directly.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The backing file could not be opened or is not a valid store.
    #[error("Failed to open cache database {path}: {source}")]
    OpenFailed {
        /// Path of the backing file
        path: PathBuf,
        /// The underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// Creating the table or its index failed for a reason other than
    /// the object already existing.
    #[error("Schema error: {0}")]
    Schema(#[source] rusqlite::Error),

    /// A stored or incoming payload could not be decoded.
    #[error(transparent)]
    Data(#[from] DataError),

    /// No entry exists for the path.
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(#[source] rusqlite::Error),

    /// The operation's deadline passed.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation's cancellation flag was set.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic failure of the underlying store.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    /// The process-wide cache has not been initialized.
    #[error("Cache is not initialized")]
    NotInitialized,

    /// Filesystem error while preparing the cache directory.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Whether this is the normal "no such entry" result.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Whether the operation ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Timeout(_))
    }
}

/// Payload errors. Never retried, never partially applied.
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    /// The info blob is not a valid payload.
    #[error("Invalid info payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The `type` column holds an unknown value.
    #[error("Invalid entry type: {0}")]
    InvalidEntryType(i64),
}
