//! Error types for provider storage.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Update targeted a record that does not exist
    #[error("Provider not found: {0}")]
    NotFound(String),

    /// Insert collided with an existing record
    #[error("Provider already exists: {0}")]
    AlreadyExists(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}
