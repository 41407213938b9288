//! Error types for the Trellis node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the node.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Storage error
    #[error(transparent)]
    Store(#[from] trellis_store::StoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
