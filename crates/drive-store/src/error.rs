//! Error types for file store access

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// File or folder id does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Content could not be decoded as UTF-8 text
    #[error("File {0} is not valid UTF-8 text")]
    NotText(String),

    /// Backend rejected the request
    #[error("Drive API error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
