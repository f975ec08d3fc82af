//! Error types for sync operations

use drive_store::StoreError;
use thiserror::Error;

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote file store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local cache failure
    #[error("Local cache error: {0}")]
    Cache(String),

    /// Request is missing data or names an unknown file
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    /// Binary content could not be decoded
    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
