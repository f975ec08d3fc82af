//! Error types for the workflow service

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown execution id, or one the caller does not own
    #[error("Execution not found")]
    ExecutionNotFound(String),

    #[error(transparent)]
    Engine(#[from] node_engine::NodeEngineError),

    #[error(transparent)]
    Store(#[from] drive_store::StoreError),

    #[error(transparent)]
    Sync(#[from] drive_sync::SyncError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_hides_id() {
        let err = ServiceError::ExecutionNotFound("secret-id".into());
        assert_eq!(err.to_string(), "Execution not found");
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let err: ServiceError = node_engine::NodeEngineError::failed("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
