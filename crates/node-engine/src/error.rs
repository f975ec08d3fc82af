//! Error types for the node engine

use thiserror::Error;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// A node is missing a property its handler requires
    #[error("{node_type} node missing '{property}' property")]
    MissingProperty { node_type: String, property: String },

    /// A templated property did not contain valid JSON
    #[error("Invalid JSON in {field}: {message}")]
    InvalidJson { field: String, message: String },

    /// No handler is registered for a node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The workflow graph is malformed
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Execution id is not known to the store
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Task execution failed
    #[error("{0}")]
    ExecutionFailed(String),

    /// Collaborator (file store, LLM, MCP, RAG) failure
    #[error("{service} error: {message}")]
    Service { service: String, message: String },

    /// Drive file store failure
    #[error(transparent)]
    Store(#[from] drive_store::StoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Workflow was cancelled
    #[error("Workflow cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a missing-property error for a node type
    pub fn missing(node_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingProperty {
            node_type: node_type.into(),
            property: property.into(),
        }
    }

    /// Create an invalid JSON error for a named field
    pub fn invalid_json(field: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::InvalidJson {
            field: field.into(),
            message: err.to_string(),
        }
    }

    /// Wrap a collaborator error
    pub fn service(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Service {
            service: service.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error represents cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
