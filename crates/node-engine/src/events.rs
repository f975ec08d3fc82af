//! Event types for streaming workflow progress
//!
//! Events are sent from the engine to any consumer (SSE bridge, test
//! harness) to report node logs, status transitions, prompts and drive
//! file changes made during a run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{ExecutionRecord, ExecutionStatus, LogEntry};

/// Trait for sending workflow events
///
/// Sending is synchronous so the executor can deliver a node's log before
/// it moves on to the next node.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Kind of human-in-the-loop prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptType {
    /// Free-form value entry
    Value,
    /// Confirmation dialog with buttons
    Dialog,
}

/// Metadata shown to the user while an execution waits for input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub prompt_type: PromptType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl PromptRequest {
    pub fn value(title: impl Into<String>, default_value: Option<String>) -> Self {
        Self {
            prompt_type: PromptType::Value,
            title: title.into(),
            message: None,
            default_value,
            options: Vec::new(),
        }
    }

    pub fn dialog(title: impl Into<String>, message: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            prompt_type: PromptType::Dialog,
            title: title.into(),
            message: Some(message.into()),
            default_value: None,
            options,
        }
    }
}

/// A drive file written by a node, pushed so clients can refresh their cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileChange {
    pub file_id: String,
    pub file_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A node wrote a log entry
    #[serde(rename_all = "camelCase")]
    Log { execution_id: String, log: LogEntry },

    /// Execution status changed
    #[serde(rename_all = "camelCase")]
    Status {
        execution_id: String,
        status: ExecutionStatus,
    },

    /// Execution finished successfully
    #[serde(rename_all = "camelCase")]
    Complete {
        execution_id: String,
        record: ExecutionRecord,
    },

    /// Execution was stopped
    #[serde(rename_all = "camelCase")]
    Cancelled { execution_id: String },

    /// Execution failed
    #[serde(rename_all = "camelCase")]
    Error { execution_id: String, error: String },

    /// Execution is waiting for user input
    #[serde(rename_all = "camelCase")]
    PromptRequest {
        execution_id: String,
        request: PromptRequest,
    },

    /// An existing drive file was rewritten
    #[serde(rename_all = "camelCase")]
    DriveFileUpdated {
        execution_id: String,
        file: DriveFileChange,
    },

    /// A drive file was created
    #[serde(rename_all = "camelCase")]
    DriveFileCreated {
        execution_id: String,
        file: DriveFileChange,
    },
}

impl WorkflowEvent {
    /// Server-sent event name for this event
    pub fn event_name(&self) -> &'static str {
        match self {
            WorkflowEvent::Log { .. } => "log",
            WorkflowEvent::Status { .. } => "status",
            WorkflowEvent::Complete { .. } => "complete",
            WorkflowEvent::Cancelled { .. } => "cancelled",
            WorkflowEvent::Error { .. } => "error",
            WorkflowEvent::PromptRequest { .. } => "prompt-request",
            WorkflowEvent::DriveFileUpdated { .. } => "drive-file-updated",
            WorkflowEvent::DriveFileCreated { .. } => "drive-file-created",
        }
    }

    pub fn execution_id(&self) -> &str {
        match self {
            WorkflowEvent::Log { execution_id, .. }
            | WorkflowEvent::Status { execution_id, .. }
            | WorkflowEvent::Complete { execution_id, .. }
            | WorkflowEvent::Cancelled { execution_id }
            | WorkflowEvent::Error { execution_id, .. }
            | WorkflowEvent::PromptRequest { execution_id, .. }
            | WorkflowEvent::DriveFileUpdated { execution_id, .. }
            | WorkflowEvent::DriveFileCreated { execution_id, .. } => execution_id,
        }
    }

    /// Create a log event
    pub fn log(execution_id: &str, log: LogEntry) -> Self {
        Self::Log {
            execution_id: execution_id.to_string(),
            log,
        }
    }

    /// Create a status event
    pub fn status(execution_id: &str, status: ExecutionStatus) -> Self {
        Self::Status {
            execution_id: execution_id.to_string(),
            status,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Names of the collected events in order
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(WorkflowEvent::event_name).collect()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Event sink that forwards into an unbounded tokio channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        sink.send(WorkflowEvent::status("exec1", ExecutionStatus::Running))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::Status { execution_id, status } => {
                assert_eq!(execution_id, "exec1");
                assert_eq!(*status, ExecutionStatus::Running);
            }
            _ => panic!("Expected Status event"),
        }
    }

    #[test]
    fn test_event_names_and_wire_shape() {
        let event = WorkflowEvent::PromptRequest {
            execution_id: "e".into(),
            request: PromptRequest::value("Name?", Some("x".into())),
        };
        assert_eq!(event.event_name(), "prompt-request");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "promptRequest");
        assert_eq!(json["executionId"], "e");
        assert_eq!(json["request"]["promptType"], "value");
        assert_eq!(json["request"]["defaultValue"], "x");
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (sink, mut rx) = ChannelEventSink::channel();
        sink.send(WorkflowEvent::Cancelled { execution_id: "e".into() })
            .unwrap();
        assert_eq!(rx.recv().await.map(|e| e.event_name()), Some("cancelled"));
        drop(rx);
        assert!(sink.send(WorkflowEvent::Cancelled { execution_id: "e".into() }).is_err());
    }
}
