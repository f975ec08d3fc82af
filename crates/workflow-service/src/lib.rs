//! Workflow Service - host-agnostic execution services
//!
//! Hosts (an HTTP server, a desktop shell, tests) drive workflow runs
//! through [`WorkflowService`]:
//!
//! - `start_execution` validates a workflow and runs it on a tokio task
//! - `stop_execution` cancels a run and releases a pending prompt
//! - `submit_prompt_response` resumes a run parked on a prompt
//! - `subscribe` yields the run's named server-sent events, replaying the
//!   log backlog for clients that reconnect
//!
//! Finished runs are persisted through an [`ExecutionHistoryStore`].

pub mod edit_history;
pub mod error;
pub mod events;
pub mod history;
pub mod service;

pub use edit_history::DriveEditHistory;
pub use error::{Result, ServiceError};
pub use events::{EventHub, LogStream, RecordingEventSink, SseEvent};
pub use history::{DriveExecutionHistory, ExecutionHistoryStore, InMemoryExecutionHistory};
pub use service::{StartExecution, WorkflowService};
