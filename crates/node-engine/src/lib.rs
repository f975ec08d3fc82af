//! Node Engine - graph-based workflow execution for Drive-backed workflows
//!
//! A workflow is a directed graph of typed nodes. The executor walks it from
//! the start node, dispatching each node to the handler registered for its
//! type and following the first matching outgoing edge. It supports:
//!
//! - `{{name}}` variable substitution against a per-run context
//! - Conditional edges and loops, bounded by a node-visit limit
//! - Cooperative cancellation through a `CancellationToken`
//! - Human-in-the-loop prompts that park the run until answered
//! - An ordered event stream (`EventSink`) for logs and status changes
//!
//! # Architecture
//!
//! - `NodeRegistry`: node type -> `NodeHandler`, validated before a run
//! - `WorkflowExecutor`: the traversal loop and its terminal-state bookkeeping
//! - `ExecutionStore`: in-flight executions, stop requests and pending prompts
//! - `ServiceContext`: collaborators handed to every handler
//!
//! Concrete handlers live in the `workflow-nodes` crate.

pub mod condition;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod extensions;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;
pub mod variables;

pub use condition::{evaluate_condition, is_truthy};
pub use config::EngineConfig;
pub use error::{NodeEngineError, Result};
pub use events::{
    ChannelEventSink, DriveFileChange, EventError, EventSink, NullEventSink, PromptRequest,
    PromptType, VecEventSink, WorkflowEvent,
};
pub use executor::{ExecutionResult, LogCallback, WorkflowExecutor};
pub use extensions::{extension_keys, ExecutorExtensions};
pub use registry::{HandlerOutcome, NodeHandler, NodeRegistry};
pub use service::{PromptCallbacks, ServiceContext};
pub use store::{ExecutionSnapshot, ExecutionStore, StorePrompter};
pub use types::{
    DiscoveredResources, Edge, ExecutionContext, ExecutionRecord, ExecutionStatus, ExecutionStep,
    FileContentType, FileExplorerData, LastCommandInfo, LogEntry, LogStatus, McpAppInfo,
    McpToolResult, NodeId, NodeType, Workflow, WorkflowNode,
};
pub use variables::{has_unresolved, placeholder_name, replace_variables, require_resolved};
