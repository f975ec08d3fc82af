//! Workflow Nodes
//!
//! Handlers for the built-in node types of Drive-backed workflows. Each
//! handler runs one node type against the run's variables and the
//! collaborators found in the `ServiceContext`.
//!
//! # Categories
//!
//! - **Control**: `variable`, `condition`
//! - **Input**: `prompt-value`
//! - **Processing**: `command` (LLM with drive and MCP tools)
//! - **Storage**: `drive-file`, `drive-read`, `drive-save`, `rag-sync`
//! - **Tool**: `mcp`
//!
//! [`builtin_registry`] registers all of them.

pub mod control;
pub mod input;
pub mod processing;
pub mod setup;
pub mod storage;
pub mod tool;

pub use control::*;
pub use input::*;
pub use processing::*;
pub use setup::{builtin_registry, setup_extensions, Collaborators};
pub use storage::*;
pub use tool::*;
