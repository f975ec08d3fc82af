//! Tool nodes
//!
//! Remote tool invocation over MCP, and the drive tools the command node
//! offers to the model.

pub mod drive_tools;
mod mcp;
pub mod mcp_client;

pub use drive_tools::{drive_tool_definitions, execute_drive_tool, is_drive_tool, DriveToolMode};
pub use mcp::{call_tool_with_ui, McpHandler, ToolInvocation};
pub use mcp_client::{McpClient, McpTool, ResourceContent, ToolCallResult};
