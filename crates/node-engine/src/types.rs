//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs (nodes, edges),
//! the per-run execution state, and the records persisted after a run.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};

/// Unique identifier for a node
pub type NodeId = String;

/// The closed set of node types the engine can dispatch
///
/// Deserializing an unknown type string fails, so a workflow with an
/// unsupported node is rejected when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Variable,
    Condition,
    PromptValue,
    Command,
    DriveFile,
    DriveRead,
    DriveSave,
    Mcp,
    RagSync,
}

impl NodeType {
    /// Every node type, in declaration order
    pub const ALL: [NodeType; 9] = [
        NodeType::Variable,
        NodeType::Condition,
        NodeType::PromptValue,
        NodeType::Command,
        NodeType::DriveFile,
        NodeType::DriveRead,
        NodeType::DriveSave,
        NodeType::Mcp,
        NodeType::RagSync,
    ];

    /// Wire name of the node type
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Variable => "variable",
            NodeType::Condition => "condition",
            NodeType::PromptValue => "prompt-value",
            NodeType::Command => "command",
            NodeType::DriveFile => "drive-file",
            NodeType::DriveRead => "drive-read",
            NodeType::DriveSave => "drive-save",
            NodeType::Mcp => "mcp",
            NodeType::RagSync => "rag-sync",
        }
    }

    /// Label used in validation messages
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::Command => "Command",
            NodeType::Mcp => "MCP",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl WorkflowNode {
    /// Create a node with no properties
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            properties: HashMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Raw property value; empty strings count as absent
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Raw property value or a missing-property error naming the key
    pub fn require(&self, key: &str) -> Result<&str> {
        self.property(key)
            .ok_or_else(|| NodeEngineError::missing(self.node_type.label(), key))
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn when(from: impl Into<String>, to: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
        }
    }
}

/// A workflow graph, immutable once execution begins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub nodes: HashMap<NodeId, WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub start_node: NodeId,
}

impl Workflow {
    /// Build a workflow from a node list, keyed by node id
    pub fn from_parts(
        nodes: impl IntoIterator<Item = WorkflowNode>,
        edges: Vec<Edge>,
        start_node: impl Into<String>,
    ) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            edges,
            start_node: start_node.into(),
        }
    }

    /// Parse a workflow from its JSON form and validate its structure
    pub fn from_json(json: &str) -> Result<Self> {
        let workflow: Workflow = serde_json::from_str(json)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Check structural invariants: known start node, consistent ids,
    /// and edges that only reference existing nodes
    pub fn validate(&self) -> Result<()> {
        if !self.nodes.contains_key(&self.start_node) {
            return Err(NodeEngineError::InvalidWorkflow(format!(
                "start node '{}' does not exist",
                self.start_node
            )));
        }
        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(NodeEngineError::InvalidWorkflow(format!(
                    "node key '{}' does not match node id '{}'",
                    key, node.id
                )));
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(end) {
                    return Err(NodeEngineError::InvalidWorkflow(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Outgoing edges of a node in declaration order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == node_id)
    }
}

/// File object passed between nodes (attachments, generated images, drive-save)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExplorerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    pub basename: String,
    pub name: String,
    pub extension: String,
    pub mime_type: String,
    pub content_type: FileContentType,
    /// Text content, or base64 for binary payloads
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileContentType {
    Text,
    Binary,
}

/// Result of an MCP tool call that exposes a UI resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpAppInfo {
    pub server_url: String,
    #[serde(default)]
    pub server_headers: HashMap<String, String>,
    pub tool_result: McpToolResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_resource: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Success,
    Error,
}

/// One entry of the execution log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub message: String,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_apps: Option<Vec<McpAppInfo>>,
}

impl LogEntry {
    pub fn new(node: &WorkflowNode, status: LogStatus, message: impl Into<String>) -> Self {
        Self {
            node_id: node.id.clone(),
            node_type: node.node_type,
            message: message.into(),
            status,
            timestamp: Utc::now(),
            mcp_apps: None,
        }
    }
}

/// Lifecycle state of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
    WaitingPrompt,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Error | ExecutionStatus::Cancelled
        )
    }
}

/// A log entry enriched with optional input/output/error for history views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    #[serde(flatten)]
    pub entry: LogEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable snapshot of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionRecord {
    pub fn start(id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Running,
            steps: Vec::new(),
        }
    }

    /// Set the terminal status and end time
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

/// The last command node that ran, kept for follow-up chats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommandInfo {
    pub node_id: NodeId,
    pub original_prompt: String,
    pub save_to: String,
}

/// Resources discovered by handlers during a run and shared with later nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredResources {
    /// RAG setting name -> store id
    #[serde(default)]
    pub rag_stores: HashMap<String, String>,
}

/// Per-run mutable state, owned by exactly one execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: HashMap<String, String>,
    pub logs: Vec<LogEntry>,
    pub last_command_info: Option<LastCommandInfo>,
    pub discovered: DiscoveredResources,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }
}
