//! Node type registry
//!
//! Maps each [`NodeType`] to the handler that runs it. A workflow is checked
//! against the registry before it starts, so a node without a handler is a
//! load-time error rather than a failure halfway through a run.
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! registry.register(Arc::new(VariableHandler));
//! registry.validate(&workflow)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NodeEngineError, Result};
use crate::service::ServiceContext;
use crate::types::{ExecutionContext, McpAppInfo, NodeType, Workflow, WorkflowNode};

/// What a handler reports back to the executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Success log message; the executor supplies one when absent
    pub message: Option<String>,
    /// Branch taken by a condition node
    pub branch: Option<bool>,
    /// Structured result kept on the execution step
    pub output: Option<Value>,
    pub mcp_apps: Vec<McpAppInfo>,
    /// RAG setting name -> store id, merged into the run's discovered resources
    pub discovered_rag_stores: HashMap<String, String>,
}

impl HandlerOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn branch(taken: bool) -> Self {
        Self {
            message: Some(format!("Condition evaluated to {}", taken)),
            branch: Some(taken),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_mcp_apps(mut self, apps: Vec<McpAppInfo>) -> Self {
        self.mcp_apps = apps;
        self
    }

    pub fn with_rag_store(mut self, setting: impl Into<String>, store_id: impl Into<String>) -> Self {
        self.discovered_rag_stores.insert(setting.into(), store_id.into());
        self
    }
}

/// Runs exactly one node type
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> NodeType;

    /// Execute one node. Templated properties are resolved by the handler.
    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome>;
}

/// Registry of node handlers keyed by node type
#[derive(Default)]
pub struct NodeRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for its type
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let node_type = handler.node_type();
        if self.handlers.insert(node_type, handler).is_some() {
            log::debug!("Replaced handler for node type '{}'", node_type);
        }
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type)
    }

    pub fn has(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// Registered node types in declaration order
    pub fn node_types(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|ty| self.handlers.contains_key(ty))
            .collect()
    }

    /// Merge another registry into this one. Later registrations win.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.handlers.extend(other.handlers);
    }

    /// Check graph structure and that every node has a handler
    pub fn validate(&self, workflow: &Workflow) -> Result<()> {
        workflow.validate()?;
        let mut ids: Vec<&String> = workflow.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let node = &workflow.nodes[id];
            if !self.has(node.node_type) {
                return Err(NodeEngineError::UnknownNodeType(format!(
                    "no handler registered for '{}' (node {})",
                    node.node_type, node.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Edge;

    struct Noop(NodeType);

    #[async_trait]
    impl NodeHandler for Noop {
        fn node_type(&self) -> NodeType {
            self.0
        }

        async fn execute(
            &self,
            _node: &WorkflowNode,
            _context: &mut ExecutionContext,
            _services: &ServiceContext,
        ) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::done())
        }
    }

    fn workflow(types: &[(&str, NodeType)]) -> Workflow {
        let nodes: Vec<_> = types
            .iter()
            .map(|(id, ty)| WorkflowNode::new(*id, *ty))
            .collect();
        let edges = types
            .windows(2)
            .map(|pair| Edge::new(pair[0].0, pair[1].0))
            .collect();
        Workflow::from_parts(nodes, edges, types[0].0)
    }

    #[test]
    fn test_validate_requires_handlers() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(Noop(NodeType::Variable)));

        let ok = workflow(&[("a", NodeType::Variable), ("b", NodeType::Variable)]);
        assert!(registry.validate(&ok).is_ok());

        let missing = workflow(&[("a", NodeType::Variable), ("b", NodeType::Mcp)]);
        let err = registry.validate(&missing).unwrap_err();
        assert!(matches!(err, NodeEngineError::UnknownNodeType(_)));
        assert!(err.to_string().contains("mcp"));
    }

    #[test]
    fn test_merge_and_listing() {
        let mut a = NodeRegistry::new();
        a.register(Arc::new(Noop(NodeType::Mcp)));
        let mut b = NodeRegistry::new();
        b.register(Arc::new(Noop(NodeType::Variable)));
        a.merge(b);
        assert_eq!(a.node_types(), vec![NodeType::Variable, NodeType::Mcp]);
    }

    #[test]
    fn test_outcome_builders() {
        let outcome = HandlerOutcome::branch(false).with_rag_store("docs", "stores/docs");
        assert_eq!(outcome.branch, Some(false));
        assert_eq!(outcome.discovered_rag_stores["docs"], "stores/docs");
    }
}
