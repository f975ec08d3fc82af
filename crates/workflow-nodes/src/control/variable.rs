//! Variable Node
//!
//! Stores a substituted value in the execution variables.

use async_trait::async_trait;
use node_engine::{
    replace_variables, require_resolved, ExecutionContext, HandlerOutcome, NodeHandler,
    NodeType, Result, ServiceContext, WorkflowNode,
};
use serde_json::json;

/// Variable Node
///
/// # Properties
/// - `name` (required) - Variable to write
/// - `value` (optional) - Templated value, empty when absent
///
/// # Outputs
/// - `variables[name]` - The substituted value
#[derive(Debug, Clone, Default)]
pub struct VariableHandler;

#[async_trait]
impl NodeHandler for VariableHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Variable
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        _services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let name = require_resolved(node, "name", context)?;
        let value = node
            .properties
            .get("value")
            .map(|v| replace_variables(v, context))
            .unwrap_or_default();

        log::debug!("Variable node {}: {} = {:?}", node.id, name, value);
        context.set(name.clone(), value.clone());

        Ok(HandlerOutcome::message(format!("Set {}", name))
            .with_output(json!({ "name": name, "value": value })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sets_substituted_value() {
        let node = WorkflowNode::new("v", NodeType::Variable)
            .with_property("name", "greeting")
            .with_property("value", "Hello {{who}}");
        let mut context = ExecutionContext::new();
        context.set("who", "Ada");
        let services = ServiceContext::new("exec", "root");

        let outcome = VariableHandler
            .execute(&node, &mut context, &services)
            .await
            .unwrap();

        assert_eq!(context.get("greeting"), Some("Hello Ada"));
        assert_eq!(outcome.message.as_deref(), Some("Set greeting"));
    }

    #[tokio::test]
    async fn test_missing_name_fails() {
        let node = WorkflowNode::new("v", NodeType::Variable).with_property("value", "x");
        let mut context = ExecutionContext::new();
        let services = ServiceContext::new("exec", "root");

        let err = VariableHandler
            .execute(&node, &mut context, &services)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "variable node missing 'name' property");
    }
}
