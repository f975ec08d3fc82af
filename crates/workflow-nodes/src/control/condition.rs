//! Condition Node
//!
//! Evaluates an expression and reports the branch taken. The executor
//! follows outgoing edges labelled `true` or `false` accordingly.

use async_trait::async_trait;
use node_engine::{
    evaluate_condition, ExecutionContext, HandlerOutcome, NodeHandler, NodeType, Result,
    ServiceContext, WorkflowNode,
};
use serde_json::json;

/// Condition Node
///
/// # Properties
/// - `condition` (required) - `left op right` or a single operand
///
/// # Outputs
/// - branch `true` / `false`
#[derive(Debug, Clone, Default)]
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        _services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let expression = node.require("condition")?;
        let taken = evaluate_condition(expression, context);
        log::debug!("Condition node {}: '{}' -> {}", node.id, expression, taken);
        Ok(HandlerOutcome::branch(taken).with_output(json!({ "result": taken })))
    }
}
