//! Prompt Value Node
//!
//! Pauses the run until the user answers a value prompt. The execution
//! store holds the resolver; a stop request or a superseding prompt
//! resolves it with `null`, which cancels the run.

use async_trait::async_trait;
use node_engine::{
    replace_variables, ExecutionContext, HandlerOutcome, NodeEngineError, NodeHandler, NodeType,
    PromptRequest, Result, ServiceContext, WorkflowNode,
};
use serde_json::Value;

/// Prompt Value Node
///
/// # Properties
/// - `title` (optional) - Prompt title, templated
/// - `default` (optional) - Pre-filled value, templated
/// - `saveTo` (required) - Variable receiving the answer
#[derive(Debug, Clone, Default)]
pub struct PromptValueHandler;

/// Text form of a prompt answer: strings as-is, anything else as JSON
pub fn prompt_answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl NodeHandler for PromptValueHandler {
    fn node_type(&self) -> NodeType {
        NodeType::PromptValue
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let save_to = node.require("saveTo")?.to_string();
        let title = node
            .property("title")
            .map(|t| replace_variables(t, context))
            .unwrap_or_else(|| "Input".to_string());
        let default_value = node.property("default").map(|d| replace_variables(d, context));

        log::debug!("Prompt node {}: waiting for '{}'", node.id, title);
        let answer = services
            .prompt(PromptRequest::value(title, default_value))
            .await?;

        let Some(answer) = answer.filter(|v| !v.is_null()) else {
            log::info!("Prompt node {}: no answer, cancelling run", node.id);
            return Err(NodeEngineError::Cancelled);
        };

        let text = prompt_answer_text(&answer);
        context.set(save_to.clone(), text);
        Ok(HandlerOutcome::message(format!("Saved input to {}", save_to)))
    }
}
