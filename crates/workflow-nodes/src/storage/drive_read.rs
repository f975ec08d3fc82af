//! Drive Read Node
//!
//! Reads a file's text into a variable.

use async_trait::async_trait;
use node_engine::{
    has_unresolved, replace_variables, ExecutionContext, HandlerOutcome, NodeEngineError,
    NodeHandler, NodeType, Result, ServiceContext, WorkflowNode,
};
use serde_json::json;

use super::lookup::{companion_file_id, file_store, find_file, looks_like_file_id};

/// Drive Read Node
///
/// # Properties
/// - `path` (required) - File id, file name, or `{{var}}` with a `var_fileId` companion
/// - `saveTo` (required) - Variable receiving the content
#[derive(Debug, Clone, Default)]
pub struct DriveReadHandler;

#[async_trait]
impl NodeHandler for DriveReadHandler {
    fn node_type(&self) -> NodeType {
        NodeType::DriveRead
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let save_to = node.require("saveTo")?.to_string();
        let raw_path = node.require("path")?;
        let path = replace_variables(raw_path, context);
        let store = file_store(services)?;

        let file_id = if looks_like_file_id(&path) {
            path.clone()
        } else if let Some(id) = companion_file_id(raw_path, context) {
            id
        } else if path.trim().is_empty() || has_unresolved(&path) {
            return Err(NodeEngineError::missing(node.node_type.label(), "path"));
        } else {
            find_file(store.as_ref(), &services.root_folder_id, &path, true)
                .await?
                .map(|f| f.id)
                .ok_or_else(|| {
                    NodeEngineError::failed(format!("File not found on Drive: {}", path))
                })?
        };

        let content = store.read_text(&file_id).await?;
        log::debug!(
            "drive-read {}: read {} bytes from {} into {}",
            node.id,
            content.len(),
            file_id,
            save_to
        );
        let length = content.len();
        context.set(save_to.clone(), content);

        Ok(HandlerOutcome::message(format!("Read {} into {}", path, save_to))
            .with_output(json!({ "fileId": file_id, "length": length })))
    }
}
