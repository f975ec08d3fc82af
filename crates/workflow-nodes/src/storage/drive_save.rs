//! Drive Save Node
//!
//! Persists a file object (generated image, attachment, text) to Drive.
//! Binary payloads arrive base64-encoded and are decoded before upload.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use drive_store::upsert_file_in_meta;
use node_engine::{
    replace_variables, require_resolved, DriveFileChange, ExecutionContext, FileContentType,
    FileExplorerData, HandlerOutcome, NodeEngineError, NodeHandler, NodeType, Result,
    ServiceContext, WorkflowNode,
};
use serde_json::json;

use super::lookup::file_store;

/// Drive Save Node
///
/// # Properties
/// - `source` (required) - Variable name holding the file object, or the JSON itself
/// - `path` (required) - Target name; the file object's extension is appended when missing
/// - `savePathTo` (optional) - Variable receiving the final file name
#[derive(Debug, Clone, Default)]
pub struct DriveSaveHandler;

fn target_name(path: &str, data: &FileExplorerData) -> String {
    let ext = data.extension.trim_start_matches('.');
    if path.contains('.') || ext.is_empty() {
        path.to_string()
    } else {
        format!("{}.{}", path, ext)
    }
}

#[async_trait]
impl NodeHandler for DriveSaveHandler {
    fn node_type(&self) -> NodeType {
        NodeType::DriveSave
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let source_raw = node.require("source")?;
        let path = require_resolved(node, "path", context)?;

        let resolved = replace_variables(source_raw, context);
        let source = context.get(&resolved).unwrap_or(resolved.as_str());
        let data: FileExplorerData = serde_json::from_str(source).map_err(|_| {
            NodeEngineError::failed(format!(
                "Variable '{}' does not contain valid FileExplorerData JSON",
                source_raw
            ))
        })?;

        let file_name = target_name(&path, &data);
        let binary = data.content_type == FileContentType::Binary;
        let bytes = if binary {
            BASE64.decode(data.data.trim()).map_err(|e| {
                NodeEngineError::failed(format!("Invalid base64 content in '{}': {}", source_raw, e))
            })?
        } else {
            data.data.clone().into_bytes()
        };

        let store = file_store(services)?;
        let root = store.root_folder_id().to_string();
        let existing = store
            .search(&root, &file_name)
            .await?
            .into_iter()
            .find(|f| f.name == file_name);

        let written = match &existing {
            Some(file) => store.update(&file.id, &bytes, &data.mime_type).await?,
            None => store.create(&file_name, &bytes, &root, &data.mime_type).await?,
        };
        upsert_file_in_meta(store.as_ref(), &written).await?;

        let change = DriveFileChange {
            file_id: written.id.clone(),
            file_name: written.name.clone(),
            content: if binary { String::new() } else { data.data.clone() },
            md5_checksum: written.md5_checksum.clone(),
            modified_time: written.modified_time.clone(),
        };
        if existing.is_some() {
            services.drive_file_updated(change);
        } else {
            services.drive_file_created(change);
        }

        if let Some(save_path_to) = node.property("savePathTo") {
            context.set(save_path_to, written.name.clone());
        }

        log::info!("drive-save {}: saved {} ({} bytes)", node.id, written.name, bytes.len());
        Ok(HandlerOutcome::message(format!("Saved {}", written.name))
            .with_output(json!({ "fileId": written.id, "fileName": written.name })))
    }
}
