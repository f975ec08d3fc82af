//! RAG Sync Node
//!
//! Uploads a Drive file into a named RAG store, creating the store on
//! first use. The store id is reported back so later nodes in the run can
//! ground on it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use drive_store::RagStore;
use node_engine::{
    extension_keys, require_resolved, ExecutionContext, HandlerOutcome, NodeEngineError,
    NodeHandler, NodeType, Result, ServiceContext, WorkflowNode,
};
use serde_json::json;

use super::lookup::{file_store, find_file};

/// RAG Sync Node
///
/// # Properties
/// - `path` (required) - File name, `.md` tried when missing
/// - `ragSetting` (required) - RAG setting (and store) name
/// - `saveTo` (optional) - Variable receiving `{path, ragSetting, fileId, mode, syncedAt}`
#[derive(Debug, Clone, Default)]
pub struct RagSyncHandler;

#[async_trait]
impl NodeHandler for RagSyncHandler {
    fn node_type(&self) -> NodeType {
        NodeType::RagSync
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let path = require_resolved(node, "path", context)?;
        let setting = require_resolved(node, "ragSetting", context)?;
        if services.api_key.is_none() {
            return Err(NodeEngineError::failed("Gemini API key not configured"));
        }

        let store = file_store(services)?;
        let rag = services
            .extensions
            .require::<Arc<dyn RagStore>>(extension_keys::RAG_STORE)?;

        let file = find_file(store.as_ref(), &services.root_folder_id, &path, true)
            .await?
            .ok_or_else(|| NodeEngineError::failed(format!("File not found on Drive: {}", path)))?;

        let store_id = match context.discovered.rag_stores.get(&setting) {
            Some(id) => id.clone(),
            None => rag.get_or_create_store(&setting).await?,
        };
        let content = store.read(&file.id).await?;
        let document = rag.upload(&store_id, &file.name, &content).await?;
        log::info!(
            "rag-sync {}: uploaded {} into {} as {}",
            node.id,
            file.name,
            store_id,
            document.document_id
        );

        let result = json!({
            "path": path,
            "ragSetting": setting,
            "fileId": document.document_id,
            "mode": "upload",
            "syncedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Some(save_to) = node.property("saveTo") {
            context.set(save_to, result.to_string());
        }

        Ok(HandlerOutcome::message(format!("Synced {} to {}", file.name, setting))
            .with_output(result)
            .with_rag_store(setting, store_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::{FileStore, InMemoryFileStore, InMemoryRagStore};
    use node_engine::ExecutorExtensions;
    use serde_json::Value;

    fn setup(rag: Arc<InMemoryRagStore>) -> (Arc<InMemoryFileStore>, ServiceContext) {
        let store = Arc::new(InMemoryFileStore::new());
        let mut ext = ExecutorExtensions::new();
        ext.set(extension_keys::FILE_STORE, store.clone() as Arc<dyn FileStore>);
        ext.set(extension_keys::RAG_STORE, rag as Arc<dyn RagStore>);
        let services = ServiceContext::new("exec", "root")
            .with_api_key("key")
            .with_extensions(ext);
        (store, services)
    }

    fn node() -> WorkflowNode {
        WorkflowNode::new("g", NodeType::RagSync)
            .with_property("path", "{{doc}}")
            .with_property("ragSetting", "research")
            .with_property("saveTo", "synced")
    }

    #[tokio::test]
    async fn test_uploads_and_reports_store() {
        let rag = Arc::new(InMemoryRagStore::new());
        let (store, services) = setup(rag.clone());
        store.create("paper.md", b"# findings", "root", "text/markdown").await.unwrap();
        let mut context = ExecutionContext::new();
        context.set("doc", "paper");

        let outcome = RagSyncHandler.execute(&node(), &mut context, &services).await.unwrap();

        let store_id = outcome.discovered_rag_stores.get("research").unwrap();
        assert_eq!(rag.documents_in(store_id), vec!["paper.md"]);

        let saved: Value = serde_json::from_str(context.get("synced").unwrap()).unwrap();
        assert_eq!(saved["path"], "paper");
        assert_eq!(saved["ragSetting"], "research");
        assert_eq!(saved["mode"], "upload");
    }

    #[tokio::test]
    async fn test_unset_path_variable() {
        let rag = Arc::new(InMemoryRagStore::new());
        let (_store, services) = setup(rag.clone());
        let err = RagSyncHandler
            .execute(&node(), &mut ExecutionContext::new(), &services)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "rag-sync node missing 'path' property");
        assert!(rag.documents_in("research").is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_and_key() {
        let rag = Arc::new(InMemoryRagStore::new());
        let (_store, services) = setup(rag.clone());
        let mut context = ExecutionContext::new();
        context.set("doc", "absent");
        let err = RagSyncHandler.execute(&node(), &mut context, &services).await.unwrap_err();
        assert_eq!(err.to_string(), "File not found on Drive: absent");

        let services = ServiceContext::new("exec", "root");
        let err = RagSyncHandler.execute(&node(), &mut context, &services).await.unwrap_err();
        assert_eq!(err.to_string(), "Gemini API key not configured");
    }
}
