//! Registry and extension setup for host applications.
//!
//! Hosts call [`builtin_registry`] once at startup and [`setup_extensions`]
//! for every run, so handlers can find their collaborators without host
//! crates naming the extension keys.
//!
//! ```ignore
//! let registry = workflow_nodes::builtin_registry();
//! let mut extensions = ExecutorExtensions::new();
//! workflow_nodes::setup_extensions(&mut extensions, Collaborators::new(store));
//! ```

use std::sync::Arc;

use drive_store::{FileStore, RagStore};
use node_engine::{extension_keys, ExecutorExtensions, NodeRegistry};

use crate::control::{ConditionHandler, VariableHandler};
use crate::input::PromptValueHandler;
use crate::processing::{CommandHandler, LlmProvider};
use crate::storage::{
    DriveFileHandler, DriveReadHandler, DriveSaveHandler, EditHistoryRecorder, RagSyncHandler,
};
use crate::tool::McpHandler;

/// Registry with a handler for every built-in node type
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(VariableHandler));
    registry.register(Arc::new(ConditionHandler));
    registry.register(Arc::new(PromptValueHandler));
    registry.register(Arc::new(CommandHandler));
    registry.register(Arc::new(DriveFileHandler));
    registry.register(Arc::new(DriveReadHandler));
    registry.register(Arc::new(DriveSaveHandler));
    registry.register(Arc::new(McpHandler));
    registry.register(Arc::new(RagSyncHandler));
    registry
}

/// Collaborators a run may use; only the file store is mandatory
#[derive(Clone)]
pub struct Collaborators {
    pub file_store: Arc<dyn FileStore>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub rag: Option<Arc<dyn RagStore>>,
    pub edit_history: Option<Arc<dyn EditHistoryRecorder>>,
}

impl Collaborators {
    pub fn new(file_store: Arc<dyn FileStore>) -> Self {
        Self {
            file_store,
            llm: None,
            rag: None,
            edit_history: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_rag(mut self, rag: Arc<dyn RagStore>) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn with_edit_history(mut self, history: Arc<dyn EditHistoryRecorder>) -> Self {
        self.edit_history = Some(history);
        self
    }
}

/// Put the collaborators into `extensions` under their well-known keys
pub fn setup_extensions(extensions: &mut ExecutorExtensions, collaborators: Collaborators) {
    extensions.set(extension_keys::FILE_STORE, collaborators.file_store);
    if let Some(llm) = collaborators.llm {
        extensions.set(extension_keys::LLM_PROVIDER, llm);
    }
    if let Some(rag) = collaborators.rag {
        extensions.set(extension_keys::RAG_STORE, rag);
    }
    if let Some(history) = collaborators.edit_history {
        extensions.set(extension_keys::EDIT_HISTORY, history);
    } else {
        log::debug!("No edit history recorder configured; drive-file edits are not recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::{InMemoryFileStore, InMemoryRagStore};
    use node_engine::NodeType;

    #[test]
    fn test_every_node_type_has_a_handler() {
        let registry = builtin_registry();
        assert_eq!(registry.node_types(), NodeType::ALL.to_vec());
    }

    #[test]
    fn test_extensions_are_found_by_handlers() {
        let mut extensions = ExecutorExtensions::new();
        let collaborators = Collaborators::new(Arc::new(InMemoryFileStore::new()))
            .with_rag(Arc::new(InMemoryRagStore::new()));
        setup_extensions(&mut extensions, collaborators);

        assert!(extensions
            .get::<Arc<dyn FileStore>>(extension_keys::FILE_STORE)
            .is_some());
        assert!(extensions
            .get::<Arc<dyn RagStore>>(extension_keys::RAG_STORE)
            .is_some());
        assert!(!extensions.has(extension_keys::LLM_PROVIDER));
    }
}
