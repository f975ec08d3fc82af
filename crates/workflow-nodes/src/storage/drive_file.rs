//! Drive File Node
//!
//! Writes templated content to a file in the Drive root. The target is
//! resolved by companion `_fileId` variable, then by name search, then by
//! exact name. Writes are not rolled back if a later node fails.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use drive_store::{upsert_file_in_meta, DriveFile, FileStore};
use node_engine::{
    extension_keys, replace_variables, require_resolved, DriveFileChange, ExecutionContext,
    HandlerOutcome, NodeEngineError, NodeHandler, NodeType, PromptRequest, Result,
    ServiceContext, WorkflowNode,
};
use serde_json::{json, Value};

use super::history::EditHistoryRecorder;
use super::lookup::{companion_file_id, file_store, find_file, with_markdown_extension};

const MARKDOWN: &str = "text/markdown";

/// How an existing file is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Leave an existing file untouched
    Create,
    /// Join existing content and the new content with a newline
    Append,
    #[default]
    Overwrite,
}

impl FromStr for WriteMode {
    type Err = NodeEngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "create" => Ok(WriteMode::Create),
            "append" => Ok(WriteMode::Append),
            "overwrite" | "" => Ok(WriteMode::Overwrite),
            other => Err(NodeEngineError::failed(format!(
                "drive-file node has unknown mode '{}'",
                other
            ))),
        }
    }
}

/// Drive File Node
///
/// # Properties
/// - `path` (required) - File name, `.md` appended when it has no extension
/// - `content` (optional) - Templated content
/// - `mode` (optional) - `create`, `append` or `overwrite` (default)
/// - `confirm` (optional) - Ask before writing unless `false`
/// - `history` (optional) - Record the change in edit history unless `false`
#[derive(Debug, Clone, Default)]
pub struct DriveFileHandler;

fn flag(node: &WorkflowNode, key: &str) -> bool {
    node.property(key).is_some_and(|v| v.trim() != "false")
}

/// A dialog answer counts as confirmation unless it is empty, `false`, or
/// names the Cancel button
fn dialog_confirmed(answer: &Value) -> bool {
    match answer {
        Value::Null | Value::Bool(false) => false,
        Value::String(button) => button != "Cancel",
        Value::Object(map) => map.get("button").and_then(Value::as_str) != Some("Cancel"),
        _ => true,
    }
}

fn change_of(file: &DriveFile, content: &str) -> DriveFileChange {
    DriveFileChange {
        file_id: file.id.clone(),
        file_name: file.name.clone(),
        content: content.to_string(),
        md5_checksum: file.md5_checksum.clone(),
        modified_time: file.modified_time.clone(),
    }
}

impl DriveFileHandler {
    async fn resolve_target(
        &self,
        store: &dyn FileStore,
        node: &WorkflowNode,
        context: &ExecutionContext,
        file_name: &str,
    ) -> Result<Option<DriveFile>> {
        if let Some(id) = node.property("path").and_then(|raw| companion_file_id(raw, context)) {
            if let Some(file) = store.get(&id).await? {
                return Ok(Some(file));
            }
            log::warn!("drive-file {}: companion file id {} not found", node.id, id);
        }
        find_file(store, store.root_folder_id(), file_name, false).await
    }

    async fn record_history(
        &self,
        services: &ServiceContext,
        file: &DriveFile,
        old: &str,
        new: &str,
    ) {
        let Some(recorder) = services
            .extensions
            .get::<Arc<dyn EditHistoryRecorder>>(extension_keys::EDIT_HISTORY)
        else {
            return;
        };
        if let Err(e) = recorder.record(&file.id, &file.name, old, new, "workflow").await {
            log::warn!("Failed to record edit history for {}: {}", file.name, e);
        }
    }
}

#[async_trait]
impl NodeHandler for DriveFileHandler {
    fn node_type(&self) -> NodeType {
        NodeType::DriveFile
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        services: &ServiceContext,
    ) -> Result<HandlerOutcome> {
        let path = require_resolved(node, "path", context)?;
        let content = node
            .properties
            .get("content")
            .map(|c| replace_variables(c, context))
            .unwrap_or_default();
        let mode: WriteMode = node.property("mode").unwrap_or_default().parse()?;

        if flag(node, "confirm") && services.prompts.is_none() {
            log::debug!("drive-file {}: no prompt handler, writing without confirmation", node.id);
        } else if flag(node, "confirm") {
            let request = PromptRequest::dialog(
                "Confirm Write",
                format!("Write to \"{}\"?", path),
                vec!["OK".to_string(), "Cancel".to_string()],
            );
            let confirmed = services
                .prompt(request)
                .await?
                .is_some_and(|answer| dialog_confirmed(&answer));
            if !confirmed {
                log::info!("drive-file {}: write to {} declined", node.id, path);
                return Ok(HandlerOutcome::message(format!("Skipped write to {}", path)));
            }
        }

        let store = file_store(services)?;
        let file_name = with_markdown_extension(&path);
        let existing = self
            .resolve_target(store.as_ref(), node, context, &file_name)
            .await?;

        let history = flag(node, "history");
        let (written, final_content, created) = match (mode, existing) {
            (WriteMode::Create, Some(file)) => {
                log::debug!("drive-file {}: {} exists, create is a no-op", node.id, file.name);
                return Ok(HandlerOutcome::message(format!("{} already exists", file.name)));
            }
            (WriteMode::Append, Some(file)) => {
                let current = store.read_text(&file.id).await?;
                let joined = format!("{}\n{}", current, content);
                let updated = store.update(&file.id, joined.as_bytes(), MARKDOWN).await?;
                if history {
                    self.record_history(services, &updated, &current, &joined).await;
                }
                (updated, joined, false)
            }
            (WriteMode::Overwrite, Some(file)) => {
                let old = if history {
                    store.read_text(&file.id).await.unwrap_or_default()
                } else {
                    String::new()
                };
                let updated = store.update(&file.id, content.as_bytes(), MARKDOWN).await?;
                if history {
                    self.record_history(services, &updated, &old, &content).await;
                }
                (updated, content, false)
            }
            (_, None) => {
                let created = store
                    .create(&file_name, content.as_bytes(), store.root_folder_id(), MARKDOWN)
                    .await?;
                (created, content, true)
            }
        };

        if let Err(e) = upsert_file_in_meta(store.as_ref(), &written).await {
            log::warn!("Failed to update sync meta for {}: {}", written.name, e);
        }

        let change = change_of(&written, &final_content);
        let verb = if created {
            services.drive_file_created(change);
            "Created"
        } else {
            services.drive_file_updated(change);
            "Updated"
        };
        log::info!("drive-file {}: {} {} ({})", node.id, verb, written.name, written.id);

        Ok(HandlerOutcome::message(format!("{} {}", verb, written.name))
            .with_output(json!({ "fileId": written.id, "fileName": written.name })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::{read_remote_sync_meta, InMemoryFileStore};
    use node_engine::{ExecutorExtensions, PromptCallbacks, VecEventSink, WorkflowEvent};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(String, String, String)>>);

    #[async_trait]
    impl EditHistoryRecorder for Recorded {
        async fn record(&self, _id: &str, name: &str, old: &str, new: &str, source: &str) -> Result<()> {
            assert_eq!(source, "workflow");
            self.0.lock().push((name.into(), old.into(), new.into()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EditHistoryRecorder for Failing {
        async fn record(&self, _: &str, _: &str, _: &str, _: &str, _: &str) -> Result<()> {
            Err(NodeEngineError::service("history", "unavailable"))
        }
    }

    struct Answer(Option<Value>);

    #[async_trait]
    impl PromptCallbacks for Answer {
        async fn prompt(&self, request: PromptRequest) -> Option<Value> {
            assert_eq!(request.title, "Confirm Write");
            self.0.clone()
        }
    }

    fn setup(
        store: Arc<InMemoryFileStore>,
        history: Option<Arc<dyn EditHistoryRecorder>>,
    ) -> (ServiceContext, Arc<VecEventSink>) {
        let mut ext = ExecutorExtensions::new();
        ext.set(extension_keys::FILE_STORE, store as Arc<dyn FileStore>);
        if let Some(history) = history {
            ext.set(extension_keys::EDIT_HISTORY, history);
        }
        let events = Arc::new(VecEventSink::new());
        let services = ServiceContext::new("exec", "root")
            .with_extensions(ext)
            .with_events(events.clone());
        (services, events)
    }

    fn node(path: &str, content: &str) -> WorkflowNode {
        WorkflowNode::new("w", NodeType::DriveFile)
            .with_property("path", path)
            .with_property("content", content)
    }

    async fn text(store: &InMemoryFileStore, name: &str) -> String {
        let file = store.find_by_exact_name(name, None).await.unwrap().unwrap();
        store.read_text(&file.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_markdown_file_and_emits_event() {
        let store = Arc::new(InMemoryFileStore::new());
        let (services, events) = setup(store.clone(), None);
        let mut context = ExecutionContext::new();
        context.set("topic", "rust");

        DriveFileHandler
            .execute(&node("notes/{{topic}}", "# {{topic}}"), &mut context, &services)
            .await
            .unwrap();

        assert_eq!(text(&store, "notes/rust.md").await, "# rust");
        assert_eq!(events.names(), vec!["drive-file-created"]);

        let meta = read_remote_sync_meta(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(meta.files.len(), 1);
    }

    #[tokio::test]
    async fn test_modes() {
        let store = Arc::new(InMemoryFileStore::new());
        store.create("log.md", b"first", "root", MARKDOWN).await.unwrap();
        let (services, events) = setup(store.clone(), None);
        let mut context = ExecutionContext::new();

        let append = node("log", "second").with_property("mode", "append");
        DriveFileHandler.execute(&append, &mut context, &services).await.unwrap();
        assert_eq!(text(&store, "log.md").await, "first\nsecond");

        let create = node("log", "ignored").with_property("mode", "create");
        DriveFileHandler.execute(&create, &mut context, &services).await.unwrap();
        assert_eq!(text(&store, "log.md").await, "first\nsecond");

        DriveFileHandler
            .execute(&node("log", "fresh"), &mut context, &services)
            .await
            .unwrap();
        assert_eq!(text(&store, "log.md").await, "fresh");

        assert!(matches!(
            events.events().last(),
            Some(WorkflowEvent::DriveFileUpdated { file, .. }) if file.content == "fresh"
        ));
    }

    #[tokio::test]
    async fn test_companion_file_id_wins() {
        let store = Arc::new(InMemoryFileStore::new());
        let picked = store.create("picked.md", b"old", "root", MARKDOWN).await.unwrap();
        let (services, _) = setup(store.clone(), None);
        let mut context = ExecutionContext::new();
        context.set("file", "something-else");
        context.set("file_fileId", picked.id.clone());

        DriveFileHandler
            .execute(&node("{{file}}", "new"), &mut context, &services)
            .await
            .unwrap();
        assert_eq!(store.read_text(&picked.id).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_history_recorded_and_failure_ignored() {
        let store = Arc::new(InMemoryFileStore::new());
        store.create("a.md", b"v1", "root", MARKDOWN).await.unwrap();
        let recorded = Arc::new(Recorded::default());
        let (services_ok, _) = setup(store.clone(), Some(recorded.clone()));
        let mut context = ExecutionContext::new();

        let write = node("a.md", "v2").with_property("history", "true");
        DriveFileHandler.execute(&write, &mut context, &services_ok).await.unwrap();
        assert_eq!(
            recorded.0.lock().clone(),
            vec![("a.md".to_string(), "v1".to_string(), "v2".to_string())]
        );

        let (services_bad, _) = setup(store.clone(), Some(Arc::new(Failing)));
        let write = node("a.md", "v3").with_property("history", "true");
        DriveFileHandler.execute(&write, &mut context, &services_bad).await.unwrap();
        assert_eq!(text(&store, "a.md").await, "v3");
    }

    #[tokio::test]
    async fn test_declined_confirmation_skips_write() {
        let store = Arc::new(InMemoryFileStore::new());
        for answer in [None, Some(json!({ "button": "Cancel" }))] {
            let (services, events) = setup(store.clone(), None);
            let services = services.with_prompts(Arc::new(Answer(answer)));
            let mut context = ExecutionContext::new();
            let write = node("guarded", "x").with_property("confirm", "true");
            let outcome = DriveFileHandler.execute(&write, &mut context, &services).await.unwrap();
            assert_eq!(outcome.message.as_deref(), Some("Skipped write to guarded"));
            assert!(events.events().is_empty());
        }
        assert_eq!(store.file_count(), 0);

        let (services, _) = setup(store.clone(), None);
        let services = services.with_prompts(Arc::new(Answer(Some(json!({ "button": "OK" })))));
        let mut context = ExecutionContext::new();
        let write = node("guarded", "x").with_property("confirm", "true");
        DriveFileHandler.execute(&write, &mut context, &services).await.unwrap();
        assert_eq!(text(&store, "guarded.md").await, "x");
    }

    #[tokio::test]
    async fn test_confirmation_skipped_without_prompt_handler() {
        let store = Arc::new(InMemoryFileStore::new());
        let (services, events) = setup(store.clone(), None);
        let mut context = ExecutionContext::new();
        let write = node("unattended", "x").with_property("confirm", "true");
        DriveFileHandler.execute(&write, &mut context, &services).await.unwrap();
        assert_eq!(text(&store, "unattended.md").await, "x");
        assert_eq!(events.names(), vec!["drive-file-created"]);
    }

    #[tokio::test]
    async fn test_unresolved_path_is_rejected() {
        let store = Arc::new(InMemoryFileStore::new());
        let (services, events) = setup(store.clone(), None);
        let mut context = ExecutionContext::new();
        let err = DriveFileHandler
            .execute(&node("{{missingName}}", "body"), &mut context, &services)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "drive-file node missing 'path' property");

        context.set("missingName", "");
        assert!(DriveFileHandler
            .execute(&node("{{missingName}}", "body"), &mut context, &services)
            .await
            .is_err());
        assert_eq!(store.file_count(), 0);
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
        assert!("shred".parse::<WriteMode>().is_err());
    }
}
