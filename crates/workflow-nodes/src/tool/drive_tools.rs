//! Drive tools exposed to the model by the command node
//!
//! Tool failures are returned in-band as `{"error": ...}` so the model can
//! react to them; they never fail the node.

use std::str::FromStr;

use drive_store::paths::is_sync_excluded_path;
use drive_store::{upsert_file_in_meta, DriveFile, FileStore};
use node_engine::{NodeEngineError, Result};
use serde_json::{json, Value};

use crate::processing::ToolDefinition;

pub const READ_DRIVE_FILE: &str = "read_drive_file";
pub const SEARCH_DRIVE_FILES: &str = "search_drive_files";
pub const LIST_DRIVE_FILES: &str = "list_drive_files";
pub const CREATE_DRIVE_FILE: &str = "create_drive_file";
pub const UPDATE_DRIVE_FILE: &str = "update_drive_file";

/// Tools hidden in `noSearch` mode
pub const DRIVE_SEARCH_TOOL_NAMES: [&str; 1] = [SEARCH_DRIVE_FILES];

/// Which drive tools a command node offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveToolMode {
    #[default]
    None,
    NoSearch,
    All,
}

impl FromStr for DriveToolMode {
    type Err = NodeEngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "none" => Ok(DriveToolMode::None),
            "noSearch" => Ok(DriveToolMode::NoSearch),
            "all" => Ok(DriveToolMode::All),
            other => Err(NodeEngineError::failed(format!(
                "Unknown driveToolMode '{}'",
                other
            ))),
        }
    }
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn all_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            READ_DRIVE_FILE,
            "Read the text content of a file in the user's Drive by file id.",
            json!({
                "type": "object",
                "properties": { "fileId": { "type": "string" } },
                "required": ["fileId"],
            }),
        ),
        tool(
            SEARCH_DRIVE_FILES,
            "Search the user's Drive for files whose name contains the query.",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        ),
        tool(
            LIST_DRIVE_FILES,
            "List the files in the user's Drive workspace.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            CREATE_DRIVE_FILE,
            "Create a new text file in the user's Drive.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["name", "content"],
            }),
        ),
        tool(
            UPDATE_DRIVE_FILE,
            "Replace the content of an existing file in the user's Drive.",
            json!({
                "type": "object",
                "properties": {
                    "fileId": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["fileId", "content"],
            }),
        ),
    ]
}

/// Tool definitions offered in `mode`
pub fn drive_tool_definitions(mode: DriveToolMode) -> Vec<ToolDefinition> {
    match mode {
        DriveToolMode::None => Vec::new(),
        DriveToolMode::NoSearch => all_definitions()
            .into_iter()
            .filter(|t| !DRIVE_SEARCH_TOOL_NAMES.contains(&t.name.as_str()))
            .collect(),
        DriveToolMode::All => all_definitions(),
    }
}

pub fn is_drive_tool(name: &str) -> bool {
    matches!(
        name,
        READ_DRIVE_FILE | SEARCH_DRIVE_FILES | LIST_DRIVE_FILES | CREATE_DRIVE_FILE | UPDATE_DRIVE_FILE
    )
}

fn summary(file: &DriveFile) -> Value {
    json!({
        "id": file.id,
        "name": file.name,
        "mimeType": file.mime_type,
        "modifiedTime": file.modified_time,
    })
}

fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeEngineError::failed(format!("missing argument '{}'", key)))
}

async fn run(store: &dyn FileStore, name: &str, args: &Value) -> Result<Value> {
    let root = store.root_folder_id().to_string();
    match name {
        READ_DRIVE_FILE => {
            let id = string_arg(args, "fileId")?;
            let file = store
                .get(id)
                .await?
                .ok_or_else(|| NodeEngineError::failed(format!("File not found: {}", id)))?;
            let content = store.read_text(id).await?;
            Ok(json!({ "id": file.id, "name": file.name, "content": content }))
        }
        SEARCH_DRIVE_FILES => {
            let query = string_arg(args, "query")?;
            let files = store.search(&root, query).await?;
            let files: Vec<Value> = files
                .iter()
                .filter(|f| !is_sync_excluded_path(&f.name))
                .map(summary)
                .collect();
            Ok(json!({ "files": files }))
        }
        LIST_DRIVE_FILES => {
            let files = store.list(&root).await?;
            let files: Vec<Value> = files
                .iter()
                .filter(|f| !is_sync_excluded_path(&f.name))
                .map(summary)
                .collect();
            Ok(json!({ "files": files }))
        }
        CREATE_DRIVE_FILE => {
            let file_name = string_arg(args, "name")?;
            let content = string_arg(args, "content")?;
            let mime = drive_store::paths::mime_type_for(file_name);
            let created = store.create(file_name, content.as_bytes(), &root, mime).await?;
            upsert_file_in_meta(store, &created).await?;
            Ok(summary(&created))
        }
        UPDATE_DRIVE_FILE => {
            let id = string_arg(args, "fileId")?;
            let content = string_arg(args, "content")?;
            let file = store
                .get(id)
                .await?
                .ok_or_else(|| NodeEngineError::failed(format!("File not found: {}", id)))?;
            let updated = store.update(id, content.as_bytes(), &file.mime_type).await?;
            upsert_file_in_meta(store, &updated).await?;
            Ok(summary(&updated))
        }
        other => Err(NodeEngineError::failed(format!("Unknown tool: {}", other))),
    }
}

/// Execute a drive tool call; errors come back as `{"error": message}`
pub async fn execute_drive_tool(store: &dyn FileStore, name: &str, args: &Value) -> Value {
    match run(store, name, args).await {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Drive tool {} failed: {}", name, e);
            json!({ "error": e.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::InMemoryFileStore;

    fn names(mode: DriveToolMode) -> Vec<String> {
        drive_tool_definitions(mode).into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_modes() {
        assert!(names(DriveToolMode::None).is_empty());
        assert_eq!(names(DriveToolMode::All).len(), 5);
        let no_search = names(DriveToolMode::NoSearch);
        assert_eq!(no_search.len(), 4);
        assert!(!no_search.iter().any(|n| n == SEARCH_DRIVE_FILES));
        assert_eq!("noSearch".parse::<DriveToolMode>().unwrap(), DriveToolMode::NoSearch);
    }

    #[tokio::test]
    async fn test_create_read_and_errors() {
        let store = InMemoryFileStore::new();
        let created = execute_drive_tool(
            &store,
            CREATE_DRIVE_FILE,
            &json!({ "name": "idea.md", "content": "ship it" }),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let read = execute_drive_tool(&store, READ_DRIVE_FILE, &json!({ "fileId": id })).await;
        assert_eq!(read["content"], "ship it");

        let listed = execute_drive_tool(&store, LIST_DRIVE_FILES, &json!({})).await;
        let listed = listed["files"].as_array().unwrap();
        assert_eq!(listed.len(), 1, "sync meta is hidden from the model");

        let missing = execute_drive_tool(&store, READ_DRIVE_FILE, &json!({})).await;
        assert_eq!(missing["error"], "missing argument 'fileId'");

        let unknown = execute_drive_tool(&store, "format_disk", &json!({})).await;
        assert_eq!(unknown["error"], "Unknown tool: format_disk");
    }
}
