//! File resolution shared by the drive nodes

use std::sync::Arc;

use drive_store::{DriveFile, FileStore};
use node_engine::{extension_keys, placeholder_name, ExecutionContext, Result, ServiceContext};
use once_cell::sync::Lazy;
use regex::Regex;

static FILE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{20,}$").expect("valid file id regex"));

/// File store registered for this run
pub fn file_store(services: &ServiceContext) -> Result<Arc<dyn FileStore>> {
    services
        .extensions
        .require::<Arc<dyn FileStore>>(extension_keys::FILE_STORE)
}

/// Whether a resolved path is really a Drive file id
pub fn looks_like_file_id(value: &str) -> bool {
    FILE_ID.is_match(value)
}

/// Append `.md` when the last path segment has no extension
pub fn with_markdown_extension(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    if base.contains('.') {
        name.to_string()
    } else {
        format!("{}.md", name)
    }
}

/// Id stored next to a file-name variable: a raw `{{file}}` path may
/// come with a `file_fileId` variable set by an earlier node
pub(crate) fn companion_file_id(raw_path: &str, context: &ExecutionContext) -> Option<String> {
    let var = placeholder_name(raw_path)?;
    context
        .get(&format!("{}_fileId", var))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Find a file in `parent_id` by name.
///
/// Search results are preferred; an exact-name lookup is the fallback.
/// With `try_markdown` a missing `name` also matches `name.md`.
pub async fn find_file(
    store: &dyn FileStore,
    parent_id: &str,
    name: &str,
    try_markdown: bool,
) -> Result<Option<DriveFile>> {
    let mut candidates = vec![name.to_string()];
    if try_markdown && !name.ends_with(".md") {
        candidates.push(format!("{}.md", name));
    }

    let found = store.search(parent_id, name).await?;
    for candidate in &candidates {
        if let Some(file) = found.iter().find(|f| &f.name == candidate) {
            return Ok(Some(file.clone()));
        }
    }

    for candidate in &candidates {
        if let Some(file) = store.find_by_exact_name(candidate, Some(parent_id)).await? {
            return Ok(Some(file));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::InMemoryFileStore;

    #[test]
    fn test_file_id_shape() {
        assert!(looks_like_file_id("1AbC_defGHIjkl-mnopQRst"));
        assert!(!looks_like_file_id("notes/today.md"));
        assert!(!looks_like_file_id("short_id"));
    }

    #[test]
    fn test_markdown_extension() {
        assert_eq!(with_markdown_extension("notes/today"), "notes/today.md");
        assert_eq!(with_markdown_extension("data.json"), "data.json");
        assert_eq!(with_markdown_extension("v1.2/readme"), "v1.2/readme.md");
    }

    #[test]
    fn test_companion_file_id() {
        let mut context = ExecutionContext::new();
        context.set("file_fileId", "abc");
        assert_eq!(companion_file_id("{{file}}", &context).as_deref(), Some("abc"));
        assert_eq!(companion_file_id("notes/{{file}}", &context), None);
        assert_eq!(companion_file_id("{{other}}", &context), None);
    }

    #[tokio::test]
    async fn test_find_prefers_exact_then_markdown() {
        let store = InMemoryFileStore::new();
        store.create("plan.md", b"md", "root", "text/markdown").await.unwrap();
        store.create("plan-old.md", b"old", "root", "text/markdown").await.unwrap();

        let found = find_file(&store, "root", "plan", true).await.unwrap().unwrap();
        assert_eq!(found.name, "plan.md");

        assert!(find_file(&store, "root", "plan", false).await.unwrap().is_none());
        assert!(find_file(&store, "root", "missing", true).await.unwrap().is_none());
    }
}
