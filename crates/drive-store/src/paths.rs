//! Path classification for synced files

use regex::Regex;

/// Remote sync metadata document, stored in the root folder
pub const SYNC_META_FILE: &str = "_sync-meta.json";
/// User settings document, stored in the root folder
pub const SETTINGS_FILE: &str = "settings.json";

/// Root sub-folders
pub mod folders {
    pub const HISTORY: &str = "history";
    pub const TRASH: &str = "trash";
    pub const SYNC_CONFLICTS: &str = "sync_conflicts";
    pub const TEMP: &str = "__TEMP__";
    pub const PLUGINS: &str = "plugins";
}

const SYSTEM_FILE_NAMES: [&str; 2] = [SYNC_META_FILE, SETTINGS_FILE];

const EXCLUDED_PREFIXES: [&str; 5] = [
    "history/",
    "trash/",
    "sync_conflicts/",
    "__TEMP__/",
    "plugins/",
];

const BINARY_APPLICATION_TYPES: [&str; 10] = [
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/x-gzip",
    "application/x-bzip2",
    "application/x-7z-compressed",
    "application/x-rar-compressed",
    "application/octet-stream",
    "application/wasm",
];

const BINARY_APPLICATION_PREFIXES: [&str; 3] = [
    "application/vnd.openxmlformats-",
    "application/vnd.ms-",
    "application/vnd.oasis.opendocument.",
];

const RAG_ELIGIBLE_EXTENSIONS: [&str; 34] = [
    ".md", ".txt", ".csv", ".tsv", ".json", ".xml", ".html", ".yaml", ".yml",
    ".js", ".ts", ".jsx", ".tsx", ".py", ".java", ".rb", ".go", ".rs",
    ".c", ".cpp", ".h", ".cs", ".php", ".dart", ".sql", ".sh",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".pptx", ".htm", ".markdown",
];

/// Sync metadata and settings never take part in a sync diff
pub fn is_system_file(name: &str) -> bool {
    SYSTEM_FILE_NAMES.contains(&name.trim_start_matches('/'))
}

/// System files and anything under an internal folder prefix
pub fn is_sync_excluded_path(name: &str) -> bool {
    let normalized = name.trim_start_matches('/');
    is_system_file(normalized) || EXCLUDED_PREFIXES.iter().any(|p| normalized.starts_with(p))
}

/// User-supplied exclusion regexes; invalid patterns are ignored
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    patterns: Vec<Regex>,
}

impl ExcludeMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.trim().is_empty())
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring invalid exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

pub fn is_binary_mime_type(mime_type: &str) -> bool {
    ["image/", "video/", "audio/", "font/"]
        .iter()
        .any(|p| mime_type.starts_with(p))
        || BINARY_APPLICATION_TYPES.contains(&mime_type)
        || BINARY_APPLICATION_PREFIXES.iter().any(|p| mime_type.starts_with(p))
}

/// Extension including the dot, lowercased; `None` when the last path
/// segment has no dot
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let dot = base.rfind('.')?;
    if dot == 0 && base.len() == 1 {
        return None;
    }
    Some(base[dot..].to_lowercase())
}

/// Text/document/code files that a RAG store can index
pub fn is_rag_eligible(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| RAG_ELIGIBLE_EXTENSIONS.contains(&ext.as_str()))
}

/// Best-effort MIME type from a file name
pub fn mime_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some(".md") | Some(".markdown") => "text/markdown",
        Some(".txt") => "text/plain",
        Some(".json") => "application/json",
        Some(".yaml") | Some(".yml") => "text/yaml",
        Some(".csv") => "text/csv",
        Some(".html") | Some(".htm") => "text/html",
        Some(".xml") => "application/xml",
        Some(".png") => "image/png",
        Some(".jpg") | Some(".jpeg") => "image/jpeg",
        Some(".gif") => "image/gif",
        Some(".webp") => "image/webp",
        Some(".svg") => "image/svg+xml",
        Some(".pdf") => "application/pdf",
        Some(".mp3") => "audio/mpeg",
        Some(".mp4") => "video/mp4",
        Some(".zip") => "application/zip",
        Some(_) | None => "text/plain",
    }
}
