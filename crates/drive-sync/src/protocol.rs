//! Request and response shapes of the sync endpoint
//!
//! The endpoint takes one JSON body tagged by `action`. The same operations
//! are exposed to the client orchestration through [`SyncRemote`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use drive_store::{DriveFile, FileSyncMeta, RagFileInfo, SyncMeta};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sync_diff::SyncDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveChoice {
    Local,
    Remote,
}

/// File content as transferred; binary payloads are base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub content: String,
    #[serde(default)]
    pub binary: bool,
    pub md5_checksum: String,
    pub modified_time: String,
}

impl FileContent {
    pub fn from_bytes(file: &DriveFile, bytes: Vec<u8>, binary: bool) -> Self {
        let (content, binary) = if binary {
            (BASE64.encode(&bytes), true)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => (text, false),
                Err(e) => (BASE64.encode(e.into_bytes()), true),
            }
        };
        Self {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            content,
            binary,
            md5_checksum: file.md5_checksum.clone().unwrap_or_default(),
            modified_time: file.modified_time.clone().unwrap_or_default(),
        }
    }

    /// Decoded bytes
    pub fn bytes(&self) -> Result<Vec<u8>> {
        if self.binary {
            Ok(BASE64.decode(&self.content)?)
        } else {
            Ok(self.content.clone().into_bytes())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub diff: SyncDiff,
    pub remote_meta: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub files: Vec<FileContent>,
    pub remote_meta: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub file_id: String,
    pub md5_checksum: String,
    pub modified_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub file_id: String,
    /// Remote snapshot entry of the resolved file
    pub meta: FileSyncMeta,
    /// Remote content, present when the remote side won
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileContent>,
    /// Name of the archived local copy, when one was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPullResponse {
    pub files: Vec<FileContent>,
    pub skipped: usize,
    pub remote_meta: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    pub files: Vec<DriveFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdsResponse {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRegisterResponse {
    pub ok: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_file_info: Option<RagFileInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagUpdate {
    pub file_name: String,
    pub rag_file_info: RagFileInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRetryResponse {
    pub retried: usize,
    pub registered: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHistoryEntry {
    pub diff: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub entries: Vec<RemoteHistoryEntry>,
}

/// Body of a sync endpoint call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SyncRequest {
    #[serde(rename_all = "camelCase")]
    Diff {
        local_meta: Option<SyncMeta>,
        #[serde(default)]
        locally_modified_file_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Pull { file_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Resolve {
        file_id: String,
        choice: ResolveChoice,
        local_content: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Update { file_id: String, content: String },
    #[serde(rename_all = "camelCase")]
    FullPull {
        #[serde(default)]
        skip_hashes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    FullPush { local_meta: SyncMeta },
    ListTrash,
    ListConflicts,
    #[serde(rename_all = "camelCase")]
    RestoreTrash { file_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    RestoreConflict {
        file_id: String,
        restore_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteUntracked { file_ids: Option<Vec<String>> },
    #[serde(rename_all = "camelCase")]
    History { file_id: String },
    #[serde(rename_all = "camelCase")]
    RagRegister { file_id: String, file_name: String },
    #[serde(rename_all = "camelCase")]
    RagSave {
        updates: Vec<RagUpdate>,
        store_name: String,
    },
    RagRetryPending,
}

impl SyncRequest {
    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            Self::Diff { .. } => "diff",
            Self::Pull { .. } => "pull",
            Self::Resolve { .. } => "resolve",
            Self::Update { .. } => "update",
            Self::FullPull { .. } => "fullPull",
            Self::FullPush { .. } => "fullPush",
            Self::ListTrash => "listTrash",
            Self::ListConflicts => "listConflicts",
            Self::RestoreTrash { .. } => "restoreTrash",
            Self::RestoreConflict { .. } => "restoreConflict",
            Self::DeleteUntracked { .. } => "deleteUntracked",
            Self::History { .. } => "history",
            Self::RagRegister { .. } => "ragRegister",
            Self::RagSave { .. } => "ragSave",
            Self::RagRetryPending => "ragRetryPending",
        }
    }
}

/// Response of a sync endpoint call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncResponse {
    Diff(DiffResponse),
    Pull(PullResponse),
    Resolve(ResolveResponse),
    Update(UpdateResponse),
    FullPull(FullPullResponse),
    Meta(SyncMeta),
    Files(FileListResponse),
    FileIds(FileIdsResponse),
    History(HistoryResponse),
    RagRegister(RagRegisterResponse),
    RagRetry(RagRetryResponse),
    Ok { ok: bool },
}

/// Operations the client orchestration needs from the server
#[async_trait]
pub trait SyncRemote: Send + Sync {
    async fn diff(&self, local_meta: Option<SyncMeta>, modified: Vec<String>) -> Result<DiffResponse>;

    /// Current remote snapshot
    async fn remote_meta(&self) -> Result<SyncMeta>;

    async fn pull(&self, file_ids: Vec<String>) -> Result<PullResponse>;

    /// Upload new text content of one tracked file
    async fn update(&self, file_id: &str, content: &str) -> Result<UpdateResponse>;

    async fn resolve(
        &self,
        file_id: &str,
        choice: ResolveChoice,
        local_content: Option<String>,
    ) -> Result<ResolveResponse>;

    async fn full_pull(&self, skip_hashes: Vec<String>) -> Result<FullPullResponse>;

    /// Replace the remote snapshot wholesale
    async fn full_push(&self, local_meta: SyncMeta) -> Result<SyncMeta>;

    async fn rag_register(&self, file_id: &str, file_name: &str) -> Result<RagRegisterResponse>;

    async fn rag_save(&self, updates: Vec<RagUpdate>, store_name: &str) -> Result<()>;
}
