//! Sync metadata snapshots
//!
//! The remote snapshot is a JSON document in the root folder and doubles as
//! the registry of user files. Clients keep their own copy as the local
//! snapshot of the last synced state.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file::{DriveFile, FileStore};
use crate::paths::{is_sync_excluded_path, SYNC_META_FILE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncMeta {
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub md5_checksum: String,
    #[serde(default)]
    pub modified_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl From<&DriveFile> for FileSyncMeta {
    fn from(file: &DriveFile) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            md5_checksum: file.md5_checksum.clone().unwrap_or_default(),
            modified_time: file.modified_time.clone().unwrap_or_default(),
            created_time: file.created_time.clone(),
            shared: file.shared,
            web_view_link: file.web_view_link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// RFC 3339 timestamp; compares lexically in UTC
    pub last_updated_at: String,
    #[serde(default)]
    pub files: HashMap<String, FileSyncMeta>,
}

impl SyncMeta {
    pub fn empty() -> Self {
        Self {
            last_updated_at: timestamp(),
            files: HashMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated_at = timestamp();
    }

    pub fn checksum(&self, file_id: &str) -> Option<&str> {
        self.files.get(file_id).map(|f| f.md5_checksum.as_str())
    }

    /// Whether this snapshot was written after `other`
    pub fn is_newer_than(&self, other: &SyncMeta) -> bool {
        match (
            chrono::DateTime::parse_from_rfc3339(&self.last_updated_at),
            chrono::DateTime::parse_from_rfc3339(&other.last_updated_at),
        ) {
            (Ok(a), Ok(b)) => a > b,
            _ => self.last_updated_at > other.last_updated_at,
        }
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read the remote snapshot; `None` when absent or unreadable
pub async fn read_remote_sync_meta(store: &dyn FileStore) -> Result<Option<SyncMeta>> {
    let Some(file) = store.find_by_exact_name(SYNC_META_FILE, None).await? else {
        return Ok(None);
    };
    let content = store.read_text(&file.id).await?;
    match serde_json::from_str(&content) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            log::warn!("Remote sync meta is corrupt, ignoring: {}", e);
            Ok(None)
        }
    }
}

pub async fn write_remote_sync_meta(store: &dyn FileStore, meta: &SyncMeta) -> Result<()> {
    let content = serde_json::to_string_pretty(meta)?;
    match store.find_by_exact_name(SYNC_META_FILE, None).await? {
        Some(file) => {
            store
                .update(&file.id, content.as_bytes(), "application/json")
                .await?;
        }
        None => {
            store
                .create(
                    SYNC_META_FILE,
                    content.as_bytes(),
                    store.root_folder_id(),
                    "application/json",
                )
                .await?;
        }
    }
    Ok(())
}

/// Rebuild the remote snapshot from a full listing of the root folder
pub async fn rebuild_sync_meta(store: &dyn FileStore) -> Result<SyncMeta> {
    let files = store.list(store.root_folder_id()).await?;
    let mut meta = SyncMeta::empty();
    for file in files.iter().filter(|f| !is_sync_excluded_path(&f.name)) {
        meta.files.insert(file.id.clone(), FileSyncMeta::from(file));
    }
    write_remote_sync_meta(store, &meta).await?;
    log::info!("Rebuilt sync meta with {} files", meta.files.len());
    Ok(meta)
}

/// Remote snapshot, rebuilt from the listing when missing
pub async fn load_or_rebuild_sync_meta(store: &dyn FileStore) -> Result<SyncMeta> {
    match read_remote_sync_meta(store).await? {
        Some(meta) => Ok(meta),
        None => rebuild_sync_meta(store).await,
    }
}

pub async fn upsert_file_in_meta(store: &dyn FileStore, file: &DriveFile) -> Result<SyncMeta> {
    let mut meta = read_remote_sync_meta(store).await?.unwrap_or_default();
    meta.files.insert(file.id.clone(), FileSyncMeta::from(file));
    meta.touch();
    write_remote_sync_meta(store, &meta).await?;
    Ok(meta)
}

pub async fn remove_file_from_meta(store: &dyn FileStore, file_id: &str) -> Result<SyncMeta> {
    let mut meta = read_remote_sync_meta(store).await?.unwrap_or_default();
    meta.files.remove(file_id);
    meta.touch();
    write_remote_sync_meta(store, &meta).await?;
    Ok(meta)
}
