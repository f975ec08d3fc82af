//! In-process file store
//!
//! Backs tests and local development. Checksums are content hashes, so two
//! writes of identical bytes produce identical checksums just like Drive's
//! md5 field.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::file::{DriveFile, FileStore};
use crate::paths::folders;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

struct Entry {
    meta: DriveFile,
    content: Vec<u8>,
    is_folder: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    failing_updates: HashSet<String>,
}

pub struct InMemoryFileStore {
    root_id: String,
    inner: RwLock<Inner>,
}

/// Content checksum in the 32-hex-char shape of an md5 digest
pub fn content_checksum(content: &[u8]) -> String {
    let hash = blake3::hash(content).to_hex();
    hash[..32].to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::with_root("root")
    }

    pub fn with_root(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Make every later `update` of this file fail with a backend error
    pub fn fail_updates_to(&self, file_id: &str) {
        self.inner.write().failing_updates.insert(file_id.to_string());
    }

    pub fn allow_updates_to(&self, file_id: &str) {
        self.inner.write().failing_updates.remove(file_id);
    }

    /// Number of files (not folders) anywhere in the store
    pub fn file_count(&self) -> usize {
        self.inner.read().entries.values().filter(|e| !e.is_folder).count()
    }

    fn folder_exists(inner: &Inner, root_id: &str, id: &str) -> bool {
        id == root_id || inner.entries.get(id).is_some_and(|e| e.is_folder)
    }
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    fn root_folder_id(&self) -> &str {
        &self.root_id
    }

    async fn get(&self, file_id: &str) -> Result<Option<DriveFile>> {
        Ok(self.inner.read().entries.get(file_id).map(|e| e.meta.clone()))
    }

    async fn read(&self, file_id: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        match inner.entries.get(file_id) {
            Some(entry) if !entry.is_folder => Ok(entry.content.clone()),
            _ => Err(StoreError::NotFound(file_id.to_string())),
        }
    }

    async fn create(
        &self,
        name: &str,
        content: &[u8],
        parent_id: &str,
        mime_type: &str,
    ) -> Result<DriveFile> {
        let mut inner = self.inner.write();
        if !Self::folder_exists(&inner, &self.root_id, parent_id) {
            return Err(StoreError::NotFound(parent_id.to_string()));
        }
        let id = new_id();
        let ts = now();
        let meta = DriveFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            md5_checksum: Some(content_checksum(content)),
            modified_time: Some(ts.clone()),
            created_time: Some(ts),
            parent_id: Some(parent_id.to_string()),
            web_view_link: Some(format!("https://drive.example/file/{}", id)),
            shared: Some(false),
        };
        inner.entries.insert(
            id,
            Entry {
                meta: meta.clone(),
                content: content.to_vec(),
                is_folder: false,
            },
        );
        log::debug!("Created file '{}' ({})", meta.name, meta.id);
        Ok(meta)
    }

    async fn update(&self, file_id: &str, content: &[u8], mime_type: &str) -> Result<DriveFile> {
        let mut inner = self.inner.write();
        if inner.failing_updates.contains(file_id) {
            return Err(StoreError::Backend(format!("update of {} rejected", file_id)));
        }
        let entry = inner
            .entries
            .get_mut(file_id)
            .filter(|e| !e.is_folder)
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;
        entry.content = content.to_vec();
        entry.meta.mime_type = mime_type.to_string();
        entry.meta.md5_checksum = Some(content_checksum(content));
        entry.meta.modified_time = Some(now());
        Ok(entry.meta.clone())
    }

    async fn search(&self, parent_id: &str, query: &str) -> Result<Vec<DriveFile>> {
        let inner = self.inner.read();
        let mut found: Vec<DriveFile> = inner
            .entries
            .values()
            .filter(|e| !e.is_folder)
            .filter(|e| e.meta.parent_id.as_deref() == Some(parent_id))
            .filter(|e| e.meta.name.contains(query))
            .map(|e| e.meta.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_by_exact_name(&self, name: &str, parent_id: Option<&str>) -> Result<Option<DriveFile>> {
        let parent = parent_id.unwrap_or(&self.root_id);
        let inner = self.inner.read();
        Ok(inner
            .entries
            .values()
            .filter(|e| !e.is_folder)
            .find(|e| e.meta.name == name && e.meta.parent_id.as_deref() == Some(parent))
            .map(|e| e.meta.clone()))
    }

    async fn list(&self, parent_id: &str) -> Result<Vec<DriveFile>> {
        let inner = self.inner.read();
        let mut files: Vec<DriveFile> = inner
            .entries
            .values()
            .filter(|e| !e.is_folder && e.meta.parent_id.as_deref() == Some(parent_id))
            .map(|e| e.meta.clone())
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.entries.values().find(|e| {
            e.is_folder && e.meta.name == name && e.meta.parent_id.as_deref() == Some(parent_id)
        }) {
            return Ok(existing.meta.id.clone());
        }
        let id = new_id();
        let ts = now();
        inner.entries.insert(
            id.clone(),
            Entry {
                meta: DriveFile {
                    id: id.clone(),
                    name: name.to_string(),
                    mime_type: FOLDER_MIME.to_string(),
                    md5_checksum: None,
                    modified_time: Some(ts.clone()),
                    created_time: Some(ts),
                    parent_id: Some(parent_id.to_string()),
                    web_view_link: None,
                    shared: None,
                },
                content: Vec::new(),
                is_folder: true,
            },
        );
        Ok(id)
    }

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> Result<DriveFile> {
        let mut inner = self.inner.write();
        if !Self::folder_exists(&inner, &self.root_id, new_parent_id) {
            return Err(StoreError::NotFound(new_parent_id.to_string()));
        }
        let entry = inner
            .entries
            .get_mut(file_id)
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;
        entry.meta.parent_id = Some(new_parent_id.to_string());
        entry.meta.modified_time = Some(now());
        Ok(entry.meta.clone())
    }

    async fn rename(&self, file_id: &str, new_name: &str) -> Result<DriveFile> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(file_id)
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;
        entry.meta.name = new_name.to_string();
        entry.meta.modified_time = Some(now());
        Ok(entry.meta.clone())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let trash = self.ensure_folder(&self.root_id, folders::TRASH).await?;
        self.move_file(file_id, &trash).await?;
        log::debug!("Moved {} to trash", file_id);
        Ok(())
    }
}
