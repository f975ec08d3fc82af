//! Client-side sync orchestration
//!
//! Sequences diff computation, transfers and snapshot bookkeeping against a
//! [`LocalCache`]. Callers serialize operations on one client; nothing here
//! locks across awaits.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use drive_store::{FileSyncMeta, RagFileInfo, RagFileStatus, SyncMeta};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::diff::create_diff;
use crate::error::{Result, SyncError};
use crate::history::{reconstruct_content, DiffOrigin, DiffWithOrigin};
use crate::protocol::{FileContent, RagUpdate, ResolveChoice, SyncRemote, UpdateResponse};
use crate::sync_diff::ConflictInfo;

/// A file as held in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFile {
    pub file_id: String,
    pub file_name: String,
    /// Text, or base64 when `binary`
    pub content: String,
    pub md5_checksum: String,
    pub modified_time: String,
    #[serde(default)]
    pub binary: bool,
}

impl From<&FileContent> for CachedFile {
    fn from(file: &FileContent) -> Self {
        Self {
            file_id: file.file_id.clone(),
            file_name: file.file_name.clone(),
            content: file.content.clone(),
            md5_checksum: file.md5_checksum.clone(),
            modified_time: file.modified_time.clone(),
            binary: file.binary,
        }
    }
}

/// Device-local storage used by sync
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Snapshot of the last synced state
    async fn local_meta(&self) -> Result<Option<SyncMeta>>;

    async fn set_local_meta(&self, meta: SyncMeta) -> Result<()>;

    async fn cached_file(&self, file_id: &str) -> Result<Option<CachedFile>>;

    async fn put_cached_file(&self, file: CachedFile) -> Result<()>;

    async fn remove_cached_file(&self, file_id: &str) -> Result<()>;

    /// Ids edited locally since the last sync
    async fn modified_file_ids(&self) -> Result<HashSet<String>>;

    /// Drop one id from the modified set
    async fn mark_synced(&self, file_id: &str) -> Result<()>;

    /// File id -> checksum of every cached file
    async fn cached_checksums(&self) -> Result<HashMap<String, String>>;

    /// Forget all local edit diffs and the modified set
    async fn clear_edit_history(&self) -> Result<()>;

    async fn remove_edit_history(&self, file_id: &str) -> Result<()>;

    /// Record content that arrived from the remote as a history step
    async fn commit_snapshot(&self, file_id: &str, content: &str) -> Result<()>;
}

#[derive(Default)]
struct CacheInner {
    meta: Option<SyncMeta>,
    files: HashMap<String, CachedFile>,
    modified: HashSet<String>,
    /// Newest first
    history: HashMap<String, Vec<DiffWithOrigin>>,
}

/// [`LocalCache`] kept in memory
#[derive(Default)]
pub struct InMemoryLocalCache {
    inner: Mutex<CacheInner>,
}

impl InMemoryLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a local edit: records a local diff and marks the file modified
    pub fn record_edit(&self, file_id: &str, content: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let file = inner
            .files
            .get_mut(file_id)
            .ok_or_else(|| SyncError::Cache(format!("file {} is not cached", file_id)))?;
        if file.binary {
            return Err(SyncError::Cache(format!("file {} is binary", file_id)));
        }
        let diff = create_diff(&file.content, content);
        if diff.is_empty() {
            return Ok(());
        }
        file.content = content.to_string();
        inner
            .history
            .entry(file_id.to_string())
            .or_default()
            .insert(0, DiffWithOrigin::local(diff));
        inner.modified.insert(file_id.to_string());
        Ok(())
    }

    /// Edit chain of a file, newest first
    pub fn history(&self, file_id: &str) -> Vec<DiffWithOrigin> {
        self.inner
            .lock()
            .history
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Content as it was `steps` history entries ago
    pub fn reconstruct(&self, file_id: &str, steps: usize) -> Option<String> {
        let inner = self.inner.lock();
        let current = &inner.files.get(file_id)?.content;
        let chain = inner.history.get(file_id).map(Vec::as_slice).unwrap_or(&[]);
        reconstruct_content(current, &chain[..steps.min(chain.len())])
    }

    pub fn content(&self, file_id: &str) -> Option<String> {
        self.inner.lock().files.get(file_id).map(|f| f.content.clone())
    }
}

#[async_trait]
impl LocalCache for InMemoryLocalCache {
    async fn local_meta(&self) -> Result<Option<SyncMeta>> {
        Ok(self.inner.lock().meta.clone())
    }

    async fn set_local_meta(&self, meta: SyncMeta) -> Result<()> {
        self.inner.lock().meta = Some(meta);
        Ok(())
    }

    async fn cached_file(&self, file_id: &str) -> Result<Option<CachedFile>> {
        Ok(self.inner.lock().files.get(file_id).cloned())
    }

    async fn put_cached_file(&self, file: CachedFile) -> Result<()> {
        self.inner.lock().files.insert(file.file_id.clone(), file);
        Ok(())
    }

    async fn remove_cached_file(&self, file_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.files.remove(file_id);
        inner.modified.remove(file_id);
        Ok(())
    }

    async fn modified_file_ids(&self) -> Result<HashSet<String>> {
        Ok(self.inner.lock().modified.clone())
    }

    async fn mark_synced(&self, file_id: &str) -> Result<()> {
        self.inner.lock().modified.remove(file_id);
        Ok(())
    }

    async fn cached_checksums(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .inner
            .lock()
            .files
            .values()
            .map(|f| (f.file_id.clone(), f.md5_checksum.clone()))
            .collect())
    }

    async fn clear_edit_history(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        for chain in inner.history.values_mut() {
            chain.retain(|d| d.origin != DiffOrigin::Local);
        }
        inner.modified.clear();
        Ok(())
    }

    async fn remove_edit_history(&self, file_id: &str) -> Result<()> {
        self.inner.lock().history.remove(file_id);
        Ok(())
    }

    async fn commit_snapshot(&self, file_id: &str, content: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let previous = match inner.files.get(file_id) {
            Some(file) if !file.binary => file.content.clone(),
            Some(_) => return Ok(()),
            None => String::new(),
        };
        let diff = create_diff(&previous, content);
        if !diff.is_empty() {
            inner
                .history
                .entry(file_id.to_string())
                .or_default()
                .insert(0, DiffWithOrigin::remote(diff));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Pushing,
    Pulling,
    Conflict,
    Error,
}

/// Client-visible sync state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    pub conflicts: Vec<ConflictInfo>,
    pub rag_pending: usize,
    pub last_error: Option<String>,
    pub last_synced_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    NothingToPush,
    Conflicts(Vec<ConflictInfo>),
    /// The remote has changes that must be pulled first
    Rejected { pending_pulls: usize },
    Pushed { files: usize, rag_pending: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    UpToDate,
    Conflicts(Vec<ConflictInfo>),
    Pulled { pulled: usize, removed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullPullOutcome {
    pub downloaded: usize,
    pub skipped: usize,
}

pub struct SyncClient<L, R> {
    cache: L,
    remote: R,
    register_rag_on_push: bool,
    state: SyncState,
}

fn sorted(ids: HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids
}

fn meta_from_content(file: &FileContent, remote_entry: Option<&FileSyncMeta>) -> FileSyncMeta {
    match remote_entry {
        Some(entry) => entry.clone(),
        None => FileSyncMeta {
            name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            md5_checksum: file.md5_checksum.clone(),
            modified_time: file.modified_time.clone(),
            created_time: None,
            shared: None,
            web_view_link: None,
        },
    }
}

impl<L: LocalCache, R: SyncRemote> SyncClient<L, R> {
    pub fn new(cache: L, remote: R) -> Self {
        Self {
            cache,
            remote,
            register_rag_on_push: false,
            state: SyncState::default(),
        }
    }

    /// Register pushed files with the RAG store
    pub fn with_rag_registration(mut self, enabled: bool) -> Self {
        self.register_rag_on_push = enabled;
        self
    }

    pub fn cache(&self) -> &L {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    fn fail(&mut self, error: SyncError) -> SyncError {
        log::error!("Sync failed: {}", error);
        self.state.status = SyncStatus::Error;
        self.state.last_error = Some(error.to_string());
        error
    }

    fn synced(&mut self) {
        self.state.status = SyncStatus::Idle;
        self.state.last_error = None;
        self.state.last_synced_at = Some(drive_store::meta::timestamp());
    }

    fn halt_on_conflicts(&mut self, conflicts: Vec<ConflictInfo>) -> Vec<ConflictInfo> {
        log::info!("Sync halted: {} conflict(s)", conflicts.len());
        self.state.status = SyncStatus::Conflict;
        self.state.conflicts = conflicts.clone();
        conflicts
    }

    async fn store_pulled(&self, file: &FileContent) -> Result<()> {
        if !file.binary {
            self.cache.commit_snapshot(&file.file_id, &file.content).await?;
        }
        self.cache.put_cached_file(CachedFile::from(file)).await
    }

    /// Upload locally modified files
    pub async fn push(&mut self) -> Result<PushOutcome> {
        self.state.status = SyncStatus::Pushing;
        match self.push_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn push_inner(&mut self) -> Result<PushOutcome> {
        let local_meta = self.cache.local_meta().await?;
        let modified = self.cache.modified_file_ids().await?;
        if modified.is_empty() {
            self.state.status = SyncStatus::Idle;
            return Ok(PushOutcome::NothingToPush);
        }

        let response = self.remote.diff(local_meta.clone(), sorted(modified)).await?;
        let diff = response.diff;
        if diff.has_conflicts() {
            return Ok(PushOutcome::Conflicts(self.halt_on_conflicts(diff.conflicts)));
        }
        let pending_pulls = diff.to_pull.len() + diff.remote_only.len();
        if pending_pulls > 0 {
            log::info!("Push rejected: {} remote change(s) to pull first", pending_pulls);
            self.state.status = SyncStatus::Idle;
            return Ok(PushOutcome::Rejected { pending_pulls });
        }
        if diff.to_push.is_empty() {
            self.state.status = SyncStatus::Idle;
            return Ok(PushOutcome::NothingToPush);
        }

        let mut meta = local_meta.unwrap_or_default();
        let mut rag_updates: Vec<RagUpdate> = Vec::new();
        let mut rag_store_name = String::new();
        let mut rag_pending = 0;
        let mut pushed = 0;
        for file_id in &diff.to_push {
            let Some(file) = self.cache.cached_file(file_id).await? else {
                log::warn!("Modified file {} is not cached, skipping", file_id);
                continue;
            };
            if file.binary {
                log::warn!("Skipping binary file {} on push", file.file_name);
                continue;
            }
            let updated = match self.remote.update(file_id, &file.content).await {
                Ok(updated) => updated,
                Err(e) => {
                    self.flush_rag_updates(rag_updates, &rag_store_name).await;
                    return Err(e);
                }
            };
            let file_name = file.file_name.clone();
            if let Err(e) = self.record_pushed(&mut meta, file, updated).await {
                self.flush_rag_updates(rag_updates, &rag_store_name).await;
                return Err(e);
            }
            pushed += 1;
            log::debug!("Pushed {}", file_name);

            if self.register_rag_on_push {
                match self.remote.rag_register(file_id, &file_name).await {
                    Ok(resp) if resp.skipped => {}
                    Ok(resp) => {
                        if let Some(name) = resp.store_name {
                            rag_store_name = name;
                        }
                        if let Some(info) = resp.rag_file_info {
                            rag_updates.push(RagUpdate {
                                file_name: file_name.clone(),
                                rag_file_info: info,
                            });
                        }
                    }
                    Err(e) => {
                        log::warn!("RAG registration for {} failed, marking pending: {}", file_name, e);
                        rag_pending += 1;
                        rag_updates.push(RagUpdate {
                            file_name: file_name.clone(),
                            rag_file_info: RagFileInfo {
                                checksum: String::new(),
                                uploaded_at: 0,
                                file_id: None,
                                status: RagFileStatus::Pending,
                            },
                        });
                    }
                }
            }
        }
        self.flush_rag_updates(rag_updates, &rag_store_name).await;

        self.cache.clear_edit_history().await?;
        let remote_meta = self.remote.remote_meta().await?;
        self.cache.set_local_meta(remote_meta).await?;
        self.state.rag_pending = rag_pending;
        self.synced();
        log::info!("Push complete: {} file(s)", pushed);
        Ok(PushOutcome::Pushed {
            files: pushed,
            rag_pending,
        })
    }

    /// Bring the local snapshot and cache in line with one uploaded file
    async fn record_pushed(
        &self,
        meta: &mut SyncMeta,
        mut file: CachedFile,
        updated: UpdateResponse,
    ) -> Result<()> {
        if let Some(entry) = meta.files.get_mut(&file.file_id) {
            entry.md5_checksum = updated.md5_checksum.clone();
            entry.modified_time = updated.modified_time.clone();
        }
        file.md5_checksum = updated.md5_checksum;
        file.modified_time = updated.modified_time;
        let file_id = file.file_id.clone();
        self.cache.put_cached_file(file).await?;
        self.cache.set_local_meta(meta.clone()).await?;
        self.cache.mark_synced(&file_id).await
    }

    async fn flush_rag_updates(&self, updates: Vec<RagUpdate>, store_name: &str) {
        if updates.is_empty() {
            return;
        }
        if let Err(e) = self.remote.rag_save(updates, store_name).await {
            log::warn!("Failed to save RAG bookkeeping: {}", e);
        }
    }

    /// Download remote changes and drop files deleted remotely
    pub async fn pull(&mut self) -> Result<PullOutcome> {
        self.state.status = SyncStatus::Pulling;
        match self.pull_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn pull_inner(&mut self) -> Result<PullOutcome> {
        let local_meta = self.cache.local_meta().await?;
        let modified = self.cache.modified_file_ids().await?;
        let response = self.remote.diff(local_meta.clone(), sorted(modified)).await?;
        let (diff, remote_meta) = (response.diff, response.remote_meta);
        if diff.has_conflicts() {
            return Ok(PullOutcome::Conflicts(self.halt_on_conflicts(diff.conflicts)));
        }

        let mut meta = local_meta.unwrap_or_default();
        for file_id in &diff.local_only {
            self.cache.remove_cached_file(file_id).await?;
            self.cache.remove_edit_history(file_id).await?;
            meta.files.remove(file_id);
            log::debug!("Removed {} deleted on remote", file_id);
        }

        let ids = diff.pull_ids();
        if ids.is_empty() && diff.local_only.is_empty() {
            self.synced();
            return Ok(PullOutcome::UpToDate);
        }
        let pulled = if ids.is_empty() {
            0
        } else {
            let files = self.remote.pull(ids).await?.files;
            for file in &files {
                self.store_pulled(file).await?;
                meta.files.insert(
                    file.file_id.clone(),
                    meta_from_content(file, remote_meta.files.get(&file.file_id)),
                );
            }
            files.len()
        };
        meta.last_updated_at = remote_meta.last_updated_at;
        self.cache.set_local_meta(meta).await?;
        self.synced();
        log::info!(
            "Pull complete: {} file(s) pulled, {} removed",
            pulled,
            diff.local_only.len()
        );
        Ok(PullOutcome::Pulled {
            pulled,
            removed: diff.local_only.len(),
        })
    }

    /// Settle one conflict; a remote win archives the local copy first
    pub async fn resolve_conflict(&mut self, file_id: &str, choice: ResolveChoice) -> Result<()> {
        let cached = self.cache.cached_file(file_id).await?;
        let local_content = cached.as_ref().filter(|f| !f.binary).map(|f| f.content.clone());
        let response = match self.remote.resolve(file_id, choice, local_content).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };

        match &response.file {
            Some(file) => self.store_pulled(file).await?,
            None => {
                if let Some(mut cached) = cached {
                    cached.md5_checksum = response.meta.md5_checksum.clone();
                    cached.modified_time = response.meta.modified_time.clone();
                    self.cache.put_cached_file(cached).await?;
                }
            }
        }
        if let Some(backup) = &response.backup_name {
            log::info!("Local copy of {} saved as {}", response.meta.name, backup);
        }

        let mut meta = self.cache.local_meta().await?.unwrap_or_default();
        meta.files.insert(response.file_id.clone(), response.meta);
        self.cache.set_local_meta(meta).await?;
        self.cache.mark_synced(file_id).await?;

        self.state.conflicts.retain(|c| c.file_id != file_id);
        if self.state.conflicts.is_empty() {
            self.state.status = SyncStatus::Idle;
        }
        Ok(())
    }

    /// Replace the local cache with the full remote set
    pub async fn full_pull(&mut self) -> Result<FullPullOutcome> {
        self.state.status = SyncStatus::Pulling;
        match self.full_pull_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn full_pull_inner(&mut self) -> Result<FullPullOutcome> {
        let modified = self.cache.modified_file_ids().await?;
        // modified copies are overwritten, so their checksums may not be skipped
        let skip_hashes: Vec<String> = self
            .cache
            .cached_checksums()
            .await?
            .into_iter()
            .filter(|(id, _)| !modified.contains(id))
            .map(|(_, checksum)| checksum)
            .collect();
        let response = self.remote.full_pull(skip_hashes).await?;
        for file in &response.files {
            self.store_pulled(file).await?;
        }
        self.cache.clear_edit_history().await?;
        self.cache.set_local_meta(response.remote_meta).await?;
        self.state.conflicts.clear();
        self.synced();
        log::info!(
            "Full pull complete: {} downloaded, {} skipped",
            response.files.len(),
            response.skipped
        );
        Ok(FullPullOutcome {
            downloaded: response.files.len(),
            skipped: response.skipped,
        })
    }

    /// Upload every modified file and replace the remote snapshot
    pub async fn full_push(&mut self) -> Result<usize> {
        self.state.status = SyncStatus::Pushing;
        match self.full_push_inner().await {
            Ok(count) => Ok(count),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn full_push_inner(&mut self) -> Result<usize> {
        let mut meta = self.cache.local_meta().await?.unwrap_or_default();
        let mut pushed = 0;
        for file_id in sorted(self.cache.modified_file_ids().await?) {
            let Some(file) = self.cache.cached_file(&file_id).await? else {
                continue;
            };
            if file.binary {
                continue;
            }
            let resp = self.remote.update(&file_id, &file.content).await?;
            if let Some(entry) = meta.files.get_mut(&file_id) {
                entry.md5_checksum = resp.md5_checksum;
                entry.modified_time = resp.modified_time;
            }
            pushed += 1;
        }
        let meta = self.remote.full_push(meta).await?;
        self.cache.clear_edit_history().await?;
        self.cache.set_local_meta(meta).await?;
        self.synced();
        log::info!("Full push complete: {} file(s)", pushed);
        Ok(pushed)
    }
}
