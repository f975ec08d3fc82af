//! Server side of the sync endpoint
//!
//! Operates on the remote file store and the remote snapshot. Conflict
//! detection happens in `diff`; everything else trusts the caller to have
//! resolved conflicts first.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drive_store::paths::{
    folders, is_binary_mime_type, is_rag_eligible, is_sync_excluded_path, mime_type_for,
    ExcludeMatcher,
};
use drive_store::{
    load_or_rebuild_sync_meta, upsert_file_in_meta, write_remote_sync_meta, DriveFile,
    FileStore, FileSyncMeta, RagFileInfo, RagFileStatus, RagStore, SyncMeta, UserSettings,
    DEFAULT_RAG_STORE_KEY,
};

use crate::diff::create_diff;
use crate::error::{Result, SyncError};
use crate::protocol::*;
use crate::sync_diff::compute_sync_diff_with;

/// Remote history entries kept per file
const MAX_REMOTE_HISTORY: usize = 50;

pub struct SyncServer {
    store: Arc<dyn FileStore>,
    rag: Option<Arc<dyn RagStore>>,
}

/// `notes/a.md` at 2024-03-05 14:07:09 -> `notes_a_20240305_140709.md`
pub fn conflict_backup_name(file_name: &str, now: DateTime<Utc>) -> String {
    let ts = now.format("%Y%m%d_%H%M%S");
    let safe = file_name.replace('/', "_");
    match safe.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &safe[..dot], ts, &safe[dot..]),
        _ => format!("{}_{}", safe, ts),
    }
}

/// Inverse of the timestamp part of [`conflict_backup_name`]
pub fn strip_backup_timestamp(backup_name: &str) -> String {
    let (base, ext) = match backup_name.rfind('.') {
        Some(dot) if dot > 0 => backup_name.split_at(dot),
        _ => (backup_name, ""),
    };
    // _YYYYMMDD_HHMMSS
    const STAMP: usize = 16;
    if base.len() > STAMP && base.is_char_boundary(base.len() - STAMP) {
        let (head, stamp) = base.split_at(base.len() - STAMP);
        let bytes = stamp.as_bytes();
        let shaped = bytes[0] == b'_'
            && bytes[9] == b'_'
            && bytes[1..9].iter().all(u8::is_ascii_digit)
            && bytes[10..].iter().all(u8::is_ascii_digit);
        if shaped {
            return format!("{}{}", head, ext);
        }
    }
    backup_name.to_string()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SyncServer {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store, rag: None }
    }

    pub fn with_rag(mut self, rag: Arc<dyn RagStore>) -> Self {
        self.rag = Some(rag);
        self
    }

    /// Dispatch one endpoint request
    pub async fn handle(&self, request: SyncRequest) -> Result<SyncResponse> {
        log::debug!("Sync action: {}", request.action());
        Ok(match request {
            SyncRequest::Diff {
                local_meta,
                locally_modified_file_ids,
            } => SyncResponse::Diff(self.diff(local_meta, locally_modified_file_ids).await?),
            SyncRequest::Pull { file_ids } => SyncResponse::Pull(self.pull(file_ids).await?),
            SyncRequest::Resolve {
                file_id,
                choice,
                local_content,
            } => SyncResponse::Resolve(self.resolve(&file_id, choice, local_content).await?),
            SyncRequest::Update { file_id, content } => {
                SyncResponse::Update(self.update(&file_id, &content).await?)
            }
            SyncRequest::FullPull { skip_hashes } => {
                SyncResponse::FullPull(self.full_pull(skip_hashes).await?)
            }
            SyncRequest::FullPush { local_meta } => {
                SyncResponse::Meta(self.full_push(local_meta).await?)
            }
            SyncRequest::ListTrash => SyncResponse::Files(FileListResponse {
                files: self.list_trash().await?,
            }),
            SyncRequest::ListConflicts => SyncResponse::Files(FileListResponse {
                files: self.list_conflicts().await?,
            }),
            SyncRequest::RestoreTrash { file_ids } => SyncResponse::FileIds(FileIdsResponse {
                file_ids: self.restore_trash(&file_ids).await?,
            }),
            SyncRequest::RestoreConflict {
                file_id,
                restore_name,
            } => SyncResponse::FileIds(FileIdsResponse {
                file_ids: vec![self.restore_conflict(&file_id, restore_name).await?],
            }),
            SyncRequest::DeleteUntracked { file_ids } => SyncResponse::FileIds(FileIdsResponse {
                file_ids: self.delete_untracked(file_ids).await?,
            }),
            SyncRequest::History { file_id } => SyncResponse::History(HistoryResponse {
                entries: self.remote_history(&file_id).await?,
            }),
            SyncRequest::RagRegister { file_id, file_name } => {
                SyncResponse::RagRegister(self.rag_register(&file_id, &file_name).await?)
            }
            SyncRequest::RagSave {
                updates,
                store_name,
            } => {
                self.rag_save(updates, &store_name).await?;
                SyncResponse::Ok { ok: true }
            }
            SyncRequest::RagRetryPending => SyncResponse::RagRetry(self.rag_retry_pending().await?),
        })
    }

    async fn settings(&self) -> UserSettings {
        match UserSettings::load_from_drive(self.store.as_ref()).await {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to load settings, using defaults: {}", e);
                UserSettings::default()
            }
        }
    }

    async fn require_file(&self, file_id: &str) -> Result<DriveFile> {
        self.store
            .get(file_id)
            .await?
            .ok_or_else(|| SyncError::InvalidRequest(format!("unknown file id {}", file_id)))
    }

    async fn read_content(&self, file: &DriveFile) -> Result<FileContent> {
        let bytes = self.store.read(&file.id).await?;
        Ok(FileContent::from_bytes(file, bytes, is_binary_mime_type(&file.mime_type)))
    }

    async fn read_all(&self, file_ids: &[String]) -> Result<Vec<FileContent>> {
        let mut files = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            match self.store.get(id).await? {
                Some(file) => files.push(self.read_content(&file).await?),
                None => log::warn!("Skipping missing file {}", id),
            }
        }
        Ok(files)
    }

    async fn list_folder(&self, folder: &str) -> Result<Vec<DriveFile>> {
        let id = self
            .store
            .ensure_folder(self.store.root_folder_id(), folder)
            .await?;
        Ok(self.store.list(&id).await?)
    }

    /// Archive local content into the conflict folder
    pub async fn save_conflict_backup(&self, file_name: &str, content: &str) -> Result<String> {
        let folder = self
            .store
            .ensure_folder(self.store.root_folder_id(), folders::SYNC_CONFLICTS)
            .await?;
        let name = conflict_backup_name(file_name, Utc::now());
        self.store
            .create(&name, content.as_bytes(), &folder, "text/plain")
            .await?;
        log::info!("Saved conflict backup {}", name);
        Ok(name)
    }

    async fn history_file(&self, file_id: &str) -> Result<(String, Option<DriveFile>)> {
        let folder = self
            .store
            .ensure_folder(self.store.root_folder_id(), folders::HISTORY)
            .await?;
        let name = format!("{}.json", file_id);
        let existing = self.store.find_by_exact_name(&name, Some(&folder)).await?;
        Ok((folder, existing))
    }

    /// Remote diffs of a file, newest first
    pub async fn remote_history(&self, file_id: &str) -> Result<Vec<RemoteHistoryEntry>> {
        let (_, existing) = self.history_file(file_id).await?;
        match existing {
            Some(file) => Ok(serde_json::from_str(&self.store.read_text(&file.id).await?)?),
            None => Ok(Vec::new()),
        }
    }

    /// Record a change made outside the sync endpoint; identical content
    /// records nothing
    pub async fn record_edit(&self, file_id: &str, old: &str, new: &str) -> Result<bool> {
        if old == new {
            return Ok(false);
        }
        self.record_remote_diff(file_id, create_diff(old, new)).await?;
        Ok(true)
    }

    async fn record_remote_diff(&self, file_id: &str, diff: String) -> Result<()> {
        let (folder, existing) = self.history_file(file_id).await?;
        let mut entries: Vec<RemoteHistoryEntry> = match &existing {
            Some(file) => serde_json::from_str(&self.store.read_text(&file.id).await?)?,
            None => Vec::new(),
        };
        entries.insert(
            0,
            RemoteHistoryEntry {
                diff,
                timestamp: drive_store::meta::timestamp(),
            },
        );
        entries.truncate(MAX_REMOTE_HISTORY);
        let body = serde_json::to_vec(&entries)?;
        match existing {
            Some(file) => {
                self.store.update(&file.id, &body, "application/json").await?;
            }
            None => {
                self.store
                    .create(&format!("{}.json", file_id), &body, &folder, "application/json")
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn list_trash(&self) -> Result<Vec<DriveFile>> {
        self.list_folder(folders::TRASH).await
    }

    pub async fn list_conflicts(&self) -> Result<Vec<DriveFile>> {
        self.list_folder(folders::SYNC_CONFLICTS).await
    }

    /// Move trashed files back to the root and track them again
    pub async fn restore_trash(&self, file_ids: &[String]) -> Result<Vec<String>> {
        let trash = self
            .store
            .ensure_folder(self.store.root_folder_id(), folders::TRASH)
            .await?;
        let mut restored = Vec::new();
        for id in file_ids {
            let file = self.require_file(id).await?;
            if file.parent_id.as_deref() != Some(trash.as_str()) {
                log::warn!("File {} is not in trash, skipping restore", id);
                continue;
            }
            let moved = self
                .store
                .move_file(id, self.store.root_folder_id())
                .await?;
            upsert_file_in_meta(self.store.as_ref(), &moved).await?;
            restored.push(id.clone());
        }
        Ok(restored)
    }

    /// Write a conflict backup back as a tracked file; returns its id
    pub async fn restore_conflict(&self, backup_id: &str, restore_name: Option<String>) -> Result<String> {
        let backup = self.require_file(backup_id).await?;
        let content = self.store.read(backup_id).await?;
        let name = restore_name.unwrap_or_else(|| strip_backup_timestamp(&backup.name));
        let mime = mime_type_for(&name);
        let target = match self.store.find_by_exact_name(&name, None).await? {
            Some(existing) => self.store.update(&existing.id, &content, mime).await?,
            None => {
                self.store
                    .create(&name, &content, self.store.root_folder_id(), mime)
                    .await?
            }
        };
        upsert_file_in_meta(self.store.as_ref(), &target).await?;
        self.store.delete(backup_id).await?;
        log::info!("Restored conflict backup {} as {}", backup.name, name);
        Ok(target.id)
    }

    /// Trash root files that the remote snapshot does not track
    pub async fn delete_untracked(&self, only: Option<Vec<String>>) -> Result<Vec<String>> {
        let meta = load_or_rebuild_sync_meta(self.store.as_ref()).await?;
        let only: Option<HashSet<String>> = only.map(|ids| ids.into_iter().collect());
        let mut deleted = Vec::new();
        for file in self.store.list(self.store.root_folder_id()).await? {
            if meta.files.contains_key(&file.id) || is_sync_excluded_path(&file.name) {
                continue;
            }
            if only.as_ref().is_some_and(|ids| !ids.contains(&file.id)) {
                continue;
            }
            self.store.delete(&file.id).await?;
            deleted.push(file.id);
        }
        Ok(deleted)
    }

    /// Re-register pending RAG entries, dropping ones that can never be indexed
    pub async fn rag_retry_pending(&self) -> Result<RagRetryResponse> {
        let rag = self.require_rag()?;
        let mut settings = self.settings().await;
        let Some(setting) = settings.rag_settings.get_mut(DEFAULT_RAG_STORE_KEY) else {
            return Ok(RagRetryResponse::default());
        };
        let meta = load_or_rebuild_sync_meta(self.store.as_ref()).await?;
        let exclude = ExcludeMatcher::new(&setting.exclude_patterns);
        let pending: Vec<String> = setting
            .files
            .iter()
            .filter(|(_, info)| info.status == RagFileStatus::Pending)
            .map(|(name, _)| name.clone())
            .collect();

        let mut report = RagRetryResponse::default();
        for name in pending {
            if is_sync_excluded_path(&name) || !is_rag_eligible(&name) || exclude.is_excluded(&name) {
                if let Some(doc) = setting.files.remove(&name).and_then(|info| info.file_id) {
                    if let Err(e) = rag.delete_document(&doc).await {
                        log::warn!("Failed to delete RAG document {}: {}", doc, e);
                    }
                }
                report.removed += 1;
                continue;
            }
            let Some(file_id) = meta
                .files
                .iter()
                .find(|(_, f)| f.name == name)
                .map(|(id, _)| id.clone())
            else {
                continue;
            };
            report.retried += 1;
            let store_id = match &setting.store_id {
                Some(id) => id.clone(),
                None => {
                    let id = rag.get_or_create_store(DEFAULT_RAG_STORE_KEY).await?;
                    setting.store_id = Some(id.clone());
                    id
                }
            };
            let upload = async {
                let bytes = self.store.read(&file_id).await?;
                rag.upload(&store_id, &name, &bytes).await
            };
            match upload.await {
                Ok(doc) => {
                    setting.files.insert(
                        name.clone(),
                        RagFileInfo {
                            checksum: doc.checksum,
                            uploaded_at: now_millis(),
                            file_id: Some(doc.document_id),
                            status: RagFileStatus::Registered,
                        },
                    );
                    report.registered += 1;
                }
                Err(e) => log::warn!("RAG retry for {} failed: {}", name, e),
            }
        }
        settings.save_to_drive(self.store.as_ref()).await?;
        Ok(report)
    }

    fn require_rag(&self) -> Result<&Arc<dyn RagStore>> {
        self.rag
            .as_ref()
            .ok_or_else(|| SyncError::InvalidRequest("RAG store not configured".to_string()))
    }
}

#[async_trait]
impl SyncRemote for SyncServer {
    async fn diff(&self, local_meta: Option<SyncMeta>, modified: Vec<String>) -> Result<DiffResponse> {
        let remote_meta = load_or_rebuild_sync_meta(self.store.as_ref()).await?;
        let settings = self.settings().await;
        let exclude = ExcludeMatcher::new(&settings.sync_exclude_patterns);
        let modified: HashSet<String> = modified.into_iter().collect();
        let diff = compute_sync_diff_with(local_meta.as_ref(), Some(&remote_meta), &modified, &exclude);
        log::debug!(
            "Sync diff: push={} pull={} conflicts={} localOnly={} remoteOnly={}",
            diff.to_push.len(),
            diff.to_pull.len(),
            diff.conflicts.len(),
            diff.local_only.len(),
            diff.remote_only.len()
        );
        Ok(DiffResponse { diff, remote_meta })
    }

    async fn remote_meta(&self) -> Result<SyncMeta> {
        Ok(load_or_rebuild_sync_meta(self.store.as_ref()).await?)
    }

    async fn pull(&self, file_ids: Vec<String>) -> Result<PullResponse> {
        let files = self.read_all(&file_ids).await?;
        let remote_meta = load_or_rebuild_sync_meta(self.store.as_ref()).await?;
        Ok(PullResponse { files, remote_meta })
    }

    async fn update(&self, file_id: &str, content: &str) -> Result<UpdateResponse> {
        let file = self.require_file(file_id).await?;
        let previous = self.store.read_text(file_id).await.ok();
        let updated = self
            .store
            .update(file_id, content.as_bytes(), &file.mime_type)
            .await?;
        upsert_file_in_meta(self.store.as_ref(), &updated).await?;

        if let Some(previous) = previous.filter(|p| p != content) {
            let diff = create_diff(&previous, content);
            if let Err(e) = self.record_remote_diff(file_id, diff).await {
                log::warn!("Failed to record remote history for {}: {}", file_id, e);
            }
        }
        Ok(UpdateResponse {
            file_id: updated.id,
            md5_checksum: updated.md5_checksum.unwrap_or_default(),
            modified_time: updated.modified_time.unwrap_or_default(),
        })
    }

    async fn resolve(
        &self,
        file_id: &str,
        choice: ResolveChoice,
        local_content: Option<String>,
    ) -> Result<ResolveResponse> {
        let file = self.require_file(file_id).await?;
        match choice {
            ResolveChoice::Remote => {
                let backup_name = match local_content {
                    Some(local) => Some(self.save_conflict_backup(&file.name, &local).await?),
                    None => None,
                };
                let content = self.read_content(&file).await?;
                upsert_file_in_meta(self.store.as_ref(), &file).await?;
                Ok(ResolveResponse {
                    file_id: file.id.clone(),
                    meta: FileSyncMeta::from(&file),
                    file: Some(content),
                    backup_name,
                })
            }
            ResolveChoice::Local => {
                let content = local_content.ok_or_else(|| {
                    SyncError::InvalidRequest("local content is required to keep the local side".into())
                })?;
                self.update(file_id, &content).await?;
                let updated = self.require_file(file_id).await?;
                Ok(ResolveResponse {
                    file_id: updated.id.clone(),
                    meta: FileSyncMeta::from(&updated),
                    file: None,
                    backup_name: None,
                })
            }
        }
    }

    async fn full_pull(&self, skip_hashes: Vec<String>) -> Result<FullPullResponse> {
        let remote_meta = load_or_rebuild_sync_meta(self.store.as_ref()).await?;
        let skip: HashSet<String> = skip_hashes.into_iter().filter(|h| !h.is_empty()).collect();
        let mut ids: Vec<String> = Vec::new();
        let mut skipped = 0;
        for (id, entry) in &remote_meta.files {
            if is_sync_excluded_path(&entry.name) {
                continue;
            }
            if skip.contains(&entry.md5_checksum) {
                skipped += 1;
            } else {
                ids.push(id.clone());
            }
        }
        ids.sort();
        let files = self.read_all(&ids).await?;
        Ok(FullPullResponse {
            files,
            skipped,
            remote_meta,
        })
    }

    async fn full_push(&self, mut local_meta: SyncMeta) -> Result<SyncMeta> {
        local_meta.files.retain(|_, f| !is_sync_excluded_path(&f.name));
        local_meta.touch();
        write_remote_sync_meta(self.store.as_ref(), &local_meta).await?;
        log::info!("Replaced remote sync meta ({} files)", local_meta.files.len());
        Ok(local_meta)
    }

    async fn rag_register(&self, file_id: &str, file_name: &str) -> Result<RagRegisterResponse> {
        if !is_rag_eligible(file_name) {
            return Ok(RagRegisterResponse {
                ok: true,
                skipped: true,
                reason: Some("ineligible-extension".to_string()),
                store_name: None,
                rag_file_info: None,
            });
        }
        let rag = self.require_rag()?;
        let bytes = self.store.read(file_id).await?;
        let store_id = rag.get_or_create_store(DEFAULT_RAG_STORE_KEY).await?;
        let doc = rag.upload(&store_id, file_name, &bytes).await?;
        Ok(RagRegisterResponse {
            ok: true,
            skipped: false,
            reason: None,
            store_name: Some(store_id),
            rag_file_info: Some(RagFileInfo {
                checksum: doc.checksum,
                uploaded_at: now_millis(),
                file_id: Some(doc.document_id),
                status: RagFileStatus::Registered,
            }),
        })
    }

    async fn rag_save(&self, updates: Vec<RagUpdate>, store_name: &str) -> Result<()> {
        let mut settings = self.settings().await;
        let setting = settings
            .rag_settings
            .entry(DEFAULT_RAG_STORE_KEY.to_string())
            .or_default();
        if !store_name.is_empty() {
            setting.store_id = Some(store_name.to_string());
            setting.store_name = Some(store_name.to_string());
        }
        for update in updates {
            setting.files.insert(update.file_name, update.rag_file_info);
        }
        settings.save_to_drive(self.store.as_ref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use drive_store::{InMemoryFileStore, InMemoryRagStore};

    async fn setup() -> (Arc<InMemoryFileStore>, SyncServer) {
        let store = Arc::new(InMemoryFileStore::new());
        let server = SyncServer::new(store.clone()).with_rag(Arc::new(InMemoryRagStore::new()));
        (store, server)
    }

    #[test]
    fn test_conflict_backup_name() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(conflict_backup_name("notes/a.md", now), "notes_a_20240305_140709.md");
        assert_eq!(conflict_backup_name("README", now), "README_20240305_140709");
        assert_eq!(conflict_backup_name(".env", now), ".env_20240305_140709");
        assert_eq!(strip_backup_timestamp("notes_a_20240305_140709.md"), "notes_a.md");
        assert_eq!(strip_backup_timestamp("README_20240305_140709"), "README");
        assert_eq!(strip_backup_timestamp("plain.md"), "plain.md");
    }

    #[tokio::test]
    async fn test_update_records_remote_history() {
        let (store, server) = setup().await;
        let file = store.create("a.md", b"one\n", "root", "text/markdown").await.unwrap();
        drive_store::rebuild_sync_meta(store.as_ref()).await.unwrap();

        let resp = server.update(&file.id, "one\ntwo\n").await.unwrap();
        let meta = server.remote_meta().await.unwrap();
        assert_eq!(meta.checksum(&file.id), Some(resp.md5_checksum.as_str()));

        let history = server.remote_history(&file.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            crate::diff::reverse_apply_diff("one\ntwo\n", &history[0].diff).as_deref(),
            Some("one\n")
        );
    }

    #[tokio::test]
    async fn test_record_edit_skips_identical_content() {
        let (_store, server) = setup().await;
        assert!(!server.record_edit("f1", "same", "same").await.unwrap());
        assert!(server.record_edit("f1", "a\n", "b\n").await.unwrap());
        assert_eq!(server.remote_history("f1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_remote_backs_up_local() {
        let (store, server) = setup().await;
        let file = store.create("notes/a.md", b"remote", "root", "text/markdown").await.unwrap();

        let resp = server
            .resolve(&file.id, ResolveChoice::Remote, Some("local".into()))
            .await
            .unwrap();
        assert_eq!(resp.file.map(|f| f.content).as_deref(), Some("remote"));

        let backups = server.list_conflicts().await.unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].name.starts_with("notes_a_"));
        assert_eq!(resp.backup_name.as_deref(), Some(backups[0].name.as_str()));
        assert_eq!(store.read_text(&backups[0].id).await.unwrap(), "local");
    }

    #[tokio::test]
    async fn test_resolve_local_requires_content() {
        let (store, server) = setup().await;
        let file = store.create("a.md", b"remote", "root", "text/markdown").await.unwrap();
        assert!(matches!(
            server.resolve(&file.id, ResolveChoice::Local, None).await,
            Err(SyncError::InvalidRequest(_))
        ));
        let resp = server
            .resolve(&file.id, ResolveChoice::Local, Some("mine".into()))
            .await
            .unwrap();
        assert!(resp.file.is_none());
        assert_eq!(store.read_text(&file.id).await.unwrap(), "mine");
    }

    #[tokio::test]
    async fn test_trash_round_trip_and_untracked() {
        let (store, server) = setup().await;
        let tracked = store.create("a.md", b"a", "root", "text/markdown").await.unwrap();
        drive_store::rebuild_sync_meta(store.as_ref()).await.unwrap();
        let stray = store.create("stray.md", b"s", "root", "text/markdown").await.unwrap();

        let deleted = server.delete_untracked(None).await.unwrap();
        assert_eq!(deleted, vec![stray.id.clone()]);
        assert_eq!(server.list_trash().await.unwrap().len(), 1);

        let restored = server.restore_trash(&[stray.id.clone(), tracked.id.clone()]).await.unwrap();
        assert_eq!(restored, vec![stray.id.clone()]);
        let meta = server.remote_meta().await.unwrap();
        assert!(meta.files.contains_key(&stray.id));
    }

    #[tokio::test]
    async fn test_restore_conflict_overwrites_target() {
        let (store, server) = setup().await;
        let file = store.create("a.md", b"remote", "root", "text/markdown").await.unwrap();
        let backup = server.save_conflict_backup("a.md", "local copy").await.unwrap();
        let backups = server.list_conflicts().await.unwrap();
        assert_eq!(backups[0].name, backup);

        let restored = server.restore_conflict(&backups[0].id, None).await.unwrap();
        assert_eq!(restored, file.id);
        assert_eq!(store.read_text(&file.id).await.unwrap(), "local copy");
        assert!(server.list_conflicts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_pull_skips_known_hashes() {
        let (store, server) = setup().await;
        let a = store.create("a.md", b"a", "root", "text/markdown").await.unwrap();
        store.create("b.md", b"b", "root", "text/markdown").await.unwrap();
        drive_store::rebuild_sync_meta(store.as_ref()).await.unwrap();

        let resp = server
            .full_pull(vec![a.md5_checksum.clone().unwrap()])
            .await
            .unwrap();
        assert_eq!(resp.skipped, 1);
        assert_eq!(resp.files.len(), 1);
        assert_eq!(resp.files[0].file_name, "b.md");
    }

    #[tokio::test]
    async fn test_rag_register_save_and_retry() {
        let (store, server) = setup().await;
        let doc = store.create("doc.md", b"text", "root", "text/markdown").await.unwrap();
        store.create("pending.md", b"later", "root", "text/markdown").await.unwrap();
        drive_store::rebuild_sync_meta(store.as_ref()).await.unwrap();

        let skipped = server.rag_register("x", "image.png").await.unwrap();
        assert!(skipped.skipped);
        assert_eq!(skipped.reason.as_deref(), Some("ineligible-extension"));

        let registered = server.rag_register(&doc.id, "doc.md").await.unwrap();
        let store_name = registered.store_name.clone().unwrap();
        let mut updates = vec![RagUpdate {
            file_name: "doc.md".into(),
            rag_file_info: registered.rag_file_info.unwrap(),
        }];
        for name in ["pending.md", "workflows/auto.yaml"] {
            updates.push(RagUpdate {
                file_name: name.into(),
                rag_file_info: RagFileInfo {
                    checksum: String::new(),
                    uploaded_at: 0,
                    file_id: None,
                    status: RagFileStatus::Pending,
                },
            });
        }
        server.rag_save(updates, &store_name).await.unwrap();

        let report = server.rag_retry_pending().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.registered, 1);

        let settings = UserSettings::load_from_drive(store.as_ref()).await.unwrap();
        let setting = &settings.rag_settings[DEFAULT_RAG_STORE_KEY];
        assert_eq!(setting.files["pending.md"].status, RagFileStatus::Registered);
        assert_eq!(setting.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_handle_dispatch() {
        let (store, server) = setup().await;
        store.create("a.md", b"a", "root", "text/markdown").await.unwrap();
        let request: SyncRequest = serde_json::from_value(serde_json::json!({
            "action": "diff",
            "localMeta": null,
            "locallyModifiedFileIds": []
        }))
        .unwrap();
        let response = server.handle(request).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["diff"]["remoteOnly"].as_array().map(Vec::len), Some(1));
    }
}
