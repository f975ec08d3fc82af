//! Three-way sync classification
//!
//! Compares the local snapshot (last state this device synced), the remote
//! snapshot (last state anyone pushed) and the set of files edited locally
//! since the last sync. Pure: no I/O.

use std::collections::{BTreeSet, HashSet};

use drive_store::paths::{is_sync_excluded_path, ExcludeMatcher};
use drive_store::SyncMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub file_id: String,
    pub file_name: String,
    pub local_checksum: String,
    pub remote_checksum: String,
    pub local_modified_time: String,
    pub remote_modified_time: String,
}

/// Partition of every file id touched by the inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiff {
    pub to_push: Vec<String>,
    pub to_pull: Vec<String>,
    pub conflicts: Vec<ConflictInfo>,
    pub local_only: Vec<String>,
    pub remote_only: Vec<String>,
    /// Present on both sides with no change on either
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl SyncDiff {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Ids that a pull needs to download
    pub fn pull_ids(&self) -> Vec<String> {
        self.to_pull
            .iter()
            .chain(self.remote_only.iter())
            .cloned()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.to_push.is_empty()
            && self.to_pull.is_empty()
            && self.conflicts.is_empty()
            && self.local_only.is_empty()
            && self.remote_only.is_empty()
    }
}

/// Classify with no user exclusion patterns
pub fn compute_sync_diff(
    local: Option<&SyncMeta>,
    remote: Option<&SyncMeta>,
    modified: &HashSet<String>,
) -> SyncDiff {
    compute_sync_diff_with(local, remote, modified, &ExcludeMatcher::default())
}

/// Classify each file id:
///
/// - local but not remote: `local_only`
/// - remote but not local: `remote_only`
/// - edited locally and remote checksum moved: `conflicts`
/// - edited locally only: `to_push`
/// - remote checksum moved only: `to_pull`
///
/// "Local" means in the local snapshot or in the modified set. System
/// files, internal folders and excluded names are skipped.
pub fn compute_sync_diff_with(
    local: Option<&SyncMeta>,
    remote: Option<&SyncMeta>,
    modified: &HashSet<String>,
    exclude: &ExcludeMatcher,
) -> SyncDiff {
    let local_files = local.map(|m| &m.files);
    let remote_files = remote.map(|m| &m.files);

    let mut ids: BTreeSet<&str> = BTreeSet::new();
    ids.extend(local_files.into_iter().flat_map(|f| f.keys().map(String::as_str)));
    ids.extend(remote_files.into_iter().flat_map(|f| f.keys().map(String::as_str)));
    ids.extend(modified.iter().map(String::as_str));

    let mut diff = SyncDiff::default();
    for id in ids {
        let local_entry = local_files.and_then(|f| f.get(id));
        let remote_entry = remote_files.and_then(|f| f.get(id));

        let name = remote_entry.or(local_entry).map(|e| e.name.as_str());
        if let Some(name) = name {
            if is_sync_excluded_path(name) || exclude.is_excluded(name) {
                continue;
            }
        }

        let local_changed = modified.contains(id);
        let has_local = local_entry.is_some() || local_changed;
        let Some(remote_entry) = remote_entry else {
            if has_local {
                diff.local_only.push(id.to_string());
            }
            continue;
        };
        if !has_local {
            diff.remote_only.push(id.to_string());
            continue;
        }

        let local_checksum = local_entry.map(|e| e.md5_checksum.as_str()).unwrap_or("");
        let remote_changed = local_entry.is_none() || local_checksum != remote_entry.md5_checksum;

        match (local_changed, remote_changed) {
            (true, true) => diff.conflicts.push(ConflictInfo {
                file_id: id.to_string(),
                file_name: remote_entry.name.clone(),
                local_checksum: local_checksum.to_string(),
                remote_checksum: remote_entry.md5_checksum.clone(),
                local_modified_time: local_entry
                    .map(|e| e.modified_time.clone())
                    .unwrap_or_default(),
                remote_modified_time: remote_entry.modified_time.clone(),
            }),
            (true, false) => diff.to_push.push(id.to_string()),
            (false, true) => diff.to_pull.push(id.to_string()),
            (false, false) => diff.unchanged.push(id.to_string()),
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_store::FileSyncMeta;

    fn entry(name: &str, checksum: &str) -> FileSyncMeta {
        FileSyncMeta {
            name: name.to_string(),
            mime_type: "text/markdown".to_string(),
            md5_checksum: checksum.to_string(),
            modified_time: "2024-01-01T00:00:00.000Z".to_string(),
            created_time: None,
            shared: None,
            web_view_link: None,
        }
    }

    fn meta(files: &[(&str, FileSyncMeta)]) -> SyncMeta {
        let mut meta = SyncMeta::empty();
        for (id, e) in files {
            meta.files.insert(id.to_string(), e.clone());
        }
        meta
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partitions() {
        let local = meta(&[
            ("same", entry("same.md", "a")),
            ("push", entry("push.md", "a")),
            ("pull", entry("pull.md", "a")),
            ("both", entry("both.md", "a")),
            ("gone", entry("gone.md", "a")),
        ]);
        let remote = meta(&[
            ("same", entry("same.md", "a")),
            ("push", entry("push.md", "a")),
            ("pull", entry("pull.md", "b")),
            ("both", entry("both.md", "b")),
            ("new", entry("new.md", "c")),
        ]);
        let diff = compute_sync_diff(Some(&local), Some(&remote), &set(&["push", "both"]));

        assert_eq!(diff.to_push, vec!["push"]);
        assert_eq!(diff.to_pull, vec!["pull"]);
        assert_eq!(diff.local_only, vec!["gone"]);
        assert_eq!(diff.remote_only, vec!["new"]);
        assert_eq!(diff.unchanged, vec!["same"]);
        assert_eq!(diff.conflicts.len(), 1);
        let conflict = &diff.conflicts[0];
        assert_eq!(conflict.file_id, "both");
        assert_eq!(conflict.local_checksum, "a");
        assert_eq!(conflict.remote_checksum, "b");
        assert_eq!(diff.pull_ids(), vec!["pull", "new"]);
    }

    #[test]
    fn test_partitions_are_exclusive_and_exhaustive() {
        let local = meta(&[("a", entry("a.md", "1")), ("b", entry("b.md", "1"))]);
        let remote = meta(&[("b", entry("b.md", "2")), ("c", entry("c.md", "1"))]);
        let modified = set(&["a", "b", "d"]);
        let diff = compute_sync_diff(Some(&local), Some(&remote), &modified);

        let mut all: Vec<String> = diff
            .to_push
            .iter()
            .chain(&diff.to_pull)
            .chain(&diff.local_only)
            .chain(&diff.remote_only)
            .chain(&diff.unchanged)
            .cloned()
            .chain(diff.conflicts.iter().map(|c| c.file_id.clone()))
            .collect();
        all.sort();
        assert_eq!(all, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_modified_without_snapshot_entry() {
        let remote = meta(&[("x", entry("x.md", "r"))]);
        let diff = compute_sync_diff(None, Some(&remote), &set(&["x", "y"]));
        assert_eq!(diff.conflicts.len(), 1);
        assert_eq!(diff.conflicts[0].local_checksum, "");
        assert_eq!(diff.conflicts[0].remote_checksum, "r");
        assert_eq!(diff.local_only, vec!["y"]);
    }

    #[test]
    fn test_system_and_excluded_files_skipped() {
        let remote = meta(&[
            ("m", entry("_sync-meta.json", "1")),
            ("s", entry("settings.json", "1")),
            ("h", entry("history/x.json", "1")),
            ("d", entry("drafts/a.md", "1")),
            ("k", entry("keep.md", "1")),
        ]);
        let exclude = ExcludeMatcher::new(&["^drafts/"]);
        let diff = compute_sync_diff_with(None, Some(&remote), &HashSet::new(), &exclude);
        assert_eq!(diff.remote_only, vec!["k"]);
    }

    #[test]
    fn test_no_snapshots() {
        let diff = compute_sync_diff(None, None, &HashSet::new());
        assert!(diff.is_clean());
    }
}
