//! Offline sync for Drive-backed workspaces
//!
//! - [`diff`]: line diffs in unified format, forward and reverse application
//! - [`history`]: rebuilding earlier versions from a chain of diffs
//! - [`sync_diff`]: three-way classification of files between snapshots
//! - [`server`] / [`client`]: the two halves of push, pull and conflict resolution
//! - [`spacing`]: blank-line preservation for the markdown editor

pub mod client;
pub mod diff;
pub mod error;
pub mod history;
pub mod protocol;
pub mod server;
pub mod spacing;
pub mod sync_diff;

pub use client::{
    CachedFile, FullPullOutcome, InMemoryLocalCache, LocalCache, PullOutcome, PushOutcome,
    SyncClient, SyncState, SyncStatus,
};
pub use diff::{apply_diff, can_apply_forward, create_diff, diff_stats, reverse_apply_diff};
pub use error::{Result, SyncError};
pub use history::{reconstruct_content, DiffOrigin, DiffWithOrigin};
pub use protocol::{FileContent, ResolveChoice, SyncRemote, SyncRequest, SyncResponse};
pub use server::{conflict_backup_name, SyncServer};
pub use spacing::{from_wysiwyg, to_wysiwyg, BLANK_LINE_MARKER};
pub use sync_diff::{compute_sync_diff, compute_sync_diff_with, ConflictInfo, SyncDiff};
