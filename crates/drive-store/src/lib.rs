//! Drive Store - file-store access for Drive-backed workspaces
//!
//! - `FileStore`: the narrow collaborator interface (read, create, update,
//!   search, move, rename, soft delete) and an in-memory implementation
//! - `SyncMeta`: local/remote sync snapshots and remote snapshot upkeep
//! - `paths`: which names take part in sync, binary and RAG classification
//! - `RagStore`: auxiliary vector-store registration
//! - `UserSettings`: the settings document shared by engine and sync

pub mod error;
pub mod file;
pub mod memory;
pub mod meta;
pub mod paths;
pub mod rag;
pub mod settings;

pub use error::{Result, StoreError};
pub use file::{DriveFile, FileStore};
pub use memory::{content_checksum, InMemoryFileStore};
pub use meta::{
    load_or_rebuild_sync_meta, read_remote_sync_meta, rebuild_sync_meta, remove_file_from_meta,
    upsert_file_in_meta, write_remote_sync_meta, FileSyncMeta, SyncMeta,
};
pub use rag::{InMemoryRagStore, RagDocument, RagStore};
pub use settings::{
    ApiPlan, McpServerConfig, RagFileInfo, RagFileStatus, RagSetting, UserSettings,
    DEFAULT_RAG_STORE_KEY,
};
