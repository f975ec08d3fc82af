//! Storage nodes
//!
//! Nodes that read and write files in the user's Drive root and keep the
//! remote sync snapshot and RAG stores in step with those writes.

mod drive_file;
mod drive_read;
mod drive_save;
mod history;
mod lookup;
mod rag_sync;

pub use drive_file::{DriveFileHandler, WriteMode};
pub use drive_read::DriveReadHandler;
pub use drive_save::DriveSaveHandler;
pub use history::EditHistoryRecorder;
pub use lookup::{file_store, find_file, looks_like_file_id, with_markdown_extension};
pub use rag_sync::RagSyncHandler;
