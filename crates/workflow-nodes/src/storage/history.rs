//! Edit history hook for workflow writes

use async_trait::async_trait;
use node_engine::Result;

/// Records a workflow's rewrite of a file in that file's edit history.
///
/// Registered under `extension_keys::EDIT_HISTORY`. Failures are logged by
/// the caller and never fail the write itself.
#[async_trait]
pub trait EditHistoryRecorder: Send + Sync {
    async fn record(&self, file_id: &str, file_name: &str, old: &str, new: &str, source: &str) -> Result<()>;
}
