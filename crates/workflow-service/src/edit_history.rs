//! Edit history recording for workflow writes
//!
//! Bridges the `drive-file` node's history hook onto the sync server's
//! remote diff history, so a workflow's rewrite shows up next to edits
//! pushed from the editor.

use std::sync::Arc;

use async_trait::async_trait;
use drive_sync::SyncServer;
use node_engine::{NodeEngineError, Result};
use workflow_nodes::EditHistoryRecorder;

pub struct DriveEditHistory {
    server: Arc<SyncServer>,
}

impl DriveEditHistory {
    pub fn new(server: Arc<SyncServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl EditHistoryRecorder for DriveEditHistory {
    async fn record(&self, file_id: &str, file_name: &str, old: &str, new: &str, source: &str) -> Result<()> {
        let recorded = self
            .server
            .record_edit(file_id, old, new)
            .await
            .map_err(|e| NodeEngineError::service("edit history", e))?;
        if recorded {
            log::debug!("Recorded {} edit of {} ({})", source, file_name, file_id);
        }
        Ok(())
    }
}
