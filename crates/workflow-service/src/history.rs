//! Execution history persistence
//!
//! Finished runs are kept as [`ExecutionRecord`] documents. The Drive-backed
//! store writes one JSON file per run into `history/workflows/` under the
//! user's root folder, which sync already excludes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use drive_store::FileStore;
use node_engine::ExecutionRecord;
use parking_lot::RwLock;

use crate::error::Result;

pub const HISTORY_FOLDER: &str = "history";
pub const WORKFLOW_HISTORY_FOLDER: &str = "workflows";

#[async_trait]
pub trait ExecutionHistoryStore: Send + Sync {
    async fn save(&self, record: &ExecutionRecord) -> Result<()>;

    /// Records, newest first, optionally for one workflow
    async fn list(&self, workflow_id: Option<&str>) -> Result<Vec<ExecutionRecord>>;

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionRecord>>;

    /// Returns whether a record was removed
    async fn delete(&self, execution_id: &str) -> Result<bool>;
}

fn newest_first(records: &mut [ExecutionRecord]) {
    records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
}

#[derive(Default)]
pub struct InMemoryExecutionHistory {
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl InMemoryExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionHistoryStore for InMemoryExecutionHistory {
    async fn save(&self, record: &ExecutionRecord) -> Result<()> {
        self.records.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list(&self, workflow_id: Option<&str>) -> Result<Vec<ExecutionRecord>> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .read()
            .values()
            .filter(|r| workflow_id.map_or(true, |id| r.workflow_id == id))
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.read().get(execution_id).cloned())
    }

    async fn delete(&self, execution_id: &str) -> Result<bool> {
        Ok(self.records.write().remove(execution_id).is_some())
    }
}

/// History kept as JSON files in the user's Drive
pub struct DriveExecutionHistory {
    store: Arc<dyn FileStore>,
}

impl DriveExecutionHistory {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    async fn folder(&self) -> Result<String> {
        let history = self
            .store
            .ensure_folder(self.store.root_folder_id(), HISTORY_FOLDER)
            .await?;
        Ok(self.store.ensure_folder(&history, WORKFLOW_HISTORY_FOLDER).await?)
    }

    fn file_name(execution_id: &str) -> String {
        format!("{}.json", execution_id)
    }
}

#[async_trait]
impl ExecutionHistoryStore for DriveExecutionHistory {
    async fn save(&self, record: &ExecutionRecord) -> Result<()> {
        let folder = self.folder().await?;
        let name = Self::file_name(&record.id);
        let body = serde_json::to_vec_pretty(record)?;
        match self.store.find_by_exact_name(&name, Some(&folder)).await? {
            Some(existing) => {
                self.store.update(&existing.id, &body, "application/json").await?;
            }
            None => {
                self.store.create(&name, &body, &folder, "application/json").await?;
            }
        }
        log::debug!("Saved execution record {} ({:?})", record.id, record.status);
        Ok(())
    }

    async fn list(&self, workflow_id: Option<&str>) -> Result<Vec<ExecutionRecord>> {
        let folder = self.folder().await?;
        let mut records = Vec::new();
        for file in self.store.list(&folder).await? {
            if !file.name.ends_with(".json") {
                continue;
            }
            let text = self.store.read_text(&file.id).await?;
            match serde_json::from_str::<ExecutionRecord>(&text) {
                Ok(record) if workflow_id.map_or(true, |id| record.workflow_id == id) => records.push(record),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable execution record {}: {}", file.name, e),
            }
        }
        newest_first(&mut records);
        Ok(records)
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let folder = self.folder().await?;
        let Some(file) = self
            .store
            .find_by_exact_name(&Self::file_name(execution_id), Some(&folder))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&self.store.read_text(&file.id).await?)?))
    }

    async fn delete(&self, execution_id: &str) -> Result<bool> {
        let folder = self.folder().await?;
        match self
            .store
            .find_by_exact_name(&Self::file_name(execution_id), Some(&folder))
            .await?
        {
            Some(file) => {
                self.store.delete(&file.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
