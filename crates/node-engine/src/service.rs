//! Collaborator bundle handed to every handler

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use drive_store::UserSettings;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{NodeEngineError, Result};
use crate::events::{DriveFileChange, EventSink, NullEventSink, PromptRequest, WorkflowEvent};
use crate::extensions::ExecutorExtensions;

/// Asks the user for input while an execution is suspended
///
/// Resolves to `None` when the execution is stopped or the prompt is
/// superseded.
#[async_trait]
pub trait PromptCallbacks: Send + Sync {
    async fn prompt(&self, request: PromptRequest) -> Option<Value>;
}

/// Read-mostly handles shared by all nodes of one run
pub struct ServiceContext {
    pub execution_id: String,
    pub root_folder_id: String,
    pub history_folder_id: Option<String>,
    pub api_key: Option<String>,
    pub settings: UserSettings,
    pub config: EngineConfig,
    pub cancel: CancellationToken,
    pub extensions: Arc<ExecutorExtensions>,
    pub events: Arc<dyn EventSink>,
    pub prompts: Option<Arc<dyn PromptCallbacks>>,
}

impl ServiceContext {
    pub fn new(execution_id: impl Into<String>, root_folder_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            root_folder_id: root_folder_id.into(),
            history_folder_id: None,
            api_key: None,
            settings: UserSettings::default(),
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
            extensions: Arc::new(ExecutorExtensions::new()),
            events: Arc::new(NullEventSink),
            prompts: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_settings(mut self, settings: UserSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptCallbacks>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` unless the run is cancelled first
    pub async fn run_cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NodeEngineError::Cancelled),
            result = fut => result,
        }
    }

    /// Send an event; delivery failures are logged and dropped
    pub fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Execution {}: failed to send event: {}", self.execution_id, e);
        }
    }

    pub fn drive_file_updated(&self, file: DriveFileChange) {
        self.emit(WorkflowEvent::DriveFileUpdated {
            execution_id: self.execution_id.clone(),
            file,
        });
    }

    pub fn drive_file_created(&self, file: DriveFileChange) {
        self.emit(WorkflowEvent::DriveFileCreated {
            execution_id: self.execution_id.clone(),
            file,
        });
    }

    /// Suspend until the user answers; `None` means the run was stopped
    pub async fn prompt(&self, request: PromptRequest) -> Result<Option<Value>> {
        let prompts = self
            .prompts
            .as_ref()
            .ok_or_else(|| NodeEngineError::service("prompt", "no prompt handler available"))?;
        if self.is_cancelled() {
            return Ok(None);
        }
        Ok(prompts.prompt(request).await)
    }
}
