//! Workflow execution service
//!
//! Owns the execution store, the event hub and the history store, and
//! exposes the operations a host needs: start a run in the background,
//! stop it, answer its prompts and stream its log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use drive_store::UserSettings;
use node_engine::{
    EngineConfig, EventSink, ExecutionContext, ExecutionRecord, ExecutionSnapshot, ExecutionStatus,
    ExecutionStore, ExecutorExtensions, NodeRegistry, ServiceContext, StorePrompter, Workflow,
    WorkflowEvent, WorkflowExecutor,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use workflow_nodes::{setup_extensions, Collaborators};

use crate::error::{Result, ServiceError};
use crate::events::{EventHub, LogStream, RecordingEventSink};
use crate::history::ExecutionHistoryStore;

/// Everything needed to start one run
pub struct StartExecution {
    pub workflow_id: String,
    pub workflow: Workflow,
    /// Root folder of the requesting user; also the ownership key
    pub root_folder_id: String,
    pub api_key: Option<String>,
    pub settings: UserSettings,
    pub variables: HashMap<String, String>,
    pub collaborators: Collaborators,
}

pub struct WorkflowService {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    store: Arc<ExecutionStore>,
    hub: Arc<EventHub>,
    history: Arc<dyn ExecutionHistoryStore>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl WorkflowService {
    pub fn new(registry: NodeRegistry, config: EngineConfig, history: Arc<dyn ExecutionHistoryStore>) -> Self {
        let store = Arc::new(ExecutionStore::from_config(&config));
        Self {
            registry: Arc::new(registry),
            config,
            hub: Arc::new(EventHub::new(store.clone())),
            store,
            history,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Validate the workflow and run it in the background
    ///
    /// Returns the new execution id; the caller opens a log stream with it.
    pub fn start_execution(&self, request: StartExecution) -> Result<String> {
        self.registry.validate(&request.workflow)?;
        self.evict_expired();

        let execution_id = uuid::Uuid::new_v4().to_string();
        let cancel = self.store.create_owned_execution(
            execution_id.clone(),
            request.workflow_id.clone(),
            request.root_folder_id.clone(),
        );
        let events: Arc<dyn EventSink> = Arc::new(RecordingEventSink::new(self.hub.clone()));
        let prompter = StorePrompter::new(self.store.clone(), execution_id.clone(), events.clone());

        let mut extensions = ExecutorExtensions::new();
        setup_extensions(&mut extensions, request.collaborators);
        let mut services = ServiceContext::new(execution_id.clone(), request.root_folder_id)
            .with_settings(request.settings)
            .with_config(self.config.clone())
            .with_cancel(cancel)
            .with_extensions(extensions)
            .with_events(events)
            .with_prompts(Arc::new(prompter));
        if let Some(api_key) = request.api_key {
            services = services.with_api_key(api_key);
        }

        let executor = WorkflowExecutor::from_config(self.registry.clone(), &self.config);
        let store = self.store.clone();
        let history = self.history.clone();
        let workflow_id = request.workflow_id;
        let workflow = request.workflow;
        let context = ExecutionContext::with_variables(request.variables);
        let id = execution_id.clone();

        log::info!("Starting execution {} of workflow '{}'", id, workflow_id);
        let handle = tokio::spawn(async move {
            let record = match executor
                .execute(&workflow_id, &workflow, context, &services)
                .await
            {
                Ok(result) => result.history_record,
                Err(e) => {
                    log::error!("Execution {} could not run: {}", id, e);
                    services.emit(WorkflowEvent::Error {
                        execution_id: id.clone(),
                        error: e.to_string(),
                    });
                    let mut record = ExecutionRecord::start(id.clone(), workflow_id.clone());
                    record.finish(ExecutionStatus::Error);
                    record
                }
            };
            store.mark_terminal(&id, record.clone());
            if let Err(e) = history.save(&record).await {
                log::warn!("Failed to save execution history for {}: {}", id, e);
            }
        });
        self.tasks.lock().insert(execution_id.clone(), handle);
        Ok(execution_id)
    }

    /// Stop a run of `workflow_id`; stopping twice is not an error
    pub fn stop_execution(&self, workflow_id: &str, execution_id: &str) -> Result<bool> {
        match self.store.get_execution(execution_id) {
            Some(snapshot) if snapshot.workflow_id == workflow_id => Ok(self.store.stop_execution(execution_id)),
            _ => Err(ServiceError::ExecutionNotFound(execution_id.to_string())),
        }
    }

    /// Answer the pending prompt of a run owned by `owner`
    ///
    /// A `null` value is delivered as "no answer", which cancels the run.
    pub fn submit_prompt_response(&self, owner: &str, execution_id: &str, value: Value) -> Result<bool> {
        if !self.store.is_execution_owned_by(execution_id, owner) {
            return Err(ServiceError::ExecutionNotFound(execution_id.to_string()));
        }
        let answer = (!value.is_null()).then_some(value);
        Ok(self.store.resolve_prompt(execution_id, answer))
    }

    pub fn execution(&self, execution_id: &str) -> Option<ExecutionSnapshot> {
        self.store.get_execution(execution_id)
    }

    /// Log stream for a run, replaying logs from index `from`
    pub fn subscribe(&self, execution_id: &str, from: usize) -> Result<LogStream> {
        self.hub.subscribe(execution_id, from)
    }

    /// Wait for a background run to finish and return its record
    pub async fn wait(&self, execution_id: &str) -> Option<ExecutionRecord> {
        let handle = self.tasks.lock().remove(execution_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Execution task {} panicked: {}", execution_id, e);
            }
        }
        self.store.record(execution_id)
    }

    pub fn history(&self) -> &Arc<dyn ExecutionHistoryStore> {
        &self.history
    }

    /// Drop finished runs older than the configured TTL
    pub fn evict_expired(&self) -> usize {
        let evicted = self.store.evict_expired(Instant::now());
        if evicted > 0 {
            self.hub.prune();
            self.tasks.lock().retain(|_, handle| !handle.is_finished());
        }
        evicted
    }
}
