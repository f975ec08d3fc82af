//! Registry of in-flight executions
//!
//! One entry per execution id holds its status, cancellation token, pending
//! prompt resolver and log backlog. The store is an explicit value owned by
//! the host process; terminal entries are evicted once they outlive the
//! configured TTL.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::events::{EventSink, PromptRequest, WorkflowEvent};
use crate::service::PromptCallbacks;
use crate::types::{ExecutionRecord, ExecutionStatus, LogEntry};

struct PendingPrompt {
    resolver: oneshot::Sender<Option<Value>>,
    request: PromptRequest,
}

struct ExecutionEntry {
    workflow_id: String,
    owner: Option<String>,
    status: ExecutionStatus,
    cancel: CancellationToken,
    pending_prompt: Option<PendingPrompt>,
    logs: Vec<LogEntry>,
    record: Option<ExecutionRecord>,
    finished_at: Option<Instant>,
}

impl ExecutionEntry {
    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished_at.get_or_insert_with(Instant::now);
    }
}

/// Point-in-time view of an execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub pending_prompt: Option<PromptRequest>,
    pub log_count: usize,
}

pub struct ExecutionStore {
    entries: Mutex<HashMap<String, ExecutionEntry>>,
    /// How long terminal executions are kept
    ttl: Duration,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::with_ttl(EngineConfig::default().terminal_ttl())
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_ttl(config.terminal_ttl())
    }

    /// Register a new execution and return its cancellation token
    pub fn create_execution(
        &self,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> CancellationToken {
        self.insert(execution_id.into(), workflow_id.into(), None)
    }

    /// Like [`create_execution`](Self::create_execution), tagged with the
    /// key of the caller allowed to control it
    pub fn create_owned_execution(
        &self,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        owner: impl Into<String>,
    ) -> CancellationToken {
        self.insert(execution_id.into(), workflow_id.into(), Some(owner.into()))
    }

    fn insert(&self, execution_id: String, workflow_id: String, owner: Option<String>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let entry = ExecutionEntry {
            workflow_id,
            owner,
            status: ExecutionStatus::Running,
            cancel: cancel.clone(),
            pending_prompt: None,
            logs: Vec::new(),
            record: None,
            finished_at: None,
        };
        let mut entries = self.entries.lock();
        if let Some(previous) = entries.insert(execution_id.clone(), entry) {
            log::warn!("Execution {} re-created, cancelling the previous run", execution_id);
            previous.cancel.cancel();
            if let Some(prompt) = previous.pending_prompt {
                let _ = prompt.resolver.send(None);
            }
        }
        log::debug!("Execution {} registered", execution_id);
        cancel
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<ExecutionSnapshot> {
        let entries = self.entries.lock();
        entries.get(execution_id).map(|entry| ExecutionSnapshot {
            execution_id: execution_id.to_string(),
            workflow_id: entry.workflow_id.clone(),
            status: entry.status,
            pending_prompt: entry.pending_prompt.as_ref().map(|p| p.request.clone()),
            log_count: entry.logs.len(),
        })
    }

    pub fn cancel_token(&self, execution_id: &str) -> Option<CancellationToken> {
        self.entries.lock().get(execution_id).map(|e| e.cancel.clone())
    }

    /// Cancel a running execution and release any pending prompt with `None`
    ///
    /// Returns whether anything changed; stopping twice returns `false`.
    pub fn stop_execution(&self, execution_id: &str) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(execution_id) else {
            return false;
        };
        if entry.status.is_terminal() || entry.cancel.is_cancelled() {
            return false;
        }
        entry.cancel.cancel();
        if let Some(prompt) = entry.pending_prompt.take() {
            let _ = prompt.resolver.send(None);
        }
        entry.finish(ExecutionStatus::Cancelled);
        log::info!("Execution {} stopped", execution_id);
        true
    }

    /// Park until [`resolve_prompt`](Self::resolve_prompt) or a stop
    ///
    /// Registration happens before this returns, so the prompt is visible to
    /// callers as soon as the future exists. A stopped or unknown execution
    /// yields `None` immediately. A second request replaces the first, which
    /// then resolves to `None`.
    pub fn request_prompt(
        &self,
        execution_id: &str,
        request: PromptRequest,
    ) -> impl Future<Output = Option<Value>> + Send + 'static {
        let (resolver, answer) = oneshot::channel();
        {
            let mut entries = self.entries.lock();
            match entries.get_mut(execution_id) {
                Some(entry) if !entry.cancel.is_cancelled() && !entry.status.is_terminal() => {
                    let pending = PendingPrompt { resolver, request };
                    if let Some(previous) = entry.pending_prompt.replace(pending) {
                        log::debug!("Execution {}: superseding pending prompt", execution_id);
                        let _ = previous.resolver.send(None);
                    }
                    entry.status = ExecutionStatus::WaitingPrompt;
                }
                _ => {
                    log::debug!("Execution {}: prompt requested after stop", execution_id);
                    drop(resolver);
                }
            }
        }
        async move { answer.await.ok().flatten() }
    }

    /// Deliver an answer to the pending prompt; returns whether one was waiting
    pub fn resolve_prompt(&self, execution_id: &str, value: Option<Value>) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(execution_id) else {
            return false;
        };
        let Some(prompt) = entry.pending_prompt.take() else {
            return false;
        };
        entry.status = ExecutionStatus::Running;
        prompt.resolver.send(value).is_ok()
    }

    pub fn is_execution_owned_by(&self, execution_id: &str, owner: &str) -> bool {
        self.entries
            .lock()
            .get(execution_id)
            .is_some_and(|e| e.owner.as_deref() == Some(owner))
    }

    pub fn set_status(&self, execution_id: &str, status: ExecutionStatus) {
        if let Some(entry) = self.entries.lock().get_mut(execution_id) {
            if !entry.status.is_terminal() {
                entry.status = status;
            }
        }
    }

    /// Store the final record; the entry becomes eligible for eviction
    pub fn mark_terminal(&self, execution_id: &str, record: ExecutionRecord) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(execution_id) {
            if let Some(prompt) = entry.pending_prompt.take() {
                let _ = prompt.resolver.send(None);
            }
            entry.status = record.status;
            entry.finished_at = Some(Instant::now());
            entry.record = Some(record);
        }
    }

    pub fn record(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.entries
            .lock()
            .get(execution_id)
            .and_then(|e| e.record.clone())
    }

    pub fn append_log(&self, execution_id: &str, entry: LogEntry) {
        if let Some(execution) = self.entries.lock().get_mut(execution_id) {
            execution.logs.push(entry);
        }
    }

    /// Logs from `index` on, for a reconnecting log stream
    pub fn logs_since(&self, execution_id: &str, index: usize) -> Option<Vec<LogEntry>> {
        self.entries
            .lock()
            .get(execution_id)
            .map(|e| e.logs.iter().skip(index).cloned().collect())
    }

    /// Drop terminal executions finished more than the TTL before `now`
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|id, entry| {
            let expired = entry.status.is_terminal()
                && entry
                    .finished_at
                    .is_some_and(|at| now.saturating_duration_since(at) > self.ttl);
            if expired {
                log::debug!("Evicted execution {}", id);
            }
            !expired
        });
        before - entries.len()
    }

    pub fn remove(&self, execution_id: &str) -> bool {
        self.entries.lock().remove(execution_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// [`PromptCallbacks`] backed by an [`ExecutionStore`] entry
///
/// Announces the prompt on the event stream, parks on the store, and
/// reports the return to `running` once answered.
pub struct StorePrompter {
    store: Arc<ExecutionStore>,
    execution_id: String,
    events: Arc<dyn EventSink>,
}

impl StorePrompter {
    pub fn new(store: Arc<ExecutionStore>, execution_id: impl Into<String>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            execution_id: execution_id.into(),
            events,
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Execution {}: failed to send event: {}", self.execution_id, e);
        }
    }
}

#[async_trait]
impl PromptCallbacks for StorePrompter {
    async fn prompt(&self, request: PromptRequest) -> Option<Value> {
        let answer = self.store.request_prompt(&self.execution_id, request.clone());
        if self
            .store
            .get_execution(&self.execution_id)
            .is_some_and(|e| e.status == ExecutionStatus::WaitingPrompt)
        {
            self.emit(WorkflowEvent::status(&self.execution_id, ExecutionStatus::WaitingPrompt));
            self.emit(WorkflowEvent::PromptRequest {
                execution_id: self.execution_id.clone(),
                request,
            });
        }
        let value = answer.await;
        if value.is_some() {
            self.emit(WorkflowEvent::status(&self.execution_id, ExecutionStatus::Running));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use serde_json::json;

    fn prompt() -> PromptRequest {
        PromptRequest::value("Name?", Some("anon".into()))
    }

    #[tokio::test]
    async fn test_prompt_after_stop_resolves_none() {
        let store = ExecutionStore::new();
        store.create_execution("e1", "wf");
        assert!(store.stop_execution("e1"));

        let answer = tokio::time::timeout(Duration::from_secs(1), store.request_prompt("e1", prompt()))
            .await
            .unwrap();
        assert_eq!(answer, None);
        assert!(store.get_execution("e1").unwrap().pending_prompt.is_none());
    }

    #[tokio::test]
    async fn test_stop_releases_pending_prompt() {
        let store = ExecutionStore::new();
        let cancel = store.create_execution("e1", "wf");
        let answer = store.request_prompt("e1", prompt());

        let snapshot = store.get_execution("e1").unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::WaitingPrompt);
        assert_eq!(snapshot.pending_prompt, Some(prompt()));

        assert!(store.stop_execution("e1"));
        assert!(!store.stop_execution("e1"));
        assert_eq!(answer.await, None);
        assert!(cancel.is_cancelled());
        assert_eq!(store.get_execution("e1").unwrap().status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_resolve_prompt_resumes() {
        let store = ExecutionStore::new();
        store.create_execution("e1", "wf");
        let answer = store.request_prompt("e1", prompt());

        assert!(store.resolve_prompt("e1", Some(json!("Ada"))));
        assert_eq!(answer.await, Some(json!("Ada")));
        assert_eq!(store.get_execution("e1").unwrap().status, ExecutionStatus::Running);
        assert!(!store.resolve_prompt("e1", Some(json!("again"))));
    }

    #[tokio::test]
    async fn test_second_prompt_supersedes_first() {
        let store = ExecutionStore::new();
        store.create_execution("e1", "wf");
        let first = store.request_prompt("e1", prompt());
        let second = store.request_prompt("e1", PromptRequest::value("Other?", None));

        assert_eq!(first.await, None);
        store.resolve_prompt("e1", Some(json!(1)));
        assert_eq!(second.await, Some(json!(1)));
    }

    #[test]
    fn test_ownership_and_unknown_ids() {
        let store = ExecutionStore::new();
        store.create_owned_execution("e1", "wf", "user-a");
        assert!(store.is_execution_owned_by("e1", "user-a"));
        assert!(!store.is_execution_owned_by("e1", "user-b"));
        assert!(!store.is_execution_owned_by("missing", "user-a"));
        assert!(!store.stop_execution("missing"));
        assert!(!store.resolve_prompt("missing", None));
    }

    #[test]
    fn test_eviction_after_ttl() {
        let store = ExecutionStore::with_ttl(Duration::from_secs(60));
        store.create_execution("done", "wf");
        store.create_execution("running", "wf");
        let mut record = ExecutionRecord::start("done", "wf");
        record.finish(ExecutionStatus::Completed);
        store.mark_terminal("done", record);

        assert_eq!(store.evict_expired(Instant::now()), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.evict_expired(later), 1);
        assert!(store.get_execution("done").is_none());
        assert!(store.get_execution("running").is_some());
    }

    #[test]
    fn test_log_replay() {
        let store = ExecutionStore::new();
        store.create_execution("e1", "wf");
        let node = crate::types::WorkflowNode::new("n", crate::types::NodeType::Variable);
        for i in 0..3 {
            store.append_log("e1", LogEntry::new(&node, crate::types::LogStatus::Info, format!("m{}", i)));
        }
        let replay = store.logs_since("e1", 1).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].message, "m1");
        assert!(store.logs_since("missing", 0).is_none());
    }

    #[tokio::test]
    async fn test_store_prompter_announces_prompt() {
        let store = Arc::new(ExecutionStore::new());
        store.create_execution("e1", "wf");
        let sink = Arc::new(VecEventSink::new());
        let prompter = StorePrompter::new(store.clone(), "e1", sink.clone());

        let waiter = tokio::spawn(async move { prompter.prompt(prompt()).await });
        while store.get_execution("e1").unwrap().pending_prompt.is_none() {
            tokio::task::yield_now().await;
        }
        store.resolve_prompt("e1", Some(json!("yes")));
        assert_eq!(waiter.await.unwrap(), Some(json!("yes")));
        assert_eq!(sink.names(), vec!["status", "prompt-request", "status"]);
    }
}
