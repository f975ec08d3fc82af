//! Log stream bridge
//!
//! Every execution gets a [`RecordingEventSink`] that keeps the log backlog
//! in the [`ExecutionStore`] and fans events out to live subscribers. A
//! subscriber that connects late (or reconnects) first receives the
//! backlog, then live events, and the stream ends after the terminal
//! event. Events cross the wire as named server-sent events whose data is
//! the JSON payload the browser client expects.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{future, stream, Stream, StreamExt};
use node_engine::{
    EventError, EventSink, ExecutionRecord, ExecutionStatus, ExecutionStore, LogStatus, WorkflowEvent,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Result, ServiceError};

/// One named server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: &'static str,
    pub data: String,
}

impl SseEvent {
    pub fn from_event(event: &WorkflowEvent) -> Result<Self> {
        let data = match event {
            WorkflowEvent::Log { log, .. } => serde_json::to_string(log)?,
            WorkflowEvent::Status { status, .. } => json!({ "status": status }).to_string(),
            WorkflowEvent::Complete { record, .. } => json!({ "record": record }).to_string(),
            WorkflowEvent::Cancelled { .. } => "{}".to_string(),
            WorkflowEvent::Error { error, .. } => json!({ "error": error }).to_string(),
            WorkflowEvent::PromptRequest { request, .. } => serde_json::to_string(request)?,
            WorkflowEvent::DriveFileUpdated { file, .. } | WorkflowEvent::DriveFileCreated { file, .. } => {
                serde_json::to_string(file)?
            }
        };
        Ok(Self {
            event: event.event_name(),
            data,
        })
    }

    /// `complete`, `cancelled` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, "complete" | "cancelled" | "error")
    }

    /// Text/event-stream framing
    pub fn to_wire(&self) -> String {
        let mut out = format!("event: {}\n", self.event);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

pub type LogStream = Pin<Box<dyn Stream<Item = SseEvent> + Send>>;

#[derive(Default)]
struct Channel {
    subscribers: Vec<mpsc::UnboundedSender<WorkflowEvent>>,
    terminal: Option<WorkflowEvent>,
}

/// Per-execution subscriber lists
///
/// Backlog appends and fan-out happen under one lock, so a subscriber sees
/// every log exactly once whether it arrived through replay or live.
pub struct EventHub {
    store: Arc<ExecutionStore>,
    channels: Mutex<HashMap<String, Channel>>,
}

impl EventHub {
    pub fn new(store: Arc<ExecutionStore>) -> Self {
        Self {
            store,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        let execution_id = event.execution_id().to_string();
        let mut channels = self.channels.lock();
        if let WorkflowEvent::Log { log, .. } = &event {
            self.store.append_log(&execution_id, log.clone());
        }
        let channel = channels.entry(execution_id).or_default();
        let terminal = matches!(
            event,
            WorkflowEvent::Complete { .. } | WorkflowEvent::Cancelled { .. } | WorkflowEvent::Error { .. }
        );
        channel.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if terminal {
            channel.subscribers.clear();
            channel.terminal = Some(event);
        }
    }

    /// Backlog from log `from` on, followed by live events
    pub fn subscribe(&self, execution_id: &str, from: usize) -> Result<LogStream> {
        let mut channels = self.channels.lock();
        let snapshot = self
            .store
            .get_execution(execution_id)
            .ok_or_else(|| ServiceError::ExecutionNotFound(execution_id.to_string()))?;

        let mut backlog: Vec<WorkflowEvent> = self
            .store
            .logs_since(execution_id, from)
            .unwrap_or_default()
            .into_iter()
            .map(|log| WorkflowEvent::log(execution_id, log))
            .collect();

        let channel = channels.entry(execution_id.to_string()).or_default();
        let terminal = channel.terminal.clone().or_else(|| {
            snapshot
                .status
                .is_terminal()
                .then(|| terminal_event(execution_id, snapshot.status, self.store.record(execution_id)))
        });
        if let Some(terminal) = terminal {
            backlog.push(terminal);
            return Ok(to_sse(stream::iter(backlog)));
        }

        if let Some(request) = snapshot.pending_prompt {
            backlog.push(WorkflowEvent::status(execution_id, ExecutionStatus::WaitingPrompt));
            backlog.push(WorkflowEvent::PromptRequest {
                execution_id: execution_id.to_string(),
                request,
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        channel.subscribers.push(tx);
        log::debug!(
            "Execution {}: subscriber attached with {} replayed event(s)",
            execution_id,
            backlog.len()
        );
        Ok(to_sse(stream::iter(backlog).chain(UnboundedReceiverStream::new(rx))))
    }

    pub fn subscriber_count(&self, execution_id: &str) -> usize {
        self.channels
            .lock()
            .get(execution_id)
            .map_or(0, |c| c.subscribers.len())
    }

    /// Drop channels whose execution is no longer in the store
    pub fn prune(&self) {
        self.channels
            .lock()
            .retain(|id, _| self.store.get_execution(id).is_some());
    }
}

/// Rebuild the terminal event of a finished execution from its record
fn terminal_event(execution_id: &str, status: ExecutionStatus, record: Option<ExecutionRecord>) -> WorkflowEvent {
    let execution_id = execution_id.to_string();
    match (status, record) {
        (ExecutionStatus::Cancelled, _) => WorkflowEvent::Cancelled { execution_id },
        (ExecutionStatus::Error, record) => {
            let error = record
                .and_then(|r| {
                    r.steps
                        .iter()
                        .rev()
                        .find(|s| s.entry.status == LogStatus::Error)
                        .map(|s| s.entry.message.clone())
                })
                .unwrap_or_else(|| "Execution error".to_string());
            WorkflowEvent::Error { execution_id, error }
        }
        (_, Some(record)) => WorkflowEvent::Complete { execution_id, record },
        (status, None) => {
            let mut record = ExecutionRecord::start(execution_id.clone(), "");
            record.finish(status);
            WorkflowEvent::Complete { execution_id, record }
        }
    }
}

/// Convert to named events, ending after the terminal one
fn to_sse(events: impl Stream<Item = WorkflowEvent> + Send + 'static) -> LogStream {
    events
        .filter_map(|event| {
            future::ready(match SseEvent::from_event(&event) {
                Ok(sse) => Some(sse),
                Err(e) => {
                    log::warn!("Dropping unserializable {} event: {}", event.event_name(), e);
                    None
                }
            })
        })
        .scan(false, |done, sse| {
            if *done {
                return future::ready(None);
            }
            *done = sse.is_terminal();
            future::ready(Some(sse))
        })
        .boxed()
}

/// [`EventSink`] handed to the executor for one run
pub struct RecordingEventSink {
    hub: Arc<EventHub>,
}

impl RecordingEventSink {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }
}

impl EventSink for RecordingEventSink {
    fn send(&self, event: WorkflowEvent) -> std::result::Result<(), EventError> {
        self.hub.publish(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::{LogEntry, NodeType, PromptRequest, WorkflowNode};

    fn log_event(id: &str, message: &str) -> WorkflowEvent {
        let node = WorkflowNode::new("n1", NodeType::Variable);
        WorkflowEvent::log(id, LogEntry::new(&node, LogStatus::Success, message))
    }

    fn setup() -> (Arc<ExecutionStore>, Arc<EventHub>, RecordingEventSink) {
        let store = Arc::new(ExecutionStore::new());
        store.create_execution("e1", "wf");
        let hub = Arc::new(EventHub::new(store.clone()));
        let sink = RecordingEventSink::new(hub.clone());
        (store, hub, sink)
    }

    #[test]
    fn test_wire_framing() {
        let sse = SseEvent {
            event: "log",
            data: "a\nb".into(),
        };
        assert_eq!(sse.to_wire(), "event: log\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn test_event_payloads() {
        let status = SseEvent::from_event(&WorkflowEvent::status("e1", ExecutionStatus::WaitingPrompt)).unwrap();
        assert_eq!(status.event, "status");
        assert_eq!(status.data, r#"{"status":"waiting-prompt"}"#);

        let error = SseEvent::from_event(&WorkflowEvent::Error {
            execution_id: "e1".into(),
            error: "boom".into(),
        })
        .unwrap();
        assert!(error.is_terminal());
        assert_eq!(error.data, r#"{"error":"boom"}"#);

        let log = SseEvent::from_event(&log_event("e1", "Set x")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&log.data).unwrap();
        assert_eq!(value["nodeId"], "n1");
        assert_eq!(value["status"], "success");
    }

    #[tokio::test]
    async fn test_live_subscriber_sees_backlog_then_live_events() {
        let (store, hub, sink) = setup();
        sink.send(log_event("e1", "first")).unwrap();
        assert_eq!(store.logs_since("e1", 0).unwrap().len(), 1);

        let stream = hub.subscribe("e1", 0).unwrap();
        assert_eq!(hub.subscriber_count("e1"), 1);
        sink.send(log_event("e1", "second")).unwrap();
        sink.send(WorkflowEvent::Cancelled {
            execution_id: "e1".into(),
        })
        .unwrap();
        sink.send(log_event("e1", "after end")).unwrap();

        let events: Vec<SseEvent> = stream.collect().await;
        let names: Vec<&str> = events.iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["log", "log", "cancelled"]);
        assert!(events[1].data.contains("second"));
        assert_eq!(hub.subscriber_count("e1"), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_finish_replays_and_ends() {
        let (store, hub, sink) = setup();
        sink.send(log_event("e1", "one")).unwrap();
        sink.send(log_event("e1", "two")).unwrap();
        let mut record = ExecutionRecord::start("e1", "wf");
        record.finish(ExecutionStatus::Completed);
        store.mark_terminal("e1", record);

        let events: Vec<SseEvent> = hub.subscribe("e1", 1).unwrap().collect().await;
        let names: Vec<&str> = events.iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["log", "complete"]);
        assert!(events[0].data.contains("two"));
    }

    #[tokio::test]
    async fn test_reconnect_while_waiting_repeats_prompt() {
        let (store, hub, _sink) = setup();
        let _answer = store.request_prompt("e1", PromptRequest::value("Name?", None));

        let mut stream = hub.subscribe("e1", 0).unwrap();
        assert_eq!(stream.next().await.map(|e| e.event), Some("status"));
        let prompt = stream.next().await.unwrap();
        assert_eq!(prompt.event, "prompt-request");
        assert!(prompt.data.contains("Name?"));
    }

    #[test]
    fn test_unknown_execution() {
        let (_store, hub, _sink) = setup();
        assert!(matches!(hub.subscribe("nope", 0), Err(ServiceError::ExecutionNotFound(_))));
    }
}
