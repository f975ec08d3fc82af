//! Workflow executor
//!
//! Walks a workflow from its start node, one node at a time, following the
//! first matching outgoing edge after each node. Each node's log entry is
//! delivered before the next node starts, which gives observers a total
//! order over node events.
//!
//! Cancellation is checked at every node boundary and also raced against the
//! running handler, so a stop request takes effect without waiting for slow
//! I/O to finish.

use std::sync::Arc;

use crate::condition::evaluate_condition;
use crate::config::EngineConfig;
use crate::error::{NodeEngineError, Result};
use crate::events::WorkflowEvent;
use crate::registry::{HandlerOutcome, NodeRegistry};
use crate::service::ServiceContext;
use crate::types::{
    ExecutionContext, ExecutionRecord, ExecutionStatus, ExecutionStep, LogEntry, LogStatus,
    NodeId, Workflow, WorkflowNode,
};

/// Called synchronously with every log entry, in execution order
pub type LogCallback<'a> = &'a (dyn Fn(&LogEntry) + Send + Sync);

/// Final state of a run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub context: ExecutionContext,
    pub history_record: ExecutionRecord,
    pub error: Option<String>,
}

pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    /// Maximum number of node visits (for infinite loop protection)
    max_node_visits: u32,
}

enum Step {
    Next(Option<NodeId>),
    Stop(ExecutionStatus, Option<String>),
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            max_node_visits: EngineConfig::default().max_node_visits,
        }
    }

    pub fn from_config(registry: Arc<NodeRegistry>, config: &EngineConfig) -> Self {
        Self::new(registry).with_max_node_visits(config.max_node_visits)
    }

    pub fn with_max_node_visits(mut self, max_node_visits: u32) -> Self {
        self.max_node_visits = max_node_visits;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Run a workflow to a terminal state
    pub async fn execute(
        &self,
        workflow_id: &str,
        workflow: &Workflow,
        context: ExecutionContext,
        services: &ServiceContext,
    ) -> Result<ExecutionResult> {
        self.execute_with_callback(workflow_id, workflow, context, services, &|_| {})
            .await
    }

    /// Run a workflow, calling `on_log` for every log entry
    ///
    /// Validation problems with the workflow itself are returned as errors.
    /// Everything that happens once the run has started, including handler
    /// failures, ends up in the returned [`ExecutionResult`].
    pub async fn execute_with_callback(
        &self,
        workflow_id: &str,
        workflow: &Workflow,
        mut context: ExecutionContext,
        services: &ServiceContext,
        on_log: LogCallback<'_>,
    ) -> Result<ExecutionResult> {
        self.registry.validate(workflow)?;

        let execution_id = services.execution_id.as_str();
        let mut record = ExecutionRecord::start(execution_id, workflow_id);
        services.emit(WorkflowEvent::status(execution_id, ExecutionStatus::Running));
        log::info!(
            "Execution {} started for workflow '{}' at node '{}'",
            execution_id,
            workflow_id,
            workflow.start_node
        );

        let mut current = Some(workflow.start_node.clone());
        let mut visits: u32 = 0;
        let (status, error) = loop {
            if services.is_cancelled() {
                break (ExecutionStatus::Cancelled, None);
            }
            let Some(node_id) = current.take() else {
                break (ExecutionStatus::Completed, None);
            };
            let node = workflow.nodes.get(&node_id).ok_or_else(|| {
                NodeEngineError::InvalidWorkflow(format!("node '{}' does not exist", node_id))
            })?;

            if visits >= self.max_node_visits {
                let message = format!("Execution limit reached ({} nodes)", self.max_node_visits);
                self.log_error(&mut context, &mut record, services, on_log, node, &message);
                break (ExecutionStatus::Error, Some(message));
            }
            visits += 1;

            match self
                .run_node(workflow, node, &mut context, &mut record, services, on_log)
                .await
            {
                Step::Next(next) => current = next,
                Step::Stop(status, error) => break (status, error),
            }
        };

        record.finish(status);
        log::info!(
            "Execution {} finished with status {:?} after {} node(s)",
            execution_id,
            status,
            visits
        );
        services.emit(WorkflowEvent::status(execution_id, status));
        let terminal = match status {
            ExecutionStatus::Cancelled => WorkflowEvent::Cancelled {
                execution_id: execution_id.to_string(),
            },
            ExecutionStatus::Error => WorkflowEvent::Error {
                execution_id: execution_id.to_string(),
                error: error.clone().unwrap_or_default(),
            },
            _ => WorkflowEvent::Complete {
                execution_id: execution_id.to_string(),
                record: record.clone(),
            },
        };
        services.emit(terminal);

        Ok(ExecutionResult {
            status,
            context,
            history_record: record,
            error,
        })
    }

    async fn run_node(
        &self,
        workflow: &Workflow,
        node: &WorkflowNode,
        context: &mut ExecutionContext,
        record: &mut ExecutionRecord,
        services: &ServiceContext,
        on_log: LogCallback<'_>,
    ) -> Step {
        let Some(handler) = self.registry.get(node.node_type) else {
            let message = format!("No handler registered for '{}'", node.node_type);
            self.log_error(context, record, services, on_log, node, &message);
            return Step::Stop(ExecutionStatus::Error, Some(message));
        };

        log::debug!("Executing node '{}' ({})", node.id, node.node_type);
        let input = serde_json::to_value(&node.properties).ok();
        let result = services
            .run_cancellable(handler.execute(node, context, services))
            .await;

        match result {
            Ok(outcome) => {
                for (setting, store_id) in &outcome.discovered_rag_stores {
                    context
                        .discovered
                        .rag_stores
                        .insert(setting.clone(), store_id.clone());
                }
                let next = next_node(workflow, node, &outcome, context);
                let message = outcome
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} completed", node.node_type.label()));
                let mut entry = LogEntry::new(node, LogStatus::Success, message);
                if !outcome.mcp_apps.is_empty() {
                    entry.mcp_apps = Some(outcome.mcp_apps);
                }
                let step = ExecutionStep {
                    entry: entry.clone(),
                    input,
                    output: outcome.output,
                    error: None,
                };
                emit_log(context, record, services, on_log, entry, step);
                Step::Next(next)
            }
            Err(e) if e.is_cancelled() => {
                log::info!("Node '{}' interrupted by cancellation", node.id);
                let entry = LogEntry::new(node, LogStatus::Info, "Execution cancelled");
                let step = ExecutionStep {
                    entry: entry.clone(),
                    input,
                    output: None,
                    error: None,
                };
                emit_log(context, record, services, on_log, entry, step);
                Step::Stop(ExecutionStatus::Cancelled, None)
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!("Node '{}' failed: {}", node.id, message);
                self.log_error(context, record, services, on_log, node, &message);
                Step::Stop(ExecutionStatus::Error, Some(message))
            }
        }
    }

    fn log_error(
        &self,
        context: &mut ExecutionContext,
        record: &mut ExecutionRecord,
        services: &ServiceContext,
        on_log: LogCallback<'_>,
        node: &WorkflowNode,
        message: &str,
    ) {
        let entry = LogEntry::new(node, LogStatus::Error, message);
        let step = ExecutionStep {
            entry: entry.clone(),
            input: None,
            output: None,
            error: Some(message.to_string()),
        };
        emit_log(context, record, services, on_log, entry, step);
    }
}

fn emit_log(
    context: &mut ExecutionContext,
    record: &mut ExecutionRecord,
    services: &ServiceContext,
    on_log: LogCallback<'_>,
    entry: LogEntry,
    step: ExecutionStep,
) {
    on_log(&entry);
    services.emit(WorkflowEvent::log(&services.execution_id, entry.clone()));
    context.logs.push(entry);
    record.steps.push(step);
}

/// First outgoing edge that matches, in declaration order
///
/// Unconditional edges always match. `true`/`false` edges match the branch
/// a condition node took. Any other condition is evaluated against the
/// current variables.
fn next_node(
    workflow: &Workflow,
    node: &WorkflowNode,
    outcome: &HandlerOutcome,
    context: &ExecutionContext,
) -> Option<NodeId> {
    workflow
        .outgoing(&node.id)
        .find(|edge| {
            let Some(condition) = edge.condition.as_deref().map(str::trim) else {
                return true;
            };
            match (condition, outcome.branch) {
                ("", _) => true,
                ("true", Some(taken)) => taken,
                ("false", Some(taken)) => !taken,
                _ => evaluate_condition(condition, context),
            }
        })
        .map(|edge| edge.to.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::registry::NodeHandler;
    use crate::types::{Edge, NodeType};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Sets `name` to `value`
    struct SetVar;

    #[async_trait]
    impl NodeHandler for SetVar {
        fn node_type(&self) -> NodeType {
            NodeType::Variable
        }

        async fn execute(
            &self,
            node: &WorkflowNode,
            context: &mut ExecutionContext,
            _services: &ServiceContext,
        ) -> Result<HandlerOutcome> {
            let name = node.require("name")?.to_string();
            let value = crate::variables::replace_variables(node.property("value").unwrap_or(""), context);
            context.set(name, value);
            Ok(HandlerOutcome::done())
        }
    }

    struct Branch;

    #[async_trait]
    impl NodeHandler for Branch {
        fn node_type(&self) -> NodeType {
            NodeType::Condition
        }

        async fn execute(
            &self,
            node: &WorkflowNode,
            context: &mut ExecutionContext,
            _services: &ServiceContext,
        ) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::branch(evaluate_condition(
                node.require("condition")?,
                context,
            )))
        }
    }

    /// Never finishes on its own
    struct Hang;

    #[async_trait]
    impl NodeHandler for Hang {
        fn node_type(&self) -> NodeType {
            NodeType::Command
        }

        async fn execute(
            &self,
            _node: &WorkflowNode,
            _context: &mut ExecutionContext,
            _services: &ServiceContext,
        ) -> Result<HandlerOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(HandlerOutcome::done())
        }
    }

    fn executor() -> WorkflowExecutor {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(SetVar));
        registry.register(Arc::new(Branch));
        registry.register(Arc::new(Hang));
        WorkflowExecutor::new(Arc::new(registry))
    }

    fn var(id: &str, name: &str, value: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeType::Variable)
            .with_property("name", name)
            .with_property("value", value)
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let workflow = Workflow::from_parts(
            [var("a", "x", "1"), var("b", "y", "{{x}}2")],
            vec![Edge::new("a", "b")],
            "a",
        );
        let sink = Arc::new(VecEventSink::new());
        let services = ServiceContext::new("exec-1", "root").with_events(sink.clone());

        let result = executor()
            .execute("wf", &workflow, ExecutionContext::new(), &services)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.context.get("y"), Some("12"));
        assert_eq!(result.history_record.steps.len(), 2);
        assert!(result.history_record.end_time.is_some());
        assert_eq!(
            sink.names(),
            vec!["status", "log", "log", "status", "complete"]
        );
    }

    #[tokio::test]
    async fn test_cancel_after_last_node_is_cancelled() {
        let workflow = Workflow::from_parts([var("only", "x", "1")], vec![], "only");
        let services = ServiceContext::new("exec-2", "root");
        let cancel = services.cancel.clone();
        let on_log = move |entry: &LogEntry| {
            if entry.status == LogStatus::Success {
                cancel.cancel();
            }
        };

        let result = executor()
            .execute_with_callback("wf", &workflow, ExecutionContext::new(), &services, &on_log)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert_eq!(result.history_record.status, ExecutionStatus::Cancelled);
        assert_eq!(result.context.get("x"), Some("1"));
    }

    #[tokio::test]
    async fn test_handler_error_is_logged_on_node() {
        let workflow = Workflow::from_parts(
            [var("a", "x", "1"), WorkflowNode::new("b", NodeType::Variable)],
            vec![Edge::new("a", "b")],
            "a",
        );
        let services = ServiceContext::new("exec-3", "root");
        let result = executor()
            .execute("wf", &workflow, ExecutionContext::new(), &services)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        let last = result.context.logs.last().unwrap();
        assert_eq!(last.node_id, "b");
        assert_eq!(last.status, LogStatus::Error);
        assert!(last.message.contains("'name'"));
        assert_eq!(result.error.as_deref(), Some(last.message.as_str()));
    }

    #[tokio::test]
    async fn test_condition_branches_first_match_wins() {
        let workflow = Workflow::from_parts(
            [
                var("start", "n", "5"),
                WorkflowNode::new("check", NodeType::Condition).with_property("condition", "{{n}} > 3"),
                var("big", "size", "big"),
                var("small", "size", "small"),
                var("also", "size", "also"),
            ],
            vec![
                Edge::new("start", "check"),
                Edge::when("check", "small", "false"),
                Edge::when("check", "big", "true"),
                Edge::new("check", "also"),
            ],
            "start",
        );
        let services = ServiceContext::new("exec-4", "root");
        let result = executor()
            .execute("wf", &workflow, ExecutionContext::new(), &services)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.context.get("size"), Some("big"));
    }

    #[tokio::test]
    async fn test_cycle_hits_visit_limit() {
        let workflow = Workflow::from_parts(
            [var("a", "x", "1"), var("b", "x", "2")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
            "a",
        );
        let services = ServiceContext::new("exec-5", "root");
        let result = executor()
            .with_max_node_visits(10)
            .execute("wf", &workflow, ExecutionContext::new(), &services)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("Execution limit reached (10 nodes)"));
        assert_eq!(result.history_record.steps.len(), 11);
    }

    #[tokio::test]
    async fn test_loop_exits_on_condition_edge() {
        // counter edge loops until the variable condition stops matching
        let workflow = Workflow::from_parts(
            [var("a", "x", "{{x}}a"), var("done", "finished", "yes")],
            vec![Edge::when("a", "a", "{{x}} != aaa"), Edge::new("a", "done")],
            "a",
        );
        let services = ServiceContext::new("exec-6", "root");
        let mut context = ExecutionContext::new();
        context.set("x", "");
        let result = executor()
            .execute("wf", &workflow, context, &services)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.context.get("x"), Some("aaa"));
        assert_eq!(result.context.get("finished"), Some("yes"));
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_handler() {
        let workflow = Workflow::from_parts([WorkflowNode::new("slow", NodeType::Command)], vec![], "slow");
        let services = ServiceContext::new("exec-7", "root");
        let cancel = services.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            executor().execute("wf", &workflow, ExecutionContext::new(), &services),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_handler_rejected_before_run() {
        let workflow = Workflow::from_parts([WorkflowNode::new("m", NodeType::Mcp)], vec![], "m");
        let services = ServiceContext::new("exec-8", "root");
        let err = executor()
            .execute("wf", &workflow, ExecutionContext::new(), &services)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeEngineError::UnknownNodeType(_)));
    }
}
