//! Intent-to-tool orchestration.
//!
//! `handle` is the single entry point for a free-text command: classify,
//! gate on confidence, validate required parameters, route to a backend
//! tool, and hand long-running operations to the tracker. The RPC
//! dependency sits behind the `ToolInvoker` trait so tests run on recorded
//! fakes instead of a live client.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use opsbot_core::config::OrchestratorConfig;
use opsbot_core::intent::{
    available_intents, classify, examples_for, required_parameters, suggestions_for, IntentKind,
    IntentMatch,
};
use opsbot_mcp::{McpClient, McpError, RpcTransport};

use crate::tracker::{OperationSubject, OperationTracker};

/// The slice of the RPC client the orchestrator needs.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, McpError>;

    fn detect_best_server(&self, category: &str) -> Result<String, McpError>;
}

#[async_trait]
impl<T> ToolInvoker for McpClient<T>
where
    T: RpcTransport,
{
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        McpClient::call_tool(self, server, tool, arguments).await
    }

    fn detect_best_server(&self, category: &str) -> Result<String, McpError> {
        McpClient::detect_best_server(self, category)
    }
}

#[async_trait]
impl<I> ToolInvoker for Arc<I>
where
    I: ToolInvoker,
{
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        self.as_ref().call_tool(server, tool, arguments).await
    }

    fn detect_best_server(&self, category: &str) -> Result<String, McpError> {
        self.as_ref().detect_best_server(category)
    }
}

/// What `handle` resolved a message to. Failures carry operator-facing
/// text with sensitive terms already scrubbed.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The tool call finished; `message` is the backend's text result.
    Completed { message: String },
    /// A long-running operation was accepted and is now tracked.
    Started { operation_id: Uuid, message: String },
    /// The intent was clear but required fields were not found in the text.
    MissingParameters { intent: IntentKind, missing: Vec<&'static str> },
    /// The intent asked for something the routed backend has no tool for.
    Invalid { message: String },
    /// Classification confidence was below the floor.
    Unknown { suggestions: Vec<&'static str> },
    Help { text: String },
    Failed { message: String },
}

pub struct Orchestrator<I> {
    invoker: I,
    tracker: Arc<OperationTracker>,
    confidence_floor: f64,
}

impl<I> Orchestrator<I>
where
    I: ToolInvoker,
{
    pub fn new(invoker: I, tracker: Arc<OperationTracker>, config: &OrchestratorConfig) -> Self {
        Self { invoker, tracker, confidence_floor: config.confidence_floor }
    }

    pub fn tracker(&self) -> &Arc<OperationTracker> {
        &self.tracker
    }

    pub async fn handle(&self, text: &str) -> Outcome {
        let correlation_id = Uuid::new_v4().to_string();
        let matched = classify(text);

        info!(
            event_name = "orchestrator.intent.classified",
            correlation_id = %correlation_id,
            intent = %matched.kind,
            confidence = matched.confidence,
            rule = matched.matched_rule.unwrap_or("none"),
            "classified incoming message"
        );

        if matched.kind == IntentKind::Unknown {
            return Outcome::Unknown { suggestions: suggestions_for(text) };
        }

        // A recognized-but-incomplete intent is answered with the missing
        // fields even when confidence is low; the floor only gates intents
        // we could otherwise act on.
        let missing: Vec<&'static str> = required_parameters(matched.kind)
            .iter()
            .copied()
            .filter(|name| matched.parameter(name).is_none())
            .collect();
        if !missing.is_empty() {
            info!(
                event_name = "orchestrator.intent.incomplete",
                correlation_id = %correlation_id,
                intent = %matched.kind,
                missing = missing.join(","),
                "required parameters absent, no call issued"
            );
            return Outcome::MissingParameters { intent: matched.kind, missing };
        }

        if matched.confidence < self.confidence_floor {
            return Outcome::Unknown { suggestions: suggestions_for(text) };
        }

        match matched.kind {
            IntentKind::Help => Outcome::Help { text: render_help() },
            IntentKind::Deploy => self.dispatch_deploy(&matched, &correlation_id).await,
            IntentKind::PipelineStatus => {
                let mut arguments = Map::new();
                insert(&mut arguments, "pipelineId", matched.parameter("pipelineId"));
                insert(&mut arguments, "project", matched.parameter("project"));
                self.dispatch("pipeline_status", "check_pipeline_status", arguments, &correlation_id)
                    .await
            }
            IntentKind::CreateWorkItem => {
                let mut arguments = Map::new();
                insert(&mut arguments, "title", matched.parameter("title"));
                insert(&mut arguments, "type", matched.parameter("type"));
                insert(&mut arguments, "assignee", matched.parameter("assignee"));
                insert(&mut arguments, "description", matched.parameter("description"));
                self.dispatch("create_work_item", "create_work_item", arguments, &correlation_id)
                    .await
            }
            IntentKind::ResourceCheck => {
                let mut arguments = Map::new();
                insert(&mut arguments, "resourceType", matched.parameter("resourceType"));
                insert(&mut arguments, "resourceGroup", matched.parameter("resourceGroup"));
                self.dispatch("resource_check", "get_resource_usage", arguments, &correlation_id)
                    .await
            }
            IntentKind::SystemCommand => {
                let command = matched.parameter("command").unwrap_or_default();
                let mut arguments = Map::new();
                insert(&mut arguments, "command", Some(command));
                let (category, tool) = if looks_like_powershell(command) {
                    ("powershell", "run_powershell")
                } else {
                    ("shell", "run_command")
                };
                self.dispatch(category, tool, arguments, &correlation_id).await
            }
            IntentKind::GitOperations => {
                let operation = matched.parameter("operation").unwrap_or_default();
                let tool = match operation {
                    "status" => "git_status",
                    "commit" => "git_commit",
                    other => {
                        return Outcome::Invalid {
                            message: format!(
                                "git operation `{other}` is not supported; try `git status` or `commit zmiany \"message\"`"
                            ),
                        };
                    }
                };
                let mut arguments = Map::new();
                insert(&mut arguments, "path", matched.parameter("path"));
                insert(&mut arguments, "message", matched.parameter("message"));
                self.dispatch("git_operations", tool, arguments, &correlation_id).await
            }
            IntentKind::Unknown => Outcome::Unknown { suggestions: suggestions_for(text) },
        }
    }

    async fn dispatch_deploy(&self, matched: &IntentMatch, correlation_id: &str) -> Outcome {
        let mut arguments = Map::new();
        insert(&mut arguments, "version", matched.parameter("version"));
        insert(&mut arguments, "environment", matched.parameter("environment"));
        insert(&mut arguments, "service", matched.parameter("service"));

        let result = match self
            .call("deploy", "deploy_to_azure", arguments, correlation_id)
            .await
        {
            Ok(result) => result,
            Err(outcome) => return outcome,
        };

        let operation_id = self.tracker.register(OperationSubject {
            action: "deploy".to_owned(),
            version: matched.parameter("version").map(str::to_owned),
            environment: matched.parameter("environment").map(str::to_owned),
            correlation_id: correlation_id.to_owned(),
        });

        Outcome::Started { operation_id, message: summarize_result(&result) }
    }

    async fn dispatch(
        &self,
        category: &str,
        tool: &str,
        arguments: Map<String, Value>,
        correlation_id: &str,
    ) -> Outcome {
        match self.call(category, tool, arguments, correlation_id).await {
            Ok(result) => Outcome::Completed { message: summarize_result(&result) },
            Err(outcome) => outcome,
        }
    }

    async fn call(
        &self,
        category: &str,
        tool: &str,
        arguments: Map<String, Value>,
        correlation_id: &str,
    ) -> Result<Value, Outcome> {
        let server = self
            .invoker
            .detect_best_server(category)
            .map_err(|error| Outcome::Failed { message: redact(&error.to_string()) })?;

        info!(
            event_name = "orchestrator.tool.dispatched",
            correlation_id = %correlation_id,
            backend = %server,
            tool,
            "dispatching tool call"
        );

        self.invoker
            .call_tool(&server, tool, Value::Object(arguments))
            .await
            .map_err(|error| {
                warn!(
                    event_name = "orchestrator.tool.failed",
                    correlation_id = %correlation_id,
                    backend = %server,
                    tool,
                    error = %error,
                    "tool call failed"
                );
                Outcome::Failed { message: redact(&error.to_string()) }
            })
    }
}

fn insert(arguments: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        arguments.insert(key.to_owned(), Value::String(value.to_owned()));
    }
}

/// Flatten a `tools/call` result into operator-facing text. Backends
/// answer with `{ content: [{ type: "text", text }] }`; anything else is
/// shown as raw JSON.
fn summarize_result(result: &Value) -> String {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if text.is_empty() {
        result.to_string()
    } else {
        text
    }
}

/// Scrub credential-shaped terms (and any value glued to them) from text
/// shown to the operator.
fn redact(text: &str) -> String {
    static SENSITIVE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:password|token|key|secret|credential)s?\b(?:\s*[:=]\s*\S+)?")
            .expect("static redaction pattern must compile")
    });
    SENSITIVE.replace_all(text, "[redacted]").into_owned()
}

fn looks_like_powershell(command: &str) -> bool {
    let lowered = command.to_lowercase();
    lowered.contains("powershell")
        || lowered.contains("get-")
        || lowered.contains("set-")
        || lowered.contains("start-service")
        || lowered.contains("stop-service")
}

fn render_help() -> String {
    let mut text = String::from("Available commands:\n");
    for kind in available_intents() {
        if *kind == IntentKind::Help {
            continue;
        }
        if let Some(example) = examples_for(*kind).first() {
            text.push_str(&format!("- {kind}: e.g. `{example}`\n"));
        }
    }
    text.push_str("- help: show this message\n");
    text
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use opsbot_core::config::{OrchestratorConfig, TrackerConfig};
    use opsbot_mcp::{EndpointRegistry, McpError};

    use super::{redact, Orchestrator, Outcome, ToolInvoker};
    use crate::tracker::{
        OperationReport, OperationStatus, OperationTracker, ReportSink, SimulatedCheckPolicy,
    };

    struct NullSink;

    impl ReportSink for NullSink {
        fn report(&self, _report: OperationReport) {}
    }

    struct FakeInvoker {
        registry: EndpointRegistry,
        replies: Mutex<VecDeque<Result<Value, McpError>>>,
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeInvoker {
        fn with_replies(replies: Vec<Result<Value, McpError>>) -> Self {
            Self {
                registry: EndpointRegistry::from([
                    ("deploy-service", "http://deploy:7071/rpc"),
                    ("work-tracker", "http://tracker:7072/rpc"),
                    ("local-devops", "http://localhost:3000/rpc"),
                    ("desktop-commander", "http://localhost:3001/rpc"),
                ]),
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for FakeInvoker {
        async fn call_tool(
            &self,
            server: &str,
            tool: &str,
            arguments: Value,
        ) -> Result<Value, McpError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((server.to_owned(), tool.to_owned(), arguments));
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"content": [{"type": "text", "text": "ok"}]})))
        }

        fn detect_best_server(&self, category: &str) -> Result<String, McpError> {
            self.registry.detect_best_server(category).map(str::to_owned)
        }
    }

    fn orchestrator_with(
        replies: Vec<Result<Value, McpError>>,
        confidence_floor: f64,
    ) -> Orchestrator<FakeInvoker> {
        let tracker = Arc::new(OperationTracker::new(
            &TrackerConfig { check_interval_secs: 30, timeout_secs: 600, completion_checks: 3 },
            Arc::new(SimulatedCheckPolicy::new(3, 1.0)),
            Arc::new(NullSink),
        ));
        Orchestrator::new(
            FakeInvoker::with_replies(replies),
            tracker,
            &OrchestratorConfig { confidence_floor },
        )
    }

    #[tokio::test]
    async fn low_confidence_text_yields_suggestions_without_any_call() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("czy mamy dzisiaj spotkanie o kawie").await;

        let Outcome::Unknown { suggestions } = outcome else {
            panic!("expected Unknown, got {outcome:?}");
        };
        assert_eq!(suggestions.len(), 3);
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn complete_partial_match_below_floor_is_treated_as_unknown() {
        // Keyword fallback scores 0.5 with both fields filled; the floor
        // still refuses to act on it.
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("deploy v1.0.0 staging now").await;

        assert!(matches!(outcome, Outcome::Unknown { .. }), "got {outcome:?}");
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_environment_short_circuits_before_any_call() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("deploy v1.0.0").await;

        let Outcome::MissingParameters { intent, missing } = outcome else {
            panic!("expected MissingParameters, got {outcome:?}");
        };
        assert_eq!(intent, opsbot_core::intent::IntentKind::Deploy);
        assert_eq!(missing, vec!["environment"]);
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_version_is_named_even_below_the_floor() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("wdróż na staging").await;

        let Outcome::MissingParameters { missing, .. } = outcome else {
            panic!("expected MissingParameters, got {outcome:?}");
        };
        assert_eq!(missing, vec!["version"]);
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_pipeline_id_is_named_in_the_outcome() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("status pipeline").await;

        let Outcome::MissingParameters { missing, .. } = outcome else {
            panic!("expected MissingParameters, got {outcome:?}");
        };
        assert_eq!(missing, vec!["pipelineId"]);
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_deploy_starts_a_tracked_operation() {
        let orchestrator = orchestrator_with(
            vec![Ok(json!({"content": [{"type": "text", "text": "Deployment accepted"}]}))],
            0.6,
        );

        let outcome = orchestrator.handle("deploy v1.2.3 to production").await;

        let Outcome::Started { operation_id, message } = outcome else {
            panic!("expected Started, got {outcome:?}");
        };
        assert_eq!(message, "Deployment accepted");
        assert_eq!(orchestrator.tracker().status(operation_id), Some(OperationStatus::Pending));

        let calls = orchestrator.invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "deploy-service");
        assert_eq!(calls[0].1, "deploy_to_azure");
        assert_eq!(calls[0].2["version"], "1.2.3");
        assert_eq!(calls[0].2["environment"], "production");
    }

    #[tokio::test]
    async fn pipeline_status_routes_to_deploy_service() {
        let orchestrator = orchestrator_with(
            vec![Ok(json!({"content": [{"type": "text", "text": "Pipeline 123: running"}]}))],
            0.6,
        );

        let outcome = orchestrator.handle("status pipeline #123").await;

        assert_eq!(outcome, Outcome::Completed { message: "Pipeline 123: running".to_owned() });
        let calls = orchestrator.invoker.calls();
        assert_eq!(calls[0].0, "deploy-service");
        assert_eq!(calls[0].1, "check_pipeline_status");
        assert_eq!(calls[0].2["pipelineId"], "123");
    }

    #[tokio::test]
    async fn work_item_routes_to_work_tracker_with_extracted_fields() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        orchestrator.handle("dodaj bug: Button not working @anna").await;

        let calls = orchestrator.invoker.calls();
        assert_eq!(calls[0].0, "work-tracker");
        assert_eq!(calls[0].1, "create_work_item");
        assert_eq!(calls[0].2["title"], "Button not working");
        assert_eq!(calls[0].2["type"], "Bug");
        assert_eq!(calls[0].2["assignee"], "anna@company.com");
    }

    #[tokio::test]
    async fn plain_command_goes_to_local_devops() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        orchestrator.handle("uruchom docker ps").await;

        let calls = orchestrator.invoker.calls();
        assert_eq!(calls[0].0, "local-devops");
        assert_eq!(calls[0].1, "run_command");
        assert_eq!(calls[0].2["command"], "docker ps");
    }

    #[tokio::test]
    async fn powershell_shaped_command_goes_to_desktop_commander() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        orchestrator.handle("run Get-Service spooler").await;

        let calls = orchestrator.invoker.calls();
        assert_eq!(calls[0].0, "desktop-commander");
        assert_eq!(calls[0].1, "run_powershell");
        assert_eq!(calls[0].2["command"], "Get-Service spooler");
    }

    #[tokio::test]
    async fn unsupported_git_operation_is_rejected_without_a_call() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("git push origin").await;

        let Outcome::Invalid { message } = outcome else {
            panic!("expected Invalid, got {outcome:?}");
        };
        assert!(message.contains("push"));
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn git_status_routes_to_local_devops() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        orchestrator.handle("git status").await;

        let calls = orchestrator.invoker.calls();
        assert_eq!(calls[0].0, "local-devops");
        assert_eq!(calls[0].1, "git_status");
    }

    #[tokio::test]
    async fn help_is_answered_locally() {
        let orchestrator = orchestrator_with(vec![], 0.6);

        let outcome = orchestrator.handle("help").await;

        let Outcome::Help { text } = outcome else {
            panic!("expected Help, got {outcome:?}");
        };
        assert!(text.contains("deploy v1.2.3 do staging"));
        assert!(orchestrator.invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn rpc_failure_surfaces_with_sensitive_terms_scrubbed() {
        let orchestrator = orchestrator_with(
            vec![Err(McpError::Application {
                code: -32000,
                message: "rejected: bad token: abc123".to_owned(),
            })],
            0.6,
        );

        let outcome = orchestrator.handle("status pipeline #99").await;

        let Outcome::Failed { message } = outcome else {
            panic!("expected Failed, got {outcome:?}");
        };
        assert!(message.contains("[redacted]"), "message: {message}");
        assert!(!message.contains("token"), "message: {message}");
        assert!(!message.contains("abc123"), "message: {message}");
    }

    #[test]
    fn redaction_covers_assignment_shapes_and_plurals() {
        assert_eq!(redact("invalid password=hunter2 given"), "invalid [redacted] given");
        assert_eq!(redact("expired secrets detected"), "expired [redacted] detected");
        assert_eq!(redact("no sensitive content"), "no sensitive content");
    }
}
