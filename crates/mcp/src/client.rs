//! The multi-endpoint RPC client: endpoint resolution, retry with linear
//! backoff, error classification, batch calls, and health probing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use opsbot_core::config::RpcConfig;

use crate::error::McpError;
use crate::protocol::{ResourceDescriptor, RpcMethod, RpcRequest, ToolDescriptor};
use crate::registry::EndpointRegistry;
use crate::transport::{ReqwestTransport, RpcTransport, TransportFailure};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(1_000) }
    }
}

impl RetryPolicy {
    /// Linear backoff: `base_delay * attempt_number`, attempt numbers
    /// starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub server: String,
    pub tool: String,
    pub arguments: Value,
}

/// One entry of a `call_many` batch. Failures are captured per entry; a
/// failing call never aborts the rest of the batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub server: String,
    pub tool: String,
    pub result: Result<Value, McpError>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Error,
    NotConfigured,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendHealth {
    pub status: HealthStatus,
    pub message: String,
    pub tools: Vec<String>,
}

pub struct McpClient<T = ReqwestTransport> {
    transport: T,
    registry: EndpointRegistry,
    policy: RetryPolicy,
    next_request_id: AtomicU64,
}

impl McpClient<ReqwestTransport> {
    pub fn new(registry: EndpointRegistry, config: &RpcConfig) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(config.timeout())?;
        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay(),
        };
        Ok(Self::with_transport(transport, registry, policy))
    }
}

impl<T> McpClient<T>
where
    T: RpcTransport,
{
    pub fn with_transport(transport: T, registry: EndpointRegistry, policy: RetryPolicy) -> Self {
        Self { transport, registry, policy, next_request_id: AtomicU64::new(1) }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Preferred backend for a coarse operation category; see
    /// `EndpointRegistry::detect_best_server`.
    pub fn detect_best_server(&self, category: &str) -> Result<String, McpError> {
        self.registry.detect_best_server(category).map(str::to_owned)
    }

    /// Invoke a named tool on a backend, returning the raw `result`
    /// payload.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        debug!(backend = server, tool, "issuing tools/call");
        self.request(server, RpcMethod::ToolsCall, json!({"name": tool, "arguments": arguments}))
            .await
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        let result = self.request(server, RpcMethod::ToolsList, json!({})).await?;
        decode_listing(server, result, "tools")
    }

    pub async fn list_resources(&self, server: &str) -> Result<Vec<ResourceDescriptor>, McpError> {
        let result = self.request(server, RpcMethod::ResourcesList, json!({})).await?;
        decode_listing(server, result, "resources")
    }

    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<Value, McpError> {
        self.request(server, RpcMethod::ResourcesRead, json!({"uri": uri})).await
    }

    /// Execute a batch of tool calls sequentially, in input order. Each
    /// entry's failure is captured independently; the batch never
    /// short-circuits.
    pub async fn call_many(&self, calls: Vec<ToolCall>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.call_tool(&call.server, &call.tool, call.arguments).await;
            outcomes.push(BatchOutcome { server: call.server, tool: call.tool, result });
        }
        outcomes
    }

    /// Probe every configured backend with a lightweight `tools/list` and
    /// report per-backend health. Known-but-unconfigured backends are
    /// reported without any network attempt, and one backend's failure
    /// never prevents probing the others.
    pub async fn test_connections(&self) -> BTreeMap<String, BackendHealth> {
        let mut results = BTreeMap::new();

        for (backend, configured) in self.registry.server_statuses() {
            if !configured {
                results.insert(
                    backend.to_owned(),
                    BackendHealth {
                        status: HealthStatus::NotConfigured,
                        message: "endpoint is not configured".to_owned(),
                        tools: Vec::new(),
                    },
                );
            }
        }

        let configured: Vec<String> =
            self.registry.configured_backends().map(str::to_owned).collect();
        for backend in configured {
            let health = match self.list_tools(&backend).await {
                Ok(tools) => BackendHealth {
                    status: HealthStatus::Healthy,
                    message: format!("connected; {} tools available", tools.len()),
                    tools: tools.into_iter().map(|tool| tool.name).collect(),
                },
                Err(error) => BackendHealth {
                    status: HealthStatus::Error,
                    message: error.to_string(),
                    tools: Vec::new(),
                },
            };
            results.insert(backend, health);
        }

        results
    }

    async fn request(
        &self,
        server: &str,
        method: RpcMethod,
        params: Value,
    ) -> Result<Value, McpError> {
        let endpoint = self
            .registry
            .endpoint(server)
            .ok_or_else(|| McpError::NotConfigured { server: server.to_owned() })?
            .to_owned();

        // The id identifies the logical call; retries of the same call
        // reuse it.
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);

        let mut attempt = 1u32;
        loop {
            match self.transport.post(&endpoint, &request).await {
                Ok(response) => {
                    if let Some(error) = response.error {
                        return Err(McpError::Application {
                            code: error.code,
                            message: error.message,
                        });
                    }
                    return response.result.ok_or_else(|| McpError::Other {
                        endpoint,
                        detail: "response carried neither result nor error".to_owned(),
                    });
                }
                Err(failure) => {
                    if failure.is_retryable() && attempt < self.policy.max_attempts {
                        let delay = self.policy.backoff(attempt);
                        warn!(
                            backend = server,
                            %method,
                            request_id = id,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure,
                            "rpc attempt failed; retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    warn!(
                        backend = server,
                        %method,
                        request_id = id,
                        attempt,
                        error = %failure,
                        "rpc call failed"
                    );
                    return Err(map_failure(failure, endpoint));
                }
            }
        }
    }
}

fn decode_listing<D>(server: &str, result: Value, field: &str) -> Result<Vec<D>, McpError>
where
    D: serde::de::DeserializeOwned,
{
    let entries = match result.get(field) {
        Some(entries) => entries.clone(),
        None => return Ok(Vec::new()),
    };
    serde_json::from_value(entries).map_err(|error| McpError::Other {
        endpoint: server.to_owned(),
        detail: format!("malformed `{field}` listing: {error}"),
    })
}

fn map_failure(failure: TransportFailure, endpoint: String) -> McpError {
    match failure {
        TransportFailure::ConnectionRefused => McpError::ConnectionRefused { endpoint },
        TransportFailure::Timeout => McpError::Timeout { endpoint },
        TransportFailure::NameResolution => McpError::NameResolution { endpoint },
        // Some gateways report request timeouts as a 408 status.
        TransportFailure::Status(408) => McpError::Timeout { endpoint },
        TransportFailure::Status(404) => McpError::NotFound { endpoint },
        TransportFailure::Status(429) => McpError::RateLimited { endpoint },
        TransportFailure::Status(status) if (500..600).contains(&status) => {
            McpError::ServerStatus { status, endpoint }
        }
        TransportFailure::Status(status) => McpError::ClientStatus { status, endpoint },
        TransportFailure::Other(detail) => McpError::Other { endpoint, detail },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use super::{McpClient, RetryPolicy, ToolCall};
    use crate::error::McpError;
    use crate::protocol::{RpcRequest, RpcResponse};
    use crate::registry::EndpointRegistry;
    use crate::transport::{RpcTransport, TransportFailure};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        replies: VecDeque<Result<RpcResponse, TransportFailure>>,
        calls: Vec<RecordedCall>,
    }

    struct RecordedCall {
        endpoint: String,
        request: RpcRequest,
        at: Instant,
    }

    impl ScriptedTransport {
        fn with_replies(replies: Vec<Result<RpcResponse, TransportFailure>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState { replies: replies.into(), calls: Vec::new() }),
            }
        }

        async fn call_count(&self) -> usize {
            self.state.lock().await.calls.len()
        }

        async fn recorded(&self) -> Vec<(String, u64, Instant)> {
            self.state
                .lock()
                .await
                .calls
                .iter()
                .map(|call| (call.endpoint.clone(), call.request.id, call.at))
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn post(
            &self,
            endpoint: &str,
            request: &RpcRequest,
        ) -> Result<RpcResponse, TransportFailure> {
            let mut state = self.state.lock().await;
            state.calls.push(RecordedCall {
                endpoint: endpoint.to_owned(),
                request: request.clone(),
                at: Instant::now(),
            });
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok(RpcResponse::success(json!({}), request.id)))
        }
    }

    fn registry() -> EndpointRegistry {
        EndpointRegistry::from([
            ("deploy-service", "http://deploy:7071/rpc"),
            ("local-devops", "http://localhost:3000/rpc"),
        ])
    }

    fn client_with(
        replies: Vec<Result<RpcResponse, TransportFailure>>,
        policy: RetryPolicy,
    ) -> McpClient<ScriptedTransport> {
        McpClient::with_transport(ScriptedTransport::with_replies(replies), registry(), policy)
    }

    fn no_delay_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay: Duration::ZERO }
    }

    #[tokio::test]
    async fn unconfigured_backend_fails_without_network_attempt() {
        let client = client_with(vec![], RetryPolicy::default());

        let error = client
            .call_tool("work-tracker", "create_work_item", json!({}))
            .await
            .expect_err("must fail");

        assert!(matches!(error, McpError::NotConfigured { ref server } if server == "work-tracker"));
        assert_eq!(client.transport.call_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_refused_is_retried_with_linearly_increasing_delay() {
        let client = client_with(
            vec![
                Err(TransportFailure::ConnectionRefused),
                Err(TransportFailure::ConnectionRefused),
                Err(TransportFailure::ConnectionRefused),
            ],
            RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1_000) },
        );

        let error =
            client.call_tool("deploy-service", "deploy_to_azure", json!({})).await.expect_err("must fail");

        assert!(matches!(
            error,
            McpError::ConnectionRefused { ref endpoint } if endpoint == "http://deploy:7071/rpc"
        ));

        let recorded = client.transport.recorded().await;
        assert_eq!(recorded.len(), 3, "exactly max_attempts attempts");
        assert_eq!(recorded[1].2 - recorded[0].2, Duration::from_millis(1_000));
        assert_eq!(recorded[2].2 - recorded[1].2, Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn not_found_is_never_retried() {
        let client = client_with(vec![Err(TransportFailure::Status(404))], no_delay_policy(3));

        let error =
            client.call_tool("deploy-service", "deploy_to_azure", json!({})).await.expect_err("must fail");

        assert!(matches!(error, McpError::NotFound { .. }));
        assert_eq!(client.transport.call_count().await, 1);
    }

    #[tokio::test]
    async fn application_error_is_surfaced_without_retry() {
        let client = client_with(
            vec![Ok(RpcResponse::failure(-32000, "tool exploded", 1))],
            no_delay_policy(3),
        );

        let error =
            client.call_tool("deploy-service", "deploy_to_azure", json!({})).await.expect_err("must fail");

        assert!(matches!(
            error,
            McpError::Application { code: -32000, ref message } if message == "tool exploded"
        ));
        assert_eq!(client.transport.call_count().await, 1);
    }

    #[tokio::test]
    async fn server_error_retries_then_surfaces_status_with_endpoint() {
        let client = client_with(
            vec![Err(TransportFailure::Status(503)), Err(TransportFailure::Status(503))],
            no_delay_policy(2),
        );

        let error =
            client.call_tool("deploy-service", "deploy_to_azure", json!({})).await.expect_err("must fail");

        assert!(matches!(
            error,
            McpError::ServerStatus { status: 503, ref endpoint }
                if endpoint == "http://deploy:7071/rpc"
        ));
        assert_eq!(client.transport.call_count().await, 2);
    }

    #[tokio::test]
    async fn request_ids_increase_strictly_across_calls() {
        let client = client_with(
            vec![
                Ok(RpcResponse::success(json!({"ok": 1}), 1)),
                Ok(RpcResponse::success(json!({"ok": 2}), 2)),
            ],
            no_delay_policy(1),
        );

        client.call_tool("deploy-service", "a", json!({})).await.expect("first call");
        client.call_tool("local-devops", "b", json!({})).await.expect("second call");

        let recorded = client.transport.recorded().await;
        assert_eq!(recorded[0].1, 1);
        assert_eq!(recorded[1].1, 2);
    }

    #[tokio::test]
    async fn call_many_keeps_input_order_and_isolates_failures() {
        let client = client_with(
            vec![
                Err(TransportFailure::Status(404)),
                Ok(RpcResponse::success(json!({"content": [{"type": "text", "text": "ok"}]}), 2)),
            ],
            no_delay_policy(1),
        );

        let outcomes = client
            .call_many(vec![
                ToolCall {
                    server: "deploy-service".to_owned(),
                    tool: "deploy_to_azure".to_owned(),
                    arguments: json!({}),
                },
                ToolCall {
                    server: "local-devops".to_owned(),
                    tool: "run_command".to_owned(),
                    arguments: json!({"command": "ls"}),
                },
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].server, "deploy-service");
        assert!(!outcomes[0].succeeded());
        assert_eq!(outcomes[1].server, "local-devops");
        assert!(outcomes[1].succeeded());
    }

    #[tokio::test]
    async fn test_connections_probes_each_backend_independently() {
        use super::HealthStatus;

        // Configured backends probe in registry order: deploy-service
        // first, then local-devops.
        let client = client_with(
            vec![
                Ok(RpcResponse::success(
                    json!({"tools": [{"name": "deploy_to_azure"}, {"name": "check_pipeline_status"}]}),
                    1,
                )),
                Err(TransportFailure::ConnectionRefused),
            ],
            no_delay_policy(1),
        );

        let results = client.test_connections().await;

        let deploy = &results["deploy-service"];
        assert_eq!(deploy.status, HealthStatus::Healthy);
        assert_eq!(deploy.tools, vec!["deploy_to_azure", "check_pipeline_status"]);

        let local = &results["local-devops"];
        assert_eq!(local.status, HealthStatus::Error);
        assert!(local.message.contains("http://localhost:3000/rpc"));

        assert_eq!(results["work-tracker"].status, HealthStatus::NotConfigured);
        assert_eq!(results["desktop-commander"].status, HealthStatus::NotConfigured);
    }

    #[test]
    fn backoff_grows_linearly_with_attempt_number() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
    }
}
