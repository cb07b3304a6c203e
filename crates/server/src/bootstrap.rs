use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use opsbot_agent::{
    OperationReport, OperationTracker, Orchestrator, ReportSink, SimulatedCheckPolicy,
};
use opsbot_core::config::{AppConfig, ConfigError};
use opsbot_mcp::{EndpointRegistry, McpClient};

pub struct Application {
    pub config: AppConfig,
    pub client: Arc<McpClient>,
    pub orchestrator: Orchestrator<Arc<McpClient>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Wire registry, client, tracker, and orchestrator from an
/// already-loaded config.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let registry = EndpointRegistry::new(config.endpoints.clone());
    let client = Arc::new(
        McpClient::new(registry, &config.rpc).map_err(BootstrapError::HttpClient)?,
    );
    info!(
        event_name = "system.bootstrap.client_ready",
        correlation_id = "bootstrap",
        backends = config.endpoints.len(),
        "rpc client constructed"
    );

    let tracker = Arc::new(OperationTracker::new(
        &config.tracker,
        Arc::new(SimulatedCheckPolicy::from_config(&config.tracker)),
        Arc::new(ConsoleReportSink),
    ));

    let orchestrator =
        Orchestrator::new(Arc::clone(&client), tracker, &config.orchestrator);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "application bootstrap complete"
    );

    Ok(Application { config, client, orchestrator })
}

/// Tracker notifications land on the console and in the structured log.
struct ConsoleReportSink;

impl ReportSink for ConsoleReportSink {
    fn report(&self, report: OperationReport) {
        info!(
            event_name = "tracker.report",
            correlation_id = %report.subject.correlation_id,
            operation_id = %report.operation_id,
            status = %report.status,
            check_count = report.check_count,
            terminal = report.terminal,
            "operation progress"
        );

        let subject = match (&report.subject.version, &report.subject.environment) {
            (Some(version), Some(environment)) => {
                format!("{} v{version} -> {environment}", report.subject.action)
            }
            _ => report.subject.action.clone(),
        };
        if report.terminal {
            println!(
                "[{}] {} finished: {} after {} checks",
                report.operation_id, subject, report.status, report.check_count
            );
        } else {
            println!(
                "[{}] {} still {} (check {}, {}s elapsed)",
                report.operation_id,
                subject,
                report.status,
                report.check_count,
                report.elapsed.as_secs()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use opsbot_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::bootstrap_with_config;

    #[tokio::test]
    async fn bootstrap_wires_a_client_over_configured_endpoints() {
        let mut overrides = ConfigOverrides::default();
        overrides
            .endpoints
            .insert("deploy-service".to_owned(), "http://localhost:7071/rpc".to_owned());

        let config = AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() })
            .expect("config should load from defaults");

        let app = bootstrap_with_config(config).expect("bootstrap should succeed");
        assert_eq!(
            app.client.registry().endpoint("deploy-service"),
            Some("http://localhost:7071/rpc")
        );
        assert_eq!(app.config.orchestrator.confidence_floor, 0.6);
    }
}
