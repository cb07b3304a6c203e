mod bootstrap;
mod console;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use opsbot_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use opsbot_mcp::HealthStatus;

#[derive(Debug, Parser)]
#[command(
    name = "opsbot-server",
    about = "Chat-driven operations assistant console",
    after_help = "Examples:\n  opsbot-server --check-connections\n  opsbot-server --config config/opsbot.toml --log-level debug"
)]
struct Cli {
    #[arg(long, help = "Path to a TOML config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override the configured log level")]
    log_level: Option<String>,
    #[arg(long, help = "Probe configured backends and print their status before starting")]
    check_connections: bool,
}

fn init_logging(config: &AppConfig) {
    use opsbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load config and initialize logging before any other work.
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        overrides: ConfigOverrides { log_level: cli.log_level.clone(), ..ConfigOverrides::default() },
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    if cli.check_connections {
        print_backend_health(&app).await;
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "opsbot server started"
    );

    console::run(&app).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "opsbot server stopping"
    );

    Ok(())
}

async fn print_backend_health(app: &bootstrap::Application) {
    println!("backend connectivity:");
    for (backend, health) in app.client.test_connections().await {
        let marker = match health.status {
            HealthStatus::Healthy => "ok",
            HealthStatus::Error => "error",
            HealthStatus::NotConfigured => "off",
        };
        println!("  {backend} [{marker}] {}", health.message);
    }
}
