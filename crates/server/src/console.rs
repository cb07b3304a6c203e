//! Line-driven console transport.
//!
//! Stands in for a chat transport: each stdin line is handed to the
//! orchestrator and the outcome is printed. Tracker reports arrive on the
//! same console through the bootstrap sink.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use opsbot_agent::Outcome;

use crate::bootstrap::Application;

pub async fn run(app: &Application) -> Result<()> {
    println!("opsbot console - type a command, `help` for examples, ctrl-c to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(
                    event_name = "system.console.interrupted",
                    correlation_id = "shutdown",
                    "interrupt received"
                );
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // EOF: piped input ran out.
                    return Ok(());
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let outcome = app.orchestrator.handle(trimmed).await;
                println!("{}", render_outcome(&outcome));
            }
        }
    }
}

pub fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed { message } => message.clone(),
        Outcome::Started { operation_id, message } => {
            format!("{message}\ntracking as operation {operation_id}")
        }
        Outcome::MissingParameters { intent, missing } => {
            format!("`{intent}` needs: {}", missing.join(", "))
        }
        Outcome::Invalid { message } => message.clone(),
        Outcome::Unknown { suggestions } => {
            let mut text = String::from("I did not understand that. Try:");
            for suggestion in suggestions {
                text.push_str("\n  - ");
                text.push_str(suggestion);
            }
            text
        }
        Outcome::Help { text } => text.clone(),
        Outcome::Failed { message } => format!("request failed: {message}"),
    }
}
