//! CLI binary for the Sitewright content factory.
//!
//! With a client id argument, runs the pipeline once for that client; with no
//! argument, polls the clients root continuously. Unsafe identifiers are
//! rejected before any filesystem access.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use sitewright_llm::ModelGateway;
use sitewright_pipeline::{Orchestrator, PipelineConfig};
use sitewright_types::ClientId;

#[derive(Parser)]
#[command(
    name = "sitewright",
    version,
    about = "Self-correcting website content factory"
)]
struct Cli {
    /// Client id for a single-shot run; omit to poll all pending clients.
    client_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env();

    if std::env::var("SITEWRIGHT_WEBHOOK_URL").is_err() {
        tracing::debug!("No webhook configured, notifications go to the log only");
    }

    // At least one provider key is required; everything else degrades.
    let gateway = Arc::new(ModelGateway::from_env()?);
    let orchestrator = Orchestrator::new(config.clone(), gateway);

    match cli.client_id {
        Some(raw) => {
            let id = ClientId::parse(&raw)?;
            let report = orchestrator.process_client(&id).await?;
            tracing::info!(
                client = %id,
                status = %report.status,
                attempts = report.attempts,
                "Single-shot run finished"
            );
            Ok(())
        }
        None => {
            tracing::info!(
                interval_secs = config.poll_interval.as_secs(),
                "Polling for pending clients"
            );
            loop {
                let processed = orchestrator.run_pass().await;
                tracing::info!(
                    processed,
                    sleep_secs = config.poll_interval.as_secs(),
                    "Pass complete, sleeping"
                );
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_shot_invocation() {
        let cli = Cli::parse_from(["sitewright", "acme-co"]);
        assert_eq!(cli.client_id.as_deref(), Some("acme-co"));
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_polling_invocation() {
        let cli = Cli::parse_from(["sitewright", "--verbose"]);
        assert!(cli.client_id.is_none());
        assert!(cli.verbose);
    }
}
