//! Soroban transaction tracker - submit once, poll until resolved
//!
//! Runs either as an HTTP service that tracks one submission at a time, or
//! as a one-shot command that submits a single unsigned envelope.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use soroban_tx_tracker::api::{self, AppState, OutcomeResponse};
use soroban_tx_tracker::config::Settings;
use soroban_tx_tracker::metrics::MetricsServer;
use soroban_tx_tracker::{
    CommandSigner, NetworkClient, RpcClient, SubmissionTracker, UnsignedEnvelope,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API until interrupted
    Serve,
    /// Submit one unsigned envelope and wait for its outcome
    Submit {
        /// File holding the base64 XDR envelope, or `-` for stdin
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging();

    info!("Starting Soroban tx tracker v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        "Using RPC {} ({} attempts every {} ms)",
        settings.rpc.url, settings.polling.max_attempts, settings.polling.interval_ms
    );

    let network: Arc<dyn NetworkClient> = Arc::new(RpcClient::from_config(&settings.rpc)?);
    let signer = Arc::new(CommandSigner::from_config(
        &settings.signer,
        &settings.rpc.network_passphrase,
    ));
    let polling = settings.polling.to_polling_config();

    match cli.command {
        Command::Serve => {
            let tracker = SubmissionTracker::new(signer, network.clone(), polling)
                .on_success(|payload| match payload {
                    Some(p) => info!("Submission succeeded with result {}", p.result_xdr),
                    None => info!("Submission succeeded"),
                })
                .on_error(|e| error!("Submission failed: {}", e));

            serve(settings, AppState::new(Arc::new(tracker), network)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Submit { input } => {
            let xdr = read_envelope(&input)?;
            let tracker = SubmissionTracker::new(signer, network, polling);

            let outcome = tracker.submit(&UnsignedEnvelope::new(xdr)).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&OutcomeResponse::from(&outcome))?
            );

            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn serve(settings: Settings, state: AppState) -> Result<()> {
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Soroban tx tracker stopped");
    Ok(())
}

fn read_envelope(input: &str) -> Result<String> {
    if input == "-" {
        let mut xdr = String::new();
        std::io::stdin()
            .read_to_string(&mut xdr)
            .context("Failed to read envelope from stdin")?;
        return Ok(xdr);
    }

    std::fs::read_to_string(input).with_context(|| format!("Failed to read envelope: {}", input))
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,soroban_tx_tracker=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
