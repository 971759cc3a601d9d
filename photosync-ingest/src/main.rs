//! photosync-ingest - upload local photo and video folders to a photo server
//!
//! Reads the configured folders, groups related files (bursts, RAW+JPEG
//! pairs, live photos), compares them with what the server already holds,
//! and uploads, upgrades, tags, stacks and files them into albums.

use anyhow::{Context, Result};
use clap::Parser;
use photosync_common::EventRecorder;
use photosync_ingest::config::{Cli, IngestConfig};
use photosync_ingest::services::{
    DryRunClient, FilenameClock, FolderSource, HttpServerClient, NameAnalyser, RetryingClient,
    ServerClient, SupportedMedia, UploadCoordinator,
};
use photosync_ingest::IngestError;
use photosync_common::ExponentialBackoff;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = IngestConfig::load(cli).context("Invalid configuration")?;

    init_tracing(&config)?;

    info!("Starting photosync-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(server = %config.server, dry_run = config.dry_run, "Server");

    // The run token stops the upload; the shutdown token also interrupts
    // the flushes of the finishing phase.
    let run_token = CancellationToken::new();
    let shutdown_token = CancellationToken::new();
    tokio::spawn(interrupt_handler(run_token.clone(), shutdown_token.clone()));

    let http = HttpServerClient::new(&config.server, &config.api_key, config.timeout)
        .context("Failed to build the server client")?;
    http.ping()
        .await
        .with_context(|| format!("Server {} is not reachable", config.server))?;
    info!(endpoint = %http.endpoint(), "Server reachable");

    let retrying = Arc::new(RetryingClient::new(
        Arc::new(http),
        ExponentialBackoff::default(),
        shutdown_token.clone(),
    ));
    let client: Arc<dyn ServerClient> = if config.dry_run {
        Arc::new(DryRunClient::new(retrying))
    } else {
        retrying
    };

    let recorder = Arc::new(EventRecorder::default());
    let analyser = NameAnalyser::new(FilenameClock::new(config.time_zone), SupportedMedia::default());
    let source = Arc::new(FolderSource::new(config.folder, analyser, recorder.clone()));
    let coordinator = Arc::new(UploadCoordinator::new(client, recorder.clone(), config.upload));

    let outcome = coordinator.run(run_token, source).await;

    match outcome {
        Err(IngestError::Cancelled) => {
            warn!("Run interrupted");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            Ok(ExitCode::FAILURE)
        }
        Ok(()) if recorder.has_errors() => {
            warn!(errors = recorder.error_count(), "Run finished with errors");
            Ok(ExitCode::FAILURE)
        }
        Ok(()) => {
            info!("Run finished");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Install the subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(config: &IngestConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Can't open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// First Ctrl+C stops the run, the second one abandons the finishing phase
async fn interrupt_handler(run: CancellationToken, shutdown: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Can't listen for Ctrl+C");
        return;
    }
    info!("Received Ctrl+C, finishing the groups in flight");
    run.cancel();

    if signal::ctrl_c().await.is_ok() {
        warn!("Received Ctrl+C again, abandoning pending server calls");
        shutdown.cancel();
    }
}
