//! doubleplay-scanner - double play tracker
//!
//! Scans a radio station's playlist history in both directions, detects
//! songs aired twice in a row and keeps the findings in a JSON dataset.
//! A small HTTP surface reports health, scan state and progress.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use doubleplay_common::config::{load_or_default, CONFIG_PATH_ENV, DATA_FOLDER_ENV};
use doubleplay_common::events::{DoublePlayEvent, EventBus};
use doubleplay_scanner::config::{ConfigOverrides, ScannerConfig};
use doubleplay_scanner::scan::ScanQueue;
use doubleplay_scanner::services::{
    BackupSink, HttpPlaylistClient, JsonFileStore, MirrorBackup, NoBackup,
};
use doubleplay_scanner::AppState;

/// Command-line arguments for doubleplay-scanner
#[derive(Parser, Debug)]
#[command(name = "doubleplay-scanner")]
#[command(about = "Detects back-to-back repeat plays in a station playlist")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Folder holding the dataset
    #[arg(short, long, env = DATA_FOLDER_ENV)]
    data_folder: Option<PathBuf>,

    /// Only scan history, exit once the historical floor is reached
    #[arg(long)]
    backward_only: bool,

    /// Historical floor (RFC 3339), default one year back
    #[arg(long, env = "DOUBLEPLAY_STOP_DATE")]
    stop_date: Option<String>,

    /// Health surface port, 0 disables it
    #[arg(short, long, env = "DOUBLEPLAY_PORT")]
    port: Option<u16>,

    /// Upstream playlist API root
    #[arg(long, env = "DOUBLEPLAY_API_BASE_URL")]
    api_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_or_default(args.config.as_deref())?;
    let config = ScannerConfig::resolve(
        &toml_config,
        ConfigOverrides {
            data_folder: args.data_folder,
            api_base_url: args.api_base_url,
            history_stop_date: args.stop_date,
            health_port: args.port,
            backward_only: args.backward_only,
        },
    )
    .context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting doubleplay-scanner");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Dataset: {}", config.dataset_path.display());
    info!("Upstream: {}", config.client.base_url);

    let client = Arc::new(
        HttpPlaylistClient::new(config.client.clone())
            .context("Failed to build upstream client")?,
    );
    let store = Arc::new(JsonFileStore::new(config.dataset_path.clone()));
    let backup: Arc<dyn BackupSink> = match &config.backup_folder {
        Some(folder) => {
            info!("Backup folder: {}", folder.display());
            Arc::new(MirrorBackup::new(folder.clone()))
        }
        None => Arc::new(NoBackup),
    };

    let event_bus = EventBus::new(100);
    let mut events = event_bus.subscribe();

    let queue = ScanQueue::new(client, store, backup, event_bus, config.scan.clone());
    queue
        .start()
        .await
        .context("Failed to start scan queue")?;

    let server_shutdown = CancellationToken::new();
    let server = if config.health_port != 0 {
        let app = doubleplay_scanner::build_router(AppState::new(Arc::clone(&queue)));
        let addr = SocketAddr::from(([127, 0, 0, 1], config.health_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;
        info!("Health check: http://{}/health", addr);

        let token = server_shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    } else {
        None
    };

    if config.scan.backward_only {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = backward_complete(&mut events) => {
                info!("Historical scan finished, exiting");
            }
        }
    } else {
        shutdown_signal().await;
    }

    queue.stop().await;
    server_shutdown.cancel();
    if let Some(server) = server {
        server
            .await
            .context("Server task panicked")?
            .context("Server error")?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves once the queue reports that backward scanning is done
async fn backward_complete(events: &mut tokio::sync::broadcast::Receiver<DoublePlayEvent>) {
    loop {
        match events.recv().await {
            Ok(DoublePlayEvent::BackwardScanComplete { .. }) => return,
            Ok(event) => tracing::trace!(event = event.name(), "Scanner event"),
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Event receiver lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
