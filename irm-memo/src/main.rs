//! irm-memo - IR memo generation service
//!
//! Streams analyst briefing memos section by section over SSE and lets the
//! client regenerate single sections afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use irm_common::config::{load_or_default, resolve_config_path};
use irm_memo::config::MemoConfig;
use irm_memo::store::InMemoryReportStore;
use irm_memo::tasks::Toolkit;
use irm_memo::AppState;

/// Command-line arguments for irm-memo
#[derive(Parser, Debug)]
#[command(name = "irm-memo")]
#[command(about = "IR memo generation service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), "IRM_CONFIG", "irm-memo.toml");
    let toml = load_or_default(config_path.as_deref()).context("Failed to load configuration")?;
    let config = MemoConfig::resolve(&toml);

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "irm_memo={0},irm_common={0},tower_http=info",
        config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting irm-memo v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.data_dir.display());
    if config.anthropic_api_key.is_none() {
        warn!("No Anthropic API key configured; drafting will fail");
    }
    if config.fmp_api_key.is_none() {
        warn!("No FMP API key configured; quotes and FMP transcripts unavailable");
    }

    let toolkit = Toolkit::from_config(&config).context("Failed to build leaf clients")?;
    let port = config.port;
    let state = AppState::new(config, toolkit, Arc::new(InMemoryReportStore::new()));
    let app = irm_memo::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
