//! chantrack-tracker - channel and team tracker service
//!
//! Serves the channel and team dashboards: starts enrichment runs against the
//! backend API, streams progress over SSE and fronts team administration.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chantrack_common::config::{ConfigResolver, LoggingConfig};
use chantrack_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use chantrack_tracker::AppState;

/// Command-line arguments for chantrack-tracker
#[derive(Parser, Debug)]
#[command(name = "chantrack-tracker")]
#[command(about = "Channel and team tracker service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Installed before config resolution; without RUST_LOG the filter switches
    // to `logging.level` afterwards.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| EnvFilter::new(LoggingConfig::default().level)),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConfigResolver::new(args.config.clone())
        .resolve()
        .context("Failed to load configuration")?;

    if !from_env {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(level) => {
                if let Err(e) = filter_handle.reload(level) {
                    warn!("Failed to apply configured log level: {}", e);
                }
            }
            Err(e) => warn!("Invalid logging.level '{}': {}", config.logging.level, e),
        }
    }

    let port = args.port.unwrap_or(config.port);
    info!("Starting chantrack-tracker v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", config.backend.effective_base_url());
    if config.backend.force_production && config.backend.production_url.is_none() {
        warn!("force_production is set but no production_url is configured");
    }

    let event_bus = EventBus::new(256);
    let state = AppState::new(config, event_bus).context("Failed to initialize application state")?;
    let app = chantrack_tracker::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
