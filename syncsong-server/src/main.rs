//! Sync-Song authority (syncsong-server) - Main entry point
//!
//! Serves room lookups, catalog search and the room WebSocket channel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use syncsong_common::config::load_config;
use syncsong_server::api::{self, AppContext};
use syncsong_server::catalog::{Catalog, HttpCatalog, NullCatalog};
use syncsong_server::config::{Overrides, Settings};
use syncsong_server::registry::{RoomRegistry, SWEEP_PERIOD, VACANT_ROOM_GRACE};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for syncsong-server
#[derive(Parser, Debug)]
#[command(name = "syncsong-server")]
#[command(about = "Sync-Song room authority")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SYNCSONG_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "SYNCSONG_BIND_ADDR")]
    bind: Option<String>,

    /// Upstream catalog search endpoint
    #[arg(long, env = "SYNCSONG_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Seconds between SYNC_STATE rebroadcasts (0 disables)
    #[arg(long, env = "SYNCSONG_RESYNC_INTERVAL_SECS")]
    resync_interval: Option<u64>,

    /// Path to config file
    #[arg(short, long, env = "SYNCSONG_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let file = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(
        &file,
        Overrides {
            bind_addr: args.bind,
            port: args.port,
            catalog_url: args.catalog_url,
            resync_interval_secs: args.resync_interval,
        },
    )
    .context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("syncsong_server={},tower_http=debug", settings.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Sync-Song authority v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let catalog: Arc<dyn Catalog> = match &settings.catalog_url {
        Some(url) => {
            info!("Catalog search via {}", url);
            Arc::new(HttpCatalog::new(url.clone()).context("Failed to set up catalog client")?)
        }
        None => {
            warn!("No catalog configured, search returns no results");
            Arc::new(NullCatalog)
        }
    };

    let registry = Arc::new(RoomRegistry::new());
    let resync = settings.resync_interval.map(|period| {
        info!("Periodic resync every {:?}", period);
        registry.spawn_resync(period)
    });

    let sweeper = registry.spawn_sweeper(SWEEP_PERIOD, VACANT_ROOM_GRACE);

    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.listen))?;

    api::run(listener, AppContext::new(registry, catalog), shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(resync) = resync {
        resync.abort();
    }
    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
