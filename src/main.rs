//! SPA Server - A static asset server for single page applications
//!
//! Binary entry point: CLI, configuration, logging and the HTTP listener.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::{signal, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spa_server::{
    cli::Cli,
    config::default_source,
    create_router, AppState, ServerConfig,
};

/// Main entry point for the SPA server.
///
/// # Startup Sequence
/// 1. Parse flags and read the config file over the defaults
/// 2. Initialize tracing at the effective level
/// 3. Validate settings, root directory and index file
/// 4. Spawn the request id generator and build the router
/// 5. Serve until SIGINT/SIGTERM, draining for at most the shutdown timeout
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut source = default_source();
    let config_found = cli.config.is_file();
    if config_found {
        source
            .read_file(&cli.config)
            .with_context(|| format!("loading config {}", cli.config.display()))?;
    }

    // RUST_LOG wins over config and flags
    let configured = source.get_string("logging.level");
    let level = cli.log_level(&configured);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !config_found {
        warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
    }

    let config = ServerConfig::from_source(&source).context("invalid configuration")?;
    config.check_paths().context("invalid configuration")?;
    info!(
        "Configuration loaded: root={}, index={}, base={:?}, cache={}, template={}",
        config.root.display(),
        config.index,
        config.base,
        config.cache.enable,
        config.template.enable
    );

    let address = config.address();
    let shutdown_timeout = config.shutdown_timeout;
    let state = AppState::from_config(config);
    let cache = state.cache.clone();
    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("Server listening on http://{}", address);

    let (stopping_tx, stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(true);
        })
        .into_future();

    tokio::select! {
        result = server => result.context("server error")?,
        _ = drain_deadline(stopping_rx, shutdown_timeout) => {
            warn!("Shutdown timeout of {:?} elapsed, dropping open connections", shutdown_timeout);
        }
    }

    let stats = cache.stats().await;
    info!(
        "Cache stats: {} entries, {} bytes, {} hits, {} misses, hit rate {:.2}",
        stats.total_entries,
        stats.total_bytes,
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );
    info!("Server shutdown complete");
    Ok(())
}

/// Completes `timeout` after shutdown began. Never completes for a zero
/// timeout, which waits for every connection to drain.
async fn drain_deadline(mut stopping: watch::Receiver<bool>, timeout: Duration) {
    let stopped = stopping.wait_for(|stopping| *stopping).await.is_ok();
    if !stopped || timeout.is_zero() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
