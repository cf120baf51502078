use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::barrier::DrawBarrier;
use server::config::ServerConfig;
use server::listener;
use server::store::BetStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "server=info,shared=info".into());

    if use_json {
        // JSON structured logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Human-readable logging for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "server",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting lottery server"
    );

    // Load configuration
    let config = ServerConfig::load()?;
    tracing::info!(
        port = config.port,
        agency_count = config.agency_count,
        accept_timeout_seconds = config.accept_timeout_seconds,
        store_path = %config.store_path,
        "Configuration loaded"
    );

    let store = Arc::new(
        BetStore::open(&config.store_path)
            .await
            .with_context(|| format!("failed to open bet store at {}", config.store_path))?,
    );
    let barrier = Arc::new(DrawBarrier::new(config.agency_count));
    let shutdown = CancellationToken::new();

    let server = listener::Server::bind(config, store, barrier, shutdown.clone()).await?;

    // Convert termination signals into a cancellation request; the listener
    // then stops intake, denies waiting agencies and drains sessions.
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
