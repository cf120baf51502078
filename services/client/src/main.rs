use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod agency;
mod config;
mod reader;

use agency::Agency;
use config::ClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging with JSON formatting (configurable via env)
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "client=info,shared=info".into());

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
        service = "client",
        version = env!("CARGO_PKG_VERSION"),
        "Starting agency client"
    );

    let config = ClientConfig::load()?;
    tracing::info!(
        agency_id = config.agency_id,
        server = %config.server_address,
        batch_size = config.batch_size,
        "Configuration loaded"
    );

    Agency::new(config).run().await?;

    tracing::info!("Agency run complete");
    Ok(())
}
