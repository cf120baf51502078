use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// TCP port the listener binds on
    pub port: u16,
    /// Accept backlog depth passed to listen(2)
    pub listen_backlog: u32,
    /// Number of agencies that must signal completion before the draw fires
    pub agency_count: usize,
    /// Idle-accept timeout; no new connection within this window ends intake
    pub accept_timeout_seconds: u64,
    /// Maximum concurrently running sessions before intake stops
    pub max_sessions: usize,
    /// Byte budget for a single decoded batch
    pub max_batch_bytes: usize,
    /// Path of the append-only bet store
    pub store_path: String,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(ServerConfig {
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "9999".to_string())
                .parse()?,
            listen_backlog: env::var("LISTEN_BACKLOG")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            agency_count: env::var("AGENCY_COUNT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            accept_timeout_seconds: env::var("ACCEPT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            max_sessions: env::var("MAX_SESSIONS")
                .unwrap_or_else(|_| "32".to_string())
                .parse()?,
            max_batch_bytes: env::var("MAX_BATCH_BYTES")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()?,
            store_path: env::var("STORE_PATH").unwrap_or_else(|_| "bets.jsonl".to_string()),
        })
    }
}
