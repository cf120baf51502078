use anyhow::Context;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// This agency's id (1-based, assigned by the deployment)
    pub agency_id: u8,
    /// host:port of the lottery server
    pub server_address: String,
    /// Maximum bets per submitted batch
    pub batch_size: usize,
    /// Directory holding the per-agency bets file `agency-{id}.csv`
    pub data_dir: String,
}

impl ClientConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(ClientConfig {
            agency_id: env::var("AGENCY_ID")
                .context("AGENCY_ID must be set")?
                .parse()
                .context("AGENCY_ID must be a small unsigned integer")?,
            server_address: env::var("SERVER_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1:9999".to_string()),
            batch_size: env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        })
    }

    /// Path of this agency's bets file
    pub fn bets_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(format!("agency-{}.csv", self.agency_id))
    }
}
