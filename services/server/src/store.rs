//! Append-only persistence for submitted bets
//!
//! Records are JSON Lines, one bet per line, written through a single
//! mutex-guarded file handle so concurrent batch appends never interleave
//! byte-for-byte. Readers call `load_all` only once the draw barrier
//! guarantees that no further writes will occur for the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::Bet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode bet record: {0}")]
    Encode(serde_json::Error),

    #[error("corrupt store record at line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
}

/// On-disk record: the bet plus the time the server accepted it
#[derive(Debug, Serialize, Deserialize)]
struct StoredBet {
    received_at: DateTime<Utc>,
    #[serde(flatten)]
    bet: Bet,
}

pub struct BetStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl BetStore {
    /// Opens (creating if needed) the store file in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Durably appends a full batch of bets.
    ///
    /// The whole batch is serialized before the lock is taken, then written,
    /// flushed and synced in one critical section. Returns only after the
    /// data has reached the device.
    pub async fn append(&self, bets: &[Bet]) -> Result<(), StoreError> {
        let received_at = Utc::now();
        let mut buf = Vec::new();
        for bet in bets {
            let record = StoredBet {
                received_at,
                bet: bet.clone(),
            };
            serde_json::to_writer(&mut buf, &record).map_err(StoreError::Encode)?;
            buf.push(b'\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;
        file.sync_data().await?;
        debug!(bets = bets.len(), bytes = buf.len(), "batch appended to store");
        Ok(())
    }

    /// Returns every bet ever appended, in append order.
    ///
    /// Deliberately lock-free: callers only invoke this after the barrier
    /// has released, at which point writing has ceased for the run.
    pub async fn load_all(&self) -> Result<Vec<Bet>, StoreError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<StoredBet>(line)
                    .map(|record| record.bet)
                    .map_err(|source| StoreError::Corrupt {
                        line: idx + 1,
                        source,
                    })
            })
            .collect()
    }
}
