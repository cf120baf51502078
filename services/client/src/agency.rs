//! Agency submission flow
//!
//! One connection for the whole run: submit every batch, require SUCCESS for
//! each, send the empty finish batch, wait for this agency's winners, then
//! acknowledge and close.

use crate::config::ClientConfig;
use crate::reader::BetReader;
use anyhow::{bail, Context, Result};
use backoff::ExponentialBackoff;
use shared::protocol::{self, Answer};
use shared::Batch;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub struct Agency {
    config: ClientConfig,
}

impl Agency {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<()> {
        let path = self.config.bets_path();
        let mut reader = BetReader::open(&path, self.config.agency_id)
            .with_context(|| format!("failed to open bets file {}", path.display()))?;

        let mut stream = self.connect().await?;

        let mut submitted = 0usize;
        loop {
            let bets = reader.next_batch(self.config.batch_size)?;
            if bets.is_empty() {
                break;
            }
            let count = bets.len();

            protocol::write_batch(&mut stream, &Batch::new(self.config.agency_id, bets))
                .await
                .context("failed to submit batch")?;
            match protocol::read_answer(&mut stream).await? {
                Answer::Success => {
                    submitted += count;
                    debug!(bets = count, "batch accepted");
                }
                Answer::Fail => bail!("server rejected a batch of {count} bets"),
            }
        }

        info!(
            agency = self.config.agency_id,
            bets = submitted,
            "all bets submitted, signaling completion"
        );
        protocol::write_batch(&mut stream, &Batch::finished(self.config.agency_id))
            .await
            .context("failed to signal completion")?;

        let winners = protocol::read_winners(&mut stream)
            .await
            .context("server closed before sending draw results")?;
        info!(
            agency = self.config.agency_id,
            winners = winners.len(),
            "draw results received"
        );
        for document in &winners {
            debug!(document = *document, "winning document");
        }

        protocol::write_finish_ack(&mut stream).await?;
        Ok(())
    }

    /// Connects with exponential backoff; the server may start after us.
    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.server_address.clone();
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        let stream = backoff::future::retry(backoff, || {
            let addr = addr.clone();
            async move {
                TcpStream::connect(&addr).await.map_err(|e| {
                    warn!(error = %e, "connect failed, retrying");
                    backoff::Error::transient(e)
                })
            }
        })
        .await
        .with_context(|| format!("failed to connect to {}", self.config.server_address))?;

        info!(server = %self.config.server_address, "connected");
        Ok(stream)
    }
}
