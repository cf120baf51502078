//! Per-connection session
//!
//! One session runs per accepted socket, concurrently with all others. It
//! decodes batches, appends them to the store and acknowledges them; the
//! empty finish batch moves the session to the barrier, and an admit token
//! triggers the agency's private draw report.
//!
//! Failures are contained per session: a malformed batch from one agency
//! never affects another agency's session, the store, or the barrier. The
//! one deliberate exception is that a finish registration already made
//! still counts toward the barrier threshold even if the session fails
//! afterwards.

use crate::barrier::{DrawBarrier, Release};
use crate::store::{BetStore, StoreError};
use shared::protocol::{self, Answer, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    session_id: Uuid,
    store: Arc<BetStore>,
    barrier: Arc<DrawBarrier>,
    shutdown: CancellationToken,
    max_batch_bytes: usize,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        store: Arc<BetStore>,
        barrier: Arc<DrawBarrier>,
        shutdown: CancellationToken,
        max_batch_bytes: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            session_id: Uuid::new_v4(),
            store,
            barrier,
            shutdown,
            max_batch_bytes,
        }
    }

    /// Runs the session to completion, logging its outcome. Spawned
    /// fire-and-forget by the listener.
    pub async fn run(mut self) {
        debug!(session_id = %self.session_id, peer = %self.peer, "session started");
        match self.serve().await {
            Ok(()) => {
                debug!(session_id = %self.session_id, peer = %self.peer, "session finished")
            }
            Err(SessionError::Protocol(ProtocolError::ConnectionClosed)) => {
                // Abrupt close by the peer ends the session without reply.
                debug!(session_id = %self.session_id, peer = %self.peer, "peer closed connection")
            }
            Err(e) => {
                warn!(session_id = %self.session_id, peer = %self.peer, error = %e, "session failed")
            }
        }
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(session_id = %self.session_id, "session cancelled at batch boundary");
                    return Ok(());
                }
                decoded = protocol::read_batch(&mut self.stream, self.max_batch_bytes) => {
                    match decoded {
                        Ok(batch) => batch,
                        Err(ProtocolError::ConnectionClosed) => {
                            return Err(ProtocolError::ConnectionClosed.into());
                        }
                        Err(e) => {
                            // The reply channel may still be viable; answer
                            // FAIL best-effort, then end the session.
                            let _ = protocol::write_answer(&mut self.stream, Answer::Fail).await;
                            return Err(e.into());
                        }
                    }
                }
            };

            if batch.is_finished() {
                info!(
                    session_id = %self.session_id,
                    agency = batch.agency,
                    "agency finished submitting"
                );
                return self.finish(batch.agency).await;
            }

            match self.store.append(&batch.bets).await {
                Ok(()) => {
                    debug!(
                        session_id = %self.session_id,
                        agency = batch.agency,
                        bets = batch.bets.len(),
                        "batch stored"
                    );
                    protocol::write_answer(&mut self.stream, Answer::Success).await?;
                }
                Err(e) => {
                    error!(
                        session_id = %self.session_id,
                        agency = batch.agency,
                        error = %e,
                        "failed to store batch"
                    );
                    let _ = protocol::write_answer(&mut self.stream, Answer::Fail).await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Registers with the barrier and waits for the draw moment.
    async fn finish(&mut self, agency: u8) -> Result<(), SessionError> {
        let release = self.barrier.register_finished(agency).await;

        // A closed channel means the barrier was torn down; treat as deny.
        match release.await.unwrap_or(Release::Deny) {
            Release::Admit => self.report_winners(agency).await,
            Release::Deny => {
                info!(
                    session_id = %self.session_id,
                    agency,
                    "draw denied, closing without results"
                );
                Ok(())
            }
        }
    }

    /// Admitted path: reload the full store, filter this agency's winners,
    /// send them and wait for the client's acknowledgment.
    async fn report_winners(&mut self, agency: u8) -> Result<(), SessionError> {
        let bets = self.store.load_all().await?;
        let winners: Vec<u32> = bets
            .iter()
            .filter(|bet| bet.agency == agency && bet.is_winner())
            .map(|bet| bet.document)
            .collect();

        info!(
            session_id = %self.session_id,
            agency,
            total_bets = bets.len(),
            winners = winners.len(),
            "draw computed"
        );

        protocol::write_winners(&mut self.stream, &winners).await?;
        protocol::read_finish_ack(&mut self.stream).await?;
        debug!(session_id = %self.session_id, agency, "finish acknowledged");
        Ok(())
    }
}
