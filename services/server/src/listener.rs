//! Listener / dispatcher
//!
//! Owns the listening socket and the session task group. Connections are
//! accepted until a shutdown request, session-pool saturation, or an idle
//! accept timeout (a graceful end of intake); each accepted socket is
//! dispatched fire-and-forget into a `JoinSet` together with shared store
//! and barrier handles. On shutdown the listener stops accepting, injects
//! deny tokens for still-waiting agencies and drains outstanding sessions.

use crate::barrier::DrawBarrier;
use crate::config::ServerConfig;
use crate::session::Session;
use crate::store::BetStore;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    store: Arc<BetStore>,
    barrier: Arc<DrawBarrier>,
    shutdown: CancellationToken,
}

impl Server {
    pub async fn bind(
        config: ServerConfig,
        store: Arc<BetStore>,
        barrier: Arc<DrawBarrier>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

        let socket = TcpSocket::new_v4().context("failed to create listening socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket
            .listen(config.listen_backlog)
            .context("failed to listen")?;

        info!(
            addr = %listener.local_addr()?,
            backlog = config.listen_backlog,
            agency_count = config.agency_count,
            "server listening"
        );

        Ok(Self {
            listener,
            config,
            store,
            barrier,
            shutdown,
        })
    }

    /// Actual bound address; useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts and dispatches connections until intake ends, then drains
    /// every outstanding session.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            config,
            store,
            barrier,
            shutdown,
        } = self;

        let accept_idle = Duration::from_secs(config.accept_timeout_seconds);
        let mut sessions: JoinSet<()> = JoinSet::new();

        loop {
            // Reap finished sessions so the saturation check counts live
            // ones, not every connection ever accepted.
            while let Some(joined) = sessions.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "session task panicked");
                }
            }
            if sessions.len() >= config.max_sessions {
                warn!(active = sessions.len(), "session pool saturated, ending intake");
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, ending intake");
                    break;
                }
                accepted = timeout(accept_idle, listener.accept()) => match accepted {
                    Err(_) => {
                        info!(
                            idle_seconds = accept_idle.as_secs(),
                            "no new connections, ending intake"
                        );
                        break;
                    }
                    Ok(Ok((stream, peer))) => {
                        debug!(%peer, active = sessions.len(), "connection accepted");
                        let session = Session::new(
                            stream,
                            peer,
                            store.clone(),
                            barrier.clone(),
                            shutdown.clone(),
                            config.max_batch_bytes,
                        );
                        sessions.spawn(session.run());
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "accept failed");
                    }
                },
            }
        }

        // No further connections; close the listening socket before draining.
        drop(listener);

        let mut denied = shutdown.is_cancelled();
        if denied {
            barrier.deny_waiting().await;
        }

        info!(outstanding = sessions.len(), "draining sessions");
        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !denied => {
                    // Shutdown arrived after intake already ended; convert
                    // pending barrier waits into denies so the drain finishes.
                    barrier.deny_waiting().await;
                    denied = true;
                }
                joined = sessions.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(error = %e, "session task panicked"),
                },
            }
        }

        info!("all sessions finished");
        Ok(())
    }
}
