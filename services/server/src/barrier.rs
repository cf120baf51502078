//! Draw barrier: the rendezvous that synchronizes the draw moment
//!
//! Sessions run concurrently with no central orchestrator. Each agency that
//! signals completion registers here and blocks on a one-shot release
//! channel. The registration that brings the completion set to the expected
//! agency count admits every waiting agency at once; shutdown instead denies
//! whoever is still waiting so no session blocks indefinitely.
//!
//! Exactly-once draw semantics do not come from computing winners centrally:
//! the winning predicate is pure, so every admitted session reloads the
//! store and recomputes independently, which is safe without further
//! coordination.

use std::collections::{HashMap, HashSet};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Token delivered to each waiting session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// All expected agencies finished; proceed with the draw
    Admit,
    /// Shutdown (or a late registration) raced the barrier; close silently
    Deny,
}

#[derive(Debug, Default)]
struct BarrierState {
    /// Agencies that have signaled completion this run
    finished: HashSet<u8>,
    /// Release channel for each registered, still-waiting agency
    waiting: HashMap<u8, oneshot::Sender<Release>>,
    /// Set once the admit tokens have been produced; thereafter inert
    fired: bool,
    /// Set on shutdown; every later registration is denied immediately
    closed: bool,
}

pub struct DrawBarrier {
    expected: usize,
    state: Mutex<BarrierState>,
}

impl DrawBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(BarrierState::default()),
        }
    }

    /// Registers `agency` as finished and returns the receiver its session
    /// awaits for the admit-or-deny token.
    ///
    /// The registration that reaches the expected count produces exactly one
    /// admit token per waiting agency; this is the only path that ever
    /// produces admits and it fires at most once per server run. A
    /// registration arriving after the barrier has fired, or after shutdown
    /// has closed it, is denied immediately and never re-triggers release.
    /// A receiver that was
    /// dropped (its session already failed) still counts toward the
    /// threshold; the token send is simply ignored.
    pub async fn register_finished(&self, agency: u8) -> oneshot::Receiver<Release> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;

        if state.fired || state.closed {
            warn!(agency, "agency registered after draw release or shutdown, denying");
            let _ = tx.send(Release::Deny);
            return rx;
        }

        state.finished.insert(agency);
        state.waiting.insert(agency, tx);
        debug!(
            agency,
            finished = state.finished.len(),
            expected = self.expected,
            "agency signaled completion"
        );

        if state.finished.len() >= self.expected {
            state.fired = true;
            info!(
                agencies = state.finished.len(),
                "all agencies finished, releasing draw"
            );
            for (_, waiter) in state.waiting.drain() {
                let _ = waiter.send(Release::Admit);
            }
        }

        rx
    }

    /// Shutdown path: delivers a deny token to every registered,
    /// still-waiting agency and closes the barrier, so a registration that
    /// races shutdown is denied instead of waiting for a token that will
    /// never arrive.
    pub async fn deny_waiting(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        for (agency, waiter) in state.waiting.drain() {
            info!(agency, "denying waiting agency on shutdown");
            let _ = waiter.send(Release::Deny);
        }
    }
}
