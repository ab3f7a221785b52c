//! Session broker
//!
//! [`Broker`] is a cheap, cloneable handle to a background event loop that
//! owns all session state. Connections call [`Broker::admit`] and then follow
//! the [`SessionSignal`]s on their ticket; everything else (promotion, idle
//! eviction, teardown) is driven by the loop.

mod actor;
pub mod config;
pub mod events;

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::BrokerError;
use crate::sandbox::{SandboxEngine, SandboxError};
use crate::session::{BrokerStats, SessionId, SessionSummary};

use actor::BrokerActor;
pub use config::{
    BrokerConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONCURRENT_SESSIONS,
    DEFAULT_MAX_SESSIONS_PER_IP,
};
use events::BrokerEvent;
pub use events::{SessionIo, SessionSignal, SessionTicket, TerminateReason};

#[derive(Clone)]
pub struct Broker {
    events: mpsc::UnboundedSender<BrokerEvent>,
    stats: watch::Receiver<BrokerStats>,
    engine: Arc<dyn SandboxEngine>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("stats", &*self.stats.borrow())
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Start the event loop on the current runtime
    pub fn spawn(config: BrokerConfig, engine: Arc<dyn SandboxEngine>) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(BrokerStats::default());

        tracing::info!(
            max_concurrent_sessions = config.max_concurrent_sessions,
            max_sessions_per_ip = config.max_sessions_per_ip,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Starting broker"
        );
        let actor = BrokerActor::new(config, Arc::clone(&engine), events.clone(), stats_tx);
        tokio::spawn(actor.run(rx));

        Self {
            events,
            stats,
            engine,
        }
    }

    /// Ask for a session on behalf of `client`.
    ///
    /// On success the ticket says whether the sandbox is starting or the
    /// session is queued. The caller must report the connection closing with
    /// [`Broker::client_closed`].
    pub async fn admit(
        &self,
        client: IpAddr,
        label: Option<String>,
    ) -> Result<SessionTicket, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(BrokerEvent::Admit {
                client,
                label,
                reply,
            })
            .map_err(|_| BrokerError::ShuttingDown)?;
        rx.await.map_err(|_| BrokerError::ShuttingDown)?
    }

    /// The client connection ended
    pub fn client_closed(&self, id: SessionId) {
        self.terminate(id, TerminateReason::ClientDisconnect);
    }

    /// The sandbox's terminal reached end of stream
    pub fn process_exited(&self, id: SessionId) {
        self.terminate(id, TerminateReason::ProcessExited);
    }

    fn terminate(&self, id: SessionId, reason: TerminateReason) {
        if self.events.send(BrokerEvent::Terminate { id, reason }).is_err() {
            tracing::debug!(session_id = %id, %reason, "Broker already stopped");
        }
    }

    /// Snapshot of tracked sessions, oldest first
    pub async fn sessions(&self) -> Vec<SessionSummary> {
        let (reply, rx) = oneshot::channel();
        if self.events.send(BrokerEvent::ListSessions { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn stats(&self) -> BrokerStats {
        self.stats.borrow().clone()
    }

    /// Receiver that observes every change to [`BrokerStats`]
    pub fn subscribe_stats(&self) -> watch::Receiver<BrokerStats> {
        self.stats.clone()
    }

    /// Remove sandboxes left behind by an earlier run
    pub async fn reap_orphans(&self) -> Result<usize, SandboxError> {
        self.engine.reap_orphans().await
    }

    /// Refuse new sessions, tear down every open one and wait until all
    /// sandboxes are gone. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.events.send(BrokerEvent::Shutdown { reply }).is_err() {
            return;
        }
        let _ = rx.await;
    }
}
