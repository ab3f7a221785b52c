//! Session registry: sessions, per-address quota and admission queue
//!
//! The registry is plain data with synchronous methods. It is owned by the
//! broker event loop, which is the only writer; nothing here blocks.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::admission::AdmissionQueue;
use super::quota::IpQuotaTracker;
use super::state::{Session, SessionId, SessionState, SessionSummary};
use crate::error::BrokerError;
use crate::watchdog::ActivityHandle;

/// What happened to a quota-cleared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Got a slot; the sandbox should be launched now
    Started,
    /// Waiting at the given 1-based position
    Queued { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub id: SessionId,
    pub outcome: AdmissionOutcome,
}

/// Global counters exposed to monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    pub active_sessions: usize,
    pub queue_length: usize,
    pub tracked_sessions: usize,
    pub distinct_clients: usize,
}

#[derive(Debug)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    quota: IpQuotaTracker,
    admission: AdmissionQueue,
}

impl Registry {
    pub fn new(max_concurrent_sessions: usize, max_sessions_per_ip: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            quota: IpQuotaTracker::new(max_sessions_per_ip),
            admission: AdmissionQueue::new(max_concurrent_sessions),
        }
    }

    /// Quota check, then start now or enqueue.
    ///
    /// A rejected client leaves no trace besides the distinct-client counter.
    pub fn admit(&mut self, client: IpAddr, label: Option<String>) -> Result<Admitted, BrokerError> {
        let id = SessionId::new();
        if !self.quota.try_reserve(client, id) {
            return Err(BrokerError::QuotaExceeded {
                client,
                limit: self.quota.limit(),
            });
        }

        let mut session = Session::new(id, client, label);
        let outcome = if self.admission.try_start_now() {
            // Queued -> Active is always valid for a new session
            let _ = session.transition(SessionState::Active);
            AdmissionOutcome::Started
        } else {
            AdmissionOutcome::Queued {
                position: self.admission.enqueue(id),
            }
        };

        self.sessions.insert(id, session);
        Ok(Admitted { id, outcome })
    }

    /// Move a session to Closing. Returns the state it was in, or `None` if
    /// teardown already began (or the session is unknown).
    ///
    /// A queued session leaves the wait list here so it can never be promoted
    /// while closing.
    pub fn begin_teardown(&mut self, id: SessionId) -> Option<SessionState> {
        let session = self.sessions.get_mut(&id)?;
        let prior = session.state();
        if !matches!(prior, SessionState::Queued | SessionState::Active) {
            return None;
        }
        session.transition(SessionState::Closing).ok()?;
        if prior == SessionState::Queued {
            self.admission.remove_queued(id);
        }
        Some(prior)
    }

    /// Release the slot and quota of a closing session, mark it Closed and drop
    /// it. Returns sessions promoted into the freed capacity (none when
    /// `promote` is false).
    pub fn finish_teardown(&mut self, id: SessionId, promote: bool) -> Vec<SessionId> {
        let Some(session) = self.sessions.get_mut(&id) else {
            return Vec::new();
        };
        if session.state() != SessionState::Closing {
            tracing::warn!(session_id = %id, state = %session.state(), "finish_teardown on a session that is not closing");
            return Vec::new();
        }

        if session.closing_from() == Some(SessionState::Active) {
            self.admission.release_active();
        }
        self.quota.release(session.client(), id);
        let _ = session.transition(SessionState::Closed);
        self.sessions.remove(&id);

        if promote { self.promote() } else { Vec::new() }
    }

    /// Fill free slots from the head of the queue
    pub fn promote(&mut self) -> Vec<SessionId> {
        let mut promoted = Vec::new();
        while let Some(id) = self.admission.promote_next() {
            match self.sessions.get_mut(&id) {
                Some(session) if session.state() == SessionState::Queued => {
                    let _ = session.transition(SessionState::Active);
                    promoted.push(id);
                }
                _ => {
                    tracing::warn!(session_id = %id, "Dropping stale queue entry");
                    self.admission.release_active();
                }
            }
        }
        promoted
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.get(&id).map(Session::state)
    }

    pub fn attach_activity(&mut self, id: SessionId, activity: ActivityHandle) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.attach_activity(activity);
        }
    }

    /// Current queue positions, head first
    pub fn queue_positions(&self) -> Vec<(SessionId, usize)> {
        self.admission
            .waiting()
            .enumerate()
            .map(|(index, entry)| (entry.session, index + 1))
            .collect()
    }

    /// Sessions that teardown has not reached yet, queued ones first
    pub fn open_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.admission.waiting().map(|e| e.session).collect();
        ids.extend(
            self.sessions
                .values()
                .filter(|s| s.state() == SessionState::Active)
                .map(Session::id),
        );
        ids
    }

    pub fn client_count(&self, client: &IpAddr) -> usize {
        self.quota.count(client)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            active_sessions: self.admission.active_count(),
            queue_length: self.admission.queue_len(),
            tracked_sessions: self.sessions.len(),
            distinct_clients: self.quota.distinct_clients(),
        }
    }

    /// Snapshot of every tracked session, oldest first
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.created_at());
        sessions.into_iter().map(SessionSummary::from).collect()
    }
}
