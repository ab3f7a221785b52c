//! Session record and state machine
//!
//! A session is one client's logical terminal connection, whether or not its
//! sandbox process exists yet. States only move forward:
//!
//! ```text
//! Queued ──capacity──▶ Active ──terminal event──▶ Closing ──cleanup──▶ Closed
//!    └──────────client left before promotion──────▶ Closing
//! ```

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::watchdog::ActivityHandle;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 16 hex digits, used for sandbox instance names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..16].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for a free slot
    Queued,
    /// Holds a slot; the sandbox process is launching or running
    Active,
    /// Teardown in progress
    Closing,
    /// Removed from every tracking structure
    Closed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Queued => 0,
            SessionState::Active => 1,
            SessionState::Closing => 2,
            SessionState::Closed => 3,
        }
    }

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Queued, SessionState::Closing) => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Queued => "queued",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A tracked terminal session
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    client: IpAddr,
    label: Option<String>,
    created_at: DateTime<Utc>,
    state: SessionState,
    /// State the session was in when teardown began
    closing_from: Option<SessionState>,
    activity: Option<ActivityHandle>,
}

impl Session {
    pub fn new(id: SessionId, client: IpAddr, label: Option<String>) -> Self {
        Self {
            id,
            client,
            label,
            created_at: Utc::now(),
            state: SessionState::Queued,
            closing_from: None,
            activity: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn client(&self) -> IpAddr {
        self.client
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn closing_from(&self) -> Option<SessionState> {
        self.closing_from
    }

    /// Last inbound activity, falling back to creation time
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.activity
            .as_ref()
            .map(ActivityHandle::last_activity)
            .unwrap_or(self.created_at)
    }

    pub fn attach_activity(&mut self, activity: ActivityHandle) {
        self.activity = Some(activity);
    }

    /// Move to `next`, rejecting backward or skipping transitions
    pub fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        if next == SessionState::Closing {
            self.closing_from = Some(self.state);
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
        Ok(())
    }
}

/// Observability snapshot of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub client: String,
    pub label: Option<String>,
    pub state: SessionState,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub last_activity_at: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            client: session.client.to_string(),
            label: session.label.clone(),
            state: session.state,
            created_at: session.created_at.to_rfc3339(),
            last_activity_at: session.last_activity_at().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn session() -> Session {
        Session::new(SessionId::new(), IpAddr::V4(Ipv4Addr::LOCALHOST), None)
    }

    #[test]
    fn new_session_is_queued() {
        let session = session();
        assert_eq!(session.state(), SessionState::Queued);
        assert!(session.closing_from().is_none());
    }

    #[test]
    fn forward_transitions_are_allowed() {
        let mut session = session();
        session.transition(SessionState::Active).unwrap();
        session.transition(SessionState::Closing).unwrap();
        assert_eq!(session.closing_from(), Some(SessionState::Active));
        session.transition(SessionState::Closed).unwrap();
    }

    #[test]
    fn queued_can_close_without_activating() {
        let mut session = session();
        session.transition(SessionState::Closing).unwrap();
        assert_eq!(session.closing_from(), Some(SessionState::Queued));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut session = session();
        session.transition(SessionState::Active).unwrap();
        let err = session.transition(SessionState::Queued).unwrap_err();
        assert!(matches!(err, SessionError::InvalidStateTransition { .. }));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = session();
        session.transition(SessionState::Closing).unwrap();
        session.transition(SessionState::Closed).unwrap();
        assert!(session.transition(SessionState::Closing).is_err());
        assert!(session.transition(SessionState::Active).is_err());
    }

    #[test]
    fn queued_cannot_skip_to_closed() {
        let mut session = session();
        assert!(session.transition(SessionState::Closed).is_err());
    }

    #[test]
    fn short_id_is_16_hex_digits() {
        let id = SessionId::new();
        let short = id.short();
        assert_eq!(short.len(), 16);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn summary_reports_client_and_state() {
        let mut session = Session::new(
            SessionId::new(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            Some("alice".to_string()),
        );
        session.transition(SessionState::Active).unwrap();
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.client, "10.0.0.7");
        assert_eq!(summary.label.as_deref(), Some("alice"));
        assert_eq!(summary.state, SessionState::Active);
        assert_eq!(summary.created_at, summary.last_activity_at);
    }
}
