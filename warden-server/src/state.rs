//! Shared application state for the warden server

use chrono::{DateTime, Utc};
use warden_core::Broker;

/// Shared application state accessible by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the session broker
    pub broker: Broker,
    /// Take the client address from `X-Forwarded-For` instead of the socket
    pub trust_forwarded_for: bool,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            trust_forwarded_for: false,
            started_at: Utc::now(),
        }
    }

    /// Use when running behind a reverse proxy that sets `X-Forwarded-For`
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
