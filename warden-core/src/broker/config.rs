//! Broker limits

use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 10;
pub const DEFAULT_MAX_SESSIONS_PER_IP: usize = 3;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(900);

/// Capacity and timeout settings for one broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Active sandboxes allowed at once; extra sessions wait in the queue
    pub max_concurrent_sessions: usize,
    /// Queued plus active sessions allowed per client address
    pub max_sessions_per_ip: usize,
    /// Inactivity after which an active session is torn down
    pub idle_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            max_sessions_per_ip: DEFAULT_MAX_SESSIONS_PER_IP,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
