//! Text notices sent to terminal clients

use std::time::Duration;

use warden_core::BrokerError;

pub const SHUTTING_DOWN: &str = "server shutting down";

pub fn queue_position(position: usize) -> String {
    format!("queue position: {}", position)
}

/// Notice for a connection the broker refused
pub fn rejected(error: &BrokerError) -> String {
    match error {
        BrokerError::QuotaExceeded { .. } => format!("session rejected: {}", error),
        BrokerError::ShuttingDown => SHUTTING_DOWN.to_string(),
    }
}

pub fn idle(after: Duration) -> String {
    format!("session closed: idle for {}s", after.as_secs())
}

pub fn failed(reason: &str) -> String {
    format!("session failed: {}", reason)
}
