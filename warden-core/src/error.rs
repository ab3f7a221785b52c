//! Error types for warden-core

use std::net::IpAddr;

use thiserror::Error;

/// Reasons the broker refuses a connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("too many sessions from {client} (limit {limit})")]
    QuotaExceeded { client: IpAddr, limit: usize },

    #[error("server shutting down")]
    ShuttingDown,
}

/// Errors related to session bookkeeping
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}
