//! Session tracking
//!
//! - [`IpQuotaTracker`] caps concurrent sessions per client address
//! - [`AdmissionQueue`] bounds active sessions and queues the rest FIFO
//! - [`Registry`] ties both to the session records

pub mod admission;
pub mod quota;
pub mod registry;
pub mod state;

pub use admission::{AdmissionQueue, QueueEntry};
pub use quota::IpQuotaTracker;
pub use registry::{AdmissionOutcome, Admitted, BrokerStats, Registry};
pub use state::{Session, SessionId, SessionState, SessionSummary};
