//! warden-core: admission control and sandbox lifecycle for terminal sessions
//!
//! This crate provides the pieces behind the warden server:
//!
//! - **Broker** - [`Broker`] admits connections, queues them when capacity is
//!   full, and tears sessions down exactly once
//! - **Sessions** - [`Registry`] with the per-address quota and FIFO queue
//! - **Sandboxes** - [`SandboxEngine`] launches a capped shell in a PTY
//!   ([`DockerEngine`] in production, [`HostEngine`] for development)
//! - **Idle watchdog** - [`IdleWatchdog`] evicts sessions without input
//! - **Frames** - [`frame::classify`] separates resize directives from input
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use warden_core::{Broker, BrokerConfig, SandboxConfig, SessionSignal, create_engine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = create_engine(SandboxConfig::default());
//! let broker = Broker::spawn(BrokerConfig::default(), engine);
//!
//! let client = IpAddr::V4(Ipv4Addr::LOCALHOST);
//! let mut ticket = broker.admit(client, None).await?;
//! while let Some(signal) = ticket.signals.recv().await {
//!     if let SessionSignal::Started(session) = signal {
//!         println!("terminal ready: {:?}", session.io.resizer.size());
//!         break;
//!     }
//! }
//! broker.client_closed(ticket.id);
//! broker.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  connection ──admit──▶ ┌──────────────────────────────┐
//!       ▲                │         BrokerActor          │
//!       │ SessionSignal  │  ┌────────────┐ ┌─────────┐  │
//!       └─────────────── │  │  Registry  │ │ Watchdog│  │
//!                        │  │ quota+queue│ │ per sess│  │
//!                        │  └────────────┘ └─────────┘  │
//!                        └──────┬────────────────▲──────┘
//!                      launch / │                │ Spawned /
//!                      teardown ▼                │ TeardownFinished
//!                        ┌──────────────────────────────┐
//!                        │   SandboxEngine (blocking)   │
//!                        └──────────────────────────────┘
//! ```

pub mod broker;
pub mod error;
pub mod frame;
pub mod sandbox;
pub mod session;
pub mod watchdog;

// Re-export key types for convenience
pub use broker::{
    Broker, BrokerConfig, SessionIo, SessionSignal, SessionTicket, TerminateReason,
};
pub use error::{BrokerError, SessionError};
pub use frame::Frame;
pub use sandbox::{
    DockerEngine, HostEngine, ProcessIo, PtyResizer, Runtime, SandboxConfig, SandboxEngine,
    SandboxError, create_engine,
};
pub use session::{
    AdmissionOutcome, BrokerStats, Registry, SessionId, SessionState, SessionSummary,
};
pub use watchdog::{ActivityHandle, IdleWatchdog};
