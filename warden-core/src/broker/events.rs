//! Messages between connections and the broker event loop

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::BrokerError;
use crate::sandbox::{ProcessIo, SandboxError, SandboxProcess};
use crate::session::{AdmissionOutcome, SessionId, SessionSummary};
use crate::watchdog::ActivityHandle;

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    ClientDisconnect,
    ProcessExited,
    IdleTimeout,
    SpawnFailure,
    Shutdown,
}

impl TerminateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client_disconnect",
            Self::ProcessExited => "process_exited",
            Self::IdleTimeout => "idle_timeout",
            Self::SpawnFailure => "spawn_failure",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal streams of a started session, handed to its connection
#[derive(Debug)]
pub struct SessionIo {
    pub io: ProcessIo,
    pub activity: ActivityHandle,
}

/// Notifications from the broker to one connection.
///
/// The channel closing means the session is fully torn down.
#[derive(Debug)]
pub enum SessionSignal {
    /// Queue position changed
    Queued { position: usize },
    /// Sandbox is running; start bridging
    Started(SessionIo),
    /// Sandbox could not be started
    SpawnFailed(String),
    /// Closed for inactivity
    IdleTimeout(Duration),
    /// Server is going down
    Shutdown,
}

/// Returned to a connection the broker accepted
#[derive(Debug)]
pub struct SessionTicket {
    pub id: SessionId,
    pub outcome: AdmissionOutcome,
    pub signals: mpsc::UnboundedReceiver<SessionSignal>,
}

#[derive(Debug)]
pub(crate) enum BrokerEvent {
    Admit {
        client: IpAddr,
        label: Option<String>,
        reply: oneshot::Sender<Result<SessionTicket, BrokerError>>,
    },
    Spawned {
        id: SessionId,
        result: Result<SandboxProcess, SandboxError>,
    },
    Terminate {
        id: SessionId,
        reason: TerminateReason,
    },
    TeardownFinished {
        id: SessionId,
    },
    ListSessions {
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
