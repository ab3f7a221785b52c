use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::{BrokerConfig, Runtime, SandboxConfig};
use warden_server::ServerConfig;

pub use warden_core::broker::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_MAX_SESSIONS_PER_IP,
};
pub use warden_server::{DEFAULT_HOST, DEFAULT_PORT};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWardenConfig {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub broker: RawBrokerSection,

    #[serde(default)]
    pub sandbox: RawSandboxSection,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub trust_forwarded_for: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawBrokerSection {
    pub max_concurrent_sessions: Option<usize>,
    pub max_sessions_per_ip: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSandboxSection {
    pub runtime: Option<Runtime>,
    pub engine_binary: Option<PathBuf>,
    pub image: Option<String>,
    pub shell: Option<String>,
    pub memory: Option<String>,
    pub cpus: Option<String>,
    pub network: Option<String>,
    pub read_only: Option<bool>,
    pub scratch: Option<String>,
    pub name_prefix: Option<String>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WardenConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub sandbox: SandboxSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Address to bind to
    pub host: String,

    /// Port for the warden server
    pub port: u16,

    /// Charge sessions to the first `X-Forwarded-For` address
    pub trust_forwarded_for: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Sandboxes running at once; further sessions queue
    pub max_concurrent_sessions: usize,

    /// Queued plus active sessions per client address
    pub max_sessions_per_ip: usize,

    /// Seconds without input before an active session is closed
    pub idle_timeout_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            max_sessions_per_ip: DEFAULT_MAX_SESSIONS_PER_IP,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxSection {
    pub runtime: Runtime,
    pub engine_binary: PathBuf,
    pub image: String,
    pub shell: String,
    pub memory: String,
    pub cpus: String,
    pub network: String,
    pub read_only: bool,
    pub scratch: String,
    pub name_prefix: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for SandboxSection {
    fn default() -> Self {
        let defaults = SandboxConfig::default();
        Self {
            runtime: defaults.runtime,
            engine_binary: defaults.engine_binary,
            image: defaults.image,
            shell: defaults.shell,
            memory: defaults.memory,
            cpus: defaults.cpus,
            network: defaults.network,
            read_only: defaults.read_only,
            scratch: defaults.scratch,
            name_prefix: defaults.name_prefix,
            cols: defaults.initial_cols,
            rows: defaults.initial_rows,
        }
    }
}

impl WardenConfig {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            trust_forwarded_for: self.server.trust_forwarded_for,
        }
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            max_concurrent_sessions: self.broker.max_concurrent_sessions,
            max_sessions_per_ip: self.broker.max_sessions_per_ip,
            idle_timeout: Duration::from_secs(self.broker.idle_timeout_secs),
        }
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        let sandbox = &self.sandbox;
        SandboxConfig {
            runtime: sandbox.runtime,
            engine_binary: sandbox.engine_binary.clone(),
            image: sandbox.image.clone(),
            shell: sandbox.shell.clone(),
            memory: sandbox.memory.clone(),
            cpus: sandbox.cpus.clone(),
            network: sandbox.network.clone(),
            read_only: sandbox.read_only,
            scratch: sandbox.scratch.clone(),
            name_prefix: sandbox.name_prefix.clone(),
            initial_cols: sandbox.cols,
            initial_rows: sandbox.rows,
        }
    }
}
