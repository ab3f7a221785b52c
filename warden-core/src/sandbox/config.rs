//! Sandbox launch configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default container image for new sessions
pub const DEFAULT_IMAGE: &str = "ubuntu:latest";
/// Default shell started inside the sandbox
pub const DEFAULT_SHELL: &str = "/bin/bash";
/// Default prefix for sandbox instance names
pub const DEFAULT_NAME_PREFIX: &str = "terminal-";

/// Which engine launches the session shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// `docker run` inside a PTY, one container per session
    #[default]
    Docker,
    /// The shell runs directly on the host in a PTY (development and tests only)
    Host,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Docker => "docker",
            Runtime::Host => "host",
        }
    }
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Runtime::Docker),
            "host" => Ok(Runtime::Host),
            other => Err(format!("unknown runtime '{}' (expected docker or host)", other)),
        }
    }
}

/// Declarative launch parameters for one sandboxed shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Engine used to launch sessions
    pub runtime: Runtime,
    /// Engine CLI binary (docker, podman, ...)
    pub engine_binary: PathBuf,
    /// Container image
    pub image: String,
    /// Shell to run (and its arguments, whitespace separated)
    pub shell: String,
    /// Memory ceiling passed to the engine, e.g. "512m"
    pub memory: String,
    /// CPU share passed to the engine, e.g. "0.5"
    pub cpus: String,
    /// Network mode for the container
    pub network: String,
    /// Mount the container root filesystem read-only
    pub read_only: bool,
    /// Writable ephemeral scratch mount (tmpfs)
    pub scratch: String,
    /// Prefix for instance names, also used to find orphans
    pub name_prefix: String,
    /// Initial terminal columns
    pub initial_cols: u16,
    /// Initial terminal rows
    pub initial_rows: u16,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::Docker,
            engine_binary: PathBuf::from("docker"),
            image: DEFAULT_IMAGE.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            memory: "512m".to_string(),
            cpus: "0.5".to_string(),
            network: "none".to_string(),
            read_only: true,
            scratch: "/tmp".to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            initial_cols: 80,
            initial_rows: 30,
        }
    }
}

impl SandboxConfig {
    /// Config for the host runtime running `command` (used heavily by tests)
    pub fn host(command: impl Into<String>) -> Self {
        Self {
            runtime: Runtime::Host,
            shell: command.into(),
            ..Default::default()
        }
    }

    /// Split `shell` into program and arguments
    pub fn shell_command(&self) -> (String, Vec<String>) {
        let mut parts = self.shell.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| DEFAULT_SHELL.to_string());
        (program, parts.collect())
    }
}
