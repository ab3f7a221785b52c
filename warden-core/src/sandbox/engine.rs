//! Sandbox engine trait and implementations
//!
//! The broker only knows three engine operations: launch, force-remove and
//! reap-orphans. Everything else (image, caps, scratch storage) is declarative
//! configuration handed to the engine.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use portable_pty::{CommandBuilder, PtySize, native_pty_system};

use super::process::SandboxProcess;
use super::{Runtime, SandboxConfig, SandboxError};
use crate::session::SessionId;

/// Trait for sandbox engine implementations
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Instance name backing the given session
    fn instance_name(&self, session: &SessionId) -> String;

    /// Launch a sandboxed shell attached to a fresh PTY.
    ///
    /// Blocking: callers run it on a blocking thread.
    fn launch(&self, name: &str) -> Result<SandboxProcess, SandboxError>;

    /// Remove the instance. Removing an instance that is already gone succeeds.
    async fn force_remove(&self, name: &str) -> Result<(), SandboxError>;

    /// Remove leftover instances from earlier runs; returns how many were removed
    async fn reap_orphans(&self) -> Result<usize, SandboxError>;
}

fn open_pty(config: &SandboxConfig) -> Result<portable_pty::PtyPair, SandboxError> {
    native_pty_system()
        .openpty(PtySize {
            rows: config.initial_rows,
            cols: config.initial_cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SandboxError::CreateFailed(e.to_string()))
}

fn spawn_in_pty(
    name: &str,
    pair: portable_pty::PtyPair,
    cmd: CommandBuilder,
) -> Result<SandboxProcess, SandboxError> {
    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| SandboxError::SpawnFailed(e.to_string()))?;
    // The reader only sees EOF once every slave handle is closed
    drop(pair.slave);
    SandboxProcess::from_pty(name.to_string(), pair.master, child)
}

/// One container per session, launched with `docker run -it` inside a PTY
pub struct DockerEngine {
    config: SandboxConfig,
}

impl DockerEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Arguments for `docker run`
    pub fn run_args(&self, name: &str) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "run".to_string(),
            "-it".to_string(),
            "--rm".to_string(),
            format!("--name={}", name),
            format!("--network={}", config.network),
            format!("--memory={}", config.memory),
            format!("--cpus={}", config.cpus),
        ];
        if config.read_only {
            args.push("--read-only".to_string());
        }
        if !config.scratch.is_empty() {
            args.push(format!("--tmpfs={}", config.scratch));
        }
        args.push(config.image.clone());

        let (program, shell_args) = config.shell_command();
        args.push(program);
        args.extend(shell_args);
        args
    }

    /// Distinguish "engine unavailable" from "image missing" before launching
    fn preflight(&self) -> Result<PathBuf, SandboxError> {
        let binary = which::which(&self.config.engine_binary).map_err(|e| {
            SandboxError::EngineUnavailable(format!(
                "{}: {}",
                self.config.engine_binary.display(),
                e
            ))
        })?;

        let output = std::process::Command::new(&binary)
            .args(["image", "inspect", "--format", "{{.Id}}", &self.config.image])
            .output()
            .map_err(|e| SandboxError::EngineUnavailable(e.to_string()))?;

        if output.status.success() {
            return Ok(binary);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("no such image") {
            Err(SandboxError::ImageMissing(self.config.image.clone()))
        } else {
            Err(SandboxError::EngineUnavailable(stderr.trim().to_string()))
        }
    }
}

/// Whether a failed `rm -f` only means the instance no longer exists
pub fn is_already_removed(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("is already in progress")
}

#[async_trait]
impl SandboxEngine for DockerEngine {
    fn instance_name(&self, session: &SessionId) -> String {
        format!("{}{}", self.config.name_prefix, session.short())
    }

    fn launch(&self, name: &str) -> Result<SandboxProcess, SandboxError> {
        let binary = self.preflight()?;

        tracing::info!(
            name = %name,
            image = %self.config.image,
            memory = %self.config.memory,
            cpus = %self.config.cpus,
            "Launching sandbox container"
        );

        let pair = open_pty(&self.config)?;
        let mut cmd = CommandBuilder::new(binary);
        for arg in self.run_args(name) {
            cmd.arg(arg);
        }
        spawn_in_pty(name, pair, cmd)
    }

    async fn force_remove(&self, name: &str) -> Result<(), SandboxError> {
        let output = tokio::process::Command::new(&self.config.engine_binary)
            .args(["rm", "-f", name])
            .output()
            .await
            .map_err(|e| SandboxError::RemoveFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || is_already_removed(&stderr) {
            tracing::debug!(name = %name, "Sandbox container removed");
            Ok(())
        } else {
            Err(SandboxError::RemoveFailed {
                name: name.to_string(),
                message: stderr.trim().to_string(),
            })
        }
    }

    async fn reap_orphans(&self) -> Result<usize, SandboxError> {
        let filter = format!("name={}", self.config.name_prefix);
        let output = tokio::process::Command::new(&self.config.engine_binary)
            .args(["ps", "-aq", "--filter", &filter])
            .output()
            .await
            .map_err(|e| SandboxError::EngineUnavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(SandboxError::EngineUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let ids = String::from_utf8_lossy(&output.stdout);
        let mut removed = 0;
        for id in ids.lines().map(str::trim).filter(|id| !id.is_empty()) {
            match self.force_remove(id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(id = %id, error = %e, "Failed to remove orphaned container"),
            }
        }
        Ok(removed)
    }
}

/// Orphan reaping deletes every prefixed directory here, so it must not be
/// shared with other programs
fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("warden")
}

/// Runs the shell directly on the host in a PTY, with a private scratch directory.
///
/// No isolation: development and tests only.
pub struct HostEngine {
    config: SandboxConfig,
    scratch_root: PathBuf,
}

impl HostEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            scratch_root: default_scratch_root(),
        }
    }

    /// Put scratch directories under `root` instead of `<temp>/warden`
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn scratch_dir(&self, name: &str) -> PathBuf {
        self.scratch_root.join(name)
    }
}

#[async_trait]
impl SandboxEngine for HostEngine {
    fn instance_name(&self, session: &SessionId) -> String {
        format!("{}{}", self.config.name_prefix, session.short())
    }

    fn launch(&self, name: &str) -> Result<SandboxProcess, SandboxError> {
        let (program, args) = self.config.shell_command();
        let scratch = self.scratch_dir(name);
        std::fs::create_dir_all(&scratch)?;

        tracing::info!(
            name = %name,
            command = %program,
            scratch = %scratch.display(),
            "Launching host shell"
        );

        let pair = open_pty(&self.config)?;
        let mut cmd = CommandBuilder::new(&program);
        for arg in &args {
            cmd.arg(arg);
        }
        cmd.cwd(&scratch);
        cmd.env("TMPDIR", &scratch);
        cmd.env("TERM", "xterm-256color");

        match spawn_in_pty(name, pair, cmd) {
            Ok(process) => Ok(process),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&scratch);
                Err(e)
            }
        }
    }

    async fn force_remove(&self, name: &str) -> Result<(), SandboxError> {
        match tokio::fs::remove_dir_all(self.scratch_dir(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::RemoveFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn reap_orphans(&self) -> Result<usize, SandboxError> {
        let mut entries = match tokio::fs::read_dir(&self.scratch_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&self.config.name_prefix) && entry.file_type().await?.is_dir() {
                self.force_remove(&name).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Create the engine selected by the configuration
pub fn create_engine(config: SandboxConfig) -> Arc<dyn SandboxEngine> {
    match config.runtime {
        Runtime::Docker => {
            tracing::info!(
                engine = %config.engine_binary.display(),
                image = %config.image,
                "Using docker sandbox engine"
            );
            Arc::new(DockerEngine::new(config))
        }
        Runtime::Host => {
            tracing::warn!(command = %config.shell, "Using host engine: sessions are NOT isolated");
            Arc::new(HostEngine::new(config))
        }
    }
}
