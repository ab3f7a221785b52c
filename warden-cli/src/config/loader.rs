use super::types::{
    BrokerSection, RawBrokerSection, RawSandboxSection, RawServerSection, RawWardenConfig,
    SandboxSection, ServerSection, WardenConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variables read on top of the config files
pub const ENV_HOST: &str = "WARDEN_HOST";
pub const ENV_PORT: &str = "WARDEN_PORT";
pub const ENV_MAX_CONCURRENT_SESSIONS: &str = "MAX_CONCURRENT_SESSIONS";
pub const ENV_MAX_SESSIONS_PER_IP: &str = "MAX_SESSIONS_PER_IP";
pub const ENV_IDLE_TIMEOUT: &str = "IDLE_TIMEOUT_DURATION";
pub const ENV_RUNTIME: &str = "WARDEN_RUNTIME";
pub const ENV_IMAGE: &str = "WARDEN_IMAGE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<WardenConfig> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with a custom environment lookup
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<WardenConfig> {
        let mut raw = RawWardenConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path() {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);

        // Layer 3: Environment
        raw = Self::merge_raw(raw, Self::from_env(env)?);

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "warden").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with WARDEN_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("WARDEN_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".warden/config.toml")
        }
    }

    /// Parse one config file; a missing file is an empty layer
    fn read_raw(path: &Path) -> Result<RawWardenConfig> {
        if !path.exists() {
            return Ok(RawWardenConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Build the environment layer
    fn from_env(env: impl Fn(&str) -> Option<String>) -> Result<RawWardenConfig> {
        Ok(RawWardenConfig {
            server: RawServerSection {
                host: env_value(&env, ENV_HOST),
                port: parse_env(&env, ENV_PORT)?,
                trust_forwarded_for: None,
            },
            broker: RawBrokerSection {
                max_concurrent_sessions: parse_env(&env, ENV_MAX_CONCURRENT_SESSIONS)?,
                max_sessions_per_ip: parse_env(&env, ENV_MAX_SESSIONS_PER_IP)?,
                idle_timeout_secs: parse_env(&env, ENV_IDLE_TIMEOUT)?,
            },
            sandbox: RawSandboxSection {
                runtime: parse_env(&env, ENV_RUNTIME)?,
                image: env_value(&env, ENV_IMAGE),
                ..RawSandboxSection::default()
            },
        })
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawWardenConfig, overlay: RawWardenConfig) -> RawWardenConfig {
        RawWardenConfig {
            server: RawServerSection {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                trust_forwarded_for: overlay
                    .server
                    .trust_forwarded_for
                    .or(base.server.trust_forwarded_for),
            },
            broker: RawBrokerSection {
                max_concurrent_sessions: overlay
                    .broker
                    .max_concurrent_sessions
                    .or(base.broker.max_concurrent_sessions),
                max_sessions_per_ip: overlay
                    .broker
                    .max_sessions_per_ip
                    .or(base.broker.max_sessions_per_ip),
                idle_timeout_secs: overlay
                    .broker
                    .idle_timeout_secs
                    .or(base.broker.idle_timeout_secs),
            },
            sandbox: RawSandboxSection {
                runtime: overlay.sandbox.runtime.or(base.sandbox.runtime),
                engine_binary: overlay.sandbox.engine_binary.or(base.sandbox.engine_binary),
                image: overlay.sandbox.image.or(base.sandbox.image),
                shell: overlay.sandbox.shell.or(base.sandbox.shell),
                memory: overlay.sandbox.memory.or(base.sandbox.memory),
                cpus: overlay.sandbox.cpus.or(base.sandbox.cpus),
                network: overlay.sandbox.network.or(base.sandbox.network),
                read_only: overlay.sandbox.read_only.or(base.sandbox.read_only),
                scratch: overlay.sandbox.scratch.or(base.sandbox.scratch),
                name_prefix: overlay.sandbox.name_prefix.or(base.sandbox.name_prefix),
                cols: overlay.sandbox.cols.or(base.sandbox.cols),
                rows: overlay.sandbox.rows.or(base.sandbox.rows),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawWardenConfig) -> WardenConfig {
        let defaults = WardenConfig::default();
        let (server, broker, sandbox) = (defaults.server, defaults.broker, defaults.sandbox);

        let mut config = WardenConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or(server.host),
                port: raw.server.port.unwrap_or(server.port),
                trust_forwarded_for: raw
                    .server
                    .trust_forwarded_for
                    .unwrap_or(server.trust_forwarded_for),
            },
            broker: BrokerSection {
                max_concurrent_sessions: raw
                    .broker
                    .max_concurrent_sessions
                    .unwrap_or(broker.max_concurrent_sessions),
                max_sessions_per_ip: raw
                    .broker
                    .max_sessions_per_ip
                    .unwrap_or(broker.max_sessions_per_ip),
                idle_timeout_secs: raw
                    .broker
                    .idle_timeout_secs
                    .unwrap_or(broker.idle_timeout_secs),
            },
            sandbox: SandboxSection {
                runtime: raw.sandbox.runtime.unwrap_or(sandbox.runtime),
                engine_binary: raw.sandbox.engine_binary.unwrap_or(sandbox.engine_binary),
                image: raw.sandbox.image.unwrap_or(sandbox.image),
                shell: raw.sandbox.shell.unwrap_or(sandbox.shell),
                memory: raw.sandbox.memory.unwrap_or(sandbox.memory),
                cpus: raw.sandbox.cpus.unwrap_or(sandbox.cpus),
                network: raw.sandbox.network.unwrap_or(sandbox.network),
                read_only: raw.sandbox.read_only.unwrap_or(sandbox.read_only),
                scratch: raw.sandbox.scratch.unwrap_or(sandbox.scratch),
                name_prefix: raw.sandbox.name_prefix.unwrap_or(sandbox.name_prefix),
                cols: raw.sandbox.cols.unwrap_or(sandbox.cols),
                rows: raw.sandbox.rows.unwrap_or(sandbox.rows),
            },
        };

        // Zero would admit nobody; treat it as one
        config.broker.max_concurrent_sessions = config.broker.max_concurrent_sessions.max(1);
        config.broker.max_sessions_per_ip = config.broker.max_sessions_per_ip.max(1);
        config
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<WardenConfig> {
        Ok(Self::finalize(Self::read_raw(path)?))
    }
}

/// Trimmed value of `key`; empty counts as unset
fn env_value(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_value(env, key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, value, e)),
        None => Ok(None),
    }
}
