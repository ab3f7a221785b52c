//! Warden serve command
//!
//! Loads the layered configuration, applies flag overrides, starts the
//! session broker and runs the HTTP/WebSocket server until SIGINT/SIGTERM.

use anyhow::Result;
use clap::Args;
use tracing::info;
use warden_core::{Broker, Runtime, create_engine};
use warden_server::WardenServer;

use crate::config::{ConfigLoader, WardenConfig};

/// Arguments for the serve command
///
/// Every flag is optional; unset flags keep the configured value.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Sandboxes running at once
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Sessions allowed per client address
    #[arg(long)]
    pub max_per_ip: Option<usize>,

    /// Seconds without input before a session is closed
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Sandbox runtime (docker or host)
    #[arg(long)]
    pub runtime: Option<Runtime>,

    /// Container image for new sessions
    #[arg(long)]
    pub image: Option<String>,

    /// Charge sessions to the first X-Forwarded-For address
    #[arg(long)]
    pub trust_forwarded_for: bool,
}

impl ServeArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut WardenConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(max) = self.max_sessions {
            config.broker.max_concurrent_sessions = max.max(1);
        }
        if let Some(max) = self.max_per_ip {
            config.broker.max_sessions_per_ip = max.max(1);
        }
        if let Some(secs) = self.idle_timeout {
            config.broker.idle_timeout_secs = secs;
        }
        if let Some(runtime) = self.runtime {
            config.sandbox.runtime = runtime;
        }
        if let Some(image) = &self.image {
            config.sandbox.image = image.clone();
        }
        if self.trust_forwarded_for {
            config.server.trust_forwarded_for = true;
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    args.apply(&mut config);

    let broker_config = config.broker_config();
    info!(
        host = %config.server.host,
        port = config.server.port,
        max_concurrent_sessions = broker_config.max_concurrent_sessions,
        max_sessions_per_ip = broker_config.max_sessions_per_ip,
        idle_timeout_secs = broker_config.idle_timeout.as_secs(),
        runtime = config.sandbox.runtime.as_str(),
        "Starting warden"
    );

    let engine = create_engine(config.sandbox_config());
    let broker = Broker::spawn(broker_config, engine);
    let server = WardenServer::new(config.server_config(), broker);

    server.run().await.map_err(Into::into)
}
