//! warden-server - HTTP and WebSocket gateway for warden terminal sessions
//!
//! Serves `GET /ws` for terminal sessions, plus `GET /api/health` and
//! `GET /api/sessions` for monitoring. All session state lives in the
//! [`warden_core::Broker`]; this crate only moves bytes and notices.

mod error;
pub mod http;
mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use warden_core::Broker;

pub use error::ServerError;
pub use http::create_router;
pub use state::AppState;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

/// The main warden server
pub struct WardenServer {
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl WardenServer {
    pub fn new(config: ServerConfig, broker: Broker) -> Self {
        let state = AppState::new(broker).with_trust_forwarded_for(config.trust_forwarded_for);
        Self::with_state(config, Arc::new(state))
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that triggers the same graceful shutdown as SIGINT/SIGTERM
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("warden server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Run the server on an already bound listener
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let broker = self.state.broker.clone();
        match broker.reap_orphans().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Removed sandboxes left by a previous run"),
            Err(e) => tracing::warn!("Failed to reap leftover sandboxes: {}", e),
        }

        let router = create_router(self.state);
        let shutdown = self.shutdown;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            wait_for_shutdown(shutdown).await;
            tracing::info!("Shutdown requested, closing sessions");
            broker.shutdown().await;
            tracing::info!("All sessions closed");
        })
        .await
        .map_err(ServerError::Serve)?;

        Ok(())
    }
}

/// Resolves on SIGINT, SIGTERM or cancellation of `token`
async fn wait_for_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Charge sessions to the first `X-Forwarded-For` address
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            trust_forwarded_for: false,
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:3001")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
