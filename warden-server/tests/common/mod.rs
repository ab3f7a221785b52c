//! Shared test utilities for warden-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use warden_core::{Broker, BrokerConfig, BrokerStats, HostEngine, SandboxConfig};
use warden_server::{ServerConfig, ServerError, WardenServer};

/// Knobs for a test server; sessions run a host command instead of a container
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub command: &'static str,
    pub max_concurrent_sessions: usize,
    pub max_sessions_per_ip: usize,
    pub idle_timeout: Duration,
    pub trust_forwarded_for: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            command: "cat",
            max_concurrent_sessions: 4,
            max_sessions_per_ip: 4,
            idle_timeout: Duration::from_secs(600),
            trust_forwarded_for: false,
        }
    }
}

/// A running server bound to an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    pub broker: Broker,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<(), ServerError>>,
    _scratch: TempDir,
}

impl TestServer {
    /// Wait until the broker counters satisfy `check`
    #[allow(dead_code)]
    pub async fn wait_for_stats(&self, check: impl FnMut(&BrokerStats) -> bool) {
        let mut rx = self.broker.subscribe_stats();
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(check))
            .await
            .expect("timed out waiting for broker stats")
            .expect("broker stopped");
    }

    #[allow(dead_code)]
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Starts a server with default options
#[allow(dead_code)]
pub async fn start_server() -> TestServer {
    start_server_with(TestOptions::default()).await
}

/// Starts a server in a background task
pub async fn start_server_with(options: TestOptions) -> TestServer {
    let scratch = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        HostEngine::new(SandboxConfig::host(options.command)).with_scratch_root(scratch.path()),
    );
    let broker = Broker::spawn(
        BrokerConfig {
            max_concurrent_sessions: options.max_concurrent_sessions,
            max_sessions_per_ip: options.max_sessions_per_ip,
            idle_timeout: options.idle_timeout,
        },
        engine,
    );

    let config = ServerConfig {
        trust_forwarded_for: options.trust_forwarded_for,
        ..ServerConfig::new("127.0.0.1", 0)
    };
    let server = WardenServer::new(config, broker.clone());
    let shutdown = server.shutdown_token();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run_with_listener(listener));

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    TestServer {
        addr,
        broker,
        shutdown,
        handle,
        _scratch: scratch,
    }
}
