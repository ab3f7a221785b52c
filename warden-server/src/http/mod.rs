//! HTTP server module

mod api;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::ws::ws_handler;

pub use api::{HealthResponse, SessionListResponse};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/sessions", get(api::list_sessions))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use std::net::{IpAddr, Ipv4Addr};
    use warden_core::{Broker, BrokerConfig, HostEngine, SandboxConfig, SessionState};

    fn test_state(root: &std::path::Path) -> Arc<AppState> {
        let engine =
            Arc::new(HostEngine::new(SandboxConfig::host("cat")).with_scratch_root(root));
        let config = BrokerConfig {
            max_concurrent_sessions: 1,
            ..BrokerConfig::default()
        };
        Arc::new(AppState::new(Broker::spawn(config, engine)))
    }

    #[tokio::test]
    async fn health_reports_broker_counters() {
        let root = tempfile::tempdir().unwrap();
        let state = test_state(root.path());
        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();

        let response = server.get("/api/health").await;
        response.assert_status_ok();

        let health: HealthResponse = response.json();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(health.active_sessions, 0);
        assert_eq!(health.queue_length, 0);
        assert_eq!(health.tracked_sessions, 0);

        state.broker.shutdown().await;
    }

    #[tokio::test]
    async fn sessions_lists_labels_and_states() {
        let root = tempfile::tempdir().unwrap();
        let state = test_state(root.path());
        let client = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
        let _active = state.broker.admit(client, Some("first".into())).await.unwrap();
        let _queued = state.broker.admit(client, None).await.unwrap();

        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();
        let response = server.get("/api/sessions").await;
        response.assert_status_ok();

        let list: SessionListResponse = response.json();
        assert_eq!(list.sessions.len(), 2);
        assert_eq!(list.sessions[0].label.as_deref(), Some("first"));
        assert_eq!(list.sessions[0].client, "192.0.2.10");
        assert_eq!(list.sessions[1].state, SessionState::Queued);

        let health: HealthResponse = server.get("/api/health").await.json();
        assert_eq!(health.queue_length, 1);
        assert_eq!(health.distinct_clients, 1);

        state.broker.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let state = test_state(root.path());
        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();

        let response = server.get("/api/nope").await;
        response.assert_status_not_found();

        state.broker.shutdown().await;
    }
}
