//! REST API handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use warden_core::SessionSummary;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Sessions holding a sandbox slot
    pub active_sessions: usize,
    /// Sessions waiting for a slot
    pub queue_length: usize,
    /// Sessions in any state, including those being torn down
    pub tracked_sessions: usize,
    /// Client addresses seen since startup
    pub distinct_clients: usize,
}

/// Health check endpoint
///
/// Returns server status, version, uptime and broker counters.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.broker.stats();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: stats.active_sessions,
        queue_length: stats.queue_length,
        tracked_sessions: stats.tracked_sessions,
        distinct_clients: stats.distinct_clients,
    })
}

/// Response for listing sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// List every tracked session, oldest first
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.broker.sessions().await,
    })
}
