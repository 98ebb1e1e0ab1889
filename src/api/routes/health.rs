//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (series is live)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::sync::SyncState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 only while the synchronizer is live. A series in `Error`
/// still serves its last good readings, but is not ready.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.sync.state().await.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with synchronizer details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.sync.snapshot().await;

    let status = match snapshot.state {
        SyncState::Live => "healthy",
        SyncState::Idle | SyncState::Loading => "starting",
        SyncState::Error => "degraded",
        SyncState::Closed => "unhealthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        sync_state: snapshot.state,
        source: state.sync.source_name().to_string(),
        readings: snapshot.len(),
        capacity: snapshot.capacity,
        last_error: snapshot.last_error,
        ws_connections: state.ws_connection_count().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
