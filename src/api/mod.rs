//! SensoGuard Dashboard API
//!
//! HTTP API layer serving the live sensor series, built with Axum.
//!
//! # Endpoints
//!
//! ## Readings
//! - `GET /api/v1/readings` - Current series with synchronizer state
//! - `GET /api/v1/chart` - Chart series (`?panel=gyroscope` or `?fields=weight,gyro_x`)
//! - `GET /api/v1/table` - Latest readings, newest first (`?limit=10`)
//! - `POST /api/v1/refresh` - Re-query the source now
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe (200 only while live)
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Real-time series stream
//!
//! # Example
//!
//! ```rust,ignore
//! use sensoguard::api::{serve, ApiConfig, AppState};
//! use sensoguard::source::{SupabaseConfig, SupabaseSource};
//! use sensoguard::sync::{SeriesSynchronizer, SyncConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(SupabaseSource::new(SupabaseConfig::default())?);
//!     let sync = Arc::new(SeriesSynchronizer::new(source, SyncConfig::default()));
//!     let config = ApiConfig::default();
//!
//!     serve(AppState::new(sync, config.clone()), &config).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let api_routes = Router::new()
        .route("/readings", get(routes::readings::list_readings))
        .route("/chart", get(routes::readings::chart))
        .route("/table", get(routes::readings::table))
        .route("/refresh", post(routes::readings::refresh));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server.
///
/// Relays series updates to WebSocket clients while running. Returns on
/// Ctrl+C, SIGTERM, or once the synchronizer is torn down.
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let relay = state.ws_hub.forward_series(Arc::clone(&state.sync));
    let closed = state.sync.shutdown_token();
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("SensoGuard API listening on {}", addr);

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(closed))
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)));

    relay.abort();
    result?;

    tracing::info!("SensoGuard API shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal or for `closed` to be cancelled
async fn shutdown_signal(closed: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = closed.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
