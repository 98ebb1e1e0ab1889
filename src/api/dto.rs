//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::model::SensorReading;
use crate::sync::{LoadOutcome, SyncState};
use crate::view::{ChartSeries, Panel, TableRow};

// ============================================
// READINGS DTOs
// ============================================

/// Current series with its state
#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub state: SyncState,
    pub count: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Ascending by id
    pub readings: Arc<[SensorReading]>,
}

// ============================================
// CHART DTOs
// ============================================

/// Chart query parameters: a predefined `panel` or a comma-separated
/// `fields` list, not both
#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub panel: Option<String>,
    pub fields: Option<String>,
}

/// Chart series response
#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub state: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<Panel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_label: Option<&'static str>,
    #[serde(flatten)]
    pub series: ChartSeries,
}

// ============================================
// TABLE DTOs
// ============================================

/// Table query parameters
#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    /// Rows to return (default from config)
    pub limit: Option<usize>,
}

/// Latest readings, newest first
#[derive(Debug, Serialize)]
pub struct TableResponse {
    pub state: SyncState,
    pub rows: Vec<TableRow>,
}

// ============================================
// REFRESH DTOs
// ============================================

/// Result of a manual refresh
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub state: SyncState,
    #[serde(flatten)]
    pub outcome: LoadOutcome,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, starting, degraded, unhealthy
    pub status: String,
    /// Synchronizer state
    pub sync_state: SyncState,
    /// Name of the reading source
    pub source: String,
    /// Readings currently held
    pub readings: usize,
    /// Series capacity (N)
    pub capacity: usize,
    /// Last synchronizer error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Open WebSocket connections
    pub ws_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
