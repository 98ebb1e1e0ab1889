//! Reading Routes
//!
//! - GET /api/v1/readings - Current series
//! - GET /api/v1/chart - Chart series for a panel or field list
//! - GET /api/v1/table - Latest readings, newest first
//! - POST /api/v1/refresh - Re-query the source now

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    ChartQuery, ChartResponse, ReadingsResponse, RefreshResponse, TableQuery, TableResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::view::{chart_series, panel_view, table_rows, Field, Panel};

/// GET /api/v1/readings
pub async fn list_readings(State(state): State<Arc<AppState>>) -> Json<ReadingsResponse> {
    let snapshot = state.sync.snapshot().await;

    Json(ReadingsResponse {
        state: snapshot.state,
        count: snapshot.len(),
        capacity: snapshot.capacity,
        last_error: snapshot.last_error,
        readings: snapshot.readings,
    })
}

/// GET /api/v1/chart?panel=gyroscope
/// GET /api/v1/chart?fields=weight,gyro_x
///
/// Without parameters every field is charted.
pub async fn chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<ChartResponse>> {
    let panel = match (&query.panel, &query.fields) {
        (Some(_), Some(_)) => {
            return Err(ApiError::Validation(
                "Use either panel or fields, not both".to_string(),
            ))
        }
        (Some(name), None) => Some(name.parse::<Panel>().map_err(ApiError::Validation)?),
        (None, _) => None,
    };

    let fields: Vec<Field> = match &query.fields {
        Some(list) => parse_fields(list)?,
        None => Field::ALL.to_vec(),
    };

    let snapshot = state.sync.snapshot().await;

    let response = match panel {
        Some(panel) => {
            let view = panel_view(&snapshot.readings, panel);
            ChartResponse {
                state: snapshot.state,
                panel: Some(view.panel),
                title: Some(view.title),
                y_label: Some(view.y_label),
                series: view.series,
            }
        }
        None => ChartResponse {
            state: snapshot.state,
            panel: None,
            title: None,
            y_label: None,
            series: chart_series(&snapshot.readings, &fields),
        },
    };

    Ok(Json(response))
}

fn parse_fields(list: &str) -> ApiResult<Vec<Field>> {
    let fields = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Field>().map_err(ApiError::Validation))
        .collect::<ApiResult<Vec<_>>>()?;

    if fields.is_empty() {
        return Err(ApiError::Validation("fields must not be empty".to_string()));
    }
    Ok(fields)
}

/// GET /api/v1/table?limit=10
pub async fn table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Json<TableResponse>> {
    let limit = query.limit.unwrap_or(state.config.table_rows);
    if limit == 0 || limit > state.config.max_table_rows {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            state.config.max_table_rows
        )));
    }

    let snapshot = state.sync.snapshot().await;

    Ok(Json(TableResponse {
        state: snapshot.state,
        rows: table_rows(&snapshot.readings, limit),
    }))
}

/// POST /api/v1/refresh
pub async fn refresh(State(state): State<Arc<AppState>>) -> ApiResult<Json<RefreshResponse>> {
    let outcome = state.sync.refresh().await?;

    Ok(Json(RefreshResponse {
        state: state.sync.state().await,
        outcome,
    }))
}
