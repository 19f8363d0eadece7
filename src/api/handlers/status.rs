//! Health and AQI lookup endpoints

use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use super::DashboardState;
use crate::analysis::RunState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::background::{ComponentHealth, HealthStatus};
use crate::guideline::{Period, Pollutant};

// ============================================================================
// Health Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub overall: HealthStatus,
    pub pipeline: RunState,
    pub components: Vec<ComponentHealth>,
    pub check_cycles: u64,
}

/// GET /health
pub async fn get_health(State(state): State<DashboardState>) -> Response {
    let pipeline = state.orchestrator.status().state;
    let response = match &state.health {
        Some(health) => {
            let health = health.read().await;
            HealthResponse {
                overall: health.overall.clone(),
                pipeline,
                components: health.components.clone(),
                check_cycles: health.check_cycles,
            }
        }
        None => HealthResponse {
            overall: HealthStatus::Healthy,
            pipeline,
            components: Vec::new(),
            check_cycles: 0,
        },
    };
    ApiResponse::ok(response)
}

// ============================================================================
// AQI Endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AqiQuery {
    pub pollutant: String,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct AqiResponse {
    pub pollutant: Pollutant,
    pub value: f64,
    pub index: u32,
    pub band: String,
    pub color: String,
    /// Above the daily guideline limit
    pub exceeds_guideline: bool,
}

/// GET /api/v1/aqi?pollutant=pm25&value=12.3
pub async fn get_aqi(State(state): State<DashboardState>, Query(query): Query<AqiQuery>) -> Response {
    let pollutant: Pollutant = match query.pollutant.parse() {
        Ok(p) => p,
        Err(e) => return ApiErrorResponse::bad_request(e),
    };
    let index = match state.table.aqi_index(pollutant, query.value) {
        Ok(i) => i,
        Err(e) => return ApiErrorResponse::bad_request(e.to_string()),
    };
    let band = state.table.band_for_index(index);
    ApiResponse::ok(AqiResponse {
        pollutant,
        value: query.value,
        index,
        band: band.label.clone(),
        color: band.color.hex(),
        exceeds_guideline: state.table.guideline_exceeded(pollutant, Period::Daily, query.value),
    })
}
