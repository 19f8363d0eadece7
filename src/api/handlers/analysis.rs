//! Pipeline run endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use super::DashboardState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};

/// POST /api/v1/analysis/run - Run the pipeline now
///
/// Answers once the run finishes. A failed run still returns its
/// `RunResult`, with status 502 so clients need not inspect the body.
/// `BUSY` when another run holds the pipeline.
pub async fn trigger_run(State(state): State<DashboardState>) -> Response {
    match state.orchestrator.try_run().await {
        Some(result) if result.success => ApiResponse::ok(result),
        Some(result) => ApiResponse::with_status(StatusCode::BAD_GATEWAY, result),
        None => ApiErrorResponse::busy("A pipeline run is already in progress"),
    }
}

/// GET /api/v1/analysis/status
pub async fn get_run_status(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.orchestrator.status())
}
