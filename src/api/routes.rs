//! API route definitions
//!
//! - /api/v1/config - live pipeline config (GET, POST patch)
//! - /api/v1/analysis/run - run the pipeline now
//! - /api/v1/analysis/status - current state and last result
//! - /api/v1/aqi - classify one concentration

use axum::{routing::{get, post}, Router};

use super::handlers::{self, DashboardState};

/// Versioned API routes, nested under `/api/v1`
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/config", get(handlers::get_config).post(handlers::update_config))
        .route("/analysis/run", post(handlers::trigger_run))
        .route("/analysis/status", get(handlers::get_run_status))
        .route("/aqi", get(handlers::get_aqi))
        .with_state(state)
}

/// Health endpoint at root level
pub fn health_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}
