//! Pipeline config endpoints

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tracing::info;

use super::DashboardState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::{PipelineConfig, PipelineConfigPatch, StoreState};

/// Live config with credentials masked
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub state: StoreState,
    pub config: PipelineConfig,
}

fn current(state: &DashboardState) -> ConfigResponse {
    ConfigResponse {
        state: state.store.state(),
        config: state.store.get().redacted(),
    }
}

/// GET /api/v1/config
pub async fn get_config(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(current(&state))
}

/// POST /api/v1/config - Submit a partial update to the config authority
///
/// Applied only when the authority accepts it; otherwise the live config is
/// left untouched and the request is answered with `REJECTED`.
pub async fn update_config(
    State(state): State<DashboardState>,
    Json(patch): Json<PipelineConfigPatch>,
) -> Response {
    if patch.is_empty() {
        return ApiErrorResponse::bad_request("Patch contains no fields");
    }
    if let Err(errors) = state.store.get().merged(&patch).validate() {
        return ApiErrorResponse::bad_request(errors.join("; "));
    }

    if state.store.update(patch).await {
        info!("Pipeline config updated via API");
        ApiResponse::ok(current(&state))
    } else {
        ApiErrorResponse::rejected("Config update rejected; current config unchanged")
    }
}
