//! REST API module using Axum
//!
//! Thin dashboard surface over the pipeline:
//! - `/health` and the `/api/v1` JSON endpoints, wrapped in the [`envelope`]
//! - `/images` serving the chart artifacts from the output directory
//! - `/data` serving the readings file's directory

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::DashboardState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Comma-separated origins allowed to call the API cross-origin.
pub const CORS_ORIGINS_ENV: &str = "AIRSIGHT_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: DashboardState) -> Router {
    let settings = state.orchestrator.settings();
    let images = ServeDir::new(&settings.output_dir);
    let data_dir = settings
        .data_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        .nest_service("/images", images)
        .nest_service("/data", ServeDir::new(data_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
