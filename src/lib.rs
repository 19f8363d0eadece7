//! airsight: air quality telemetry charts
//!
//! Turns a delimited-text feed of PM2.5/PM10, temperature and humidity
//! readings into guideline-annotated chart artifacts for a dashboard.
//!
//! ## Architecture
//!
//! - **Guideline table**: WHO limits and AQI bands, single source for every chart
//! - **Config store**: reactive pipeline config backed by a remote authority
//! - **Render targets**: canvas size, background and font for chart output
//! - **Orchestrator**: runs the external chart computation and verifies its artifacts
//! - **Background**: self-healing health checks and the periodic refresh loop

pub mod analysis;
pub mod api;
pub mod background;
pub mod config;
pub mod guideline;
pub mod readings;
pub mod render;
pub mod sample;
pub mod storage;

pub use analysis::{AnalysisOrchestrator, ArtifactVerifier, RunResult, RunState};
pub use config::{PipelineConfig, ReactiveConfigStore, ServiceConfig};
pub use guideline::{AqiBand, GuidelineTable, Period, Pollutant};
pub use render::{RenderTarget, RenderTargetFactory};
