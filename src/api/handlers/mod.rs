//! API route handlers
//!
//! - Health: self-healer snapshot plus pipeline state
//! - Config: read and patch the live pipeline config
//! - Analysis: trigger a run and read its status
//! - AQI: classify a single concentration

mod analysis;
mod config;
mod status;

pub use analysis::*;
pub use config::*;
pub use status::*;

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::analysis::AnalysisOrchestrator;
use crate::background::SystemHealth;
use crate::config::ReactiveConfigStore;
use crate::guideline::GuidelineTable;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct DashboardState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub store: Arc<ReactiveConfigStore>,
    pub table: Arc<GuidelineTable>,
    /// Published by the self-healer; absent when it is not running
    pub health: Option<Arc<RwLock<SystemHealth>>>,
}

impl DashboardState {
    pub fn new(
        orchestrator: Arc<AnalysisOrchestrator>,
        store: Arc<ReactiveConfigStore>,
        table: Arc<GuidelineTable>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            table,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<RwLock<SystemHealth>>) -> Self {
        self.health = Some(health);
        self
    }
}
