//! Self-Healer: periodic health checks for the chart pipeline
//!
//! Monitors the pieces the dashboard depends on:
//! - Chart artifacts: requests a pipeline run when any are missing
//! - Readings file: warns when the data has gone stale
//! - Disk space: warns when the output volume is nearly full

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::ArtifactVerifier;

/// Health check interval (30 seconds)
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Component health status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is operating normally
    Healthy,
    /// Component is running but with reduced capability
    Degraded { reason: String },
    /// Component is not operational
    Unhealthy { reason: String },
}

impl HealthStatus {
    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded { .. } => 1,
            HealthStatus::Unhealthy { .. } => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}

/// Action taken by a health check to heal a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HealAction {
    /// Asked the refresh loop for a pipeline run
    RunRequested,
    /// No action was needed
    NoActionNeeded,
    /// Could not self-heal, requires manual intervention
    ManualInterventionRequired { reason: String },
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealAction::RunRequested => write!(f, "pipeline run requested"),
            HealAction::NoActionNeeded => write!(f, "no action needed"),
            HealAction::ManualInterventionRequired { reason } => {
                write!(f, "manual intervention required: {}", reason)
            }
        }
    }
}

/// Trait for component health checks
///
/// The self-healer calls `check()` every cycle and `heal()` when a component
/// is unhealthy.
pub trait HealthCheck: Send + Sync {
    /// Name of the component being checked
    fn component_name(&self) -> &str;

    /// Check the component's health
    fn check(&self) -> HealthStatus;

    /// Attempt to heal the component
    fn heal(&self) -> HealAction;
}

/// Health status for a single component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<HealAction>,
}

/// Aggregated system health
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub components: Vec<ComponentHealth>,
    /// Worst of all components
    pub overall: HealthStatus,
    /// Number of completed health check cycles
    pub check_cycles: u64,
}

impl SystemHealth {
    fn new() -> Self {
        Self {
            components: Vec::new(),
            overall: HealthStatus::Healthy,
            check_cycles: 0,
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Chart artifact health check
pub struct ArtifactHealthCheck {
    verifier: ArtifactVerifier,
    /// Wakes the refresh loop
    refresh: Option<Arc<Notify>>,
}

impl ArtifactHealthCheck {
    pub fn new(verifier: ArtifactVerifier, refresh: Option<Arc<Notify>>) -> Self {
        Self { verifier, refresh }
    }
}

impl HealthCheck for ArtifactHealthCheck {
    fn component_name(&self) -> &str {
        "Chart Artifacts"
    }

    fn check(&self) -> HealthStatus {
        let statuses = self.verifier.verify_all();
        let missing: Vec<String> = statuses
            .iter()
            .filter_map(|s| s.missing_reason().map(|r| format!("{} ({})", s.name(), r)))
            .collect();

        if missing.is_empty() {
            HealthStatus::Healthy
        } else if missing.len() == statuses.len() {
            HealthStatus::Unhealthy {
                reason: format!("No charts available: {}", missing.join(", ")),
            }
        } else {
            HealthStatus::Degraded {
                reason: format!("Missing charts: {}", missing.join(", ")),
            }
        }
    }

    fn heal(&self) -> HealAction {
        match &self.refresh {
            Some(refresh) => {
                refresh.notify_one();
                HealAction::RunRequested
            }
            None => HealAction::ManualInterventionRequired {
                reason: "run `airsight run` to regenerate charts".to_string(),
            },
        }
    }
}

/// Readings file freshness check
pub struct DataFreshnessCheck {
    data_file: PathBuf,
    stale_after: Duration,
}

impl DataFreshnessCheck {
    pub fn new(data_file: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            data_file: data_file.into(),
            stale_after,
        }
    }
}

impl HealthCheck for DataFreshnessCheck {
    fn component_name(&self) -> &str {
        "Readings Data"
    }

    fn check(&self) -> HealthStatus {
        let modified = match std::fs::metadata(&self.data_file).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => {
                return HealthStatus::Degraded {
                    reason: format!(
                        "{} not found, sample data will be generated",
                        self.data_file.display()
                    ),
                }
            }
        };
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age > self.stale_after {
            HealthStatus::Degraded {
                reason: format!("Readings last updated {:.0} min ago", age.as_secs_f64() / 60.0),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    fn heal(&self) -> HealAction {
        HealAction::NoActionNeeded
    }
}

/// Disk space health check
pub struct DiskHealthCheck {
    /// Path to check disk space for
    data_path: PathBuf,
    /// Minimum free space before warning (bytes)
    min_free_bytes: u64,
}

impl DiskHealthCheck {
    pub fn new(data_path: impl Into<PathBuf>, min_free_bytes: u64) -> Self {
        Self {
            data_path: data_path.into(),
            min_free_bytes,
        }
    }
}

impl HealthCheck for DiskHealthCheck {
    fn component_name(&self) -> &str {
        "Disk Space"
    }

    fn check(&self) -> HealthStatus {
        match check_disk_free(&self.data_path) {
            Ok(free_bytes) if free_bytes < self.min_free_bytes => HealthStatus::Unhealthy {
                reason: format!(
                    "Only {:.0} MB free (minimum {:.0} MB)",
                    free_bytes as f64 / 1_048_576.0,
                    self.min_free_bytes as f64 / 1_048_576.0
                ),
            },
            Ok(free_bytes) if free_bytes < self.min_free_bytes * 2 => HealthStatus::Degraded {
                reason: format!("{:.0} MB free, approaching minimum", free_bytes as f64 / 1_048_576.0),
            },
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Degraded {
                reason: format!("Could not check disk space: {}", e),
            },
        }
    }

    fn heal(&self) -> HealAction {
        warn!("Disk space low, chart writes may fail");
        HealAction::ManualInterventionRequired {
            reason: "free space on the output volume".to_string(),
        }
    }
}

/// Free bytes available to unprivileged users on the volume holding `path`
#[cfg(unix)]
fn check_disk_free(path: &Path) -> Result<u64, String> {
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|e| e.to_string())?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };

    if result == 0 {
        let stat = unsafe { stat.assume_init() };
        #[allow(clippy::unnecessary_cast)]
        let free = stat.f_bavail as u64 * stat.f_frsize as u64;
        Ok(free)
    } else {
        Err(format!("statvfs failed for {}", path.display()))
    }
}

#[cfg(not(unix))]
fn check_disk_free(_path: &Path) -> Result<u64, String> {
    Err("disk space check unsupported on this platform".to_string())
}

// ============================================================================
// Healer
// ============================================================================

/// Self-healer manages health checks and automatic recovery
pub struct SelfHealer {
    checks: Vec<Box<dyn HealthCheck>>,
    /// Shared for API access
    health: Arc<RwLock<SystemHealth>>,
}

impl SelfHealer {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>) -> Self {
        Self {
            checks,
            health: Arc::new(RwLock::new(SystemHealth::new())),
        }
    }

    /// Shared system health (for API endpoints)
    pub fn health_handle(&self) -> Arc<RwLock<SystemHealth>> {
        self.health.clone()
    }

    /// Run the health check loop until cancelled. The first cycle runs
    /// immediately.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            checks = self.checks.len(),
            interval_secs = HEALTH_CHECK_INTERVAL.as_secs(),
            "Self-healer started"
        );

        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        info!("Self-healer stopped");
    }

    /// Run one health check cycle and publish the result
    pub async fn run_cycle(&self) -> SystemHealth {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut worst = HealthStatus::Healthy;

        for check in &self.checks {
            let status = check.check();
            let action = match &status {
                HealthStatus::Unhealthy { .. } => {
                    error!(
                        component = check.component_name(),
                        status = %status,
                        "Component unhealthy, attempting heal"
                    );
                    Some(check.heal())
                }
                HealthStatus::Degraded { .. } => {
                    warn!(
                        component = check.component_name(),
                        status = %status,
                        "Component degraded"
                    );
                    None
                }
                HealthStatus::Healthy => {
                    debug!(component = check.component_name(), "Component healthy");
                    None
                }
            };

            if let Some(ref action) = action {
                info!(
                    component = check.component_name(),
                    action = %action,
                    "Heal action taken"
                );
            }

            if status.severity() > worst.severity() {
                worst = status.clone();
            }

            components.push(ComponentHealth {
                name: check.component_name().to_string(),
                status,
                last_checked: Utc::now(),
                last_action: action,
            });
        }

        let mut health = self.health.write().await;
        health.components = components;
        health.overall = worst;
        health.check_cycles += 1;
        health.clone()
    }
}
