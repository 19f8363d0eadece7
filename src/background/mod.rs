//! Background services: health checks and periodic refresh
//!
//! Both run as tokio tasks until the shared cancellation token fires.

pub mod refresh;
pub mod self_healer;

pub use refresh::{run_refresh_loop, RefreshObserver};
pub use self_healer::{
    ArtifactHealthCheck, ComponentHealth, DataFreshnessCheck, DiskHealthCheck, HealAction, HealthCheck,
    HealthStatus, SelfHealer, SystemHealth,
};
