//! Configuration Module
//!
//! Two layers:
//!
//! - [`ServiceConfig`]: static deployment settings (paths, analysis command,
//!   rendering, server) loaded once from TOML at startup.
//! - [`PipelineConfig`]: the telemetry channel settings, held by the
//!   [`ReactiveConfigStore`] and kept in sync with a remote authority.
//!
//! ## Loading Order
//!
//! 1. `AIRSIGHT_CONFIG` environment variable (path to TOML file)
//! 2. `airsight.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(ServiceConfig::load());
//!
//! // Anywhere in the codebase:
//! let out = &config::get().paths.output_dir;
//! ```

pub mod authority;
pub mod defaults;
mod pipeline;
mod service_config;
pub mod store;
pub mod validation;
pub mod watcher;

pub use authority::{AuthorityError, ConfigAuthority, FileConfigAuthority, HttpConfigAuthority, UpdateAck};
pub use pipeline::*;
pub use service_config::*;
pub use store::{ConfigChange, ConfigObserver, ReactiveConfigStore, StoreState};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Global service configuration, initialized once at startup.
static SERVICE_CONFIG: OnceLock<ServiceConfig> = OnceLock::new();

/// Initialize the global service configuration. Later calls are ignored.
pub fn init(config: ServiceConfig) {
    if SERVICE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Global service configuration, or built-in defaults before `init()`.
pub fn get() -> &'static ServiceConfig {
    SERVICE_CONFIG.get_or_init(ServiceConfig::default)
}

pub fn is_initialized() -> bool {
    SERVICE_CONFIG.get().is_some()
}

/// Build the authority selected by `[remote]`: HTTP when `config_url` is set,
/// otherwise the local config document seeded with `[pipeline]`.
pub fn build_authority(config: &ServiceConfig) -> Arc<dyn ConfigAuthority> {
    if let Some(ref url) = config.remote.config_url {
        let timeout = Duration::from_secs(config.remote.request_timeout_secs);
        match HttpConfigAuthority::new(url, timeout) {
            Ok(http) => return Arc::new(http),
            Err(e) => tracing::warn!(
                url = %url,
                error = %e,
                "HTTP config authority unavailable, falling back to local document"
            ),
        }
    }
    Arc::new(FileConfigAuthority::new(
        config.remote.config_file.clone(),
        config.pipeline.clone(),
    ))
}
