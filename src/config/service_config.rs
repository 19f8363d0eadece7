//! Service Configuration - paths, analysis invocation, rendering, remote authority
//!
//! Every tunable the pipeline reads at startup lives here as a TOML value.
//! Each section implements `Default`, so a missing file means built-in defaults.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use super::pipeline::PipelineConfig;
use crate::readings::DateWindow;
use crate::render::{Background, ChartKind};

/// Environment variable pointing at the service config file.
pub const CONFIG_ENV: &str = "AIRSIGHT_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "airsight.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one airsight deployment.
///
/// Load with `ServiceConfig::load()` which searches:
/// 1. `$AIRSIGHT_CONFIG` env var
/// 2. `./airsight.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Initial channel settings, used until the remote authority answers.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ServiceConfig {
    /// Load configuration using the standard search order, then apply
    /// credential overrides from the environment.
    pub fn load() -> Self {
        let mut config = Self::load_from_search_path();
        config.apply_env_overrides();
        config
    }

    fn load_from_search_path() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded service config from {CONFIG_ENV}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV} points to non-existent file, falling back");
            }
        }

        // 2. Check ./airsight.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded service config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Channel credentials from the environment (or `.env`) win over the file.
    pub fn apply_env_overrides(&mut self) {
        let overrides = [
            ("AIRSIGHT_CHANNEL_ID", &mut self.pipeline.channel_id),
            ("AIRSIGHT_READ_KEY", &mut self.pipeline.read_key),
            ("AIRSIGHT_WRITE_KEY", &mut self.pipeline.write_key),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.analysis.timeout_secs == 0 {
            errors.push("analysis.timeout_secs must be > 0".to_string());
        }
        if self.analysis.command.trim().is_empty() {
            errors.push("analysis.command must not be empty".to_string());
        }
        if self.analysis.artifacts.is_empty() {
            errors.push("analysis.artifacts must name at least one artifact".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.analysis.artifacts {
            if name.trim().is_empty() {
                errors.push("analysis.artifacts entries must not be empty".to_string());
            } else if Path::new(name).file_name().map(|f| f != name.as_str()).unwrap_or(true) {
                errors.push(format!("analysis.artifacts entry '{name}' must be a plain file name"));
            } else if ChartKind::from_artifact(name).is_none() {
                let known: Vec<&str> = ChartKind::ALL.iter().map(|k| k.artifact()).collect();
                errors.push(format!(
                    "analysis.artifacts entry '{name}' does not name a chart (one of: {})",
                    known.join(", ")
                ));
            }
            if !seen.insert(name) {
                errors.push(format!("analysis.artifacts entry '{name}' is duplicated"));
            }
        }

        if let (Some(start), Some(end)) = (self.analysis.start_date, self.analysis.end_date) {
            if start > end {
                errors.push(format!(
                    "analysis.start_date ({start}) must not be after analysis.end_date ({end})"
                ));
            }
        }

        for (label, value) in [("render.width", self.render.width), ("render.height", self.render.height)] {
            if !(64..=8192).contains(&value) {
                errors.push(format!("{label} must be within 64..=8192, got {value}"));
            }
        }

        if self.remote.request_timeout_secs == 0 {
            errors.push("remote.request_timeout_secs must be > 0".to_string());
        }

        if let Err(pipeline_errors) = self.pipeline.validate() {
            errors.extend(pipeline_errors.into_iter().map(|e| format!("pipeline.{e}")));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Paths
// ============================================================================

/// Filesystem locations shared with the collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw readings file (delimited text).
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Directory that receives chart artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_data_file() -> PathBuf {
    PathBuf::from(defaults::DATA_FILE)
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(defaults::OUTPUT_DIR)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            output_dir: default_output_dir(),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// External analysis computation and its expected outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Program to launch. Resolved next to the running binary when it has no
    /// path separator and a sibling exists.
    #[serde(default = "default_analysis_command")]
    pub command: String,

    /// Extra arguments placed before `<input> <output_dir>`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Bounded wait for launch + completion (seconds).
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,

    /// Well-known artifact file names the computation must produce.
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<String>,

    /// Optional external sample-data generator (program + args). When unset the
    /// built-in synthetic generator is used.
    #[serde(default)]
    pub sample_command: Option<Vec<String>>,

    /// First UTC day to chart, as `"YYYY-MM-DD"`. Unset charts from the first reading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    /// Last UTC day to chart, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

fn default_analysis_command() -> String {
    defaults::ANALYSIS_COMMAND.to_string()
}
fn default_analysis_timeout() -> u64 {
    defaults::ANALYSIS_TIMEOUT_SECS
}
fn default_artifacts() -> Vec<String> {
    ChartKind::ALL.iter().map(|k| k.artifact().to_string()).collect()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            command: default_analysis_command(),
            args: Vec::new(),
            timeout_secs: default_analysis_timeout(),
            artifacts: default_artifacts(),
            sample_command: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

// ============================================================================
// Render
// ============================================================================

/// Canvas parameters handed to the render-target factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Font file (TTF/OTF) to register. Falls back to the platform default.
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// Draw guideline/annotation overlays.
    #[serde(default = "default_true")]
    pub overlays: bool,

    /// Canvas background of the charts the pipeline writes.
    #[serde(default = "default_background")]
    pub background: Background,
}

fn default_width() -> u32 {
    defaults::CANVAS_WIDTH
}
fn default_height() -> u32 {
    defaults::CANVAS_HEIGHT
}
fn default_true() -> bool {
    true
}
fn default_background() -> Background {
    Background::OpaqueWhite
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            font_path: None,
            overlays: true,
            background: default_background(),
        }
    }
}

// ============================================================================
// Remote Authority
// ============================================================================

/// Where the reactive store loads and submits pipeline config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of an HTTP config authority. Takes precedence over `config_file`.
    #[serde(default)]
    pub config_url: Option<String>,

    /// Local TOML document acting as the authority when no URL is set.
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_config_file() -> PathBuf {
    PathBuf::from(defaults::CONFIG_FILE)
}
fn default_request_timeout() -> u64 {
    defaults::REMOTE_CONFIG_TIMEOUT_SECS
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            config_url: None,
            config_file: default_config_file(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}
