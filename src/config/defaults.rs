//! System-wide default constants.
//!
//! Centralises the magic numbers used across the pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Paths
// ============================================================================

/// Raw readings file populated by the telemetry collaborator.
pub const DATA_FILE: &str = "data/air_quality_data.csv";

/// Directory the dashboard serves chart artifacts from.
pub const OUTPUT_DIR: &str = "public/images";

/// Local configuration document used when no remote authority URL is set.
pub const CONFIG_FILE: &str = "data/pipeline_config.toml";

// ============================================================================
// Analysis
// ============================================================================

/// Bundled analysis computation binary.
pub const ANALYSIS_COMMAND: &str = "airsight-analyze";

/// Environment variable carrying the JSON analysis parameters.
pub const ANALYSIS_PARAMS_ENV: &str = "AIRSIGHT_ANALYSIS_PARAMS";

/// Bounded wait for launch + completion of the analysis process (seconds).
pub const ANALYSIS_TIMEOUT_SECS: u64 = 120;

/// Time series of PM2.5 / PM10 with guideline overlays.
pub const TIME_SERIES_ARTIFACT: &str = "time_series.svg";

/// Daily mean PM2.5 trend chart.
pub const TREND_ARTIFACT: &str = "pm25_trend.svg";

/// Hour-of-day PM2.5 bars and PM10 line.
pub const DAILY_PATTERN_ARTIFACT: &str = "daily_pattern.svg";

/// Weekday x hour PM2.5 heatmap.
pub const HEATMAP_ARTIFACT: &str = "heatmap.svg";

/// PM2.5 against temperature and humidity.
pub const CORRELATION_ARTIFACT: &str = "correlation.svg";

// ============================================================================
// Sample Data
// ============================================================================

/// Seed for the synthetic generator so repeated runs produce identical values.
pub const SAMPLE_SEED: u64 = 42;

/// Days of hourly synthetic readings.
pub const SAMPLE_DAYS: i64 = 7;

// ============================================================================
// Pipeline Config
// ============================================================================

/// Lower bound on the telemetry polling interval (ms).
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Default telemetry polling interval (ms). 15 minutes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 900_000;

/// HTTP timeout for remote configuration requests (seconds).
pub const REMOTE_CONFIG_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Rendering
// ============================================================================

/// Canvas width (px).
pub const CANVAS_WIDTH: u32 = 1200;

/// Canvas height (px).
pub const CANVAS_HEIGHT: u32 = 600;

/// Font family used when no font file registers.
pub const FALLBACK_FONT_FAMILY: &str = "sans-serif";

// ============================================================================
// Health Checks
// ============================================================================

/// Data file older than this is reported degraded (seconds). 1 hour.
pub const DATA_STALE_AFTER_SECS: u64 = 3_600;

/// Free disk space below this is unhealthy (bytes). 100 MB.
pub const MIN_FREE_DISK_BYTES: u64 = 100 * 1024 * 1024;

// ============================================================================
// Server
// ============================================================================

/// Default dashboard bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:3000";
