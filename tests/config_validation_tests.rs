//! Config Validation Tests
//!
//! Typo detection and range validation of the service config document,
//! exercised through the public loading functions.

use airsight::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use airsight::config::{ConfigError, Metric, ServiceConfig};
use tempfile::tempdir;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_render_section_warns_with_suggestion() {
    let toml_str = r#"
[render]
widht = 800
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("widht"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("render.width"));
}

#[test]
fn typo_in_pipeline_section_warns() {
    let warnings = validate_unknown_keys("[pipeline]\npoll_interval = 5000\n");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "pipeline.poll_interval");
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[paths]
data_file = "data/air_quality_data.csv"
output_dir = "public/images"

[analysis]
command = "airsight-analyze"
args = []
timeout_secs = 60
artifacts = ["time_series.svg", "pm25_trend.svg", "heatmap.svg"]
sample_command = ["python3", "generate_sample_data.py"]
start_date = "2024-03-01"
end_date = "2024-03-31"

[render]
width = 1000
height = 500
font_path = "fonts/Inter-Regular.ttf"
overlays = true
background = "transparent"

[remote]
config_url = "http://localhost:3000"
config_file = "data/pipeline_config.toml"
request_timeout_secs = 5

[server]
addr = "127.0.0.1:3000"

[pipeline]
channel_id = "2998710"
poll_interval_ms = 60000

[pipeline.field_map]
pm25 = "field3"
pm10 = "field4"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Unexpected warnings: {warnings:?}");
    assert!(ServiceConfig::from_toml_str(toml_str).is_ok());
}

#[test]
fn far_off_keys_get_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("zzzzzzzz", &known), None);
    assert_eq!(
        suggest_correction("analysis.timout_secs", &known).as_deref(),
        Some("analysis.timeout_secs")
    );
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn out_of_range_values_are_all_reported() {
    let toml_str = r#"
[analysis]
timeout_secs = 0
artifacts = ["../escape.svg", "ok.svg", "ok.svg"]
start_date = "2024-04-01"
end_date = "2024-03-01"

[render]
width = 10
height = 100000

[pipeline]
poll_interval_ms = 5
"#;
    match ServiceConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            let joined = errors.join("\n");
            assert!(joined.contains("analysis.timeout_secs"), "{joined}");
            assert!(joined.contains("plain file name"), "{joined}");
            assert!(joined.contains("duplicated"), "{joined}");
            assert!(joined.contains("does not name a chart"), "{joined}");
            assert!(joined.contains("analysis.start_date"), "{joined}");
            assert!(joined.contains("render.width"), "{joined}");
            assert!(joined.contains("render.height"), "{joined}");
            assert!(joined.contains("pipeline.poll_interval_ms"), "{joined}");
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn unknown_keys_do_not_fail_loading() {
    let config = ServiceConfig::from_toml_str("[render]\nwidht = 800\n").unwrap();
    assert_eq!(config.render.width, ServiceConfig::default().render.width);
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn load_from_file_reports_path_on_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("airsight.toml");
    std::fs::write(&path, "[render\nwidth = ").unwrap();

    match ServiceConfig::load_from_file(&path) {
        Err(ConfigError::Parse(p, _)) => assert_eq!(p, path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = ServiceConfig::load_from_file(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("airsight.toml");
    let mut config = ServiceConfig::default();
    config.render.width = 800;
    config
        .pipeline
        .field_map
        .insert(Metric::Pm25, "pm2_5_atm".to_string());
    std::fs::write(&path, config.to_toml().unwrap()).unwrap();

    let loaded = ServiceConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.render.width, 800);
    assert_eq!(loaded.pipeline.field_name(Metric::Pm25), "pm2_5_atm");
}
