//! Analysis - the external chart computation and the pipeline around it.
//!
//! - [`launcher`]: the seam for starting the computation as a child process
//! - [`orchestrator`]: the run state machine (`Idle → … → Completed | Failed`)
//! - [`verifier`]: artifact post-condition checks
//! - [`compute`]: the computation itself, run by the `airsight-analyze` binary
//!
//! The orchestrator and the computation share one wire contract: the
//! computation receives [`AnalysisParams`] as JSON in an environment variable
//! and may print one [`AnalysisReport`] JSON line on stdout. Charts are
//! written under [`partial_path`] first and renamed into place.

pub mod compute;
pub mod launcher;
pub mod orchestrator;
pub mod verifier;

pub use launcher::{AnalysisHandle, AnalysisLauncher, CommandLauncher, LaunchError, ProcessOutput};
pub use orchestrator::{AnalysisOrchestrator, Diagnostic, OrchestratorSettings, RunResult, RunState, RunStatus};
pub use verifier::{verify, ArtifactStatus, ArtifactVerifier, MissingReason};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{Metric, PipelineConfig};
use crate::guideline::{epa_bands, who_2021_thresholds, AqiBand, GuidelineTable, GuidelineThreshold, Pollutant, AQI_MAX};
use crate::readings::{DateWindow, ReadingSummary};
use crate::render::{ChartKind, RenderTarget};

/// Name a chart is written under before it is renamed into place.
pub fn partial_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Parameters handed to the analysis computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub thresholds: Vec<GuidelineThreshold>,
    pub bands: Vec<AqiBand>,
    pub target: RenderTarget,
    /// Column names for each metric in the input file.
    pub field_map: BTreeMap<Metric, String>,
    /// Well-known artifact file names; each one selects a [`ChartKind`].
    pub artifacts: Vec<String>,
    /// Only readings dated inside this window are charted.
    #[serde(default)]
    pub window: DateWindow,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            thresholds: who_2021_thresholds(),
            bands: epa_bands(),
            target: RenderTarget::default(),
            field_map: PipelineConfig::default().field_map,
            artifacts: ChartKind::ALL.iter().map(|k| k.artifact().to_string()).collect(),
            window: DateWindow::default(),
        }
    }
}

impl AnalysisParams {
    /// Pipeline config view carrying just the field map, for the readings loader.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            field_map: self.field_map.clone(),
            ..PipelineConfig::default()
        }
    }
}

/// One launch of the computation.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub params: AnalysisParams,
}

/// Artifact entry reported by the computation or the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    /// One-paragraph reading of the chart for the dashboard caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// AQI band of a pollutant's mean concentration over the charted window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanAirQuality {
    pub mean: f64,
    pub index: u32,
    pub level: String,
    pub color: String,
    /// The mean lies past the last breakpoint of the index scale.
    #[serde(default)]
    pub beyond_scale: bool,
}

impl MeanAirQuality {
    /// `None` for a mean that cannot be classified (no readings).
    pub fn classify(table: &GuidelineTable, pollutant: Pollutant, mean: f64) -> Option<Self> {
        let index = table.aqi_index(pollutant, mean).ok()?;
        let band = table.band_for_index(index);
        Some(Self {
            mean,
            index,
            level: band.label.clone(),
            color: band.color.hex(),
            beyond_scale: index > AQI_MAX,
        })
    }
}

/// Structured stdout of the computation. Advisory: artifacts on disk decide
/// the run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<ArtifactInfo>,
    #[serde(default)]
    pub readings: usize,
    #[serde(default)]
    pub rejected: usize,
    /// Readings above the daily guideline, per pollutant.
    #[serde(default)]
    pub exceedances: BTreeMap<Pollutant, usize>,
    /// Air quality level of each pollutant's mean.
    #[serde(default)]
    pub air_quality: BTreeMap<Pollutant, MeanAirQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReadingSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisReport {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            artifacts: Vec::new(),
            readings: 0,
            rejected: 0,
            exceedances: BTreeMap::new(),
            air_quality: BTreeMap::new(),
            summary: None,
            error: Some(error.into()),
        }
    }

    /// Last stdout line that parses as a report.
    pub fn from_stdout(stdout: &str) -> Option<Self> {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|l| l.starts_with('{'))
            .find_map(|l| serde_json::from_str(l).ok())
    }

    /// Description the computation gave for `name`, if any.
    pub fn description_of(&self, name: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.description.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_found_after_log_lines() {
        let stdout = "loading...\n{\"success\":true,\"readings\":3}\ntrailing noise\n";
        let report = AnalysisReport::from_stdout(stdout).unwrap();
        assert!(report.success);
        assert_eq!(report.readings, 3);
    }

    #[test]
    fn test_unstructured_stdout() {
        assert!(AnalysisReport::from_stdout("plain text only").is_none());
        assert!(AnalysisReport::from_stdout("{not json").is_none());
        assert!(AnalysisReport::from_stdout("").is_none());
    }

    #[test]
    fn test_partial_path_keeps_the_artifact_name() {
        let p = partial_path(Path::new("/srv/images/time_series.svg"));
        assert_eq!(p, PathBuf::from("/srv/images/time_series.svg.tmp"));
    }

    #[test]
    fn test_mean_air_quality_levels() {
        let table = GuidelineTable::who_2021().unwrap();
        let moderate = MeanAirQuality::classify(&table, Pollutant::Pm25, 20.0).unwrap();
        assert_eq!(moderate.level, "Moderate");
        assert_eq!(moderate.color, "#ffff00");
        assert!(!moderate.beyond_scale);

        let off_scale = MeanAirQuality::classify(&table, Pollutant::Pm25, 5_000.0).unwrap();
        assert_eq!(off_scale.level, "Hazardous");
        assert!(off_scale.beyond_scale);

        assert!(MeanAirQuality::classify(&table, Pollutant::Pm10, f64::NAN).is_none());
    }

    #[test]
    fn test_description_lookup() {
        let report = AnalysisReport {
            success: true,
            artifacts: vec![ArtifactInfo {
                name: "heatmap.svg".to_string(),
                size_bytes: 10,
                modified: None,
                description: Some("worst on Mondays".to_string()),
            }],
            ..AnalysisReport::failure("unused")
        };
        assert_eq!(report.description_of("heatmap.svg"), Some("worst on Mondays"));
        assert_eq!(report.description_of("time_series.svg"), None);
    }

    #[test]
    fn test_params_json_round_trip() {
        let params = AnalysisParams {
            window: DateWindow {
                start: chrono::NaiveDate::from_ymd_opt(2024, 3, 1),
                end: None,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: AnalysisParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
