//! The analysis computation run inside `airsight-analyze`.
//!
//! Loads the readings file, keeps the configured date window, renders one
//! chart per requested artifact into the output directory and summarises the
//! series into an [`AnalysisReport`]. Charts are written under their partial
//! name and renamed into place so the dashboard never serves a half-written
//! file.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use super::{partial_path, AnalysisParams, AnalysisReport, ArtifactInfo, MeanAirQuality};
use crate::config::defaults::ANALYSIS_PARAMS_ENV;
use crate::config::Metric;
use crate::guideline::{GuidelineTable, Period, Pollutant};
use crate::readings::{load_readings, Reading, ReadingSummary};
use crate::render::chart::draw;
use crate::render::ChartKind;

/// Parameters from `AIRSIGHT_ANALYSIS_PARAMS`, or defaults when absent or
/// malformed.
pub fn params_from_env() -> AnalysisParams {
    match std::env::var(ANALYSIS_PARAMS_ENV) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed analysis parameters, using defaults");
            AnalysisParams::default()
        }),
        Err(_) => AnalysisParams::default(),
    }
}

/// Readings above the daily guideline, per pollutant.
pub fn count_exceedances(table: &GuidelineTable, readings: &[Reading]) -> BTreeMap<Pollutant, usize> {
    Pollutant::ALL
        .iter()
        .map(|p| {
            let n = readings
                .iter()
                .filter(|r| {
                    let v = match p {
                        Pollutant::Pm25 => r.pm25,
                        Pollutant::Pm10 => r.pm10,
                    };
                    table.guideline_exceeded(*p, Period::Daily, v)
                })
                .count();
            (*p, n)
        })
        .collect()
}

/// Level of each pollutant's mean over the summarised readings.
pub fn mean_air_quality(table: &GuidelineTable, summary: &ReadingSummary) -> BTreeMap<Pollutant, MeanAirQuality> {
    Pollutant::ALL
        .iter()
        .filter_map(|p| {
            let metric = match p {
                Pollutant::Pm25 => Metric::Pm25,
                Pollutant::Pm10 => Metric::Pm10,
            };
            let mean = summary.metric(metric)?.mean;
            Some((*p, MeanAirQuality::classify(table, *p, mean)?))
        })
        .collect()
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<u64> {
    let tmp = partial_path(path);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(contents.len() as u64)
}

/// Run the whole computation. Never panics on bad input; failures come back
/// as a report with `success: false`.
pub fn run_analysis(input: &Path, output_dir: &Path, params: &AnalysisParams) -> AnalysisReport {
    let table = match GuidelineTable::with_epa_breakpoints(params.thresholds.clone(), params.bands.clone()) {
        Ok(t) => t,
        Err(e) => return AnalysisReport::failure(format!("guideline table: {e}")),
    };
    let mut charts = Vec::with_capacity(params.artifacts.len());
    for name in &params.artifacts {
        match ChartKind::from_artifact(name) {
            Some(kind) => charts.push((name.as_str(), kind)),
            None => return AnalysisReport::failure(format!("no chart is drawn as '{name}'")),
        }
    }

    let set = match load_readings(input, &params.pipeline_config()) {
        Ok(set) => set,
        Err(e) => return AnalysisReport::failure(e.to_string()),
    };
    let loaded = set.readings.len();
    let readings = params.window.apply(set.readings);
    if readings.len() < loaded {
        info!(
            kept = readings.len(),
            outside = loaded - readings.len(),
            start = ?params.window.start,
            end = ?params.window.end,
            "Applied date window"
        );
    }
    let summary = ReadingSummary::from_readings(&readings);

    if let Err(e) = std::fs::create_dir_all(output_dir) {
        return AnalysisReport::failure(format!("cannot create {}: {e}", output_dir.display()));
    }

    let mut artifacts = Vec::with_capacity(charts.len());
    for (name, kind) in charts {
        let chart = draw(kind, &params.target, &table, &readings);
        match write_atomic(&output_dir.join(name), &chart.svg) {
            Ok(size_bytes) => artifacts.push(ArtifactInfo {
                name: name.to_string(),
                size_bytes,
                modified: None,
                description: Some(chart.description),
            }),
            Err(e) => {
                return AnalysisReport {
                    artifacts,
                    ..AnalysisReport::failure(format!("cannot write {name}: {e}"))
                }
            }
        }
    }

    let exceedances = count_exceedances(&table, &readings);
    let air_quality = summary
        .as_ref()
        .map(|s| mean_air_quality(&table, s))
        .unwrap_or_default();
    info!(
        readings = readings.len(),
        rejected = set.rejected,
        exceedances = ?exceedances,
        "Charts rendered"
    );
    AnalysisReport {
        success: true,
        artifacts,
        readings: readings.len(),
        rejected: set.rejected,
        exceedances,
        air_quality,
        summary,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::sample::SyntheticSampleGenerator;
    use tempfile::tempdir;

    fn week_of_readings(dir: &Path) -> std::path::PathBuf {
        let input = dir.join("air.csv");
        let readings = SyntheticSampleGenerator {
            end: Some(crate::readings::parse_timestamp("2024-03-08T12:00:00Z").unwrap()),
            ..Default::default()
        }
        .readings();
        crate::readings::write_readings(&input, &readings, &PipelineConfig::default()).unwrap();
        input
    }

    #[test]
    fn test_renders_every_chart_kind() {
        let dir = tempdir().unwrap();
        let input = week_of_readings(dir.path());

        let out = dir.path().join("images");
        let report = run_analysis(&input, &out, &AnalysisParams::default());
        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.readings, 168);
        assert_eq!(report.artifacts.len(), ChartKind::ALL.len());
        for a in &report.artifacts {
            let meta = std::fs::metadata(out.join(&a.name)).unwrap();
            assert_eq!(meta.len(), a.size_bytes);
            assert!(a.size_bytes > 0);
            assert!(a.description.as_deref().is_some_and(|d| !d.is_empty()), "{}", a.name);
            assert!(!partial_path(&out.join(&a.name)).exists());
        }
        assert_eq!(report.summary.unwrap().daily.len(), 8);

        let pm25 = &report.air_quality[&Pollutant::Pm25];
        assert!(pm25.mean > 0.0);
        assert!(!pm25.level.is_empty());
        assert!(report.air_quality.contains_key(&Pollutant::Pm10));
    }

    #[test]
    fn test_date_window_limits_readings() {
        let dir = tempdir().unwrap();
        let input = week_of_readings(dir.path());
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 5);
        let params = AnalysisParams {
            artifacts: vec!["time_series.svg".to_string()],
            window: crate::readings::DateWindow { start: day, end: day },
            ..Default::default()
        };

        let report = run_analysis(&input, &dir.path().join("images"), &params);
        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.readings, 24);
        let description = report.description_of("time_series.svg").unwrap();
        assert!(description.contains("2024-03-05 to 2024-03-05"), "{description}");
    }

    #[test]
    fn test_unknown_artifact_name_fails_before_writing() {
        let dir = tempdir().unwrap();
        let input = week_of_readings(dir.path());
        let out = dir.path().join("images");
        let params = AnalysisParams {
            artifacts: vec!["time_series.svg".to_string(), "radar.svg".to_string()],
            ..Default::default()
        };
        let report = run_analysis(&input, &out, &params);
        assert!(!report.success);
        assert!(report.error.unwrap().contains("radar.svg"));
        assert!(!out.join("time_series.svg").exists());
    }

    #[test]
    fn test_missing_input_reports_failure() {
        let dir = tempdir().unwrap();
        let report = run_analysis(&dir.path().join("nope.csv"), dir.path(), &AnalysisParams::default());
        assert!(!report.success);
        assert!(report.error.is_some());
        assert!(report.artifacts.is_empty());
    }

    #[test]
    fn test_broken_bands_report_failure() {
        let dir = tempdir().unwrap();
        let params = AnalysisParams {
            bands: Vec::new(),
            ..Default::default()
        };
        let report = run_analysis(&dir.path().join("x.csv"), dir.path(), &params);
        assert!(report.error.unwrap().contains("guideline table"));
    }

    #[test]
    fn test_exceedance_counts() {
        let table = GuidelineTable::who_2021().unwrap();
        let ts = crate::readings::parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let r = |pm25: f64, pm10: f64| Reading {
            timestamp: ts,
            pm25,
            pm10,
            temperature: 20.0,
            humidity: 50.0,
        };
        let counts = count_exceedances(&table, &[r(20.0, 10.0), r(10.0, 50.0), r(15.0, 45.0)]);
        assert_eq!(counts[&Pollutant::Pm25], 1);
        assert_eq!(counts[&Pollutant::Pm10], 1);
    }
}
