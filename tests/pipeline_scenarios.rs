//! End-to-end pipeline runs against real child processes.
//!
//! The bundled `airsight-analyze` binary covers the happy paths; small `sh`
//! scripts stand in for misbehaving computations.

#![cfg(unix)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use airsight::analysis::{
    AnalysisOrchestrator, CommandLauncher, Diagnostic, MissingReason, OrchestratorSettings, RunState,
};
use airsight::config::{PipelineConfig, RenderConfig};
use airsight::guideline::GuidelineTable;
use airsight::readings::{parse_timestamp, write_readings, DateWindow};
use airsight::render::{Background, ChartKind, RenderTargetFactory};
use airsight::sample::SyntheticSampleGenerator;
use tempfile::{tempdir, TempDir};

const SERIES: &str = "time_series.svg";
const TREND: &str = "pm25_trend.svg";

fn settings(dir: &Path, timeout: Duration) -> OrchestratorSettings {
    OrchestratorSettings {
        data_file: dir.join("data").join("air_quality_data.csv"),
        output_dir: dir.join("images"),
        artifacts: vec![SERIES.to_string(), TREND.to_string()],
        timeout,
        background: Background::OpaqueWhite,
        window: DateWindow::default(),
    }
}

fn orchestrator(dir: &Path, launcher: CommandLauncher, timeout: Duration) -> AnalysisOrchestrator {
    orchestrator_with(settings(dir, timeout), launcher)
}

fn orchestrator_with(settings: OrchestratorSettings, launcher: CommandLauncher) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        settings,
        Arc::new(GuidelineTable::who_2021().unwrap()),
        RenderTargetFactory::new(&RenderConfig::default()),
        Arc::new(launcher),
        Arc::new(SyntheticSampleGenerator::default()),
    )
}

fn bundled_analysis() -> CommandLauncher {
    CommandLauncher::new(env!("CARGO_BIN_EXE_airsight-analyze"), Vec::new())
}

/// `sh -c <script>` receiving the input file as `$1` and the output dir as `$2`.
fn script(body: &str) -> CommandLauncher {
    CommandLauncher::new("sh", vec!["-c".to_string(), body.to_string(), "analysis".to_string()])
}

fn seed_data(dir: &TempDir) {
    let end = parse_timestamp("2024-03-08T12:00:00Z").unwrap();
    let readings = SyntheticSampleGenerator {
        end: Some(end),
        ..Default::default()
    }
    .readings();
    let path = dir.path().join("data").join("air_quality_data.csv");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_readings(&path, &readings, &PipelineConfig::default()).unwrap();
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Bundled Computation
// ============================================================================

#[tokio::test]
async fn test_existing_data_renders_both_charts() {
    let dir = tempdir().unwrap();
    seed_data(&dir);
    let orch = orchestrator(dir.path(), bundled_analysis(), Duration::from_secs(60));

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.artifact_names(), names(&[SERIES, TREND]));
    assert!(!result
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::SampleDataGenerated { .. })));

    let report = result.report.expect("structured report");
    assert_eq!(report.readings, 168);
    for name in [SERIES, TREND] {
        let svg = std::fs::read_to_string(dir.path().join("images").join(name)).unwrap();
        assert!(svg.starts_with("<?xml"), "{name} has no XML declaration");
        assert!(svg.contains("<svg"), "{name} is not an SVG document");
        assert!(svg.contains(r##"fill="#ffffff""##), "{name} lost its white canvas");
    }
}

#[tokio::test]
async fn test_every_chart_kind_is_rendered_and_described() {
    let dir = tempdir().unwrap();
    seed_data(&dir);
    let mut all = settings(dir.path(), Duration::from_secs(60));
    all.artifacts = ChartKind::ALL.iter().map(|k| k.artifact().to_string()).collect();
    let orch = orchestrator_with(all, bundled_analysis());

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    assert_eq!(result.artifacts.len(), ChartKind::ALL.len());
    for artifact in &result.artifacts {
        let description = artifact.description.as_deref().unwrap_or_default();
        assert!(!description.is_empty(), "{} has no description", artifact.name);
    }
    let report = result.report.expect("structured report");
    assert!(!report.air_quality.is_empty());
}

#[tokio::test]
async fn test_transparent_background_reaches_the_charts() {
    let dir = tempdir().unwrap();
    seed_data(&dir);
    let mut transparent = settings(dir.path(), Duration::from_secs(60));
    transparent.background = Background::Transparent;
    let orch = orchestrator_with(transparent, bundled_analysis());

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    for name in [SERIES, TREND] {
        let svg = std::fs::read_to_string(dir.path().join("images").join(name)).unwrap();
        assert!(!svg.contains(r##"fill="#ffffff""##), "{name} has an opaque canvas");
    }
}

#[tokio::test]
async fn test_date_window_limits_the_charted_readings() {
    let dir = tempdir().unwrap();
    seed_data(&dir);
    let mut one_day = settings(dir.path(), Duration::from_secs(60));
    let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 5);
    one_day.window = DateWindow { start: day, end: day };
    let orch = orchestrator_with(one_day, bundled_analysis());

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    assert_eq!(result.report.expect("structured report").readings, 24);
}

#[tokio::test]
async fn test_missing_data_generates_sample_before_analysis() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(dir.path(), bundled_analysis(), Duration::from_secs(60));

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    assert!(matches!(
        result.diagnostics.first(),
        Some(Diagnostic::SampleDataGenerated { .. })
    ));
    assert!(dir.path().join("data").join("air_quality_data.csv").is_file());
    assert_eq!(result.artifact_names(), names(&[SERIES, TREND]));
}

#[tokio::test]
async fn test_repeat_runs_produce_the_same_artifact_set() {
    let dir = tempdir().unwrap();
    seed_data(&dir);
    let orch = orchestrator(dir.path(), bundled_analysis(), Duration::from_secs(60));

    let first = orch.run().await;
    // Keep the two runs' mtimes apart on coarse-grained filesystems
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = orch.run().await;
    assert!(first.success && second.success);
    assert_eq!(first.artifact_names(), second.artifact_names());
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(orch.status().runs_started, 2);

    for (old, new) in first.artifacts.iter().zip(&second.artifacts) {
        assert_eq!(old.name, new.name);
        let (old_at, new_at) = (old.modified.unwrap(), new.modified.unwrap());
        assert!(new_at > old_at, "{} was not rewritten by the second run", new.name);
        assert!(new_at >= second.started_at - chrono::Duration::seconds(1));
    }
}

// ============================================================================
// Misbehaving Computations
// ============================================================================

#[tokio::test]
async fn test_partial_output_reports_the_missing_artifact() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(
        dir.path(),
        script(r#"printf '<svg/>' > "$2/time_series.svg""#),
        Duration::from_secs(10),
    );

    let result = orch.run().await;
    assert!(!result.success);
    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.missing_artifacts(), vec![TREND]);
    assert_eq!(result.artifact_names(), names(&[SERIES]));
    assert!(result.diagnostics.contains(&Diagnostic::UnstructuredOutput));
}

#[tokio::test]
async fn test_empty_artifact_fails_verification() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(
        dir.path(),
        script(r#"printf '<svg/>' > "$2/time_series.svg"; : > "$2/pm25_trend.svg""#),
        Duration::from_secs(10),
    );

    let result = orch.run().await;
    assert!(!result.success);
    assert!(result.diagnostics.contains(&Diagnostic::ArtifactMissing {
        name: TREND.to_string(),
        reason: MissingReason::Empty,
    }));
}

#[tokio::test]
async fn test_artifacts_on_disk_outrank_exit_status() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(
        dir.path(),
        script(
            r#"printf '<svg/>' > "$2/time_series.svg"
printf '<svg/>' > "$2/pm25_trend.svg"
echo '{"success":false,"error":"font missing"}'
exit 3"#,
        ),
        Duration::from_secs(10),
    );

    let result = orch.run().await;
    assert!(result.success, "{:?}", result.messages());
    assert!(result.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::AnalysisReportedFailure { exit_code: Some(3), error: Some(e) } if e == "font missing"
    )));
}

#[tokio::test]
async fn test_stale_artifacts_never_count_as_fresh() {
    let dir = tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join(SERIES), b"<svg>old</svg>").unwrap();
    std::fs::write(images.join(TREND), b"<svg>old</svg>").unwrap();

    let orch = orchestrator(dir.path(), script("exit 0"), Duration::from_secs(10));
    let result = orch.run().await;
    assert!(!result.success);
    assert_eq!(result.missing_artifacts(), vec![SERIES, TREND]);
}

#[tokio::test]
async fn test_timeout_kills_the_analysis() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(dir.path(), script("exec sleep 30"), Duration::from_secs(1));

    let started = Instant::now();
    let result = orch.run().await;
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(!result.success);
    assert!(result.diagnostics.contains(&Diagnostic::Timeout { after_ms: 1000 }));
    assert!(result.artifacts.is_empty());
}

#[tokio::test]
async fn test_missing_program_is_invocation_failure() {
    let dir = tempdir().unwrap();
    let orch = orchestrator(
        dir.path(),
        CommandLauncher::new(dir.path().join("no-such-analysis"), Vec::new()),
        Duration::from_secs(10),
    );

    let result = orch.run().await;
    assert!(!result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::InvocationFailed { .. })));
    assert!(result.messages().iter().any(|m| m.starts_with("InvocationFailed")));
}

// ============================================================================
// Exclusivity
// ============================================================================

#[tokio::test]
async fn test_concurrent_runs_never_overlap() {
    let dir = tempdir().unwrap();
    let overlap = dir.path().join("overlap");
    let body = format!(
        r#"[ -e "$2/.busy" ] && echo overlap >> "{overlap}"
touch "$2/.busy"
sleep 0.3
printf '<svg/>' > "$2/time_series.svg"
printf '<svg/>' > "$2/pm25_trend.svg"
rm "$2/.busy""#,
        overlap = overlap.display()
    );
    let orch = Arc::new(orchestrator(dir.path(), script(&body), Duration::from_secs(10)));

    let (a, b) = tokio::join!(orch.run(), orch.run());
    assert!(a.success, "{:?}", a.messages());
    assert!(b.success, "{:?}", b.messages());
    assert!(!overlap.exists(), "two analysis processes ran at once");
    assert_eq!(orch.status().runs_started, 2);
    assert_eq!(orch.status().state, RunState::Idle);
}

#[tokio::test]
async fn test_try_run_skips_while_a_run_is_active() {
    let dir = tempdir().unwrap();
    let orch = Arc::new(orchestrator(
        dir.path(),
        script(
            r#"sleep 0.5
printf '<svg/>' > "$2/time_series.svg"
printf '<svg/>' > "$2/pm25_trend.svg""#,
        ),
        Duration::from_secs(10),
    ));

    let mut status = orch.subscribe_status();
    let background = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run().await }
    });
    status
        .wait_for(|s| s.state == RunState::AwaitingResult)
        .await
        .unwrap();

    assert!(orch.is_busy());
    assert!(orch.try_run().await.is_none());
    assert!(background.await.unwrap().success);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn test_second_orchestrator_on_the_same_output_is_refused() {
    let dir = tempdir().unwrap();
    let slow = r#"sleep 0.5
printf '<svg/>' > "$2/time_series.svg"
printf '<svg/>' > "$2/pm25_trend.svg""#;
    let first = Arc::new(orchestrator(dir.path(), script(slow), Duration::from_secs(10)));
    let second = orchestrator(dir.path(), script(slow), Duration::from_secs(10));

    let mut status = first.subscribe_status();
    let background = tokio::spawn({
        let first = first.clone();
        async move { first.run().await }
    });
    status
        .wait_for(|s| s.state == RunState::AwaitingResult)
        .await
        .unwrap();

    let refused = second.run().await;
    assert!(!refused.success);
    assert!(matches!(refused.diagnostics[..], [Diagnostic::OutputLocked { .. }]));
    assert!(background.await.unwrap().success);
    assert!(second.run().await.success);
}
