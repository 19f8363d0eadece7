//! Analysis Orchestrator - one pipeline run as an explicit state machine
//!
//! ```text
//! Idle → PreparingInput ─┬─────────────────→ Invoking → AwaitingResult → Verifying → Completed
//!                        └→ GeneratingSample ┘                                     ↘ Failed
//! ```
//!
//! Guarantees:
//! - At most one run in flight. `run()` queues behind the active run (FIFO),
//!   `try_run()` returns `None` instead of waiting.
//! - Stale artifacts are deleted before the computation is launched, so a run
//!   never reports success on a previous run's output. Failures before that
//!   point leave prior artifacts untouched.
//! - Launch + wait share one deadline. On expiry the process is killed and the
//!   run fails with `Timeout`.
//! - Cancellation is honoured between states and while awaiting the process,
//!   which is then killed. A cancelled run removes whatever it already wrote.
//!   Dropping the future of `run()` counts as cancellation: the run still
//!   settles to `Idle` with a failed result and releases its slot.
//! - The output directory is claimed with an [`OutputLock`] for the whole
//!   run, so a second process never writes the same charts.
//! - The artifact verifier has the final word, whatever the process reported.
//! - Every path ends in a [`RunResult`]; nothing is raised to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::launcher::{AnalysisLauncher, ProcessOutput};
use super::verifier::{ArtifactVerifier, MissingReason};
use super::{partial_path, AnalysisParams, AnalysisReport, AnalysisRequest, ArtifactInfo};
use crate::config::{PipelineConfig, ReactiveConfigStore, ServiceConfig};
use crate::guideline::GuidelineTable;
use crate::readings::DateWindow;
use crate::render::{Background, RenderTarget, RenderTargetFactory};
use crate::sample::SampleGenerator;
use crate::storage::OutputLock;

// ============================================================================
// States & Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    PreparingInput,
    GeneratingSample,
    Invoking,
    AwaitingResult,
    Verifying,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::PreparingInput => "preparing_input",
            RunState::GeneratingSample => "generating_sample",
            RunState::Invoking => "invoking",
            RunState::AwaitingResult => "awaiting_result",
            RunState::Verifying => "verifying",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Ordered run diagnostics. Failure kinds carry the taxonomy names in `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Another writer holds the output directory; nothing was touched.
    OutputLocked { reason: String },
    /// Raw data was absent and sample data was produced instead.
    SampleDataGenerated { generator: String },
    /// Neither real nor sample data could be obtained.
    NoDataAvailable { reason: String },
    /// The computation could not be started or awaited.
    InvocationFailed { reason: String },
    /// Launch + wait exceeded the deadline; the process was killed.
    Timeout { after_ms: u64 },
    /// Stdout carried no parseable report.
    UnstructuredOutput,
    /// The process exited non-zero or its report said `success: false`.
    AnalysisReportedFailure {
        exit_code: Option<i32>,
        error: Option<String>,
    },
    ArtifactMissing { name: String, reason: MissingReason },
    Cancelled { during: RunState },
    CleanupFailed { name: String, reason: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::OutputLocked { reason } => write!(f, "OutputLocked: {reason}"),
            Diagnostic::SampleDataGenerated { generator } => {
                write!(f, "SampleDataGenerated: {generator}")
            }
            Diagnostic::NoDataAvailable { reason } => write!(f, "NoDataAvailable: {reason}"),
            Diagnostic::InvocationFailed { reason } => write!(f, "InvocationFailed: {reason}"),
            Diagnostic::Timeout { after_ms } => write!(f, "Timeout: exceeded {after_ms}ms"),
            Diagnostic::UnstructuredOutput => write!(f, "UnstructuredOutput"),
            Diagnostic::AnalysisReportedFailure { exit_code, error } => {
                write!(f, "AnalysisReportedFailure")?;
                if let Some(code) = exit_code {
                    write!(f, ": exit code {code}")?;
                }
                if let Some(e) = error {
                    write!(f, ": {e}")?;
                }
                Ok(())
            }
            Diagnostic::ArtifactMissing { name, reason } => write!(f, "ArtifactMissing({name}): {reason}"),
            Diagnostic::Cancelled { during } => write!(f, "Cancelled during {during}"),
            Diagnostic::CleanupFailed { name, reason } => write!(f, "CleanupFailed({name}): {reason}"),
        }
    }
}

/// Outcome of one run. Always produced, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub success: bool,
    pub state: RunState,
    /// Verified artifacts, in configured order.
    pub artifacts: Vec<ArtifactInfo>,
    pub diagnostics: Vec<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
}

impl RunResult {
    pub fn artifact_names(&self) -> BTreeSet<String> {
        self.artifacts.iter().map(|a| a.name.clone()).collect()
    }

    /// Diagnostics rendered as strings.
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }

    /// Names reported as `ArtifactMissing`.
    pub fn missing_artifacts(&self) -> Vec<&str> {
        self.diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::ArtifactMissing { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Published on every transition.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub runs_started: u64,
    pub last_result: Option<RunResult>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Where a run reads and writes.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub data_file: PathBuf,
    pub output_dir: PathBuf,
    pub artifacts: Vec<String>,
    pub timeout: Duration,
    pub background: Background,
    pub window: DateWindow,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            data_file: config.paths.data_file.clone(),
            output_dir: config.paths.output_dir.clone(),
            artifacts: config.analysis.artifacts.clone(),
            timeout: config.analysis.timeout(),
            background: config.render.background,
            window: config.analysis.window(),
        }
    }
}

pub struct AnalysisOrchestrator {
    settings: OrchestratorSettings,
    table: Arc<GuidelineTable>,
    targets: RenderTargetFactory,
    launcher: Arc<dyn AnalysisLauncher>,
    sample: Arc<dyn SampleGenerator>,
    config_store: Option<Arc<ReactiveConfigStore>>,
    verifier: ArtifactVerifier,
    /// Serialises runs; tokio's mutex wakes waiters in FIFO order.
    run_lock: tokio::sync::Mutex<()>,
    current_cancel: Mutex<Option<CancellationToken>>,
    status_tx: watch::Sender<RunStatus>,
}

impl AnalysisOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        table: Arc<GuidelineTable>,
        targets: RenderTargetFactory,
        launcher: Arc<dyn AnalysisLauncher>,
        sample: Arc<dyn SampleGenerator>,
    ) -> Self {
        let verifier = ArtifactVerifier::new(settings.output_dir.clone(), settings.artifacts.clone());
        let (status_tx, _) = watch::channel(RunStatus {
            state: RunState::Idle,
            run_id: None,
            runs_started: 0,
            last_result: None,
        });
        Self {
            settings,
            table,
            targets,
            launcher,
            sample,
            config_store: None,
            verifier,
            run_lock: tokio::sync::Mutex::new(()),
            current_cancel: Mutex::new(None),
            status_tx,
        }
    }

    /// Read the field map (and sample schema) from a live config store.
    pub fn with_config_store(mut self, store: Arc<ReactiveConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn verifier(&self) -> &ArtifactVerifier {
        &self.verifier
    }

    pub fn status(&self) -> RunStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// Whether a run currently holds the run slot.
    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Request cancellation of the active run. Returns whether one was active.
    pub fn cancel(&self) -> bool {
        match self.lock_cancel().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the pipeline, waiting for any active run to finish first.
    pub async fn run(&self) -> RunResult {
        let slot = self.run_lock.lock().await;
        self.run_exclusive(slot).await
    }

    /// Run only if no other run is active.
    pub async fn try_run(&self) -> Option<RunResult> {
        let slot = self.run_lock.try_lock().ok()?;
        Some(self.run_exclusive(slot).await)
    }

    async fn run_exclusive(&self, slot: MutexGuard<'_, ()>) -> RunResult {
        let token = CancellationToken::new();
        *self.lock_cancel() = Some(token.clone());

        let mut run = Run::new(self, token, slot);
        self.status_tx.send_modify(|s| {
            s.run_id = Some(run.id);
            s.runs_started += 1;
        });
        info!(run_id = %run.id, data_file = %self.settings.data_file.display(), "Analysis run started");

        let success = self.execute(&mut run).await;
        run.finish(success)
    }

    /// Publish a finished run and free the cancel slot.
    fn settle(&self, result: &RunResult) {
        *self.lock_cancel() = None;
        info!(
            run_id = %result.run_id,
            success = result.success,
            artifacts = result.artifacts.len(),
            diagnostics = ?result.messages(),
            "Analysis run finished"
        );
        self.status_tx.send_modify(|s| {
            s.state = RunState::Idle;
            s.last_result = Some(result.clone());
        });
    }

    fn pipeline_config(&self) -> PipelineConfig {
        self.config_store
            .as_ref()
            .map(|s| s.get())
            .unwrap_or_default()
    }

    fn params(&self, pipeline: &PipelineConfig) -> AnalysisParams {
        AnalysisParams {
            thresholds: self.table.thresholds().to_vec(),
            bands: self.table.bands().to_vec(),
            target: RenderTarget::clone(&self.targets.target(self.settings.background)),
            field_map: pipeline.field_map.clone(),
            artifacts: self.settings.artifacts.clone(),
            window: self.settings.window,
        }
    }

    /// Drive one run to a terminal state. Returns whether it completed.
    async fn execute(&self, run: &mut Run<'_>) -> bool {
        // PreparingInput
        run.enter(RunState::PreparingInput);
        match OutputLock::acquire(&self.settings.output_dir).await {
            Ok(lock) => run.output_lock = Some(lock),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Output directory is locked");
                run.push(Diagnostic::OutputLocked { reason: e.to_string() });
                return false;
            }
        }
        let pipeline = self.pipeline_config();
        if !is_file(&self.settings.data_file).await {
            run.enter(RunState::GeneratingSample);
            if let Err(reason) = self.generate_sample(&pipeline).await {
                run.push(Diagnostic::NoDataAvailable { reason });
                return false;
            }
            run.push(Diagnostic::SampleDataGenerated {
                generator: self.sample.name().to_string(),
            });
        }
        if run.cancelled() {
            return false;
        }

        // Output directory is ours from here on
        if let Err(diag) = self.remove_stale_artifacts().await {
            run.push(diag);
            return false;
        }
        run.output_claimed = true;
        if run.cancelled() {
            return false;
        }

        // Invoking
        run.enter(RunState::Invoking);
        let request = AnalysisRequest {
            input: self.settings.data_file.clone(),
            output_dir: self.settings.output_dir.clone(),
            params: self.params(&pipeline),
        };
        let deadline = Instant::now() + self.settings.timeout;
        let launched = tokio::time::timeout_at(deadline, self.launcher.launch(&request)).await;
        let mut handle = match launched {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                run.push(Diagnostic::InvocationFailed { reason: e.to_string() });
                return false;
            }
            Err(_) => {
                run.push(self.timeout_diagnostic());
                self.remove_partial_output(run).await;
                return false;
            }
        };

        // AwaitingResult
        run.enter(RunState::AwaitingResult);
        let cancel = run.cancel.clone();
        let waited = tokio::select! {
            waited = tokio::time::timeout_at(deadline, handle.wait()) => Some(waited),
            _ = cancel.cancelled() => None,
        };
        let Some(waited) = waited else {
            handle.terminate().await;
            run.cancelled();
            self.remove_partial_output(run).await;
            return false;
        };
        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                run.push(Diagnostic::InvocationFailed { reason: e.to_string() });
                return false;
            }
            Err(_) => {
                warn!(run_id = %run.id, timeout = ?self.settings.timeout, "Analysis timed out, terminating");
                handle.terminate().await;
                run.push(self.timeout_diagnostic());
                self.remove_partial_output(run).await;
                return false;
            }
        };
        drop(handle);
        self.interpret_output(run, output);
        if run.cancelled() {
            self.remove_partial_output(run).await;
            return false;
        }

        // Verifying
        run.enter(RunState::Verifying);
        let mut all_present = true;
        for status in self.verifier.check_all().await {
            match status.missing_reason() {
                None => {
                    let name = status.name();
                    let description = run
                        .report
                        .as_ref()
                        .and_then(|r| r.description_of(&name))
                        .map(str::to_string);
                    run.artifacts.push(ArtifactInfo {
                        name,
                        size_bytes: status.size_bytes,
                        modified: status.modified,
                        description,
                    });
                }
                Some(reason) => {
                    all_present = false;
                    run.push(Diagnostic::ArtifactMissing {
                        name: status.name(),
                        reason,
                    });
                }
            }
        }
        all_present
    }

    async fn generate_sample(&self, pipeline: &PipelineConfig) -> Result<(), String> {
        info!(
            path = %self.settings.data_file.display(),
            generator = self.sample.name(),
            "Raw data absent, generating sample data"
        );
        self.sample
            .generate(&self.settings.data_file, pipeline)
            .await
            .map_err(|e| e.to_string())?;
        if is_file(&self.settings.data_file).await {
            Ok(())
        } else {
            Err(format!(
                "generator '{}' reported success but {} is absent",
                self.sample.name(),
                self.settings.data_file.display()
            ))
        }
    }

    /// Delete last run's artifacts and make sure the output directory exists.
    async fn remove_stale_artifacts(&self) -> Result<(), Diagnostic> {
        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| Diagnostic::CleanupFailed {
                name: self.settings.output_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        for path in self.output_files() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed stale artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(cleanup_failed(&path, e)),
            }
        }
        Ok(())
    }

    /// Best-effort removal of artifacts written by an aborted run.
    async fn remove_partial_output(&self, run: &mut Run<'_>) {
        for path in self.output_files() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(run_id = %run.id, path = %path.display(), "Removed partial artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => run.push(cleanup_failed(&path, e)),
            }
        }
    }

    /// Every file a run may leave behind: the artifacts and their in-progress copies.
    fn output_files(&self) -> Vec<PathBuf> {
        self.settings
            .artifacts
            .iter()
            .flat_map(|name| {
                let path = self.verifier.path_of(name);
                [partial_path(&path), path]
            })
            .collect()
    }

    fn timeout_diagnostic(&self) -> Diagnostic {
        Diagnostic::Timeout {
            after_ms: u64::try_from(self.settings.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Structured output is advisory; anything else is logged and left to the verifier.
    fn interpret_output(&self, run: &mut Run<'_>, output: ProcessOutput) {
        let report = AnalysisReport::from_stdout(&output.stdout);
        if report.is_none() {
            debug!(
                run_id = %run.id,
                stdout = %output.stdout.trim(),
                stderr = %output.stderr.trim(),
                "Analysis produced no structured report"
            );
            run.push(Diagnostic::UnstructuredOutput);
        }

        let reported_ok = report.as_ref().map_or(true, |r| r.success);
        if !output.success || !reported_ok {
            let error = report
                .as_ref()
                .and_then(|r| r.error.clone())
                .or_else(|| Some(output.stderr.trim().to_string()).filter(|s| !s.is_empty()));
            warn!(run_id = %run.id, exit_code = ?output.exit_code, error = ?error, "Analysis reported failure");
            run.push(Diagnostic::AnalysisReportedFailure {
                exit_code: output.exit_code,
                error,
            });
        }
        run.report = report;
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

fn cleanup_failed(path: &Path, e: std::io::Error) -> Diagnostic {
    Diagnostic::CleanupFailed {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        reason: e.to_string(),
    }
}

/// Mutable bookkeeping for the run in flight.
///
/// Owns the run slot and the output lock. If the run is dropped before
/// [`Run::finish`], its `Drop` cancels, cleans up and settles it instead.
struct Run<'a> {
    orchestrator: &'a AnalysisOrchestrator,
    id: Uuid,
    state: RunState,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    diagnostics: Vec<Diagnostic>,
    artifacts: Vec<ArtifactInfo>,
    report: Option<AnalysisReport>,
    /// Stale artifacts are gone; anything in the output set is ours now.
    output_claimed: bool,
    finished: bool,
    output_lock: Option<OutputLock>,
    // Last field: released only after the output lock.
    _slot: MutexGuard<'a, ()>,
}

impl<'a> Run<'a> {
    fn new(orchestrator: &'a AnalysisOrchestrator, cancel: CancellationToken, slot: MutexGuard<'a, ()>) -> Self {
        Self {
            orchestrator,
            id: Uuid::new_v4(),
            state: RunState::Idle,
            started_at: Utc::now(),
            cancel,
            diagnostics: Vec::new(),
            artifacts: Vec::new(),
            report: None,
            output_claimed: false,
            finished: false,
            output_lock: None,
            _slot: slot,
        }
    }

    fn enter(&mut self, state: RunState) {
        info!(run_id = %self.id, from = %self.state, to = %state, "Run state transition");
        self.state = state;
        self.orchestrator.status_tx.send_modify(|s| s.state = state);
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Records a `Cancelled` diagnostic when cancellation was requested.
    fn cancelled(&mut self) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        warn!(run_id = %self.id, during = %self.state, "Run cancelled");
        self.push(Diagnostic::Cancelled { during: self.state });
        true
    }

    fn finish(&mut self, success: bool) -> RunResult {
        self.finished = true;
        self.enter(if success { RunState::Completed } else { RunState::Failed });
        self.output_lock = None;
        let result = RunResult {
            run_id: self.id,
            success,
            state: self.state,
            artifacts: std::mem::take(&mut self.artifacts),
            diagnostics: std::mem::take(&mut self.diagnostics),
            started_at: self.started_at,
            finished_at: Utc::now(),
            report: self.report.take(),
        };
        self.orchestrator.settle(&result);
        result
    }
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(run_id = %self.id, during = %self.state, "Run dropped before finishing");
        // Any launched process is killed when its handle drops
        self.cancel.cancel();
        self.push(Diagnostic::Cancelled { during: self.state });
        if self.output_claimed {
            for path in self.orchestrator.output_files() {
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(run_id = %self.id, path = %path.display(), "Removed partial artifact"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => self.push(cleanup_failed(&path, e)),
                }
            }
        }
        self.finish(false);
    }
}
