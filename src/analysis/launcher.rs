//! Launcher seam for the analysis computation.
//!
//! `launch` starts the process and returns a handle; `wait` collects its
//! output; `terminate` kills it. Splitting launch from wait lets the
//! orchestrator tell "could not start" apart from "started but failed", and
//! lets it kill a process that overran its deadline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::AnalysisRequest;
use crate::config::defaults::ANALYSIS_PARAMS_ENV;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode analysis parameters: {0}")]
    Params(#[from] serde_json::Error),
    #[error("failed waiting for analysis process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A started analysis process.
#[async_trait]
pub trait AnalysisHandle: Send {
    /// Wait for exit. Cancel-safe: dropping the future leaves the process running
    /// until `terminate` (or drop of the handle).
    async fn wait(&mut self) -> Result<ProcessOutput, LaunchError>;

    /// Kill the process and reap it.
    async fn terminate(&mut self);
}

/// Starts the analysis computation.
#[async_trait]
pub trait AnalysisLauncher: Send + Sync {
    async fn launch(&self, request: &AnalysisRequest) -> Result<Box<dyn AnalysisHandle>, LaunchError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Child Process
// ============================================================================

/// Runs `program [args..] <input> <output_dir>` with the parameters in
/// `AIRSIGHT_ANALYSIS_PARAMS`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve a bare command name against the directory of the running
    /// executable first, so the bundled `airsight-analyze` is found without
    /// being on `PATH`.
    pub fn resolve(command: &str, args: Vec<String>) -> Self {
        let program = sibling_executable(command).unwrap_or_else(|| PathBuf::from(command));
        Self::new(program, args)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn sibling_executable(command: &str) -> Option<PathBuf> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        return None;
    }
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    let candidate = dir.join(format!("{command}{}", std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

#[async_trait]
impl AnalysisLauncher for CommandLauncher {
    async fn launch(&self, request: &AnalysisRequest) -> Result<Box<dyn AnalysisHandle>, LaunchError> {
        let params = serde_json::to_string(&request.params)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.input)
            .arg(&request.output_dir)
            .env(ANALYSIS_PARAMS_ENV, params)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        debug!(program = %self.program.display(), pid = ?child.id(), "Analysis process started");
        let stdout = child.stdout.take().map(|s| tokio::spawn(read_all(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_all(s)));
        Ok(Box::new(ChildHandle { child, stdout, stderr }))
    }

    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("analysis")
    }
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Analysis output stream closed with error");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

struct ChildHandle {
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[async_trait]
impl AnalysisHandle for ChildHandle {
    async fn wait(&mut self) -> Result<ProcessOutput, LaunchError> {
        let status = self.child.wait().await.map_err(LaunchError::Wait)?;
        let stdout = collect(self.stdout.take()).await;
        let stderr = collect(self.stderr.take()).await;
        Ok(ProcessOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill analysis process");
        }
        // Grandchildren may still hold the pipes open
        for task in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisParams;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            input: PathBuf::from("in.csv"),
            output_dir: PathBuf::from("out"),
            params: AnalysisParams::default(),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_launch() {
        let launcher = CommandLauncher::new("/nonexistent/airsight-analyze", vec![]);
        assert!(matches!(
            launcher.launch(&request()).await,
            Err(LaunchError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_and_params_reach_process() {
        let launcher = CommandLauncher::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("echo \"$1 $2\"; printf %s \"${ANALYSIS_PARAMS_ENV}\" | head -c 1"),
                "analysis".to_string(),
            ],
        );
        let mut handle = launcher.launch(&request()).await.unwrap();
        let output = handle.wait().await.unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "in.csv out\n{");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_stops_process() {
        let launcher = CommandLauncher::new("sh", vec!["-c".to_string(), "exec sleep 30".to_string()]);
        let mut handle = launcher.launch(&request()).await.unwrap();
        let waited = tokio::time::timeout(std::time::Duration::from_millis(100), handle.wait()).await;
        assert!(waited.is_err());
        handle.terminate().await;
        let output = handle.wait().await.unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_path_commands_are_not_resolved() {
        let launcher = CommandLauncher::resolve("./bin/analyze", vec![]);
        assert_eq!(launcher.program(), Path::new("./bin/analyze"));
    }
}
