//! Artifact Verifier - read-only post-condition checks on chart artifacts.
//!
//! An artifact is verified only when it exists and is non-empty. A zero-byte
//! file fails verification just like a missing one, but the two are reported
//! with different reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Why an artifact failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    NotFound,
    Empty,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::NotFound => write!(f, "not found"),
            MissingReason::Empty => write!(f, "empty"),
        }
    }
}

/// Result of checking one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl ArtifactStatus {
    pub fn verified(&self) -> bool {
        self.exists && self.size_bytes > 0
    }

    pub fn missing_reason(&self) -> Option<MissingReason> {
        match (self.exists, self.size_bytes) {
            (false, _) => Some(MissingReason::NotFound),
            (true, 0) => Some(MissingReason::Empty),
            _ => None,
        }
    }

    /// File name component, for diagnostics.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Check one artifact path. Directories and unreadable entries count as absent.
pub fn verify(path: &Path) -> ArtifactStatus {
    status_of(path, std::fs::metadata(path))
}

/// [`verify`] without blocking the runtime.
pub async fn check(path: &Path) -> ArtifactStatus {
    status_of(path, tokio::fs::metadata(path).await)
}

fn status_of(path: &Path, metadata: std::io::Result<std::fs::Metadata>) -> ArtifactStatus {
    match metadata {
        Ok(meta) if meta.is_file() => ArtifactStatus {
            path: path.to_path_buf(),
            exists: true,
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        },
        _ => ArtifactStatus {
            path: path.to_path_buf(),
            exists: false,
            size_bytes: 0,
            modified: None,
        },
    }
}

/// The well-known artifact set of one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    output_dir: PathBuf,
    expected: Vec<String>,
}

impl ArtifactVerifier {
    pub fn new(output_dir: impl Into<PathBuf>, expected: Vec<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            expected,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Status of every expected artifact, in configured order.
    pub fn verify_all(&self) -> Vec<ArtifactStatus> {
        self.expected.iter().map(|n| verify(&self.path_of(n))).collect()
    }

    pub async fn check_all(&self) -> Vec<ArtifactStatus> {
        let mut statuses = Vec::with_capacity(self.expected.len());
        for name in &self.expected {
            statuses.push(check(&self.path_of(name)).await);
        }
        statuses
    }

    pub fn all_verified(&self) -> bool {
        self.verify_all().iter().all(ArtifactStatus::verified)
    }
}
