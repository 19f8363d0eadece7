//! Sample-data generators - fill in the readings file when the telemetry
//! collaborator has not produced one yet.
//!
//! [`SyntheticSampleGenerator`] is deterministic and offline (seeded RNG).
//! [`CommandSampleGenerator`] runs an external program instead.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{defaults, PipelineConfig};
use crate::readings::{write_readings, Reading, ReadingError};

/// Environment variable telling an external generator where to write.
pub const SAMPLE_OUTPUT_ENV: &str = "AIRSIGHT_SAMPLE_OUTPUT";

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Write(#[from] ReadingError),
    #[error("failed to start sample generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sample generator exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
    #[error("sample generator timed out after {0:?}")]
    Timeout(Duration),
    #[error("sample generator finished but {0} is missing or empty")]
    NoOutput(PathBuf),
}

/// Produces a readings file at `path` with the channel's schema.
#[async_trait]
pub trait SampleGenerator: Send + Sync {
    /// Write sample data to `path`. Returns the number of rows written, when known.
    async fn generate(&self, path: &Path, config: &PipelineConfig) -> Result<Option<usize>, SampleError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Synthetic
// ============================================================================

/// Uniform random readings, hourly, over the last `days` days.
#[derive(Debug, Clone)]
pub struct SyntheticSampleGenerator {
    pub seed: u64,
    pub days: i64,
    /// Series end. Defaults to the current hour.
    pub end: Option<DateTime<Utc>>,
}

impl Default for SyntheticSampleGenerator {
    fn default() -> Self {
        Self {
            seed: defaults::SAMPLE_SEED,
            days: defaults::SAMPLE_DAYS,
            end: None,
        }
    }
}

impl SyntheticSampleGenerator {
    /// Build the series without touching disk.
    pub fn readings(&self) -> Vec<Reading> {
        let now = Utc::now();
        let end = self
            .end
            .unwrap_or_else(|| now.duration_trunc(ChronoDuration::hours(1)).unwrap_or(now));
        let hours = self.days.max(0) * 24;
        let start = end - ChronoDuration::hours(hours);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let round = |v: f64| (v * 100.0).round() / 100.0;
        (0..hours)
            .map(|h| Reading {
                timestamp: start + ChronoDuration::hours(h),
                humidity: round(rng.gen_range(30.0..90.0)),
                temperature: round(rng.gen_range(15.0..35.0)),
                pm25: round(rng.gen_range(5.0..50.0)),
                pm10: round(rng.gen_range(10.0..100.0)),
            })
            .collect()
    }
}

#[async_trait]
impl SampleGenerator for SyntheticSampleGenerator {
    async fn generate(&self, path: &Path, config: &PipelineConfig) -> Result<Option<usize>, SampleError> {
        let readings = self.readings();
        write_readings(path, &readings, config)?;
        info!(path = %path.display(), rows = readings.len(), seed = self.seed, "Synthetic sample data written");
        Ok(Some(readings.len()))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

// ============================================================================
// External Command
// ============================================================================

/// Runs `program args..` with `AIRSIGHT_SAMPLE_OUTPUT=<path>` and checks the
/// file appeared.
#[derive(Debug, Clone)]
pub struct CommandSampleGenerator {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSampleGenerator {
    /// From a `[program, args..]` vector. `None` when empty.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl SampleGenerator for CommandSampleGenerator {
    async fn generate(&self, path: &Path, _config: &PipelineConfig) -> Result<Option<usize>, SampleError> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(SAMPLE_OUTPUT_ENV, path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SampleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SampleError::Timeout(self.timeout))?
            .map_err(|source| SampleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SampleError::Exited {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Sample generator output");

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => {
                info!(path = %path.display(), program = %self.program, "External sample data written");
                Ok(None)
            }
            _ => Err(SampleError::NoOutput(path.to_path_buf())),
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::load_readings;
    use tempfile::tempdir;

    #[test]
    fn test_synthetic_is_deterministic() {
        let end = crate::readings::parse_timestamp("2024-03-08T00:00:00Z").unwrap();
        let gen = SyntheticSampleGenerator {
            end: Some(end),
            ..Default::default()
        };
        let a = gen.readings();
        let b = gen.readings();
        assert_eq!(a, b);
        assert_eq!(a.len(), 7 * 24);
        assert_eq!(a.last().unwrap().timestamp, end - ChronoDuration::hours(1));
    }

    #[test]
    fn test_synthetic_ranges() {
        for r in SyntheticSampleGenerator::default().readings() {
            assert!((30.0..=90.0).contains(&r.humidity));
            assert!((15.0..=35.0).contains(&r.temperature));
            assert!((5.0..=50.0).contains(&r.pm25));
            assert!((10.0..=100.0).contains(&r.pm10));
            assert!(r.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_synthetic_file_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("air.csv");
        let config = PipelineConfig::default();
        let rows = SyntheticSampleGenerator::default()
            .generate(&path, &config)
            .await
            .unwrap();
        assert_eq!(rows, Some(168));
        let set = load_readings(&path, &config).unwrap();
        assert_eq!(set.readings.len(), 168);
        assert_eq!(set.rejected, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempdir().unwrap();
        let gen = CommandSampleGenerator {
            program: "/nonexistent/airsight-sample".to_string(),
            args: vec![],
            timeout: Duration::from_secs(5),
        };
        let err = gen
            .generate(&dir.path().join("x.csv"), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_that_writes_nothing_fails() {
        let dir = tempdir().unwrap();
        let gen = CommandSampleGenerator::from_argv(&["true".to_string()], Duration::from_secs(5)).unwrap();
        let err = gen
            .generate(&dir.path().join("x.csv"), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::NoOutput(_)));
    }
}
