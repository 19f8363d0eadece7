//! Sensor readings - delimited-text load/write and summary statistics
//!
//! The telemetry collaborator drops a header + rows file at a known path:
//!
//! ```text
//! created_at,entry_id,field1,field2,field3,field4
//! 2024-03-01T00:00:00Z,1,54.2,22.1,18.4,31.0
//! ```
//!
//! Metric columns are found through the pipeline field map, falling back to
//! the canonical names (`pm25`, `pm10`, `temperature`, `humidity`). Rows that
//! violate the reading invariants are rejected and counted, never coerced.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{Metric, PipelineConfig};

/// Timestamp column written by the telemetry channel.
pub const TIMESTAMP_COLUMN: &str = "created_at";

/// Column order used when writing a readings file.
const WRITE_ORDER: [Metric; 4] = [
    Metric::Humidity,
    Metric::Temperature,
    Metric::Pm25,
    Metric::Pm10,
];

/// Parse-error lines logged individually before going quiet.
const MAX_LOGGED_REJECTS: usize = 10;

/// One timestamped sensor sample. Immutable once read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// µg/m³, ≥ 0
    pub pm25: f64,
    /// µg/m³, ≥ 0
    pub pm10: f64,
    /// °C
    pub temperature: f64,
    /// %RH in [0, 100]
    pub humidity: f64,
}

impl Reading {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Pm25 => self.pm25,
            Metric::Pm10 => self.pm10,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        }
    }

    /// Check the value-range invariants of a reading.
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [("pm25", self.pm25), ("pm10", self.pm10)] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {v}"));
            }
        }
        if !self.temperature.is_finite() {
            return Err(format!("temperature must be finite, got {}", self.temperature));
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(format!("humidity must be within [0, 100], got {}", self.humidity));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("readings file is empty: {0}")]
    Empty(PathBuf),
    #[error("missing column for {metric} (looked for {looked_for:?})")]
    MissingColumn {
        metric: String,
        looked_for: Vec<String>,
    },
    #[error("no valid readings in {path} ({rejected} rows rejected)")]
    NoValidRows { path: PathBuf, rejected: usize },
}

/// Readings loaded from one file.
#[derive(Debug, Clone)]
pub struct ReadingSet {
    pub readings: Vec<Reading>,
    /// Rows rejected as malformed or out of range.
    pub rejected: usize,
}

// ============================================================================
// Column Mapping
// ============================================================================

/// Resolved column indices for one header row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    timestamp: usize,
    metrics: BTreeMap<Metric, usize>,
}

impl ColumnMap {
    fn from_header(header: &str, config: &PipelineConfig) -> Result<Self, ReadingError> {
        let columns: Vec<String> = csv_split(header)
            .into_iter()
            .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let find = |name: &str| columns.iter().position(|c| c.eq_ignore_ascii_case(name));

        let timestamp = find(TIMESTAMP_COLUMN)
            .or_else(|| find("timestamp"))
            .ok_or_else(|| ReadingError::MissingColumn {
                metric: "timestamp".to_string(),
                looked_for: vec![TIMESTAMP_COLUMN.to_string(), "timestamp".to_string()],
            })?;

        let mut metrics = BTreeMap::new();
        for metric in Metric::ALL {
            let mapped = config.field_name(metric);
            let idx = find(mapped)
                .or_else(|| find(metric.canonical_name()))
                .ok_or_else(|| ReadingError::MissingColumn {
                    metric: metric.to_string(),
                    looked_for: vec![mapped.to_string(), metric.canonical_name().to_string()],
                })?;
            metrics.insert(metric, idx);
        }
        Ok(Self { timestamp, metrics })
    }

    fn parse_row(&self, line: &str) -> Result<Reading, String> {
        let fields = csv_split(line);
        let field = |idx: usize| fields.get(idx).map(|s| s.trim()).unwrap_or("");
        let number = |metric: Metric| -> Result<f64, String> {
            let raw = field(self.metrics[&metric]);
            raw.parse::<f64>()
                .map_err(|_| format!("{metric}: not a number: '{raw}'"))
        };

        let reading = Reading {
            timestamp: parse_timestamp(field(self.timestamp))?,
            pm25: number(Metric::Pm25)?,
            pm10: number(Metric::Pm10)?,
            temperature: number(Metric::Temperature)?,
            humidity: number(Metric::Humidity)?,
        };
        reading.validate()?;
        Ok(reading)
    }
}

/// Split a CSV line respecting quoted fields.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim().trim_matches('"');
    if s.is_empty() {
        return Err("empty timestamp".to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S UTC",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }
    Err(format!("cannot parse timestamp '{s}'"))
}

// ============================================================================
// Load / Write
// ============================================================================

/// Load readings from `path`, resolving columns through `config.field_map`.
///
/// Output is sorted chronologically. Fails only when the file cannot be read,
/// lacks required columns, or contains no valid row at all.
pub fn load_readings(path: &Path, config: &PipelineConfig) -> Result<ReadingSet, ReadingError> {
    let io_err = |source| ReadingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .ok_or_else(|| ReadingError::Empty(path.to_path_buf()))?
        .map_err(io_err)?;
    let columns = ColumnMap::from_header(&header, config)?;

    let mut readings = Vec::new();
    let mut rejected = 0usize;
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match columns.parse_row(&line) {
            Ok(r) => readings.push(r),
            Err(reason) => {
                if rejected < MAX_LOGGED_REJECTS {
                    warn!(line = idx + 2, %reason, "Rejected reading");
                }
                rejected += 1;
            }
        }
    }

    if readings.is_empty() {
        return Err(ReadingError::NoValidRows {
            path: path.to_path_buf(),
            rejected,
        });
    }

    // Stable: rows with equal timestamps keep file order
    readings.sort_by_key(|r| r.timestamp);
    info!(
        path = %path.display(),
        readings = readings.len(),
        rejected,
        "Readings loaded"
    );
    Ok(ReadingSet { readings, rejected })
}

/// Write readings with the channel's field names as column headers.
pub fn write_readings(path: &Path, readings: &[Reading], config: &PipelineConfig) -> Result<(), ReadingError> {
    let io_err = |source| ReadingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);

    let mut header = vec![TIMESTAMP_COLUMN.to_string(), "entry_id".to_string()];
    header.extend(WRITE_ORDER.iter().map(|m| config.field_name(*m).to_string()));
    writeln!(out, "{}", header.join(",")).map_err(io_err)?;

    for (i, r) in readings.iter().enumerate() {
        let values: Vec<String> = WRITE_ORDER.iter().map(|m| format!("{:.2}", r.value(*m))).collect();
        writeln!(
            out,
            "{},{},{}",
            r.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            i + 1,
            values.join(",")
        )
        .map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    Ok(())
}

// ============================================================================
// Summary Statistics
// ============================================================================

/// Mean / median / min / max / standard deviation of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl MetricSummary {
    fn of(values: &[f64]) -> Self {
        let std_dev = if values.len() > 1 {
            Statistics::std_dev(values.iter())
        } else {
            0.0
        };
        Self {
            mean: Statistics::mean(values.iter()),
            median: Data::new(values.to_vec()).median(),
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            std_dev,
        }
    }
}

/// Per-calendar-day (UTC) particulate means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyMean {
    pub date: NaiveDate,
    pub pm25: f64,
    pub pm10: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub metrics: BTreeMap<Metric, MetricSummary>,
    pub daily: Vec<DailyMean>,
}

impl ReadingSummary {
    /// Summarise a chronological series. `None` when empty.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let first = readings.first()?.timestamp;
        let last = readings.last()?.timestamp;

        let metrics = Metric::ALL
            .iter()
            .map(|m| {
                let values: Vec<f64> = readings.iter().map(|r| r.value(*m)).collect();
                (*m, MetricSummary::of(&values))
            })
            .collect();

        Some(Self {
            count: readings.len(),
            first,
            last,
            metrics,
            daily: daily_means(readings),
        })
    }

    pub fn metric(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.get(&metric)
    }
}

/// Group readings by UTC date and average PM2.5 / PM10.
pub fn daily_means(readings: &[Reading]) -> Vec<DailyMean> {
    let mut days: BTreeMap<NaiveDate, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for r in readings {
        let day = days.entry(r.timestamp.date_naive()).or_default();
        day.0.push(r.pm25);
        day.1.push(r.pm10);
    }
    days.into_iter()
        .map(|(date, (pm25, pm10))| DailyMean {
            date,
            samples: pm25.len(),
            pm25: Statistics::mean(pm25.iter()),
            pm10: Statistics::mean(pm10.iter()),
        })
        .collect()
}

// ============================================================================
// Date Window
// ============================================================================

/// Inclusive range of UTC calendar dates. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }

    /// Keep only the readings inside the window.
    pub fn apply(&self, readings: Vec<Reading>) -> Vec<Reading> {
        if self.is_unbounded() {
            return readings;
        }
        readings.into_iter().filter(|r| self.contains(r.timestamp)).collect()
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// Particulate means for one hour of the day (UTC), across all days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyMean {
    pub hour: u32,
    pub pm25: f64,
    pub pm10: f64,
    pub samples: usize,
}

/// Hour-of-day profile, ascending by hour. Hours without readings are absent.
pub fn hourly_profile(readings: &[Reading]) -> Vec<HourlyMean> {
    let mut hours: BTreeMap<u32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for r in readings {
        let slot = hours.entry(r.timestamp.hour()).or_default();
        slot.0.push(r.pm25);
        slot.1.push(r.pm10);
    }
    hours
        .into_iter()
        .map(|(hour, (pm25, pm10))| HourlyMean {
            hour,
            samples: pm25.len(),
            pm25: Statistics::mean(pm25.iter()),
            pm10: Statistics::mean(pm10.iter()),
        })
        .collect()
}

/// Mean PM2.5 per (weekday, hour); rows start on Monday.
pub type WeekGrid = [[Option<f64>; 24]; 7];

pub fn weekday_hour_grid(readings: &[Reading]) -> WeekGrid {
    let mut sums = [[(0.0_f64, 0_usize); 24]; 7];
    for r in readings {
        let day = r.timestamp.weekday().num_days_from_monday() as usize;
        let cell = &mut sums[day][r.timestamp.hour() as usize];
        cell.0 += r.pm25;
        cell.1 += 1;
    }
    let mut grid: WeekGrid = [[None; 24]; 7];
    for (day, row) in sums.iter().enumerate() {
        for (hour, (sum, n)) in row.iter().enumerate() {
            if *n > 0 {
                grid[day][hour] = Some(sum / *n as f64);
            }
        }
    }
    grid
}

/// Pearson coefficient and least-squares line of `y` against `x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub coefficient: f64,
    pub slope: f64,
    pub intercept: f64,
    pub samples: usize,
}

impl Correlation {
    /// `None` with fewer than two pairs or when either side is constant.
    pub fn between(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len().min(y.len());
        if n < 2 {
            return None;
        }
        let (x, y) = (&x[..n], &y[..n]);
        let sx = Statistics::std_dev(x.iter());
        let sy = Statistics::std_dev(y.iter());
        if !(sx > 0.0 && sy > 0.0) {
            return None;
        }
        let cov = Statistics::covariance(x.iter(), y.iter());
        let slope = cov / Statistics::variance(x.iter());
        Some(Self {
            coefficient: (cov / (sx * sy)).clamp(-1.0, 1.0),
            slope,
            intercept: Statistics::mean(y.iter()) - slope * Statistics::mean(x.iter()),
            samples: n,
        })
    }

    /// Verbal strength of the coefficient.
    pub fn strength(&self) -> &'static str {
        match self.coefficient {
            c if c > 0.5 => "strong positive",
            c if c > 0.2 => "moderate positive",
            c if c > -0.2 => "weak or no",
            c if c > -0.5 => "moderate negative",
            _ => "strong negative",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "created_at,entry_id,field1,field2,field3,field4";

    fn write(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("data.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_via_field_map() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            &format!(
                "{HEADER}\n2024-03-01T01:00:00Z,2,50,21,12.5,30\n2024-03-01 00:00:00,1,55,20,10,25\n"
            ),
        );
        let set = load_readings(&path, &PipelineConfig::default()).unwrap();
        assert_eq!(set.readings.len(), 2);
        assert_eq!(set.rejected, 0);
        // Sorted chronologically
        assert_eq!(set.readings[0].pm25, 10.0);
        assert_eq!(set.readings[1].humidity, 50.0);
    }

    #[test]
    fn test_canonical_column_fallback() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "timestamp,pm25,pm10,temperature,humidity\n2024-03-01T00:00:00Z,8,16,19,40\n",
        );
        let set = load_readings(&path, &PipelineConfig::default()).unwrap();
        assert_eq!(set.readings[0].pm10, 16.0);
    }

    #[test]
    fn test_invalid_rows_rejected_not_coerced() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            &format!(
                "{HEADER}\n\
                 2024-03-01T00:00:00Z,1,50,20,-1,25\n\
                 2024-03-01T01:00:00Z,2,150,20,5,25\n\
                 2024-03-01T02:00:00Z,3,50,20,abc,25\n\
                 not-a-date,4,50,20,5,25\n\
                 2024-03-01T04:00:00Z,5,50,20,5,25\n"
            ),
        );
        let set = load_readings(&path, &PipelineConfig::default()).unwrap();
        assert_eq!(set.readings.len(), 1);
        assert_eq!(set.rejected, 4);
    }

    #[test]
    fn test_missing_column_is_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "created_at,field1,field2\n2024-03-01T00:00:00Z,1,2\n");
        let err = load_readings(&path, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, ReadingError::MissingColumn { .. }), "{err}");
    }

    #[test]
    fn test_no_valid_rows_is_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), &format!("{HEADER}\nbad,1,2,3,4,5\n"));
        assert!(matches!(
            load_readings(&path, &PipelineConfig::default()),
            Err(ReadingError::NoValidRows { rejected: 1, .. })
        ));
    }

    #[test]
    fn test_write_then_load_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("data.csv");
        let ts = parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let readings = vec![Reading {
            timestamp: ts,
            pm25: 12.25,
            pm10: 30.5,
            temperature: 21.0,
            humidity: 45.75,
        }];
        write_readings(&path, &readings, &PipelineConfig::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(HEADER));
        let back = load_readings(&path, &PipelineConfig::default()).unwrap();
        assert_eq!(back.readings, readings);
    }

    #[test]
    fn test_summary_and_daily_means() {
        let day1 = parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let day2 = parse_timestamp("2024-03-02T00:00:00Z").unwrap();
        let r = |timestamp: DateTime<Utc>, pm25: f64| Reading {
            timestamp,
            pm25,
            pm10: pm25 * 2.0,
            temperature: 20.0,
            humidity: 50.0,
        };
        let readings = vec![r(day1, 10.0), r(day1, 20.0), r(day2, 30.0)];
        let summary = ReadingSummary::from_readings(&readings).unwrap();

        assert_eq!(summary.count, 3);
        let pm25 = summary.metric(Metric::Pm25).unwrap();
        assert!((pm25.mean - 20.0).abs() < 1e-9);
        assert_eq!(pm25.min, 10.0);
        assert_eq!(pm25.max, 30.0);
        assert_eq!(summary.daily.len(), 2);
        assert!((summary.daily[0].pm25 - 15.0).abs() < 1e-9);
        assert_eq!(summary.daily[0].samples, 2);
        assert!(ReadingSummary::from_readings(&[]).is_none());
    }

    #[test]
    fn test_csv_split_quotes() {
        assert_eq!(csv_split(r#"a,"b,c","d""e""#), vec!["a", "b,c", "d\"e"]);
    }

    fn at(ts: &str, pm25: f64, temperature: f64) -> Reading {
        Reading {
            timestamp: parse_timestamp(ts).unwrap(),
            pm25,
            pm10: pm25 * 2.0,
            temperature,
            humidity: 50.0,
        }
    }

    #[test]
    fn test_date_window_is_inclusive_of_whole_days() {
        let window = DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 3, 2),
            end: NaiveDate::from_ymd_opt(2024, 3, 3),
        };
        let kept = window.apply(vec![
            at("2024-03-01T23:59:59Z", 1.0, 0.0),
            at("2024-03-02T00:00:00Z", 2.0, 0.0),
            at("2024-03-03T23:30:00Z", 3.0, 0.0),
            at("2024-03-04T00:00:00Z", 4.0, 0.0),
        ]);
        let values: Vec<f64> = kept.iter().map(|r| r.pm25).collect();
        assert_eq!(values, vec![2.0, 3.0]);
        assert!(DateWindow::default().is_unbounded());
    }

    #[test]
    fn test_hourly_profile_groups_across_days() {
        let profile = hourly_profile(&[
            at("2024-03-01T08:00:00Z", 10.0, 0.0),
            at("2024-03-02T08:30:00Z", 20.0, 0.0),
            at("2024-03-02T14:00:00Z", 4.0, 0.0),
        ]);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].hour, 8);
        assert_eq!(profile[0].pm25, 15.0);
        assert_eq!(profile[0].samples, 2);
        assert_eq!(profile[1].pm10, 8.0);
    }

    #[test]
    fn test_week_grid_starts_on_monday() {
        // 2024-03-04 is a Monday, 2024-03-10 a Sunday
        let grid = weekday_hour_grid(&[
            at("2024-03-04T07:00:00Z", 12.0, 0.0),
            at("2024-03-10T23:00:00Z", 30.0, 0.0),
        ]);
        assert_eq!(grid[0][7], Some(12.0));
        assert_eq!(grid[6][23], Some(30.0));
        assert_eq!(grid[3][12], None);
    }

    #[test]
    fn test_correlation_of_linear_series() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [3.0, 5.0, 7.0, 9.0];
        let c = Correlation::between(&x, &y).unwrap();
        assert!((c.coefficient - 1.0).abs() < 1e-9);
        assert!((c.slope - 2.0).abs() < 1e-9);
        assert!((c.intercept - 1.0).abs() < 1e-9);
        assert_eq!(c.strength(), "strong positive");

        let inverse = Correlation::between(&x, &[4.0, 3.0, 2.5, 1.0]).unwrap();
        assert_eq!(inverse.strength(), "strong negative");
    }

    #[test]
    fn test_correlation_needs_variation() {
        assert!(Correlation::between(&[1.0], &[2.0]).is_none());
        assert!(Correlation::between(&[1.0, 1.0, 1.0], &[2.0, 3.0, 4.0]).is_none());
    }

    #[test]
    fn test_summary_includes_median() {
        let summary = ReadingSummary::from_readings(&[
            at("2024-03-01T00:00:00Z", 1.0, 0.0),
            at("2024-03-01T01:00:00Z", 2.0, 0.0),
            at("2024-03-01T02:00:00Z", 9.0, 0.0),
        ])
        .unwrap();
        let pm25 = summary.metric(Metric::Pm25).unwrap();
        assert_eq!(pm25.median, 2.0);
        assert_eq!(pm25.mean, 4.0);
    }
}
