//! Guideline Table - regulatory thresholds and AQI banding
//!
//! Static lookup data used to annotate charts and classify readings:
//!
//! - **Guideline thresholds**: WHO 2021 daily/annual mean limits for PM2.5 and
//!   PM10. Exceedance drives the overlay lines drawn on charts.
//! - **AQI bands**: contiguous integer index ranges covering `[0, 500]`, each
//!   with a severity label and display colour.
//! - **Concentration breakpoints**: US EPA piecewise-linear mapping from a
//!   pollutant concentration (µg/m³) to the AQI index scale.
//!
//! Classification is saturating: anything above the last band's upper bound
//! lands in the last band. Negative or non-finite concentrations are rejected
//! with [`ClassifyError::InvalidReading`].

use serde::{Deserialize, Serialize};

/// Upper end of the AQI index scale.
pub const AQI_MAX: u32 = 500;

// ============================================================================
// Enums
// ============================================================================

/// Pollutants the table knows thresholds and breakpoints for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
}

impl Pollutant {
    pub const ALL: [Pollutant; 2] = [Pollutant::Pm25, Pollutant::Pm10];
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pollutant::Pm25 => write!(f, "PM2.5"),
            Pollutant::Pm10 => write!(f, "PM10"),
        }
    }
}

impl std::str::FromStr for Pollutant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['.', '_'], "").as_str() {
            "pm25" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            other => Err(format!("unknown pollutant: {other}")),
        }
    }
}

/// Averaging period a guideline limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Annual,
}

// ============================================================================
// Data Types
// ============================================================================

/// A regulatory reference concentration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuidelineThreshold {
    pub pollutant: Pollutant,
    pub period: Period,
    /// Limit in µg/m³
    pub limit: f64,
}

/// RGBA display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// CSS hex form (`#rrggbb`), alpha dropped.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One labelled band of the AQI index scale. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiBand {
    pub label: String,
    pub lower_bound: u32,
    pub upper_bound: u32,
    pub color: Rgba,
}

impl AqiBand {
    pub fn new(label: &str, lower_bound: u32, upper_bound: u32, color: Rgba) -> Self {
        Self {
            label: label.to_string(),
            lower_bound,
            upper_bound,
            color,
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        (self.lower_bound..=self.upper_bound).contains(&index)
    }
}

/// Concentration range mapped linearly onto an AQI index range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub conc_low: f64,
    pub conc_high: f64,
    pub index_low: u32,
    pub index_high: u32,
}

const fn bp(conc_low: f64, conc_high: f64, index_low: u32, index_high: u32) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        index_low,
        index_high,
    }
}

/// EPA PM2.5 breakpoints (24-hour, µg/m³, truncated to 0.1).
const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 12.0, 0, 50),
    bp(12.1, 35.4, 51, 100),
    bp(35.5, 55.4, 101, 150),
    bp(55.5, 150.4, 151, 200),
    bp(150.5, 250.4, 201, 300),
    bp(250.5, 350.4, 301, 400),
    bp(350.5, 500.4, 401, 500),
];

/// EPA PM10 breakpoints (24-hour, µg/m³, truncated to integer).
const PM10_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 54.0, 0, 50),
    bp(55.0, 154.0, 51, 100),
    bp(155.0, 254.0, 101, 150),
    bp(255.0, 354.0, 151, 200),
    bp(355.0, 424.0, 201, 300),
    bp(425.0, 504.0, 301, 400),
    bp(505.0, 604.0, 401, 500),
];

// ============================================================================
// Errors
// ============================================================================

/// Classification failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyError {
    #[error("invalid {pollutant} reading: {value}")]
    InvalidReading { pollutant: Pollutant, value: f64 },
}

/// Static-table authoring errors. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuidelineError {
    #[error("AQI band table is empty")]
    NoBands,
    #[error("first AQI band must start at 0, starts at {0}")]
    DoesNotStartAtZero(u32),
    #[error("AQI band '{0}' has lower bound above upper bound")]
    InvertedBand(String),
    #[error("AQI bands '{previous}' and '{next}' are not contiguous")]
    Gap { previous: String, next: String },
    #[error("last AQI band ends at {0}, expected {AQI_MAX}")]
    DoesNotCover(u32),
    #[error("no breakpoints for {0}")]
    MissingBreakpoints(Pollutant),
}

// ============================================================================
// Guideline Table
// ============================================================================

/// Immutable threshold and band lookup. Build once, share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct GuidelineTable {
    thresholds: Vec<GuidelineThreshold>,
    bands: Vec<AqiBand>,
    pm25_breakpoints: Vec<Breakpoint>,
    pm10_breakpoints: Vec<Breakpoint>,
}

impl GuidelineTable {
    /// Build a table, checking the band invariant (sorted, contiguous, `[0, 500]`).
    pub fn new(
        thresholds: Vec<GuidelineThreshold>,
        bands: Vec<AqiBand>,
        pm25_breakpoints: Vec<Breakpoint>,
        pm10_breakpoints: Vec<Breakpoint>,
    ) -> Result<Self, GuidelineError> {
        validate_bands(&bands)?;
        if pm25_breakpoints.is_empty() {
            return Err(GuidelineError::MissingBreakpoints(Pollutant::Pm25));
        }
        if pm10_breakpoints.is_empty() {
            return Err(GuidelineError::MissingBreakpoints(Pollutant::Pm10));
        }
        Ok(Self {
            thresholds,
            bands,
            pm25_breakpoints,
            pm10_breakpoints,
        })
    }

    /// WHO 2021 guideline limits with the EPA AQI scale.
    pub fn who_2021() -> Result<Self, GuidelineError> {
        Self::new(
            who_2021_thresholds(),
            epa_bands(),
            PM25_BREAKPOINTS.to_vec(),
            PM10_BREAKPOINTS.to_vec(),
        )
    }

    /// Caller-supplied thresholds and bands over the EPA breakpoints. Used by
    /// the analysis process to rebuild the table it was handed.
    pub fn with_epa_breakpoints(
        thresholds: Vec<GuidelineThreshold>,
        bands: Vec<AqiBand>,
    ) -> Result<Self, GuidelineError> {
        Self::new(
            thresholds,
            bands,
            PM25_BREAKPOINTS.to_vec(),
            PM10_BREAKPOINTS.to_vec(),
        )
    }

    /// Same thresholds and breakpoints with a different band sequence.
    pub fn with_bands(&self, bands: Vec<AqiBand>) -> Result<Self, GuidelineError> {
        Self::new(
            self.thresholds.clone(),
            bands,
            self.pm25_breakpoints.clone(),
            self.pm10_breakpoints.clone(),
        )
    }

    pub fn thresholds(&self) -> &[GuidelineThreshold] {
        &self.thresholds
    }

    pub fn bands(&self) -> &[AqiBand] {
        &self.bands
    }

    pub fn threshold(&self, pollutant: Pollutant, period: Period) -> Option<&GuidelineThreshold> {
        self.thresholds
            .iter()
            .find(|t| t.pollutant == pollutant && t.period == period)
    }

    /// Classify a concentration into its AQI band.
    pub fn classify(&self, pollutant: Pollutant, value: f64) -> Result<&AqiBand, ClassifyError> {
        let index = self.aqi_index(pollutant, value)?;
        Ok(self.band_for_index(index))
    }

    /// Convert a concentration to an AQI index. Values past the last
    /// breakpoint saturate to [`AQI_MAX`] + 1.
    pub fn aqi_index(&self, pollutant: Pollutant, value: f64) -> Result<u32, ClassifyError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ClassifyError::InvalidReading { pollutant, value });
        }

        let (breakpoints, truncated) = match pollutant {
            Pollutant::Pm25 => (&self.pm25_breakpoints, (value * 10.0).floor() / 10.0),
            Pollutant::Pm10 => (&self.pm10_breakpoints, value.floor()),
        };

        let hit = breakpoints
            .iter()
            .find(|b| truncated >= b.conc_low && truncated <= b.conc_high);

        let index = match hit {
            Some(b) => {
                let span = b.conc_high - b.conc_low;
                let frac = if span > 0.0 {
                    (truncated - b.conc_low) / span
                } else {
                    0.0
                };
                let index = f64::from(b.index_low) + frac * f64::from(b.index_high - b.index_low);
                index.round() as u32
            }
            // Only reachable past the last breakpoint (ranges are gap-free after truncation)
            None => AQI_MAX + 1,
        };
        Ok(index)
    }

    /// First band containing `index`; the last band when none does.
    pub fn band_for_index(&self, index: u32) -> &AqiBand {
        // Non-empty by construction
        let last = &self.bands[self.bands.len() - 1];
        self.bands.iter().find(|b| b.contains(index)).unwrap_or(last)
    }

    /// Whether `value` exceeds the limit for `(pollutant, period)`.
    ///
    /// Pollutant/period pairs without a configured limit never exceed.
    pub fn guideline_exceeded(&self, pollutant: Pollutant, period: Period, value: f64) -> bool {
        self.threshold(pollutant, period)
            .is_some_and(|t| value > t.limit)
    }
}

fn validate_bands(bands: &[AqiBand]) -> Result<(), GuidelineError> {
    let first = bands.first().ok_or(GuidelineError::NoBands)?;
    if first.lower_bound != 0 {
        return Err(GuidelineError::DoesNotStartAtZero(first.lower_bound));
    }
    for band in bands {
        if band.lower_bound > band.upper_bound {
            return Err(GuidelineError::InvertedBand(band.label.clone()));
        }
    }
    for pair in bands.windows(2) {
        if pair[1].lower_bound != pair[0].upper_bound + 1 {
            return Err(GuidelineError::Gap {
                previous: pair[0].label.clone(),
                next: pair[1].label.clone(),
            });
        }
    }
    let last = &bands[bands.len() - 1];
    if last.upper_bound != AQI_MAX {
        return Err(GuidelineError::DoesNotCover(last.upper_bound));
    }
    Ok(())
}

/// WHO Global Air Quality Guidelines (2021).
pub fn who_2021_thresholds() -> Vec<GuidelineThreshold> {
    vec![
        GuidelineThreshold { pollutant: Pollutant::Pm25, period: Period::Daily, limit: 15.0 },
        GuidelineThreshold { pollutant: Pollutant::Pm25, period: Period::Annual, limit: 5.0 },
        GuidelineThreshold { pollutant: Pollutant::Pm10, period: Period::Daily, limit: 45.0 },
        GuidelineThreshold { pollutant: Pollutant::Pm10, period: Period::Annual, limit: 15.0 },
    ]
}

/// US EPA AQI categories.
pub fn epa_bands() -> Vec<AqiBand> {
    vec![
        AqiBand::new("Good", 0, 50, Rgba::opaque(0, 228, 0)),
        AqiBand::new("Moderate", 51, 100, Rgba::opaque(255, 255, 0)),
        AqiBand::new("Unhealthy for Sensitive Groups", 101, 150, Rgba::opaque(255, 126, 0)),
        AqiBand::new("Unhealthy", 151, 200, Rgba::opaque(255, 0, 0)),
        AqiBand::new("Very Unhealthy", 201, 300, Rgba::opaque(143, 63, 151)),
        AqiBand::new("Hazardous", 301, 500, Rgba::opaque(126, 0, 35)),
    ]
}
