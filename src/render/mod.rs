//! Render Target Factory - pre-built chart rendering contexts
//!
//! Two canonical targets (opaque white and transparent) are built once at
//! startup and shared behind `Arc`s. Building a target registers the
//! configured font; a missing or unreadable font logs a warning and falls
//! back to the platform default family so rendering always proceeds.
//!
//! Each chart the pipeline can draw is a [`ChartKind`] with one well-known
//! artifact file name.

pub mod chart;
pub mod patterns;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{defaults, RenderConfig};

/// Canvas background mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    OpaqueWhite,
    Transparent,
}

impl Background {
    /// SVG fill for the background rect, `None` for no rect at all.
    pub fn fill(&self) -> Option<&'static str> {
        match self {
            Background::OpaqueWhite => Some("#ffffff"),
            Background::Transparent => None,
        }
    }
}

/// Chart drawn by the analysis computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// PM2.5 / PM10 over time with guideline overlays.
    TimeSeries,
    /// Daily mean PM2.5 bars with a moving average.
    Trend,
    /// Mean concentration per hour of day.
    DailyPattern,
    /// Mean PM2.5 per weekday and hour.
    Heatmap,
    /// PM2.5 against temperature and humidity.
    Correlation,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::TimeSeries,
        ChartKind::Trend,
        ChartKind::DailyPattern,
        ChartKind::Heatmap,
        ChartKind::Correlation,
    ];

    /// Well-known artifact file name.
    pub fn artifact(&self) -> &'static str {
        match self {
            ChartKind::TimeSeries => defaults::TIME_SERIES_ARTIFACT,
            ChartKind::Trend => defaults::TREND_ARTIFACT,
            ChartKind::DailyPattern => defaults::DAILY_PATTERN_ARTIFACT,
            ChartKind::Heatmap => defaults::HEATMAP_ARTIFACT,
            ChartKind::Correlation => defaults::CORRELATION_ARTIFACT,
        }
    }

    pub fn from_artifact(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.artifact() == name)
    }
}

/// Font used for chart text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFace {
    pub family: String,
    /// Registered font file; `None` when the fallback family is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl FontFace {
    pub fn fallback() -> Self {
        Self {
            family: defaults::FALLBACK_FONT_FAMILY.to_string(),
            source: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source.is_none()
    }
}

/// Immutable rendering-context descriptor handed to the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    /// Draw guideline lines and exceedance annotations.
    pub overlays: bool,
    pub font: FontFace,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self {
            width: defaults::CANVAS_WIDTH,
            height: defaults::CANVAS_HEIGHT,
            background: Background::OpaqueWhite,
            overlays: true,
            font: FontFace::fallback(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("cannot read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a TrueType/OpenType font")]
    UnknownFormat,
    #[error("font file has no usable name")]
    NoFamily,
}

/// sfnt version tags: TrueType, OpenType/CFF, legacy Apple, collection.
const FONT_MAGIC: [[u8; 4]; 4] = [*b"\x00\x01\x00\x00", *b"OTTO", *b"true", *b"ttcf"];

/// Check the font header and derive a family name from the file stem.
fn load_font(path: &Path) -> Result<FontFace, FontError> {
    let bytes = std::fs::read(path)?;
    let magic = bytes.get(..4).ok_or(FontError::UnknownFormat)?;
    if !FONT_MAGIC.iter().any(|m| m.as_slice() == magic) {
        return Err(FontError::UnknownFormat);
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(FontError::NoFamily)?;
    // "DejaVuSans-Bold" -> "DejaVuSans"
    let family = stem.split('-').next().unwrap_or(stem).trim();
    if family.is_empty() {
        return Err(FontError::NoFamily);
    }
    Ok(FontFace {
        family: family.to_string(),
        source: Some(path.to_path_buf()),
    })
}

/// Register the configured font, falling back on any failure.
pub fn register_font(path: Option<&Path>) -> FontFace {
    let Some(path) = path else {
        return FontFace::fallback();
    };
    match load_font(path) {
        Ok(face) => {
            debug!(family = %face.family, path = %path.display(), "Font registered");
            face
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                fallback = defaults::FALLBACK_FONT_FAMILY,
                "Font registration failed, using platform default"
            );
            FontFace::fallback()
        }
    }
}

/// Holds the two canonical targets.
#[derive(Debug, Clone)]
pub struct RenderTargetFactory {
    opaque: Arc<RenderTarget>,
    transparent: Arc<RenderTarget>,
}

impl RenderTargetFactory {
    /// Register the font once and build both targets.
    pub fn new(config: &RenderConfig) -> Self {
        let font = register_font(config.font_path.as_deref());
        let opaque = RenderTarget {
            width: config.width,
            height: config.height,
            background: Background::OpaqueWhite,
            overlays: config.overlays,
            font,
        };
        let transparent = RenderTarget {
            background: Background::Transparent,
            ..opaque.clone()
        };
        Self {
            opaque: Arc::new(opaque),
            transparent: Arc::new(transparent),
        }
    }

    pub fn opaque(&self) -> Arc<RenderTarget> {
        Arc::clone(&self.opaque)
    }

    pub fn transparent(&self) -> Arc<RenderTarget> {
        Arc::clone(&self.transparent)
    }

    pub fn target(&self, background: Background) -> Arc<RenderTarget> {
        match background {
            Background::OpaqueWhite => self.opaque(),
            Background::Transparent => self.transparent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_targets_are_shared() {
        let factory = RenderTargetFactory::new(&RenderConfig::default());
        assert!(Arc::ptr_eq(&factory.opaque(), &factory.opaque()));
        assert!(Arc::ptr_eq(
            &factory.transparent(),
            &factory.target(Background::Transparent)
        ));
        assert_eq!(factory.opaque().background, Background::OpaqueWhite);
        assert_eq!(factory.transparent().background, Background::Transparent);
        assert_eq!(factory.transparent().width, factory.opaque().width);
    }

    #[test]
    fn test_missing_font_falls_back() {
        let config = RenderConfig {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..Default::default()
        };
        let factory = RenderTargetFactory::new(&config);
        assert!(factory.opaque().font.is_fallback());
        assert_eq!(factory.opaque().font.family, defaults::FALLBACK_FONT_FAMILY);
    }

    #[test]
    fn test_garbage_font_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Broken.ttf");
        std::fs::write(&path, b"<html>").unwrap();
        assert!(register_font(Some(&path)).is_fallback());
    }

    #[test]
    fn test_truetype_header_registers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Inter-Regular.ttf");
        std::fs::write(&path, [0x00, 0x01, 0x00, 0x00, 0x00, 0x0c]).unwrap();
        let face = register_font(Some(&path));
        assert_eq!(face.family, "Inter");
        assert_eq!(face.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_chart_kinds_map_to_distinct_artifacts() {
        for kind in ChartKind::ALL {
            assert_eq!(ChartKind::from_artifact(kind.artifact()), Some(kind));
        }
        assert_eq!(ChartKind::from_artifact("pm25_trend.svg"), Some(ChartKind::Trend));
        assert_eq!(ChartKind::from_artifact("time_series.png"), None);
    }

    #[test]
    fn test_background_fill() {
        assert_eq!(Background::OpaqueWhite.fill(), Some("#ffffff"));
        assert_eq!(Background::Transparent.fill(), None);
    }
}
