//! SVG chart drawing.
//!
//! - Time series: PM2.5 and PM10 lines, with dashed daily guideline limits and
//!   exceedance markers when overlays are on.
//! - Trend: daily mean PM2.5 bars coloured by AQI band, a moving average line,
//!   and the daily guideline limit.
//!
//! The hour-of-day, heatmap and correlation charts live in [`super::patterns`]
//! and share the builder below. [`draw`] picks the chart for a [`ChartKind`].

use std::fmt::Write as _;

use crate::guideline::{GuidelineTable, Period, Pollutant};
use crate::readings::{daily_means, DailyMean, Reading};

use super::patterns;
use super::{ChartKind, RenderTarget};

/// Window of the trend chart's moving average (days).
pub const TREND_WINDOW: usize = 3;

pub(super) const PM25_COLOR: &str = "#1f77b4";
pub(super) const PM10_COLOR: &str = "#ff7f0e";
pub(super) const GUIDELINE_COLOR: &str = "#d62728";
pub(super) const AXIS_COLOR: &str = "#333333";
const AVERAGE_COLOR: &str = "#222222";

pub(super) const MARGIN_LEFT: f64 = 70.0;
pub(super) const MARGIN_RIGHT: f64 = 30.0;
pub(super) const MARGIN_TOP: f64 = 50.0;
pub(super) const MARGIN_BOTTOM: f64 = 60.0;

/// A rendered chart and its caption.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub svg: String,
    pub description: String,
}

/// Render one chart over a chronological reading series.
pub fn draw(kind: ChartKind, target: &RenderTarget, table: &GuidelineTable, readings: &[Reading]) -> Chart {
    match kind {
        ChartKind::TimeSeries => Chart {
            svg: render_time_series(target, table, readings),
            description: describe_time_series(table, readings),
        },
        ChartKind::Trend => {
            let daily = daily_means(readings);
            Chart {
                svg: render_trend(target, table, &daily),
                description: describe_trend(table, &daily),
            }
        }
        ChartKind::DailyPattern => patterns::daily_pattern(target, table, readings),
        ChartKind::Heatmap => patterns::heatmap(target, table, readings),
        ChartKind::Correlation => patterns::correlation(target, readings),
    }
}

// ============================================================================
// SVG Builder
// ============================================================================

/// Minimal SVG document builder.
pub(super) struct Svg {
    body: String,
    width: u32,
    height: u32,
    font: String,
}

impl Svg {
    pub(super) fn new(target: &RenderTarget) -> Self {
        let mut svg = Self {
            body: String::new(),
            width: target.width,
            height: target.height,
            font: escape(&target.font.family),
        };
        if let Some(fill) = target.background.fill() {
            svg.rect(0.0, 0.0, f64::from(target.width), f64::from(target.height), fill);
        }
        svg
    }

    pub(super) fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="{fill}"/>"#
        );
    }

    pub(super) fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, dashed: bool) {
        let dash = if dashed { r#" stroke-dasharray="8 4""# } else { "" };
        let _ = writeln!(
            self.body,
            r#"<line x1="{x1:.1}" y1="{y1:.1}" x2="{x2:.1}" y2="{y2:.1}" stroke="{stroke}" stroke-width="1.5"{dash}/>"#
        );
    }

    pub(super) fn polyline(&mut self, points: &[(f64, f64)], stroke: &str) {
        if points.is_empty() {
            return;
        }
        let pts: Vec<String> = points.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
        let _ = writeln!(
            self.body,
            r#"<polyline points="{}" fill="none" stroke="{stroke}" stroke-width="1.5"/>"#,
            pts.join(" ")
        );
    }

    pub(super) fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}" fill="{fill}"/>"#
        );
    }

    pub(super) fn text(&mut self, x: f64, y: f64, size: u32, anchor: &str, content: &str) {
        let _ = writeln!(
            self.body,
            r#"<text x="{x:.1}" y="{y:.1}" font-family="{}" font-size="{size}" text-anchor="{anchor}" fill="{AXIS_COLOR}">{}</text>"#,
            self.font,
            escape(content)
        );
    }

    pub(super) fn finish(self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

pub(super) fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Maps data coordinates into the plot area.
pub(super) struct Plot {
    pub(super) left: f64,
    pub(super) top: f64,
    pub(super) width: f64,
    pub(super) height: f64,
    x_min: f64,
    x_max: f64,
    y_max: f64,
}

impl Plot {
    pub(super) fn new(target: &RenderTarget, x_max: f64, y_max: f64) -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (f64::from(target.width) - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (f64::from(target.height) - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
            x_min: 0.0,
            x_max: x_max.max(f64::EPSILON),
            y_max: y_max.max(f64::EPSILON),
        }
    }

    /// Restrict the plot to a horizontal slice of the canvas.
    pub(super) fn columns(mut self, left: f64, width: f64) -> Self {
        self.left = left;
        self.width = width.max(1.0);
        self
    }

    /// Horizontal data range that does not start at zero.
    pub(super) fn x_range(mut self, min: f64, max: f64) -> Self {
        self.x_min = min;
        self.x_max = if max > min { max } else { min + 1.0 };
        self
    }

    pub(super) fn x(&self, v: f64) -> f64 {
        let span = (self.x_max - self.x_min).max(f64::EPSILON);
        self.left + (v - self.x_min) / span * self.width
    }

    pub(super) fn y(&self, v: f64) -> f64 {
        self.top + self.height - v / self.y_max * self.height
    }

    pub(super) fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub(super) fn right(&self) -> f64 {
        self.left + self.width
    }

    pub(super) fn axes(&self, svg: &mut Svg, y_label: &str) {
        svg.line(self.left, self.bottom(), self.right(), self.bottom(), AXIS_COLOR, false);
        svg.line(self.left, self.top, self.left, self.bottom(), AXIS_COLOR, false);
        for tick in 0..=4 {
            let v = self.y_max * f64::from(tick) / 4.0;
            let y = self.y(v);
            svg.line(self.left - 5.0, y, self.left, y, AXIS_COLOR, false);
            svg.text(self.left - 8.0, y + 4.0, 11, "end", &format!("{v:.0}"));
        }
        svg.text(self.left - 52.0, self.top - 15.0, 12, "start", y_label);
    }
}

/// Headroom above the largest plotted value, so guideline lines stay visible.
pub(super) fn y_ceiling(values: impl Iterator<Item = f64>, guideline: f64) -> f64 {
    let max = values.fold(guideline, f64::max);
    (max * 1.1).ceil().max(1.0)
}

// ============================================================================
// Charts
// ============================================================================

/// Time series of PM2.5 and PM10 for a chronological reading series.
pub fn render_time_series(target: &RenderTarget, table: &GuidelineTable, readings: &[Reading]) -> String {
    let mut svg = Svg::new(target);
    let limit = |p: Pollutant| table.threshold(p, Period::Daily).map(|t| t.limit);
    let overlay_max = if target.overlays {
        limit(Pollutant::Pm10).unwrap_or(0.0)
    } else {
        0.0
    };

    let y_max = y_ceiling(readings.iter().flat_map(|r| [r.pm25, r.pm10]), overlay_max);
    let (start, span_secs) = match (readings.first(), readings.last()) {
        (Some(first), Some(last)) => (
            first.timestamp,
            (last.timestamp - first.timestamp).num_seconds().max(1) as f64,
        ),
        _ => {
            svg.text(f64::from(target.width) / 2.0, f64::from(target.height) / 2.0, 16, "middle", "No data");
            return svg.finish();
        }
    };
    let plot = Plot::new(target, span_secs, y_max);
    let x_of = |r: &Reading| plot.x((r.timestamp - start).num_seconds() as f64);

    svg.text(f64::from(target.width) / 2.0, 28.0, 18, "middle", "Particulate matter concentration");
    plot.axes(&mut svg, "µg/m³");

    for (pollutant, color) in [(Pollutant::Pm25, PM25_COLOR), (Pollutant::Pm10, PM10_COLOR)] {
        let value = |r: &Reading| match pollutant {
            Pollutant::Pm25 => r.pm25,
            Pollutant::Pm10 => r.pm10,
        };
        let points: Vec<(f64, f64)> = readings.iter().map(|r| (x_of(r), plot.y(value(r)))).collect();
        svg.polyline(&points, color);

        if !target.overlays {
            continue;
        }
        if let Some(limit) = limit(pollutant) {
            let y = plot.y(limit);
            svg.line(plot.left, y, plot.right(), y, color, true);
            svg.text(plot.right() - 4.0, y - 6.0, 11, "end", &format!("{pollutant} daily guideline ({limit} µg/m³)"));
        }
        for r in readings
            .iter()
            .filter(|&r| table.guideline_exceeded(pollutant, Period::Daily, value(r)))
        {
            svg.circle(x_of(r), plot.y(value(r)), 2.5, GUIDELINE_COLOR);
        }
    }

    // Legend + time range
    svg.line(plot.left, plot.bottom() + 35.0, plot.left + 20.0, plot.bottom() + 35.0, PM25_COLOR, false);
    svg.text(plot.left + 25.0, plot.bottom() + 39.0, 12, "start", "PM2.5");
    svg.line(plot.left + 90.0, plot.bottom() + 35.0, plot.left + 110.0, plot.bottom() + 35.0, PM10_COLOR, false);
    svg.text(plot.left + 115.0, plot.bottom() + 39.0, 12, "start", "PM10");
    if let Some(last) = readings.last() {
        svg.text(plot.left, plot.bottom() + 18.0, 11, "start", &start.format("%Y-%m-%d %H:%M").to_string());
        svg.text(
            plot.right(),
            plot.bottom() + 18.0,
            11,
            "end",
            &last.timestamp.format("%Y-%m-%d %H:%M").to_string(),
        );
    }
    svg.finish()
}

fn describe_time_series(table: &GuidelineTable, readings: &[Reading]) -> String {
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return "No data available for the time series.".to_string();
    };
    let n = readings.len() as f64;
    let mean_pm25 = readings.iter().map(|r| r.pm25).sum::<f64>() / n;
    let mean_pm10 = readings.iter().map(|r| r.pm10).sum::<f64>() / n;
    let level = table
        .classify(Pollutant::Pm25, mean_pm25)
        .map(|b| b.label.clone())
        .unwrap_or_else(|_| "Unknown".to_string());
    format!(
        "Readings from {} to {}. Mean PM2.5 {mean_pm25:.2} µg/m³, mean PM10 {mean_pm10:.2} µg/m³. \
         Overall air quality based on PM2.5: {level}.",
        first.timestamp.format("%Y-%m-%d"),
        last.timestamp.format("%Y-%m-%d"),
    )
}

fn describe_trend(table: &GuidelineTable, daily: &[DailyMean]) -> String {
    let Some(worst) = daily.iter().max_by(|a, b| a.pm25.total_cmp(&b.pm25)) else {
        return "No data available for the daily trend.".to_string();
    };
    let over = daily
        .iter()
        .filter(|d| table.guideline_exceeded(Pollutant::Pm25, Period::Daily, d.pm25))
        .count();
    format!(
        "{over} of {} days above the PM2.5 daily guideline. Highest daily mean {:.1} µg/m³ on {}.",
        daily.len(),
        worst.pm25,
        worst.date.format("%Y-%m-%d"),
    )
}

/// Trailing moving average; the first `window - 1` entries average what is available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let from = (i + 1).saturating_sub(window);
            let slice = &values[from..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Daily mean PM2.5 bars coloured by AQI band, with a moving average.
pub fn render_trend(target: &RenderTarget, table: &GuidelineTable, daily: &[DailyMean]) -> String {
    let mut svg = Svg::new(target);
    if daily.is_empty() {
        svg.text(f64::from(target.width) / 2.0, f64::from(target.height) / 2.0, 16, "middle", "No data");
        return svg.finish();
    }

    let guideline = table.threshold(Pollutant::Pm25, Period::Daily).map(|t| t.limit);
    let means: Vec<f64> = daily.iter().map(|d| d.pm25).collect();
    let y_max = y_ceiling(means.iter().copied(), if target.overlays { guideline.unwrap_or(0.0) } else { 0.0 });
    let plot = Plot::new(target, daily.len() as f64, y_max);

    svg.text(f64::from(target.width) / 2.0, 28.0, 18, "middle", "Daily mean PM2.5");
    plot.axes(&mut svg, "µg/m³");

    let slot = plot.width / daily.len() as f64;
    let bar = slot * 0.7;
    for (i, day) in daily.iter().enumerate() {
        let color = table
            .classify(Pollutant::Pm25, day.pm25)
            .map(|band| band.color.hex())
            .unwrap_or_else(|_| "#999999".to_string());
        let x = plot.x(i as f64) + (slot - bar) / 2.0;
        let y = plot.y(day.pm25);
        svg.rect(x, y, bar, plot.bottom() - y, &color);
        svg.text(x + bar / 2.0, plot.bottom() + 18.0, 11, "middle", &day.date.format("%m-%d").to_string());
    }

    let avg = moving_average(&means, TREND_WINDOW);
    let points: Vec<(f64, f64)> = avg
        .iter()
        .enumerate()
        .map(|(i, v)| (plot.x(i as f64) + slot / 2.0, plot.y(*v)))
        .collect();
    svg.polyline(&points, AVERAGE_COLOR);

    if target.overlays {
        if let Some(limit) = guideline {
            let y = plot.y(limit);
            svg.line(plot.left, y, plot.right(), y, GUIDELINE_COLOR, true);
            svg.text(plot.right() - 4.0, y - 6.0, 11, "end", &format!("WHO daily guideline ({limit} µg/m³)"));
        }
        let over = daily
            .iter()
            .filter(|d| table.guideline_exceeded(Pollutant::Pm25, Period::Daily, d.pm25))
            .count();
        svg.text(
            plot.left,
            plot.bottom() + 40.0,
            12,
            "start",
            &format!("{over} of {} days above guideline, {TREND_WINDOW}-day moving average", daily.len()),
        );
    }
    svg.finish()
}
