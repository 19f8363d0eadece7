//! Pattern charts: hour-of-day profile, weekday x hour heatmap, and PM2.5
//! against the weather metrics.
//!
//! All hours are UTC, the same clock the readings file uses.

use crate::guideline::{GuidelineTable, Period, Pollutant};
use crate::readings::{hourly_profile, weekday_hour_grid, Correlation, HourlyMean, Reading, WeekGrid};

use super::chart::{
    y_ceiling, Chart, Plot, Svg, GUIDELINE_COLOR, MARGIN_LEFT, MARGIN_RIGHT, MARGIN_TOP, PM10_COLOR, PM25_COLOR,
};
use super::RenderTarget;

const DAY_NAMES: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

/// Yellow-orange-red ramp, light to dark.
const HEAT_RAMP: [(u8, u8, u8); 8] = [
    (255, 255, 204),
    (255, 237, 160),
    (254, 217, 118),
    (254, 178, 76),
    (253, 141, 60),
    (252, 78, 42),
    (227, 26, 28),
    (177, 0, 38),
];

const EMPTY_CELL: &str = "#eeeeee";
const SCATTER_COLOR: &str = "#4c72b0";

fn no_data(target: &RenderTarget, what: &str) -> Chart {
    let mut svg = Svg::new(target);
    svg.text(f64::from(target.width) / 2.0, f64::from(target.height) / 2.0, 16, "middle", "No data");
    Chart {
        svg: svg.finish(),
        description: format!("No data available for the {what}."),
    }
}

fn title(svg: &mut Svg, target: &RenderTarget, text: &str) {
    svg.text(f64::from(target.width) / 2.0, 28.0, 18, "middle", text);
}

// ============================================================================
// Hour of Day
// ============================================================================

/// PM2.5 bars and a PM10 line over the 24 hours of the day.
pub fn daily_pattern(target: &RenderTarget, table: &GuidelineTable, readings: &[Reading]) -> Chart {
    let profile = hourly_profile(readings);
    if profile.is_empty() {
        return no_data(target, "daily pattern");
    }

    let limit = |p: Pollutant| table.threshold(p, Period::Daily).map(|t| t.limit);
    let overlay_max = if target.overlays {
        limit(Pollutant::Pm10).unwrap_or(0.0)
    } else {
        0.0
    };
    let y_max = y_ceiling(profile.iter().flat_map(|h| [h.pm25, h.pm10]), overlay_max);
    let plot = Plot::new(target, 24.0, y_max);
    let mut svg = Svg::new(target);
    title(&mut svg, target, "Average concentration by hour of day (UTC)");
    plot.axes(&mut svg, "µg/m³");

    let slot = plot.width / 24.0;
    let bar = slot * 0.7;
    for h in &profile {
        let x = plot.x(f64::from(h.hour)) + (slot - bar) / 2.0;
        let y = plot.y(h.pm25);
        svg.rect(x, y, bar, plot.bottom() - y, PM25_COLOR);
    }
    let points: Vec<(f64, f64)> = profile
        .iter()
        .map(|h| (plot.x(f64::from(h.hour)) + slot / 2.0, plot.y(h.pm10)))
        .collect();
    svg.polyline(&points, PM10_COLOR);
    for (x, y) in &points {
        svg.circle(*x, *y, 3.0, PM10_COLOR);
    }
    for hour in (0..24).step_by(3) {
        svg.text(
            plot.x(f64::from(hour)) + slot / 2.0,
            plot.bottom() + 18.0,
            11,
            "middle",
            &format!("{hour:02}:00"),
        );
    }

    if target.overlays {
        for (pollutant, color) in [(Pollutant::Pm25, PM25_COLOR), (Pollutant::Pm10, PM10_COLOR)] {
            if let Some(limit) = limit(pollutant) {
                let y = plot.y(limit);
                svg.line(plot.left, y, plot.right(), y, color, true);
                svg.text(plot.right() - 4.0, y - 6.0, 11, "end", &format!("{pollutant} daily guideline ({limit} µg/m³)"));
            }
        }
    }

    svg.rect(plot.left, plot.bottom() + 29.0, 20.0, 10.0, PM25_COLOR);
    svg.text(plot.left + 25.0, plot.bottom() + 39.0, 12, "start", "PM2.5");
    svg.line(plot.left + 90.0, plot.bottom() + 35.0, plot.left + 110.0, plot.bottom() + 35.0, PM10_COLOR, false);
    svg.text(plot.left + 115.0, plot.bottom() + 39.0, 12, "start", "PM10");

    Chart {
        svg: svg.finish(),
        description: describe_daily_pattern(&profile),
    }
}

fn extreme_hour(profile: &[HourlyMean], value: impl Fn(&HourlyMean) -> f64, highest: bool) -> u32 {
    let pick = |a: &&HourlyMean, b: &&HourlyMean| value(a).total_cmp(&value(b));
    let found = if highest {
        // First of equal maxima, like the lowest
        profile.iter().rev().max_by(pick)
    } else {
        profile.iter().min_by(pick)
    };
    found.map_or(0, |h| h.hour)
}

fn describe_daily_pattern(profile: &[HourlyMean]) -> String {
    let pm25 = |h: &HourlyMean| h.pm25;
    let pm10 = |h: &HourlyMean| h.pm10;
    format!(
        "PM2.5 peaks at {:02}:00 and PM10 at {:02}:00. \
         The cleanest hours are {:02}:00 for PM2.5 and {:02}:00 for PM10 (UTC).",
        extreme_hour(profile, pm25, true),
        extreme_hour(profile, pm10, true),
        extreme_hour(profile, pm25, false),
        extreme_hour(profile, pm10, false),
    )
}

// ============================================================================
// Heatmap
// ============================================================================

/// Colour for `t` in `[0, 1]` along the heat ramp.
pub fn heat_color(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (HEAT_RAMP.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(HEAT_RAMP.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (HEAT_RAMP[i], HEAT_RAMP[i + 1]);
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * frac).round() as u8;
    format!("#{:02x}{:02x}{:02x}", mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Row-major first (day, hour, value) of the highest or lowest cell.
fn extreme_cell(grid: &WeekGrid, highest: bool) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (day, row) in grid.iter().enumerate() {
        for (hour, cell) in row.iter().enumerate() {
            let Some(v) = *cell else { continue };
            let better = match best {
                None => true,
                Some((_, _, b)) if highest => v > b,
                Some((_, _, b)) => v < b,
            };
            if better {
                best = Some((day, hour, v));
            }
        }
    }
    best
}

/// Mean PM2.5 per weekday (rows) and hour (columns).
pub fn heatmap(target: &RenderTarget, table: &GuidelineTable, readings: &[Reading]) -> Chart {
    let grid = weekday_hour_grid(readings);
    let (Some(worst), Some(best)) = (extreme_cell(&grid, true), extreme_cell(&grid, false)) else {
        return no_data(target, "heatmap");
    };

    let mut svg = Svg::new(target);
    title(&mut svg, target, "PM2.5 by day of week and hour (UTC)");

    let left = MARGIN_LEFT + 30.0;
    let legend_width = 70.0;
    let width = (f64::from(target.width) - left - MARGIN_RIGHT - legend_width).max(24.0);
    let height = (f64::from(target.height) - MARGIN_TOP - 50.0).max(7.0);
    let (cell_w, cell_h) = (width / 24.0, height / 7.0);
    let (lo, hi) = (best.2, worst.2);
    let span = hi - lo;

    for (day, row) in grid.iter().enumerate() {
        let y = MARGIN_TOP + day as f64 * cell_h;
        for (hour, cell) in row.iter().enumerate() {
            let x = left + hour as f64 * cell_w;
            let fill = match cell {
                Some(v) if span > 0.0 => heat_color((v - lo) / span),
                Some(_) => heat_color(0.5),
                None => EMPTY_CELL.to_string(),
            };
            svg.rect(x, y, cell_w - 1.0, cell_h - 1.0, &fill);
        }
        svg.text(left - 8.0, y + cell_h / 2.0 + 4.0, 12, "end", &DAY_NAMES[day][..3]);
    }
    for hour in (0..24).step_by(3) {
        svg.text(
            left + (f64::from(hour) + 0.5) * cell_w,
            MARGIN_TOP + height + 18.0,
            11,
            "middle",
            &format!("{hour:02}:00"),
        );
    }

    // Colour scale
    let bar_x = left + width + 20.0;
    let steps = HEAT_RAMP.len();
    let step_h = height / steps as f64;
    for i in 0..steps {
        let t = 1.0 - i as f64 / (steps - 1) as f64;
        svg.rect(bar_x, MARGIN_TOP + i as f64 * step_h, 16.0, step_h, &heat_color(t));
    }
    svg.text(bar_x + 20.0, MARGIN_TOP + 10.0, 11, "start", &format!("{hi:.0}"));
    svg.text(bar_x + 20.0, MARGIN_TOP + height, 11, "start", &format!("{lo:.0}"));

    if target.overlays {
        if let Some(limit) = table.threshold(Pollutant::Pm25, Period::Daily).map(|t| t.limit) {
            let over = grid.iter().flatten().flatten().filter(|v| **v > limit).count();
            svg.text(
                left,
                MARGIN_TOP + height + 40.0,
                12,
                "start",
                &format!("{over} weekday-hours average above the {limit} µg/m³ daily guideline"),
            );
        }
    }

    let description = format!(
        "PM2.5 is highest on {}s at {:02}:00 ({:.1} µg/m³) and lowest on {}s at {:02}:00 ({:.1} µg/m³), UTC.",
        DAY_NAMES[worst.0], worst.1, worst.2, DAY_NAMES[best.0], best.1, best.2,
    );
    Chart {
        svg: svg.finish(),
        description,
    }
}

// ============================================================================
// Correlation
// ============================================================================

/// Scatter of PM2.5 against one weather metric, with its regression line.
fn scatter_panel(svg: &mut Svg, plot: &Plot, x: &[f64], y: &[f64], label: &str, fit: Option<&Correlation>) {
    plot.axes(svg, "PM2.5 µg/m³");
    for (xv, yv) in x.iter().zip(y) {
        svg.circle(plot.x(*xv), plot.y(*yv), 2.0, SCATTER_COLOR);
    }
    let (x_lo, x_hi) = x.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

    let heading = match fit {
        Some(c) => {
            let at = |v: f64| (plot.x(v), plot.y((c.slope * v + c.intercept).max(0.0)));
            let (start, end) = (at(x_lo), at(x_hi));
            svg.line(start.0, start.1, end.0, end.1, GUIDELINE_COLOR, false);
            format!("PM2.5 vs {label} (r = {:.2})", c.coefficient)
        }
        None => format!("PM2.5 vs {label} (not enough variation)"),
    };
    svg.text((plot.left + plot.right()) / 2.0, MARGIN_TOP - 12.0, 13, "middle", &heading);
    svg.text(plot.left, plot.bottom() + 18.0, 11, "start", &format!("{x_lo:.0}"));
    svg.text(plot.right(), plot.bottom() + 18.0, 11, "end", &format!("{x_hi:.0}"));
    svg.text((plot.left + plot.right()) / 2.0, plot.bottom() + 36.0, 12, "middle", label);
}

/// PM2.5 against temperature and humidity, side by side.
pub fn correlation(target: &RenderTarget, readings: &[Reading]) -> Chart {
    if readings.is_empty() {
        return no_data(target, "correlation analysis");
    }

    let pm25: Vec<f64> = readings.iter().map(|r| r.pm25).collect();
    let temperature: Vec<f64> = readings.iter().map(|r| r.temperature).collect();
    let humidity: Vec<f64> = readings.iter().map(|r| r.humidity).collect();
    let with_temperature = Correlation::between(&temperature, &pm25);
    let with_humidity = Correlation::between(&humidity, &pm25);

    let mut svg = Svg::new(target);
    title(&mut svg, target, "Air quality vs environmental factors");

    let half = f64::from(target.width) / 2.0;
    let panel_width = half - MARGIN_LEFT - MARGIN_RIGHT;
    let y_max = y_ceiling(pm25.iter().copied(), 0.0);
    let panels = [
        (0.0, &temperature, "Temperature (°C)", with_temperature.as_ref()),
        (half, &humidity, "Humidity (%)", with_humidity.as_ref()),
    ];
    for (offset, x, label, fit) in panels {
        let (lo, hi) = x.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let plot = Plot::new(target, 1.0, y_max)
            .columns(offset + MARGIN_LEFT, panel_width)
            .x_range(lo, hi);
        scatter_panel(&mut svg, &plot, x, &pm25, label, fit);
    }

    Chart {
        svg: svg.finish(),
        description: describe_correlation(with_temperature.as_ref(), with_humidity.as_ref()),
    }
}

fn describe_correlation(temperature: Option<&Correlation>, humidity: Option<&Correlation>) -> String {
    let part = |c: Option<&Correlation>, factor: &str| match c {
        Some(c) => format!("{} correlation with {factor} (r = {:.2})", capitalise(c.strength()), c.coefficient),
        None => format!("No measurable correlation with {factor}"),
    };
    format!(
        "Correlation of PM2.5 with environmental factors. {}. {}.",
        part(temperature, "temperature"),
        part(humidity, "humidity"),
    )
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
