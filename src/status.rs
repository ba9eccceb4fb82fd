//! Text rendering of the live readings for the status line.

use vitalwatch_core::{LiveReading, PressurePoint, SessionStatus};

const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Placeholder for a reading that has not arrived yet.
pub const UNSET: &str = "—";

/// Number of trend points shown in the sparkline.
pub const SPARKLINE_WIDTH: usize = 24;

pub fn format_heart_rate(bpm: Option<f64>) -> String {
    match bpm {
        Some(bpm) => format!("{:.0} bpm", bpm),
        None => UNSET.to_string(),
    }
}

pub fn format_oxygen_saturation(pct: Option<f64>) -> String {
    match pct {
        Some(pct) => format!("{:.1} %", pct),
        None => UNSET.to_string(),
    }
}

pub fn format_pressure(volts: Option<f64>) -> String {
    match volts {
        Some(volts) => format!("{:.2} V", volts),
        None => UNSET.to_string(),
    }
}

/// Short label for the session status.
pub fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Stopped => "paused",
        SessionStatus::Starting => "starting",
        SessionStatus::Running(state) => state.label(),
    }
}

/// Normalize the last `width` pressure values to 0-7 for 8 bar levels.
///
/// A flat trend renders at the lowest level.
pub fn normalize_trend(points: &[PressurePoint], width: usize) -> Vec<u8> {
    let tail = &points[points.len().saturating_sub(width)..];
    if tail.is_empty() {
        return Vec::new();
    }

    let min = tail.iter().map(|p| p.pressure_volts).fold(f64::INFINITY, f64::min);
    let max = tail.iter().map(|p| p.pressure_volts).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    tail.iter()
        .map(|p| {
            if range <= f64::EPSILON {
                0
            } else {
                let normalized = ((p.pressure_volts - min) / range * 7.0).round() as u8;
                normalized.min(7)
            }
        })
        .collect()
}

pub fn render_sparkline(levels: &[u8]) -> String {
    levels
        .iter()
        .map(|&v| SPARKLINE_CHARS[v.min(7) as usize])
        .collect()
}

/// One-line summary of the session.
///
/// ```
/// use vitalwatch::status::status_line;
/// use vitalwatch_core::{ConnectionState, LiveReading, SessionStatus};
///
/// let live = LiveReading { heart_rate_bpm: Some(72.0), oxygen_saturation_pct: None };
/// let line = status_line(SessionStatus::Running(ConnectionState::Connected), &live, &[]);
/// assert_eq!(line, "[connected] HR 72 bpm | SpO2 — | Pressure —");
/// ```
pub fn status_line(status: SessionStatus, live: &LiveReading, trend: &[PressurePoint]) -> String {
    let latest = trend.last().map(|p| p.pressure_volts);
    let mut line = format!(
        "[{}] HR {} | SpO2 {} | Pressure {}",
        status_label(status),
        format_heart_rate(live.heart_rate_bpm),
        format_oxygen_saturation(live.oxygen_saturation_pct),
        format_pressure(latest),
    );

    let sparkline = render_sparkline(&normalize_trend(trend, SPARKLINE_WIDTH));
    if !sparkline.is_empty() {
        line.push(' ');
        line.push_str(&sparkline);
    }
    line
}
