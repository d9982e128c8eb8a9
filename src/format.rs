use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

/// Parses an LMS duration into whole minutes.
///
/// Accepts `.NET` TimeSpan strings (`[d.]HH:MM:SS[.fffffff]`) and plain
/// numbers of minutes. Anything unparsable is 0.
pub fn parse_minutes(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() < 2 {
        return raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(|value| value as i64)
            .unwrap_or(0);
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((days, hours)) => (days.parse::<i64>(), hours.parse::<i64>()),
        None => (Ok(0), parts[0].parse::<i64>()),
    };
    let minutes = parts[1].parse::<i64>();

    match (days, hours, minutes) {
        (Ok(days), Ok(hours), Ok(minutes)) => (days * 1440 + hours * 60 + minutes).max(0),
        _ => 0,
    }
}

pub fn minutes_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_f64()
            .filter(|minutes| minutes.is_finite() && *minutes > 0.0)
            .map(|minutes| minutes as i64)
            .unwrap_or(0),
        Value::String(text) => parse_minutes(text),
        _ => 0,
    }
}

/// Numeric or numeric-string progress; everything else is 0.
pub fn progress_from_value(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|progress| progress.is_finite()).unwrap_or(0.0)
}

pub fn optional_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
}

/// LMS timestamps arrive with or without an offset and fractional seconds.
pub fn parse_lms_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressBand {
    High,
    Med,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressDisplay {
    pub value: f64,
    pub display: String,
    pub band: ProgressBand,
}

pub fn format_progress(progress: f64) -> ProgressDisplay {
    let progress = if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let band = if progress >= 75.0 {
        ProgressBand::High
    } else if progress >= 40.0 {
        ProgressBand::Med
    } else {
        ProgressBand::Low
    };

    ProgressDisplay {
        value: (progress * 10.0).round() / 10.0,
        display: format!("{}%", progress.round() as i64),
        band,
    }
}

pub fn format_time_spent(minutes: i64) -> String {
    if minutes <= 0 {
        return "0m".to_string();
    }

    let hours = minutes / 60;
    let remaining = minutes % 60;
    match (hours, remaining) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
