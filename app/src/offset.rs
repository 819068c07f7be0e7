//! Camera clock offset: parsing and the manual/automatic policy

use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use track_index::{OffsetEstimator, TrackIndex};

static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|h|m|s)").expect("duration part regex"));

/// Parse an offset such as `-30s`, `1h30m`, `250ms` or a bare number of seconds (`90`, `-1.5`).
///
/// An empty string is a zero offset.
pub fn parse_time_offset(raw: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("invalid time offset {raw:?} (expected e.g. -30s, 1h30m or 90)");

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(TimeDelta::zero());
    }
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let nanos = match body.parse::<f64>() {
        Ok(secs) if secs.is_finite() => secs * 1e9,
        Ok(_) => return Err(invalid()),
        Err(_) => {
            let mut total = 0.0;
            let mut consumed = 0;
            for caps in DURATION_PART.captures_iter(body) {
                let Some(whole) = caps.get(0) else { continue };
                if whole.start() != consumed {
                    return Err(invalid());
                }
                consumed = whole.end();

                let value: f64 = caps[1].parse().map_err(|_| invalid())?;
                let unit = match &caps[2] {
                    "h" => 3_600e9,
                    "m" => 60e9,
                    "s" => 1e9,
                    "ms" => 1e6,
                    "us" | "µs" => 1e3,
                    _ => 1.0,
                };
                total += value * unit;
            }
            if consumed == 0 || consumed != body.len() {
                return Err(invalid());
            }
            total
        }
    };

    let nanos = nanos.round() as i64;
    Ok(TimeDelta::nanoseconds(if negative { -nanos } else { nanos }))
}

/// Human form of an offset for log lines, e.g. `-1h2m3.5s`.
pub fn format_offset(offset: TimeDelta) -> String {
    let sign = if offset < TimeDelta::zero() { "-" } else { "" };
    let abs = offset.abs();
    let hours = abs.num_hours();
    let minutes = abs.num_minutes() % 60;
    let millis = abs.num_milliseconds() % 60_000;

    let mut out = sign.to_string();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if millis % 1000 == 0 {
        out.push_str(&format!("{}s", millis / 1000));
    } else {
        out.push_str(&format!("{}s", millis as f64 / 1000.0));
    }
    out
}

/// Offset to apply to every capture time.
///
/// A non-zero manual offset always wins. Otherwise, when `auto` is set, the
/// estimator runs over the captures; if it finds nothing usable the offset
/// stays zero.
pub fn resolve_offset(
    manual: TimeDelta,
    auto: bool,
    estimator: &OffsetEstimator,
    track: &TrackIndex,
    captures: &[DateTime<Utc>],
) -> TimeDelta {
    if !auto {
        info!("Auto offset disabled, using manual offset: {}", format_offset(manual));
        return manual;
    }
    if !manual.is_zero() {
        info!("Using manual time offset: {}", format_offset(manual));
        return manual;
    }

    match estimator.estimate_for_track(track, captures.iter().copied()) {
        Ok(estimate) => {
            info!(
                "Auto-detected time offset: {} using {} samples",
                format_offset(estimate.offset),
                estimate.samples_used
            );
            estimate.offset
        }
        Err(err) => {
            warn!("Auto offset detection failed, using 0s: {err}");
            TimeDelta::zero()
        }
    }
}
