use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{AppError, Result};

static DURATION_PART: OnceLock<Regex> = OnceLock::new();

fn duration_part() -> &'static Regex {
    DURATION_PART.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("valid duration regex")
    })
}

/// Parse interval strings such as `30s`, `1m`, `500ms` or `1h30m`.
/// Every number needs a unit and the total must be positive.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || AppError::InvalidDuration(input.to_string());

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let caps = duration_part().captures(rest).ok_or_else(invalid)?;
        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * unit;
        rest = &rest[caps[0].len()..];
    }

    let nanos = nanos.round();
    if nanos < 1.0 || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}
