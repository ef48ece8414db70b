use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{PushgateError, Result};

pub fn unix_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

/// Parses durations such as `250ms`, `30s`, `5m`, `1h` or `2h30m`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let value = input.trim();
    if value.is_empty() {
        return Err(PushgateError::InvalidConfig("empty duration".to_string()));
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid_duration(input));
        }
        let amount = rest[..digits]
            .parse::<u64>()
            .map_err(|_| invalid_duration(input))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(60 * 60)),
            "d" => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
            _ => return Err(invalid_duration(input)),
        };
        total = total.saturating_add(part);
        rest = &rest[unit_len..];
    }

    Ok(total)
}

fn invalid_duration(input: &str) -> PushgateError {
    PushgateError::InvalidConfig(format!("invalid duration: {input:?}"))
}
