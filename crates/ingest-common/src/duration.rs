//! Duration string parsing
//!
//! Accepts the compact notation used by the service's environment variables:
//! a sequence of decimal numbers, each with an optional fraction and a unit
//! suffix, e.g. `300ms`, `1.5s`, `5m` or `2h45m`.
//!
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
//! is accepted as zero. Negative durations are rejected.

use std::time::Duration;

use crate::error::{CommonError, Result};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration string such as `1h30m` into a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || CommonError::InvalidDuration(input.to_string());

    let mut rest = input.trim();
    rest = rest.strip_prefix('+').unwrap_or(rest);

    if rest.is_empty() || rest.starts_with('-') {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            },
            None => ("", after_int),
        };

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);
        let unit_nanos = unit_in_nanos(unit).ok_or_else(invalid)?;

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid())?
        };

        // Ignore fraction digits beyond nanosecond precision
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        let fraction: u128 = if frac_digits.is_empty() {
            0
        } else {
            let numerator: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            numerator * unit_nanos / scale
        };

        total = whole
            .checked_mul(unit_nanos)
            .and_then(|n| n.checked_add(fraction))
            .and_then(|n| total.checked_add(n))
            .ok_or_else(invalid)?;

        rest = remainder;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid())?;
    Ok(Duration::from_nanos(nanos))
}

fn unit_in_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}
