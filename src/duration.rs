//! Duration string parsing for configuration values (TTL, grace).
//!
//! A deliberately small parser, not a general humantime replacement: it
//! accepts a non-negative decimal number followed by an optional unit
//! (`ms`, `s`, `m`, `h`, `d`, `w`); a bare number is milliseconds.
//! Fractional values are accepted and floored to whole milliseconds.

use crate::error::{Error, Result};

/// Parses a duration string into milliseconds.
///
/// Examples: `"30s"` -> 30000, `"1.5m"` -> 90000, `"500"` -> 500,
/// `"2d"` -> 172800000.
pub fn parse_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::config("empty duration string"));
    }

    let split_at = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (number_part, unit_part) = input.split_at(split_at);

    let number: f64 = number_part
        .parse()
        .map_err(|_| Error::config(format!("invalid duration number: {number_part:?}")))?;
    if number < 0.0 {
        return Err(Error::config("duration must not be negative"));
    }

    let multiplier_ms: f64 = match unit_part {
        "" | "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        "w" => 604_800_000.0,
        other => return Err(Error::config(format!("unknown duration unit: {other:?}"))),
    };

    Ok((number * multiplier_ms).floor() as u64)
}
