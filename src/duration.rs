//! Duration normalization and commit-time validation.
//!
//! A countdown is entered as a free-form magnitude plus a unit. Everything
//! downstream (expiry, sorting, warnings) works in minutes.
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{MemoError, Result};

/// Longest countdown a note may carry: 365 days.
pub const MAX_DURATION_MINUTES: f64 = 525_600.0;

pub const MINUTES_PER_HOUR: f64 = 60.0;
pub const MINUTES_PER_DAY: f64 = 60.0 * 24.0;

/// Unit a duration magnitude is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    /// Number of minutes in one of this unit.
    pub fn minutes_per_unit(self) -> f64 {
        match self {
            DurationUnit::Minutes => 1.0,
            DurationUnit::Hours => MINUTES_PER_HOUR,
            DurationUnit::Days => MINUTES_PER_DAY,
        }
    }

    /// Parses a stored unit name. Anything unknown is read as minutes, so the
    /// raw magnitude keeps its value.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DurationUnit::Minutes => "minutes",
            DurationUnit::Hours => "hours",
            DurationUnit::Days => "days",
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationUnit {
    type Err = MemoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutes" | "minute" | "min" | "m" => Ok(DurationUnit::Minutes),
            "hours" | "hour" | "h" => Ok(DurationUnit::Hours),
            "days" | "day" | "d" => Ok(DurationUnit::Days),
            other => Err(MemoError::InvalidDuration {
                message: format!("unknown duration unit `{}`", other),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for DurationUnit {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Self::parse_lenient(&s)).unwrap_or_default())
    }
}

/// Whether a magnitude is the "no expiry" marker.
pub fn is_sentinel(magnitude: &str) -> bool {
    let trimmed = magnitude.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none")
}

/// Converts a magnitude/unit pair to minutes.
///
/// Never fails: unparsable, negative or non-finite input yields `0.0`.
pub fn to_minutes(magnitude: &str, unit: DurationUnit) -> f64 {
    let value = parse_leading_float(magnitude).map_or(0.0, |(value, _)| value);
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    let minutes = value * unit.minutes_per_unit();
    if minutes.is_finite() {
        minutes
    } else {
        0.0
    }
}

/// Largest magnitude accepted for `unit` under the one-year cap.
pub fn max_magnitude(unit: DurationUnit) -> f64 {
    MAX_DURATION_MINUTES / unit.minutes_per_unit()
}

/// Checks a magnitude before it is committed to a note and returns its
/// length in minutes.
///
/// Only plain decimal literals pass, so the checked value is exactly what
/// [`to_minutes`] later reads from the stored string.
pub fn validate_magnitude(magnitude: &str, unit: DurationUnit) -> Result<f64> {
    let trimmed = magnitude.trim();
    let value = match parse_leading_float(trimmed) {
        Some((value, consumed)) if consumed == trimmed.len() => value,
        _ => {
            return Err(MemoError::InvalidDuration {
                message: format!("`{}` is not a number", trimmed),
            })
        }
    };

    if !value.is_finite() || value <= 0.0 {
        return Err(MemoError::InvalidDuration {
            message: "Enter a duration greater than zero".to_string(),
        });
    }

    let minutes = value * unit.minutes_per_unit();
    if minutes > MAX_DURATION_MINUTES {
        return Err(MemoError::InvalidDuration {
            message: format!(
                "Enter a duration of at most one year ({} {})",
                max_magnitude(unit),
                unit
            ),
        });
    }

    Ok(minutes)
}

// Same leniency as a JS-style parseFloat, minus exponents: "12abc" reads
// as 12. Also returns how many bytes of the trimmed input were consumed.
fn parse_leading_float(input: &str) -> Option<(f64, usize)> {
    let s = input.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }
    let value = s[..end].trim_end_matches('.').parse().ok()?;
    Some((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_units_to_minutes() {
        assert_eq!(to_minutes("2", DurationUnit::Hours), 120.0);
        assert_eq!(to_minutes("1", DurationUnit::Days), 1440.0);
        assert_eq!(to_minutes("15", DurationUnit::Minutes), 15.0);
        assert_eq!(to_minutes("1.5", DurationUnit::Hours), 90.0);
    }

    #[test]
    fn to_minutes_is_total() {
        for input in ["", "abc", "-5", "NaN", "inf", " ", ".", "+", "1e400"] {
            let minutes = to_minutes(input, DurationUnit::Days);
            assert!(minutes.is_finite(), "{input:?} gave {minutes}");
            assert!(minutes >= 0.0, "{input:?} gave {minutes}");
        }
        assert_eq!(to_minutes("abc", DurationUnit::Minutes), 0.0);
        assert_eq!(to_minutes("12abc", DurationUnit::Minutes), 12.0);
        assert_eq!(to_minutes("  7 ", DurationUnit::Minutes), 7.0);
    }

    #[test]
    fn unknown_unit_reads_as_minutes() {
        assert_eq!(DurationUnit::parse_lenient("fortnights"), DurationUnit::Minutes);
        assert_eq!(DurationUnit::parse_lenient("HOURS"), DurationUnit::Hours);
        assert_eq!(DurationUnit::parse_lenient("days"), DurationUnit::Days);
    }

    #[test]
    fn validation_enforces_one_year_cap() {
        assert_eq!(validate_magnitude("525600", DurationUnit::Minutes).unwrap(), 525_600.0);
        assert_eq!(validate_magnitude("8760", DurationUnit::Hours).unwrap(), 525_600.0);
        assert_eq!(validate_magnitude("365", DurationUnit::Days).unwrap(), 525_600.0);

        assert!(validate_magnitude("525601", DurationUnit::Minutes).is_err());
        assert!(validate_magnitude("8761", DurationUnit::Hours).is_err());
        assert!(validate_magnitude("366", DurationUnit::Days).is_err());
    }

    #[test]
    fn validation_rejects_non_positive_and_garbage() {
        for bad in ["0", "-3", "abc", "", "NaN", "inf", "12abc", "5 5"] {
            let err = validate_magnitude(bad, DurationUnit::Minutes).unwrap_err();
            assert!(matches!(err, MemoError::InvalidDuration { .. }), "{bad:?}");
        }
    }

    #[test]
    fn validation_rejects_exponents() {
        // Stored magnitudes are read back by `to_minutes`, which stops at the `e`.
        for bad in ["1e3", "99999e-5", "1E2", "2.5e1"] {
            assert!(
                validate_magnitude(bad, DurationUnit::Days).is_err(),
                "{bad:?} passed validation"
            );
        }
        assert_eq!(to_minutes("1e3", DurationUnit::Minutes), 1.0);
    }

    #[test]
    fn validated_value_matches_normalizer() {
        for (input, unit) in [
            ("1.5", DurationUnit::Hours),
            (" 7 ", DurationUnit::Minutes),
            ("+2", DurationUnit::Days),
            ("3.", DurationUnit::Minutes),
        ] {
            assert_eq!(validate_magnitude(input, unit).unwrap(), to_minutes(input, unit));
        }
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_sentinel(""));
        assert!(is_sentinel("   "));
        assert!(is_sentinel("None"));
        assert!(!is_sentinel("5"));
    }
}
