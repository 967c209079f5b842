//! Byte sizes, transfer-rate caps and duration strings.
//!
//! Byte units follow the usual humanised conventions: `KB`/`K` are powers of
//! 1000 and `KiB`/`Ki` are powers of 1024. Durations use the `1h30m` form with
//! an extra `d` unit for days.

use std::fmt;

use chrono::TimeDelta;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::UnitError;

const BYTE_UNITS: &[(&str, i64)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1_000),
    ("kb", 1_000),
    ("ki", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1_000_000),
    ("mb", 1_000_000),
    ("mi", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1_000_000_000),
    ("gb", 1_000_000_000),
    ("gi", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1_000_000_000_000),
    ("tb", 1_000_000_000_000),
    ("ti", 1 << 40),
    ("tib", 1 << 40),
    ("p", 1_000_000_000_000_000),
    ("pb", 1_000_000_000_000_000),
    ("pi", 1 << 50),
    ("pib", 1 << 50),
];

const NANOS_PER_MICRO: i128 = 1_000;
const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

const DURATION_UNITS: &[(&str, i128)] = &[
    ("ns", 1),
    ("us", NANOS_PER_MICRO),
    ("\u{b5}s", NANOS_PER_MICRO),
    ("\u{3bc}s", NANOS_PER_MICRO),
    ("ms", NANOS_PER_MILLI),
    ("s", NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("h", 3_600 * NANOS_PER_SECOND),
    ("d", 86_400 * NANOS_PER_SECOND),
];

/// A signed byte quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bytes(pub i64);

impl Bytes {
    /// Zero bytes.
    pub const ZERO: Self = Self(0);

    /// Raw byte count.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// True when the quantity is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl From<i64> for Bytes {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Parse a humanised byte quantity such as `10GB`, `1.5 GiB` or `-1`.
///
/// # Errors
///
/// Returns [`UnitError::InvalidBytes`] for malformed numbers, unknown units or
/// values that do not fit in an `i64`.
pub fn parse_bytes(value: &str) -> Result<i64, UnitError> {
    let invalid = |reason| UnitError::InvalidBytes {
        value: value.to_string(),
        reason,
    };

    let trimmed = value.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let split = body
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(body.len());
    let (number, unit) = body.split_at(split);
    let number = number.replace(',', "");
    if number.is_empty() {
        return Err(invalid("missing number"));
    }

    let unit = unit.trim().to_ascii_lowercase();
    let multiplier = BYTE_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, multiplier)| *multiplier)
        .ok_or_else(|| invalid("unknown unit"))?;

    let magnitude = if number.contains('.') {
        let parsed: f64 = number.parse().map_err(|_| invalid("malformed number"))?;
        let scaled = (parsed * multiplier as f64).trunc();
        if !scaled.is_finite() || scaled >= i64::MAX as f64 {
            return Err(invalid("value out of range"));
        }
        #[allow(clippy::cast_possible_truncation)]
        let bytes = scaled as i64;
        bytes
    } else {
        number
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(|| invalid("value out of range"))?
    };

    Ok(if negative { -magnitude } else { magnitude })
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor;

        impl Visitor<'_> for BytesVisitor {
            type Value = Bytes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as `10GB`")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Bytes, E> {
                Ok(Bytes(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Bytes, E> {
                i64::try_from(value)
                    .map(Bytes)
                    .map_err(|_| E::custom("byte count out of range"))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Bytes, E> {
                parse_bytes(value).map(Bytes).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(BytesVisitor)
    }
}

/// Upload cap applied by the throttle action.
///
/// `-1` is the conventional "no cap" sentinel; it is kept as its own variant so
/// no unit conversion can alter its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimit {
    /// Remove any cap.
    Unlimited,
    /// Cap at the given number of bytes per second.
    BytesPerSecond(u64),
}

impl RateLimit {
    /// Interpret a signed byte count, treating `-1` as unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::InvalidBytes`] for negative values other than `-1`.
    pub fn from_bytes(value: i64) -> Result<Self, UnitError> {
        match value {
            -1 => Ok(Self::Unlimited),
            v if v < 0 => Err(UnitError::InvalidBytes {
                value: value.to_string(),
                reason: "negative rate limit",
            }),
            #[allow(clippy::cast_sign_loss)]
            v => Ok(Self::BytesPerSecond(v as u64)),
        }
    }

    /// Parse `unlimited`, `-1` or a byte quantity per second.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::InvalidBytes`] when the value cannot be parsed.
    pub fn parse(value: &str) -> Result<Self, UnitError> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        let without_suffix = trimmed
            .strip_suffix("/s")
            .or_else(|| trimmed.strip_suffix("ps"))
            .unwrap_or(trimmed);
        Self::from_bytes(parse_bytes(without_suffix)?)
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::BytesPerSecond(bytes) => write!(f, "{bytes}B/s"),
        }
    }
}

impl<'de> Deserialize<'de> for RateLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RateVisitor;

        impl Visitor<'_> for RateVisitor {
            type Value = RateLimit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("`unlimited`, -1 or a rate such as `1MiB`")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RateLimit, E> {
                RateLimit::from_bytes(value).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RateLimit, E> {
                Ok(RateLimit::BytesPerSecond(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RateLimit, E> {
                RateLimit::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RateVisitor)
    }
}

/// Parse a duration such as `1h`, `90s`, `2h45m`, `1.5h` or `7d`.
///
/// # Errors
///
/// Returns [`UnitError::InvalidDuration`] for malformed input or values that
/// overflow the representable range.
pub fn parse_duration(value: &str) -> Result<TimeDelta, UnitError> {
    let invalid = |reason| UnitError::InvalidDuration {
        value: value.to_string(),
        reason,
    };

    let trimmed = value.trim();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid("expected a number"));
        }
        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid("missing unit"));
        }
        let scale = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| invalid("unknown unit"))?;

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("malformed number"))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid("duration out of range"))?;
        if !fraction.is_empty() {
            let digits: f64 = format!("0.{fraction}")
                .parse()
                .map_err(|_| invalid("malformed number"))?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let extra = (digits * scale as f64) as i128;
            nanos += extra;
        }
        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid("duration out of range"))?;
        rest = after;
    }

    let total = i64::try_from(total).map_err(|_| invalid("duration out of range"))?;
    let delta = TimeDelta::nanoseconds(total);
    Ok(if negative { -delta } else { delta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_units_follow_si_and_iec() {
        assert_eq!(parse_bytes("10"), Ok(10));
        assert_eq!(parse_bytes("10M"), Ok(10_000_000));
        assert_eq!(parse_bytes("10MB"), Ok(10_000_000));
        assert_eq!(parse_bytes("10MiB"), Ok(10 * 1024 * 1024));
        assert_eq!(parse_bytes("2 GiB"), Ok(2_147_483_648));
        assert_eq!(parse_bytes("1.5kb"), Ok(1_500));
        assert_eq!(parse_bytes("1,024 B"), Ok(1_024));
        assert_eq!(parse_bytes("-1"), Ok(-1));
    }

    #[test]
    fn malformed_byte_strings_fail() {
        assert!(matches!(
            parse_bytes("ten"),
            Err(UnitError::InvalidBytes {
                reason: "missing number",
                ..
            })
        ));
        assert!(matches!(
            parse_bytes("10XB"),
            Err(UnitError::InvalidBytes {
                reason: "unknown unit",
                ..
            })
        ));
        assert!(parse_bytes("99999999999PB").is_err());
        assert!(parse_bytes("").is_err());
    }

    #[test]
    fn rate_limit_keeps_the_unlimited_sentinel() {
        assert_eq!(RateLimit::parse("-1"), Ok(RateLimit::Unlimited));
        assert_eq!(RateLimit::parse("Unlimited"), Ok(RateLimit::Unlimited));
        assert_eq!(
            RateLimit::parse("1MiB/s"),
            Ok(RateLimit::BytesPerSecond(1_048_576))
        );
        assert_eq!(
            RateLimit::parse("512KB"),
            Ok(RateLimit::BytesPerSecond(512_000))
        );
        assert!(RateLimit::parse("-2").is_err());
    }

    #[test]
    fn bytes_and_rates_deserialize_from_numbers_and_strings() {
        let bytes: Vec<Bytes> = serde_json::from_str(r#"[4096, "1KiB", "-1"]"#).unwrap();
        assert_eq!(bytes, vec![Bytes(4096), Bytes(1024), Bytes(-1)]);

        let rates: Vec<RateLimit> = serde_json::from_str(r#"[-1, 2048, "1MB"]"#).unwrap();
        assert_eq!(
            rates,
            vec![
                RateLimit::Unlimited,
                RateLimit::BytesPerSecond(2048),
                RateLimit::BytesPerSecond(1_000_000),
            ]
        );
    }

    #[test]
    fn durations_accept_compound_and_fractional_forms() {
        assert_eq!(parse_duration("1h"), Ok(TimeDelta::hours(1)));
        assert_eq!(parse_duration("90s"), Ok(TimeDelta::seconds(90)));
        assert_eq!(
            parse_duration("2h45m"),
            Ok(TimeDelta::hours(2) + TimeDelta::minutes(45))
        );
        assert_eq!(parse_duration("1.5h"), Ok(TimeDelta::minutes(90)));
        assert_eq!(parse_duration("7d"), Ok(TimeDelta::days(7)));
        assert_eq!(parse_duration("250ms"), Ok(TimeDelta::milliseconds(250)));
        assert_eq!(parse_duration("-30m"), Ok(TimeDelta::minutes(-30)));
        assert_eq!(parse_duration("0"), Ok(TimeDelta::zero()));
    }

    #[test]
    fn malformed_durations_fail() {
        for input in ["", "h", "10", "1x", "1.h2", "--1h"] {
            assert!(parse_duration(input).is_err(), "{input} should fail");
        }
    }
}
