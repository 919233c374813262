//! Timestamp precision and conversion to and from nanoseconds.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// The unit of the integer timestamps written on a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    #[default]
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown precision {0:?}, expected one of n, u, ms, s, m or h")]
pub struct PrecisionError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timestamp {value} at {precision} precision overflows a nanosecond timestamp")]
pub struct TimestampOverflow {
    pub value: i64,
    pub precision: Precision,
}

impl Precision {
    /// The number of nanoseconds in one unit of this precision.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Nanosecond => 1,
            Self::Microsecond => NANOS_PER_MICRO,
            Self::Millisecond => NANOS_PER_MILLI,
            Self::Second => NANOS_PER_SECOND,
            Self::Minute => NANOS_PER_MINUTE,
            Self::Hour => NANOS_PER_HOUR,
        }
    }

    /// Scales a timestamp written in this precision to nanoseconds.
    pub fn to_nanos(self, value: i64) -> Result<i64, TimestampOverflow> {
        value
            .checked_mul(self.nanos_per_unit())
            .ok_or(TimestampOverflow {
                value,
                precision: self,
            })
    }

    /// Scales a nanosecond timestamp down to this precision, dropping any
    /// remainder.
    pub const fn from_nanos(self, nanos: i64) -> i64 {
        nanos / self.nanos_per_unit()
    }

    /// Rounds a nanosecond timestamp down to the closest boundary of this
    /// precision, so the result survives [`Self::from_nanos`] followed by
    /// [`Self::to_nanos`] unchanged.
    pub const fn truncate(self, nanos: i64) -> i64 {
        nanos.saturating_sub(nanos.rem_euclid(self.nanos_per_unit()))
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nanosecond => "n",
            Self::Microsecond => "u",
            Self::Millisecond => "ms",
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
        })
    }
}

/// Parses the precision selector of a write request. The empty string
/// selects nanoseconds.
impl FromStr for Precision {
    type Err = PrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "n" | "ns" => Self::Nanosecond,
            "u" | "us" | "µ" | "µs" => Self::Microsecond,
            "ms" => Self::Millisecond,
            "s" => Self::Second,
            "m" => Self::Minute,
            "h" => Self::Hour,
            other => return Err(PrecisionError(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Precision; 6] = [
        Precision::Nanosecond,
        Precision::Microsecond,
        Precision::Millisecond,
        Precision::Second,
        Precision::Minute,
        Precision::Hour,
    ];

    #[test]
    fn parse_selectors() {
        assert_eq!("".parse::<Precision>().unwrap(), Precision::Nanosecond);
        assert_eq!("n".parse::<Precision>().unwrap(), Precision::Nanosecond);
        assert_eq!("u".parse::<Precision>().unwrap(), Precision::Microsecond);
        assert_eq!("ms".parse::<Precision>().unwrap(), Precision::Millisecond);
        assert_eq!("s".parse::<Precision>().unwrap(), Precision::Second);
        assert_eq!("m".parse::<Precision>().unwrap(), Precision::Minute);
        assert_eq!("h".parse::<Precision>().unwrap(), Precision::Hour);

        let err = "d".parse::<Precision>().unwrap_err();
        assert_eq!(err.to_string(), r#"unknown precision "d", expected one of n, u, ms, s, m or h"#);
    }

    #[test]
    fn display_parses_back() {
        for p in ALL {
            assert_eq!(p.to_string().parse::<Precision>().unwrap(), p);
        }
    }

    #[test]
    fn scale_to_nanos() {
        assert_eq!(
            Precision::Microsecond.to_nanos(946730096789012).unwrap(),
            946730096789012000
        );
        assert_eq!(Precision::Minute.to_nanos(15778834).unwrap(), 946730040000000000);
        assert_eq!(Precision::Hour.to_nanos(262980).unwrap(), 946728000000000000);
        assert_eq!(Precision::Second.to_nanos(-5).unwrap(), -5_000_000_000);
    }

    #[test]
    fn scale_overflow() {
        let err = Precision::Second.to_nanos(i64::MAX / 10).unwrap_err();
        assert_eq!(err.precision, Precision::Second);
        assert!(Precision::Hour.to_nanos(i64::MIN / 1000).is_err());
        assert_eq!(Precision::Nanosecond.to_nanos(i64::MAX).unwrap(), i64::MAX);
    }

    #[test]
    fn truncate_to_boundary() {
        // 2000-01-01T12:34:56.789012345Z
        let t = 946730096789012345;
        assert_eq!(Precision::Nanosecond.truncate(t), t);
        assert_eq!(Precision::Microsecond.truncate(t), 946730096789012000);
        assert_eq!(Precision::Millisecond.truncate(t), 946730096789000000);
        assert_eq!(Precision::Second.truncate(t), 946730096000000000);
        assert_eq!(Precision::Minute.truncate(t), 946730040000000000);
        assert_eq!(Precision::Hour.truncate(t), 946728000000000000);

        // before the epoch the boundary is still the one below
        assert_eq!(Precision::Second.truncate(-1), -1_000_000_000);
    }

    #[test]
    fn truncated_time_round_trips() {
        let t = 946730096789012345;
        for p in ALL {
            let truncated = p.truncate(t);
            assert_eq!(p.to_nanos(p.from_nanos(truncated)).unwrap(), truncated);
        }
    }
}
