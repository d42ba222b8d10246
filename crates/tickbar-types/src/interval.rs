//! Bar aggregation interval definitions.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::IntervalError;

/// Fixed bar aggregation interval.
///
/// Boundaries are aligned to the Unix epoch in UTC, so every interval start
/// is an exact multiple of the interval size.
///
/// Serializes as the short code (`m1`). Deserializing accepts everything
/// [`FromStr`] does, so config files and the CLI share one syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String")]
pub enum Interval {
    /// 1-second bars.
    #[serde(rename = "s1")]
    Second1,
    /// 1-minute bars.
    #[default]
    #[serde(rename = "m1")]
    Minute1,
    /// 5-minute bars.
    #[serde(rename = "m5")]
    Minute5,
    /// 15-minute bars.
    #[serde(rename = "m15")]
    Minute15,
    /// 30-minute bars.
    #[serde(rename = "m30")]
    Minute30,
    /// 1-hour bars.
    #[serde(rename = "h1")]
    Hour1,
    /// 4-hour bars.
    #[serde(rename = "h4")]
    Hour4,
    /// Daily bars.
    #[serde(rename = "d1")]
    Day1,
}

impl Interval {
    /// Returns the interval size in seconds.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        match self {
            Self::Second1 => 1,
            Self::Minute1 => 60,
            Self::Minute5 => 300,
            Self::Minute15 => 900,
            Self::Minute30 => 1800,
            Self::Hour1 => 3600,
            Self::Hour4 => 14400,
            Self::Day1 => 86400,
        }
    }

    /// Returns the interval size as a duration.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.seconds())
    }

    /// Looks up the interval with the given size in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::NonPositive`] for zero or negative sizes and
    /// [`IntervalError::Unsupported`] for sizes with no matching interval.
    pub fn from_seconds(seconds: i64) -> Result<Self, IntervalError> {
        if seconds <= 0 {
            return Err(IntervalError::NonPositive(seconds));
        }
        Self::all()
            .iter()
            .copied()
            .find(|interval| interval.seconds() == seconds)
            .ok_or(IntervalError::Unsupported(seconds))
    }

    /// Truncates a timestamp to the start of the interval containing it.
    ///
    /// A timestamp exactly on a boundary is the start of a new interval.
    #[must_use]
    pub fn floor(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let rem_secs = timestamp.timestamp().rem_euclid(self.seconds());
        let subsec = i64::from(timestamp.timestamp_subsec_nanos());
        timestamp - TimeDelta::seconds(rem_secs) - TimeDelta::nanoseconds(subsec)
    }

    /// Returns the exclusive end of the interval starting at `start`.
    #[must_use]
    pub fn end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.duration()
    }

    /// Returns the interval as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Second1 => "s1",
            Self::Minute1 => "m1",
            Self::Minute5 => "m5",
            Self::Minute15 => "m15",
            Self::Minute30 => "m30",
            Self::Hour1 => "h1",
            Self::Hour4 => "h4",
            Self::Day1 => "d1",
        }
    }

    /// Returns all supported intervals.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Second1,
            Self::Minute1,
            Self::Minute5,
            Self::Minute15,
            Self::Minute30,
            Self::Hour1,
            Self::Hour4,
            Self::Day1,
        ]
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(seconds) = s.parse::<i64>() {
            return Self::from_seconds(seconds);
        }
        match s.to_lowercase().as_str() {
            "s1" | "1s" | "second" | "second1" => Ok(Self::Second1),
            "m1" | "1m" | "minute" | "minute1" => Ok(Self::Minute1),
            "m5" | "5m" | "minute5" => Ok(Self::Minute5),
            "m15" | "15m" | "minute15" => Ok(Self::Minute15),
            "m30" | "30m" | "minute30" => Ok(Self::Minute30),
            "h1" | "1h" | "hour" | "hour1" => Ok(Self::Hour1),
            "h4" | "4h" | "hour4" => Ok(Self::Hour4),
            "d1" | "1d" | "day" | "day1" | "daily" => Ok(Self::Day1),
            _ => Err(IntervalError::Parse(s.to_string())),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
