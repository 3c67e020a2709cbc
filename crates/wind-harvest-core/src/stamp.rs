//! Canonical interval stamps.
//!
//! Upstream snapshots are published at a fixed cadence (every 6 hours for
//! GFS). Every point in time maps to exactly one [`Stamp`]: its UTC calendar
//! date plus the hour truncated down to the nearest interval boundary.
//!
//! ```text
//! 2024-11-25T05:00Z ──▶ 2024112500
//! 2024-11-25T07:00Z ──▶ 2024112506
//! 2024-11-25T23:59Z ──▶ 2024112518
//! ```
//!
//! The textual form (`YYYYMMDDHH`) is the archive key: staged payloads and
//! archived artifacts are named after it.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Publication cadence in whole hours.
///
/// Must divide 24 so that every day holds the same set of boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Interval {
    hours: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("interval must be a positive divisor of 24 hours, got {0}")]
pub struct InvalidInterval(pub u32);

impl Interval {
    /// The GFS cadence: `00`, `06`, `12`, `18`.
    pub const SIX_HOURS: Interval = Interval { hours: 6 };

    pub fn new(hours: u32) -> Result<Self, InvalidInterval> {
        if hours == 0 || 24 % hours != 0 {
            return Err(InvalidInterval(hours));
        }
        Ok(Self { hours })
    }

    pub fn hours(self) -> u32 {
        self.hours
    }

    pub fn duration(self) -> Duration {
        Duration::hours(i64::from(self.hours))
    }

    /// Truncate an hour of day down to the interval boundary.
    pub fn bucket(self, hour: u32) -> u32 {
        (hour / self.hours) * self.hours
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::SIX_HOURS
    }
}

impl TryFrom<u32> for Interval {
    type Error = InvalidInterval;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        Self::new(hours)
    }
}

impl From<Interval> for u32 {
    fn from(interval: Interval) -> u32 {
        interval.hours
    }
}

/// Interval-aligned key identifying one snapshot, e.g. `2024112506`.
///
/// Field order makes the derived `Ord` chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    date: NaiveDate,
    hour: u32,
}

impl Stamp {
    /// Map a point in time to its canonical stamp.
    pub fn from_time(time: DateTime<Utc>, interval: Interval) -> Self {
        Self {
            date: time.date_naive(),
            hour: interval.bucket(time.hour()),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// `YYYYMMDD`
    pub fn date_str(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Zero-padded two digit hour bucket.
    pub fn hour_str(&self) -> String {
        format!("{:02}", self.hour)
    }

    /// The instant this stamp's interval begins.
    pub fn start(&self) -> DateTime<Utc> {
        (self.date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(self.hour))).and_utc()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.date.format("%Y%m%d"), self.hour)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid stamp '{0}', expected YYYYMMDDHH")]
pub struct InvalidStamp(pub String);

impl FromStr for Stamp {
    type Err = InvalidStamp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidStamp(s.to_string());
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(&s[..8], "%Y%m%d").map_err(|_| invalid())?;
        let hour: u32 = s[8..].parse().map_err(|_| invalid())?;
        if hour > 23 {
            return Err(invalid());
        }
        Ok(Self { date, hour })
    }
}

impl Serialize for Stamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a user supplied timestamp as UTC.
///
/// Accepts RFC 3339 (`2024-11-25T08:00:00Z`, offsets are converted to UTC)
/// and offset-less forms which are taken as UTC: `2024-11-25T08:00:00`,
/// `2024-11-25T08:00`, `2024-11-25 08:00:00`, and a bare `2024-11-25`.
pub fn parse_time(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}
