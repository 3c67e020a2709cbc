//! Stepping search over the archive.
//!
//! Both lookups walk the time axis one interval at a time and stop at the
//! first archived stamp they meet. Neither computes a distance-based
//! nearest neighbour.
//!
//! # Latest
//!
//! Start at "now" and step backward until a stamp is archived, giving up
//! after `max_steps` attempts.
//!
//! # Nearest
//!
//! 1. Step backward from the target.
//! 2. Once the cursor is `limit_days` whole days from the target, flip to
//!    forward and jump the cursor ahead by `limit_days` (back to the target).
//! 3. Step forward until the limit is reached again, then fail with
//!    [`LookupError::NoDataWithinLimit`].
//!
//! A hit on the backward leg always wins, even if an artifact on the
//! forward side is closer in absolute time. Without a day-limit the
//! backward leg is bounded by `max_steps`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::archive::Archive;
use crate::models::Direction;
use crate::stamp::{parse_time, Interval, Stamp};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid params, expecting timeIso=ISO_TIME_STRING (got '{0}')")]
    InvalidTime(String),
    #[error("invalid searchLimit: {0}")]
    InvalidLimit(String),
    #[error("no data within searchLimit of {limit_days} day(s)")]
    NoDataWithinLimit { limit_days: u32 },
    #[error("no data within {max_steps} interval(s) of lookback")]
    LookbackExhausted { max_steps: u32 },
    #[error("lookup timed out after {0}s")]
    Timeout(u64),
    #[error("archive error: {0:#}")]
    Archive(#[from] anyhow::Error),
}

/// Validated input for a nearest lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestQuery {
    pub target: DateTime<Utc>,
    pub limit_days: Option<u32>,
}

impl NearestQuery {
    /// Validate raw query parameters before any search begins.
    ///
    /// An empty `search_limit` is treated as absent. Limits above
    /// `max_limit_days` are rejected.
    pub fn parse(
        time_iso: Option<&str>,
        search_limit: Option<&str>,
        max_limit_days: u32,
    ) -> Result<Self, LookupError> {
        let raw_time = time_iso.unwrap_or("");
        let target = parse_time(raw_time).ok_or_else(|| LookupError::InvalidTime(raw_time.to_string()))?;

        let limit_days = match search_limit.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => {
                let days: u32 = raw
                    .parse()
                    .map_err(|_| LookupError::InvalidLimit(format!("'{}' is not a whole number of days", raw)))?;
                Some(days)
            }
        };

        Self::new(target, limit_days, max_limit_days)
    }

    pub fn new(
        target: DateTime<Utc>,
        limit_days: Option<u32>,
        max_limit_days: u32,
    ) -> Result<Self, LookupError> {
        if let Some(days) = limit_days {
            if days > max_limit_days {
                return Err(LookupError::InvalidLimit(format!(
                    "{} days exceeds the maximum of {}",
                    days, max_limit_days
                )));
            }
        }
        Ok(Self { target, limit_days })
    }
}

/// Where a lookup stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookupHit {
    pub stamp: Stamp,
    /// Leg of the search that found the stamp.
    pub direction: Direction,
    /// Number of stamps checked, including the hit.
    pub attempts: u32,
}

/// Step budget covering `days` of history plus the current interval.
pub fn steps_for_days(days: u32, interval: Interval) -> u32 {
    (days.saturating_mul(24) / interval.hours()).saturating_add(1)
}

/// Newest archived stamp at or before `now`.
pub async fn find_latest(
    archive: &dyn Archive,
    interval: Interval,
    now: DateTime<Utc>,
    max_steps: u32,
) -> Result<LookupHit, LookupError> {
    let mut cursor = now;
    for attempts in 1..=max_steps {
        let stamp = Stamp::from_time(cursor, interval);
        if archive.contains(&stamp).await? {
            return Ok(LookupHit {
                stamp,
                direction: Direction::Backward,
                attempts,
            });
        }
        cursor -= interval.duration();
    }
    Err(LookupError::LookbackExhausted { max_steps })
}

/// First archived stamp met stepping backward, then forward, from the target.
///
/// `max_steps` only bounds an unlimited query; with a day-limit the two
/// legs are bounded by the limit itself.
pub async fn find_nearest(
    archive: &dyn Archive,
    interval: Interval,
    query: &NearestQuery,
    max_steps: u32,
) -> Result<LookupHit, LookupError> {
    let mut direction = Direction::Backward;
    let mut cursor = query.target;
    let mut attempts = 0u32;

    loop {
        match query.limit_days {
            Some(limit) => {
                if (query.target - cursor).num_days().abs() >= i64::from(limit) {
                    match direction {
                        Direction::Backward => {
                            direction = Direction::Forward;
                            cursor += Duration::days(i64::from(limit));
                            continue;
                        }
                        Direction::Forward => {
                            return Err(LookupError::NoDataWithinLimit { limit_days: limit })
                        }
                    }
                }
            }
            None if attempts >= max_steps => return Err(LookupError::LookbackExhausted { max_steps }),
            None => {}
        }

        let stamp = Stamp::from_time(cursor, interval);
        attempts += 1;
        if archive.contains(&stamp).await? {
            return Ok(LookupHit {
                stamp,
                direction,
                attempts,
            });
        }

        cursor = match direction {
            Direction::Backward => cursor - interval.duration(),
            Direction::Forward => cursor + interval.duration(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::InMemoryArchive;
    use chrono::TimeZone;

    fn stamp(s: &str) -> Stamp {
        s.parse().unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn nearest(target: DateTime<Utc>, limit_days: Option<u32>) -> NearestQuery {
        NearestQuery::new(target, limit_days, 365).unwrap()
    }

    #[tokio::test]
    async fn test_latest_returns_current_interval_when_present() {
        let archive = InMemoryArchive::with_stamps([stamp("2024112506"), stamp("2024112500")]);
        let hit = find_latest(&archive, Interval::SIX_HOURS, utc(2024, 11, 25, 9), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112506"));
        assert_eq!(hit.attempts, 1);
    }

    #[tokio::test]
    async fn test_latest_steps_back_over_gaps() {
        let archive = InMemoryArchive::with_stamps([stamp("2024112406")]);
        let hit = find_latest(&archive, Interval::SIX_HOURS, utc(2024, 11, 25, 13), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112406"));
        assert_eq!(hit.attempts, 6);
    }

    #[tokio::test]
    async fn test_latest_on_empty_archive_is_bounded() {
        let archive = InMemoryArchive::new();
        let err = find_latest(&archive, Interval::SIX_HOURS, utc(2024, 11, 25, 13), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::LookbackExhausted { max_steps: 8 }));
    }

    #[tokio::test]
    async fn test_nearest_prefers_backward_hit_over_closer_forward_one() {
        // 08:00 → 06 missing → 02:00 → 00 found, although 12 is only 4h away.
        let archive = InMemoryArchive::with_stamps([stamp("2024112500"), stamp("2024112512")]);
        let hit = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), None), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112500"));
        assert_eq!(hit.direction, Direction::Backward);
        assert_eq!(hit.attempts, 2);
    }

    #[tokio::test]
    async fn test_nearest_exact_stamp() {
        let archive = InMemoryArchive::with_stamps([stamp("2024112506")]);
        let hit = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 6), Some(1)), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112506"));
        assert_eq!(hit.attempts, 1);
    }

    #[tokio::test]
    async fn test_nearest_flips_forward_when_backward_leg_is_empty() {
        let archive = InMemoryArchive::with_stamps([stamp("2024112612")]);
        let hit = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), Some(2)), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112612"));
        assert_eq!(hit.direction, Direction::Forward);
    }

    #[tokio::test]
    async fn test_nearest_backward_leg_respects_limit() {
        // 2024112318 is more than one day behind the target.
        let archive = InMemoryArchive::with_stamps([stamp("2024112318"), stamp("2024112600")]);
        let hit = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), Some(1)), 121)
            .await
            .unwrap();
        assert_eq!(hit.stamp, stamp("2024112600"));
        assert_eq!(hit.direction, Direction::Forward);
    }

    #[tokio::test]
    async fn test_nearest_no_data_within_limit() {
        let archive = InMemoryArchive::with_stamps([stamp("2024110100"), stamp("2024122500")]);
        let err = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), Some(1)), 121)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NoDataWithinLimit { limit_days: 1 }));
        assert!(err.to_string().contains("no data within searchLimit"));
    }

    #[tokio::test]
    async fn test_nearest_zero_limit_fails_without_probing() {
        let archive = InMemoryArchive::with_stamps([stamp("2024112506")]);
        let err = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), Some(0)), 121)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NoDataWithinLimit { limit_days: 0 }));
    }

    #[tokio::test]
    async fn test_nearest_without_limit_is_bounded() {
        let archive = InMemoryArchive::new();
        let err = find_nearest(&archive, Interval::SIX_HOURS, &nearest(utc(2024, 11, 25, 8), None), 40)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::LookbackExhausted { max_steps: 40 }));
    }

    #[test]
    fn test_parse_query() {
        let q = NearestQuery::parse(Some("2024-11-25T08:00:00Z"), Some("3"), 365).unwrap();
        assert_eq!(q.target, utc(2024, 11, 25, 8));
        assert_eq!(q.limit_days, Some(3));

        let q = NearestQuery::parse(Some("2024-11-25T08:00:00Z"), Some(""), 365).unwrap();
        assert_eq!(q.limit_days, None);
    }

    #[test]
    fn test_parse_query_rejects_bad_input() {
        assert!(matches!(
            NearestQuery::parse(None, None, 365),
            Err(LookupError::InvalidTime(_))
        ));
        assert!(matches!(
            NearestQuery::parse(Some("not a time"), None, 365),
            Err(LookupError::InvalidTime(_))
        ));
        assert!(matches!(
            NearestQuery::parse(Some("2024-11-25"), Some("-1"), 365),
            Err(LookupError::InvalidLimit(_))
        ));
        assert!(matches!(
            NearestQuery::parse(Some("2024-11-25"), Some("400"), 365),
            Err(LookupError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_steps_for_days() {
        assert_eq!(steps_for_days(30, Interval::SIX_HOURS), 121);
        assert_eq!(steps_for_days(1, Interval::new(12).unwrap()), 3);
    }

    #[test]
    fn test_steps_for_days_saturates() {
        let hourly = Interval::new(1).unwrap();
        assert_eq!(steps_for_days(u32::MAX, hourly), u32::MAX);
        assert_eq!(steps_for_days(u32::MAX, Interval::SIX_HOURS), u32::MAX / 6 + 1);
    }
}
