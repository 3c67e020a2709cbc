//! Outcome types that flow through the harvest pipeline.
//!
//! Every stage ends in exactly one enumerated variant. There is no
//! "pending" state: a search that runs out of room reports
//! [`HarvestOutcome::NoData`] rather than going quiet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::stamp::Stamp;

/// A raw payload downloaded into the staging area, awaiting conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedSnapshot {
    pub stamp: Stamp,
    /// The moment the search was probing when this stamp was found.
    pub target: DateTime<Utc>,
    pub path: PathBuf,
}

/// Terminal result of one bounded backward search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// A new snapshot was downloaded and staged.
    Found(StagedSnapshot),
    /// Upstream has this stamp but the archive already holds it.
    AlreadyHave { stamp: Stamp },
    /// The search walked past the age limit without a successful download.
    NoData { oldest_tried: Option<Stamp> },
}

/// Terminal result of converting one staged snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Converted { stamp: Stamp, path: PathBuf },
    /// Another writer published the stamp first; our output was discarded.
    AlreadyArchived { stamp: Stamp },
    Failed { stamp: Stamp, reason: String },
}

/// Direction of a stepping search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Backward,
    Forward,
}

/// Why a harvest/backfill cycle stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CycleStop {
    /// The newest upstream snapshot reachable from the target is archived.
    AlreadyHave { stamp: Stamp },
    /// Nothing downloadable within the age limit.
    NoData,
    ConversionFailed {
        stamp: Stamp,
        #[serde(rename = "message")]
        reason: String,
    },
    /// The interval before the last conversion is already archived.
    PredecessorArchived { stamp: Stamp },
    /// The backfill depth bound was reached.
    DepthLimit,
}

/// Summary of one harvest/backfill cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Stamps published to the archive during this cycle, newest first.
    pub archived: Vec<Stamp>,
    /// Number of backfill levels entered beyond the initial search.
    pub depth: u32,
    pub stop: CycleStop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn stamp(s: &str) -> Stamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_cycle_stop_serializes_with_reason_tag() {
        let cases = vec![
            (
                CycleStop::AlreadyHave {
                    stamp: stamp("2024112506"),
                },
                json!({"reason": "already_have", "stamp": "2024112506"}),
            ),
            (CycleStop::NoData, json!({"reason": "no_data"})),
            (
                CycleStop::ConversionFailed {
                    stamp: stamp("2024112506"),
                    reason: "converter exited with exit status: 1".to_string(),
                },
                json!({
                    "reason": "conversion_failed",
                    "stamp": "2024112506",
                    "message": "converter exited with exit status: 1",
                }),
            ),
            (
                CycleStop::PredecessorArchived {
                    stamp: stamp("2024112500"),
                },
                json!({"reason": "predecessor_archived", "stamp": "2024112500"}),
            ),
            (CycleStop::DepthLimit, json!({"reason": "depth_limit"})),
        ];

        for (stop, expected) in cases {
            assert_eq!(serde_json::to_value(&stop).unwrap(), expected, "{:?}", stop);
        }
    }

    #[test]
    fn test_cycle_report_serializes() {
        let report = CycleReport {
            started_at: Utc.with_ymd_and_hms(2024, 11, 25, 8, 0, 0).unwrap(),
            archived: vec![stamp("2024112506"), stamp("2024112500")],
            depth: 1,
            stop: CycleStop::ConversionFailed {
                stamp: stamp("2024112418"),
                reason: "corrupt GRIB message".to_string(),
            },
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["started_at"], "2024-11-25T08:00:00Z");
        assert_eq!(value["archived"], json!(["2024112506", "2024112500"]));
        assert_eq!(value["depth"], 1);
        assert_eq!(value["stop"]["reason"], "conversion_failed");
        assert_eq!(value["stop"]["message"], "corrupt GRIB message");
    }

    #[test]
    fn test_outcomes_serialize_with_outcome_tag() {
        let outcome = ConversionOutcome::Failed {
            stamp: stamp("2024112506"),
            reason: "output file is empty".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"outcome": "failed", "stamp": "2024112506", "reason": "output file is empty"})
        );

        let harvest = HarvestOutcome::NoData { oldest_tried: None };
        assert_eq!(
            serde_json::to_value(&harvest).unwrap(),
            json!({"outcome": "no_data", "oldest_tried": null})
        );
    }
}
