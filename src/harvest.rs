//! Bounded backward search for the newest upstream snapshot.
//!
//! Starting from a target time, the harvester requests the snapshot for
//! the target's stamp and walks back one interval per failed request:
//!
//! ```text
//! target ─▶ fetch(stamp) ──err──▶ target -= interval ─▶ (repeat)
//!                │
//!                ok
//!                ├── archived already ─▶ AlreadyHave
//!                ├── body cut off      ─▶ target -= interval ─▶ (repeat)
//!                └── stage payload     ─▶ Found
//!
//! now - target > max_age_days ─▶ NoData
//! ```
//!
//! The walk is linear, not exponential: upstream publishes on a fixed
//! cadence and gaps are shallow. The age guard is evaluated against the
//! `now` captured by the caller at the start of the chain.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use wind_harvest_core::archive::Archive;
use wind_harvest_core::models::{HarvestOutcome, StagedSnapshot};
use wind_harvest_core::stamp::{Interval, Stamp};

use crate::fs_archive::{remove_if_exists, FsArchive};
use crate::upstream::{Payload, PayloadError, Upstream};

pub struct Harvester {
    upstream: Arc<dyn Upstream>,
    archive: FsArchive,
    interval: Interval,
    max_age_days: u32,
}

impl Harvester {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        archive: FsArchive,
        interval: Interval,
        max_age_days: u32,
    ) -> Self {
        Self {
            upstream,
            archive,
            interval,
            max_age_days,
        }
    }

    /// Find, download, and stage the newest snapshot at or before `target`.
    pub async fn harvest(&self, target: DateTime<Utc>, now: DateTime<Utc>) -> Result<HarvestOutcome> {
        let mut target = target;
        let mut oldest_tried = None;

        loop {
            if (now - target).num_days() > i64::from(self.max_age_days) {
                info!(
                    op = "harvest.no_data",
                    oldest_tried = ?oldest_tried.map(|s: Stamp| s.to_string()),
                    max_age_days = self.max_age_days,
                    "hit age limit, harvest complete or there is a big gap in data"
                );
                return Ok(HarvestOutcome::NoData { oldest_tried });
            }

            let stamp = Stamp::from_time(target, self.interval);
            oldest_tried = Some(stamp);

            let payload = match self.upstream.fetch(&stamp).await {
                Ok(payload) => payload,
                Err(err) => {
                    debug!(
                        op = "harvest.unavailable",
                        upstream = self.upstream.name(),
                        stamp = %stamp,
                        error = %format!("{:#}", err),
                        "trying previous interval"
                    );
                    target -= self.interval.duration();
                    continue;
                }
            };

            if self.archive.contains(&stamp).await? {
                info!(op = "harvest.already_have", stamp = %stamp, "not looking further");
                return Ok(HarvestOutcome::AlreadyHave { stamp });
            }

            let path = match self.stage(&stamp, payload).await? {
                Some(path) => path,
                None => {
                    target -= self.interval.duration();
                    continue;
                }
            };
            info!(op = "harvest.staged", stamp = %stamp, path = %path.display());
            return Ok(HarvestOutcome::Found(StagedSnapshot {
                stamp,
                target,
                path,
            }));
        }
    }

    /// Copy the payload into `<stamp>.f000`. `None` means the body broke off
    /// mid-stream and nothing was staged.
    async fn stage(&self, stamp: &Stamp, payload: Payload) -> Result<Option<PathBuf>> {
        self.archive.ensure_staging_dir().await?;
        let temp = self.archive.temp_staged_path(stamp);

        let mut file = tokio::fs::File::create(&temp)
            .await
            .with_context(|| format!("Failed to create staging file: {}", temp.display()))?;
        let written = payload.write_to(&mut file).await;
        drop(file);

        match written {
            Ok(bytes) => debug!(op = "harvest.payload", stamp = %stamp, bytes),
            Err(PayloadError::Body(err)) => {
                remove_if_exists(&temp).await;
                debug!(
                    op = "harvest.truncated",
                    upstream = self.upstream.name(),
                    stamp = %stamp,
                    error = %err,
                    "trying previous interval"
                );
                return Ok(None);
            }
            Err(err) => {
                remove_if_exists(&temp).await;
                return Err(anyhow::Error::new(err).context(format!("Failed to stage payload for {}", stamp)));
            }
        }

        self.archive.commit_staged(&temp, stamp).await.map(Some)
    }
}
