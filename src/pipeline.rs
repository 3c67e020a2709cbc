//! Harvest/backfill cycles.
//!
//! One cycle is: harvest the newest snapshot at or before `now`, convert
//! it, then keep filling the interval immediately before the last
//! converted snapshot until one of the stop conditions holds:
//!
//! | Stop | When |
//! |------|------|
//! | `AlreadyHave` | the harvester met an archived stamp first |
//! | `NoData` | nothing downloadable within the age limit |
//! | `ConversionFailed` | the converter rejected a payload |
//! | `PredecessorArchived` | the previous interval is already archived |
//! | `DepthLimit` | `backfill_depth` levels were used |
//!
//! A cycle therefore converts at most `1 + backfill_depth` snapshots.
//! Cycles hold the pipeline's in-flight guard for their whole duration;
//! a second trigger waits for the running one instead of overlapping it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use wind_harvest_core::archive::Archive;
use wind_harvest_core::models::{ConversionOutcome, CycleReport, CycleStop, HarvestOutcome};
use wind_harvest_core::stamp::{Interval, Stamp};

use crate::config::Config;
use crate::convert::{ConversionOrchestrator, Converter, ProcessConverter};
use crate::fs_archive::FsArchive;
use crate::harvest::Harvester;
use crate::upstream::{NomadsUpstream, Upstream};

pub struct HarvestPipeline {
    harvester: Harvester,
    orchestrator: ConversionOrchestrator,
    archive: FsArchive,
    interval: Interval,
    backfill_depth: u32,
    in_flight: Mutex<()>,
}

impl HarvestPipeline {
    /// Pipeline against NOMADS and the configured converter process.
    pub fn from_config(config: &Config) -> Result<Self> {
        let upstream = Arc::new(NomadsUpstream::new(&config.upstream)?);
        let converter = Arc::new(ProcessConverter::from_config(&config.converter));
        Ok(Self::with_parts(config, upstream, converter))
    }

    pub fn with_parts(
        config: &Config,
        upstream: Arc<dyn Upstream>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let archive = FsArchive::from_config(&config.storage);
        let interval = config.interval();
        let harvester = Harvester::new(upstream, archive.clone(), interval, config.harvest.max_age_days);
        let orchestrator =
            ConversionOrchestrator::new(converter, archive.clone(), config.converter.validate_json);
        Self::new(harvester, orchestrator, archive, interval, config.harvest.backfill_depth)
    }

    pub fn new(
        harvester: Harvester,
        orchestrator: ConversionOrchestrator,
        archive: FsArchive,
        interval: Interval,
        backfill_depth: u32,
    ) -> Self {
        Self {
            harvester,
            orchestrator,
            archive,
            interval,
            backfill_depth,
            in_flight: Mutex::new(()),
        }
    }

    pub fn archive(&self) -> &FsArchive {
        &self.archive
    }

    /// Run one harvest/backfill cycle. `now` bounds the age of every search
    /// in the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let _guard = self.in_flight.lock().await;
        info!(op = "cycle.start", now = %now, backfill_depth = self.backfill_depth);

        let mut archived: Vec<Stamp> = Vec::new();
        let mut depth = 0u32;
        let mut target = now;

        let stop = loop {
            let staged = match self.harvester.harvest(target, now).await? {
                HarvestOutcome::Found(staged) => staged,
                HarvestOutcome::AlreadyHave { stamp } => break CycleStop::AlreadyHave { stamp },
                HarvestOutcome::NoData { .. } => break CycleStop::NoData,
            };

            match self.orchestrator.convert(&staged).await? {
                ConversionOutcome::Converted { stamp, .. } => archived.push(stamp),
                ConversionOutcome::AlreadyArchived { stamp } => {
                    warn!(op = "cycle.raced", stamp = %stamp, "artifact appeared during conversion");
                }
                ConversionOutcome::Failed { stamp, reason } => {
                    break CycleStop::ConversionFailed { stamp, reason };
                }
            }

            if depth >= self.backfill_depth {
                break CycleStop::DepthLimit;
            }

            let previous_target = staged.target - self.interval.duration();
            let previous = Stamp::from_time(previous_target, self.interval);
            if self.archive.contains(&previous).await? {
                break CycleStop::PredecessorArchived { stamp: previous };
            }

            depth += 1;
            info!(op = "cycle.backfill", depth, stamp = %previous);
            target = previous_target;
        };

        info!(
            op = "cycle.done",
            archived = archived.len(),
            depth,
            stop = ?stop
        );
        Ok(CycleReport {
            started_at: now,
            archived,
            depth,
            stop,
        })
    }
}

/// `windh harvest`: run one cycle now and print its report as JSON.
pub async fn run_harvest(config: &Config) -> Result<()> {
    let pipeline = HarvestPipeline::from_config(config)?;
    let report = pipeline.run_cycle(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
