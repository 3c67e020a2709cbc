//! Archive-backed lookups with a time budget.
//!
//! Wraps the stepping searches in `wind_harvest_core::lookup` around the
//! filesystem archive and returns the artifact itself. Lookups never take
//! the harvest guard; artifacts are write-once and only appear atomically.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use wind_harvest_core::archive::Archive;
use wind_harvest_core::lookup::{find_latest, find_nearest, LookupError, LookupHit, NearestQuery};
use wind_harvest_core::stamp::{parse_time, Interval, Stamp};

use crate::config::Config;
use crate::fs_archive::FsArchive;

/// An archived artifact located by a lookup.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub hit: LookupHit,
    pub path: PathBuf,
    pub body: Vec<u8>,
}

impl Snapshot {
    pub fn stamp(&self) -> Stamp {
        self.hit.stamp
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveLookup {
    archive: FsArchive,
    interval: Interval,
    max_steps: u32,
    max_search_limit_days: u32,
    timeout: Duration,
}

impl ArchiveLookup {
    pub fn new(
        archive: FsArchive,
        interval: Interval,
        max_steps: u32,
        max_search_limit_days: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            archive,
            interval,
            max_steps,
            max_search_limit_days,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FsArchive::from_config(&config.storage),
            config.interval(),
            config.lookup_max_steps(),
            config.lookup.max_search_limit_days,
            Duration::from_secs(config.lookup.timeout_secs),
        )
    }

    pub fn archive(&self) -> &FsArchive {
        &self.archive
    }

    /// Validate raw `timeIso` / `searchLimit` values.
    pub fn parse_nearest(
        &self,
        time_iso: Option<&str>,
        search_limit: Option<&str>,
    ) -> Result<NearestQuery, LookupError> {
        NearestQuery::parse(time_iso, search_limit, self.max_search_limit_days)
    }

    pub fn nearest_query(
        &self,
        target: DateTime<Utc>,
        limit_days: Option<u32>,
    ) -> Result<NearestQuery, LookupError> {
        NearestQuery::new(target, limit_days, self.max_search_limit_days)
    }

    /// Newest archived artifact at or before `now`.
    pub async fn latest(&self, now: DateTime<Utc>) -> Result<Snapshot, LookupError> {
        self.bounded(async {
            let hit = find_latest(&self.archive, self.interval, now, self.max_steps).await?;
            self.load(hit).await
        })
        .await
    }

    /// First archived artifact met stepping backward, then forward, from the
    /// query's target.
    pub async fn nearest(&self, query: &NearestQuery) -> Result<Snapshot, LookupError> {
        self.bounded(async {
            let hit = find_nearest(&self.archive, self.interval, query, self.max_steps).await?;
            self.load(hit).await
        })
        .await
    }

    async fn bounded<F>(&self, search: F) -> Result<Snapshot, LookupError>
    where
        F: Future<Output = Result<Snapshot, LookupError>>,
    {
        tokio::time::timeout(self.timeout, search)
            .await
            .map_err(|_| LookupError::Timeout(self.timeout.as_secs()))?
    }

    async fn load(&self, hit: LookupHit) -> Result<Snapshot, LookupError> {
        debug!(op = "lookup.hit", stamp = %hit.stamp, direction = ?hit.direction, attempts = hit.attempts);
        let body = self
            .archive
            .read(&hit.stamp)
            .await?
            .ok_or_else(|| anyhow::anyhow!("artifact {} vanished after lookup", hit.stamp))?;
        Ok(Snapshot {
            hit,
            path: self.archive.artifact_path(&hit.stamp),
            body,
        })
    }
}

// ============ CLI ============

/// `windh latest`.
pub async fn run_latest(config: &Config, body: bool) -> anyhow::Result<()> {
    let lookup = ArchiveLookup::from_config(config);
    let snapshot = lookup.latest(Utc::now()).await?;
    print_snapshot(&snapshot, body)
}

/// `windh nearest <time>`.
pub async fn run_nearest(
    config: &Config,
    time: &str,
    limit_days: Option<u32>,
    body: bool,
) -> anyhow::Result<()> {
    let lookup = ArchiveLookup::from_config(config);
    let target = parse_time(time).ok_or_else(|| LookupError::InvalidTime(time.to_string()))?;
    let query = lookup.nearest_query(target, limit_days)?;
    let snapshot = lookup.nearest(&query).await?;
    print_snapshot(&snapshot, body)
}

/// `windh list`.
pub async fn run_list(config: &Config) -> anyhow::Result<()> {
    let archive = FsArchive::from_config(&config.storage);
    let stamps = archive.stamps().await?;
    if stamps.is_empty() {
        println!("No archived snapshots in {}", archive.archive_dir().display());
        return Ok(());
    }
    for stamp in &stamps {
        println!("{}", stamp);
    }
    println!("{} snapshot(s)", stamps.len());
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot, body: bool) -> anyhow::Result<()> {
    if body {
        let mut out = std::io::stdout().lock();
        out.write_all(&snapshot.body)?;
        out.write_all(b"\n")?;
        return Ok(());
    }
    println!(
        "{}  {}  ({:?}, {} attempt(s))",
        snapshot.stamp(),
        snapshot.path.display(),
        snapshot.hit.direction,
        snapshot.hit.attempts
    );
    Ok(())
}
