//! Filesystem archive and staging area.
//!
//! Two directories, both created on first use:
//!
//! | Directory | Entry | Lifetime |
//! |-----------|-------|----------|
//! | `storage.staging_dir` | `<stamp>.f000` | download → conversion |
//! | `storage.archive_dir` | `<stamp>.json` | forever (write-once) |
//!
//! Writers never produce a final name directly. Payloads and converter
//! output land under a hidden `.<name>.<uuid>.tmp` name first and are moved
//! into place in one step, so a reader sees either nothing or a complete
//! file. Archive publication uses a hard link, which fails instead of
//! replacing an existing artifact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use wind_harvest_core::archive::Archive;
use wind_harvest_core::stamp::Stamp;

use crate::config::StorageConfig;

const ARTIFACT_SUFFIX: &str = "json";
const STAGED_SUFFIX: &str = "f000";

/// Result of moving a finished artifact into the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Published,
    /// The stamp was already archived; the candidate was discarded.
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct FsArchive {
    archive_dir: PathBuf,
    staging_dir: PathBuf,
}

impl FsArchive {
    pub fn new(archive_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(&storage.archive_dir, &storage.staging_dir)
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn artifact_path(&self, stamp: &Stamp) -> PathBuf {
        self.archive_dir.join(format!("{}.{}", stamp, ARTIFACT_SUFFIX))
    }

    pub fn staged_path(&self, stamp: &Stamp) -> PathBuf {
        self.staging_dir.join(format!("{}.{}", stamp, STAGED_SUFFIX))
    }

    /// Unique scratch name next to the final artifact (same filesystem).
    pub fn temp_artifact_path(&self, stamp: &Stamp) -> PathBuf {
        self.archive_dir.join(temp_name(stamp, ARTIFACT_SUFFIX))
    }

    pub fn temp_staged_path(&self, stamp: &Stamp) -> PathBuf {
        self.staging_dir.join(temp_name(stamp, STAGED_SUFFIX))
    }

    pub async fn ensure_archive_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .with_context(|| format!("Failed to create archive dir: {}", self.archive_dir.display()))
    }

    pub async fn ensure_staging_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("Failed to create staging dir: {}", self.staging_dir.display()))
    }

    /// Move a completely written staging file to `<stamp>.f000`.
    pub async fn commit_staged(&self, temp: &Path, stamp: &Stamp) -> Result<PathBuf> {
        let final_path = self.staged_path(stamp);
        if let Err(err) = tokio::fs::rename(temp, &final_path).await {
            remove_if_exists(temp).await;
            return Err(err).with_context(|| {
                format!("Failed to move staged payload into place: {}", final_path.display())
            });
        }
        Ok(final_path)
    }

    /// Publish a finished artifact under `<stamp>.json` without clobbering.
    ///
    /// The temporary file is removed in every case.
    pub async fn publish(&self, temp: &Path, stamp: &Stamp) -> Result<Publish> {
        let final_path = self.artifact_path(stamp);

        if let Ok(file) = tokio::fs::File::open(temp).await {
            let _ = file.sync_all().await;
        }

        let linked = tokio::fs::hard_link(temp, &final_path).await;
        remove_if_exists(temp).await;

        match linked {
            Ok(()) => {
                sync_dir(&self.archive_dir).await;
                Ok(Publish::Published)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(Publish::AlreadyPresent),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to publish artifact: {}", final_path.display())),
        }
    }

    /// Remove the staged payload of one stamp. Other staged stamps are untouched.
    pub async fn remove_staged(&self, stamp: &Stamp) {
        remove_if_exists(&self.staged_path(stamp)).await;
    }
}

fn temp_name(stamp: &Stamp, suffix: &str) -> String {
    format!(".{}.{}.{}.tmp", stamp, suffix, Uuid::new_v4().simple())
}

/// Parse `<stamp>.json` file names; anything else is not an artifact.
fn stamp_from_file_name(name: &str) -> Option<Stamp> {
    let stem = name.strip_suffix(ARTIFACT_SUFFIX)?.strip_suffix('.')?;
    stem.parse().ok()
}

pub(crate) async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(op = "archive.remove", path = %path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(op = "archive.remove.error", path = %path.display(), error = %err),
    }
}

async fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = tokio::fs::File::open(dir).await {
            let _ = handle.sync_all().await;
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[async_trait]
impl Archive for FsArchive {
    async fn contains(&self, stamp: &Stamp) -> Result<bool> {
        let path = self.artifact_path(stamp);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
    }

    async fn read(&self, stamp: &Stamp) -> Result<Option<Vec<u8>>> {
        let path = self.artifact_path(stamp);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn stamps(&self) -> Result<Vec<Stamp>> {
        let mut entries = match tokio::fs::read_dir(&self.archive_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to list archive dir: {}", self.archive_dir.display())
                })
            }
        };

        let mut stamps = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(stamp) = entry.file_name().to_str().and_then(stamp_from_file_name) {
                stamps.push(stamp);
            }
        }
        stamps.sort();
        Ok(stamps)
    }
}
