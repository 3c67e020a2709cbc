//! In-memory [`Archive`] implementation for tests.
//!
//! A `BTreeMap` behind `std::sync::RwLock`, so `stamps()` comes out sorted
//! for free.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::Archive;
use crate::stamp::Stamp;

/// In-memory archive. Inserts are write-once like the on-disk archive.
pub struct InMemoryArchive {
    artifacts: RwLock<BTreeMap<Stamp, Vec<u8>>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build an archive holding a small JSON body for each stamp.
    pub fn with_stamps<I: IntoIterator<Item = Stamp>>(stamps: I) -> Self {
        let archive = Self::new();
        for stamp in stamps {
            let body = format!("{{\"stamp\":\"{}\"}}", stamp).into_bytes();
            // fresh map, cannot collide except on duplicate input
            let _ = archive.insert(stamp, body);
        }
        archive
    }

    /// Publish an artifact. Returns `false` if the stamp was already present.
    pub fn insert(&self, stamp: Stamp, body: Vec<u8>) -> Result<bool> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| anyhow!("in-memory archive lock poisoned"))?;
        if artifacts.contains_key(&stamp) {
            return Ok(false);
        }
        artifacts.insert(stamp, body);
        Ok(true)
    }
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Archive for InMemoryArchive {
    async fn contains(&self, stamp: &Stamp) -> Result<bool> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| anyhow!("in-memory archive lock poisoned"))?;
        Ok(artifacts.contains_key(stamp))
    }

    async fn read(&self, stamp: &Stamp) -> Result<Option<Vec<u8>>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| anyhow!("in-memory archive lock poisoned"))?;
        Ok(artifacts.get(stamp).cloned())
    }

    async fn stamps(&self) -> Result<Vec<Stamp>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| anyhow!("in-memory archive lock poisoned"))?;
        Ok(artifacts.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(s: &str) -> Stamp {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_write_once() {
        let archive = InMemoryArchive::new();
        assert!(archive.insert(stamp("2024112500"), b"first".to_vec()).unwrap());
        assert!(!archive.insert(stamp("2024112500"), b"second".to_vec()).unwrap());

        let body = archive.read(&stamp("2024112500")).await.unwrap().unwrap();
        assert_eq!(body, b"first");
    }

    #[tokio::test]
    async fn test_stamps_sorted() {
        let archive =
            InMemoryArchive::with_stamps([stamp("2024112512"), stamp("2024112418"), stamp("2024112500")]);
        let stamps = archive.stamps().await.unwrap();
        assert_eq!(
            stamps,
            vec![stamp("2024112418"), stamp("2024112500"), stamp("2024112512")]
        );
        assert!(archive.contains(&stamp("2024112500")).await.unwrap());
        assert!(!archive.contains(&stamp("2024112506")).await.unwrap());
        assert!(archive.read(&stamp("2024112506")).await.unwrap().is_none());
    }
}
