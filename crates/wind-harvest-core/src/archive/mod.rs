//! Archive abstraction for wind-harvest.
//!
//! The [`Archive`] trait is the time index: the set of converted artifacts,
//! addressable only by [`Stamp`]. The search algorithms in
//! [`crate::lookup`] and the harvest pipeline only ever ask "is this stamp
//! archived?", so backends stay trivial (a directory on disk, a map in
//! memory).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::stamp::Stamp;

/// Read side of the artifact archive.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`contains`](Archive::contains) | Presence test for one stamp |
/// | [`read`](Archive::read) | Full artifact content |
/// | [`stamps`](Archive::stamps) | Every archived stamp, oldest first |
#[async_trait]
pub trait Archive: Send + Sync {
    /// Whether a complete artifact is published for `stamp`.
    async fn contains(&self, stamp: &Stamp) -> Result<bool>;

    /// Artifact bytes, or `None` if the stamp is not archived.
    async fn read(&self, stamp: &Stamp) -> Result<Option<Vec<u8>>>;

    /// All archived stamps, sorted ascending.
    async fn stamps(&self) -> Result<Vec<Stamp>>;
}
