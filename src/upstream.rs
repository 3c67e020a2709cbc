//! Upstream snapshot sources.
//!
//! The harvester only needs one thing from upstream: "give me the payload
//! for this stamp, or tell me you can't". Any error (transport failure,
//! non-success status, a body that breaks off mid-stream) is treated the
//! same way by the caller: step back one interval and try again.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`NomadsUpstream`] | NOAA NOMADS GRIB filter over HTTP (`reqwest`) |
//! | [`StaticUpstream`] | Fixed in-memory payloads; records every request |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use wind_harvest_core::stamp::Stamp;

use crate::config::UpstreamConfig;

/// Body of a successful upstream response, not yet read.
pub enum Payload {
    /// Streamed from an HTTP response, chunk by chunk.
    Http(reqwest::Response),
    Memory(Vec<u8>),
}

/// Why copying a payload to disk stopped.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The upstream connection failed mid-body. Transient, like a failed fetch.
    #[error("failed reading upstream response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("failed writing payload: {0}")]
    Io(#[from] std::io::Error),
}

impl Payload {
    /// Copy the whole body into `file`, returning the number of bytes written.
    pub async fn write_to(self, file: &mut tokio::fs::File) -> Result<u64, PayloadError> {
        let mut written = 0u64;
        match self {
            Payload::Http(mut response) => {
                while let Some(chunk) = response.chunk().await.map_err(PayloadError::Body)? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
            Payload::Memory(bytes) => {
                file.write_all(&bytes).await?;
                written = bytes.len() as u64;
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// A source of raw snapshots keyed by stamp.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Request the snapshot for `stamp`.
    ///
    /// Returns an error on transport failure or any non-success status.
    async fn fetch(&self, stamp: &Stamp) -> Result<Payload>;
}

// ═══════════════════════════════════════════════════════════════════════
// NOMADS
// ═══════════════════════════════════════════════════════════════════════

/// GFS 1.0° GRIB filter on NOAA NOMADS.
///
/// One request per stamp, e.g. for `2024112506`:
///
/// ```text
/// GET filter_gfs_1p00.pl?file=gfs.t06z.pgrb2.1p00.f000
///     &lev_10_m_above_ground=on&lev_surface=on
///     &var_TMP=on&var_UGRD=on&var_VGRD=on
///     &leftlon=0&rightlon=360&toplat=90&bottomlat=-90
///     &dir=/gfs.20241125/06/atmos
/// ```
pub struct NomadsUpstream {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl NomadsUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Query parameters selecting the fields and extent for one stamp.
    pub fn query_params(&self, stamp: &Stamp) -> Vec<(String, String)> {
        let hh = stamp.hour_str();
        let mut params = vec![("file".to_string(), format!("gfs.t{}z.pgrb2.1p00.f000", hh))];
        for field in self.config.levels.iter().chain(self.config.variables.iter()) {
            params.push((field.clone(), "on".to_string()));
        }
        params.push(("leftlon".to_string(), self.config.left_lon.to_string()));
        params.push(("rightlon".to_string(), self.config.right_lon.to_string()));
        params.push(("toplat".to_string(), self.config.top_lat.to_string()));
        params.push(("bottomlat".to_string(), self.config.bottom_lat.to_string()));
        params.push((
            "dir".to_string(),
            format!("/gfs.{}/{}/atmos", stamp.date_str(), hh),
        ));
        params
    }
}

#[async_trait]
impl Upstream for NomadsUpstream {
    fn name(&self) -> &str {
        "nomads"
    }

    async fn fetch(&self, stamp: &Stamp) -> Result<Payload> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params(stamp))
            .send()
            .await
            .with_context(|| format!("Request for {} failed", stamp))?;

        let status = response.status();
        tracing::debug!(op = "upstream.response", stamp = %stamp, status = %status, url = %response.url());
        if !status.is_success() {
            bail!("upstream returned {} for {}", status, stamp);
        }
        Ok(Payload::Http(response))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Static
// ═══════════════════════════════════════════════════════════════════════

/// Serves a fixed set of payloads from memory.
///
/// Every requested stamp is recorded, which lets callers check exactly
/// which downloads a harvest attempted.
#[derive(Default)]
pub struct StaticUpstream {
    payloads: HashMap<Stamp, Vec<u8>>,
    requests: Mutex<Vec<Stamp>>,
}

impl StaticUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stamp: Stamp, body: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(stamp, body.into());
        self
    }

    /// Stamps requested so far, in request order.
    pub fn requests(&self) -> Vec<Stamp> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Upstream for StaticUpstream {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, stamp: &Stamp) -> Result<Payload> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("request log poisoned"))?
            .push(*stamp);
        match self.payloads.get(stamp) {
            Some(body) => Ok(Payload::Memory(body.clone())),
            None => bail!("upstream returned 404 Not Found for {}", stamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nomads_query_params() {
        let upstream = NomadsUpstream::new(&UpstreamConfig::default()).unwrap();
        let params = upstream.query_params(&"2024112506".parse().unwrap());
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("file"), Some("gfs.t06z.pgrb2.1p00.f000"));
        assert_eq!(get("dir"), Some("/gfs.20241125/06/atmos"));
        assert_eq!(get("lev_10_m_above_ground"), Some("on"));
        assert_eq!(get("var_UGRD"), Some("on"));
        assert_eq!(get("leftlon"), Some("0"));
        assert_eq!(get("rightlon"), Some("360"));
        assert_eq!(get("bottomlat"), Some("-90"));
    }

    #[tokio::test]
    async fn test_static_upstream_records_requests() {
        let present: Stamp = "2024112500".parse().unwrap();
        let missing: Stamp = "2024112506".parse().unwrap();
        let upstream = StaticUpstream::new().with(present, "grib");

        assert!(upstream.fetch(&missing).await.is_err());
        assert!(matches!(upstream.fetch(&present).await, Ok(Payload::Memory(ref b)) if b == b"grib"));
        assert_eq!(upstream.requests(), vec![missing, present]);
    }
}
