//! # Wind Harvest
//!
//! Harvests GFS 1.0° wind snapshots from NOAA NOMADS, converts them to JSON
//! and answers "latest" and "nearest to a time" queries against the local
//! archive.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │ Scheduler │──▶│ Harvester │──▶│  Convert  │──▶│   Archive    │
//! │  (15 min) │   │  NOMADS   │   │ grib2json │   │ <stamp>.json │
//! └───────────┘   └───────────┘   └───────────┘   └──────┬───────┘
//!        ▲              backfill ◀──────┘                 │
//!        │                                     ┌──────────┤
//!   HarvestPipeline                            ▼          ▼
//!   (one cycle at a time)                 ┌────────┐ ┌────────┐
//!                                         │  CLI   │ │  HTTP  │
//!                                         │ (windh)│ │ (axum) │
//!                                         └────────┘ └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! windh harvest                          # one harvest/backfill cycle
//! windh latest                           # newest archived stamp
//! windh nearest 2024-11-25T08:00:00Z --limit-days 1
//! windh serve                            # HTTP API + 15-minute harvesting
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`upstream`] | Snapshot sources (NOMADS, static) |
//! | [`fs_archive`] | Staging area and write-once archive on disk |
//! | [`harvest`] | Bounded backward search and download |
//! | [`convert`] | External converter and atomic publish |
//! | [`pipeline`] | Harvest/backfill cycles behind the in-flight guard |
//! | [`scheduler`] | Periodic cycles |
//! | [`lookup`] | Latest / nearest lookups with a time budget |
//! | [`server`] | HTTP query interface |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! Stamps, outcome types and the search algorithms live in
//! `wind-harvest-core`.

pub mod config;
pub mod convert;
pub mod fs_archive;
pub mod harvest;
pub mod logging;
pub mod lookup;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod upstream;
