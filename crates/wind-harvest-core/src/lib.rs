//! # Wind Harvest Core
//!
//! Runtime-free logic shared by the `wind-harvest` service: canonical
//! interval stamps, the archive abstraction, and the stepping search used
//! by the "latest" and "nearest" lookups.
//!
//! This crate contains no tokio, HTTP, process, or filesystem code. The
//! service crate supplies a filesystem [`archive::Archive`]; tests use
//! [`archive::memory::InMemoryArchive`].

pub mod archive;
pub mod lookup;
pub mod models;
pub mod stamp;
