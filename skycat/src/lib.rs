//! skycat - astronomical catalog cache and query orchestration.
//!
//! Turns a list of requested object identifiers into a reliable,
//! locally-persisted set of properties: remote lookups are rate-limited
//! and retried, already-known objects are never re-fetched, and the
//! file-backed caches are written atomically with backups and a shrink
//! guard so accumulated data is never silently truncated.
//!
//! # High-Level API
//!
//! The [`service`] module provides a facade over the component wiring:
//!
//! ```ignore
//! use skycat::config::{QueryConfig, StoreConfig};
//! use skycat::query::{EnrichmentPolicy, HttpResolver};
//! use skycat::service::CatalogService;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let resolver = Arc::new(HttpResolver::new(
//!     "https://lookup.example/objects",
//!     "simbad",
//!     Duration::from_secs(20),
//! )?);
//! let service = CatalogService::open(StoreConfig::new(), QueryConfig::new(), resolver)?;
//! let (records, summary) = service.enrich_objects(&ids, &EnrichmentPolicy::new()).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod logging;
pub mod query;
pub mod ratelimit;
pub mod service;
pub mod store;

/// Version of the skycat library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
