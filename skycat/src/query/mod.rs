//! Query planning and orchestration against remote catalog services.
//!
//! The [`CacheCoordinator`] decides what actually needs fetching; the
//! [`QueryOrchestrator`] drains that set in rate-limited batches with
//! retries, persisting after every batch.

pub mod coordinator;
mod http;
pub mod orchestrator;
pub mod resolver;
mod stats;

pub use coordinator::{CacheCoordinator, EnrichmentPolicy, QueryPlan};
pub use http::HttpResolver;
pub use orchestrator::{EnrichError, QueryOrchestrator, QueryOutcome};
pub use resolver::{BundledCatalog, FieldSet, LocalCatalog, RemoteResolver, Resolution};
pub use stats::{FailureEntry, QueryStats, Summary};
