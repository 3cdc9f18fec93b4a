//! Configuration for queries and stores.
//!
//! Builder-style structs with validated, operator-tunable values. Invalid
//! configuration is rejected when a session starts, before any work is
//! performed.

mod defaults;
mod query;
mod store;

pub use defaults::*;
pub use query::QueryConfig;
pub use store::StoreConfig;

use thiserror::Error;

/// Rejected configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Rate values must be positive and finite.
    #[error("queries_per_second must be positive and finite, got {0}")]
    InvalidRate(f64),

    /// Burst capacity must be at least one token.
    #[error("burst must be >= 1")]
    InvalidBurst,

    /// Batches must hold at least one identifier.
    #[error("batch_size must be >= 1")]
    InvalidBatchSize,

    /// At least one lookup must run at a time.
    #[error("parallelism must be >= 1")]
    InvalidParallelism,

    /// Per-lookup timeouts must be non-zero.
    #[error("timeout must be non-zero")]
    InvalidTimeout,

    /// The shrink threshold is a fraction of the prior record count.
    #[error("shrink_threshold must be in (0, 1], got {0}")]
    InvalidShrinkThreshold(f64),
}
