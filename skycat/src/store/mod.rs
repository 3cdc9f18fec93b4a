//! Durable snapshot stores for enriched properties and raw catalog tables.
//!
//! Each store owns its on-disk snapshot exclusively and writes it
//! atomically (temp file, fsync, rename), so a reader never observes a
//! half-written state. Destructive rewrites are preceded by timestamped
//! backups, and a shrink guard refuses writes that would sharply reduce
//! the accumulated record count.

mod lock;
mod property;
mod raw;
mod snapshot;

pub use lock::StoreLock;
pub use property::{CacheStore, DatasetMode, MergeMode, MergeReport};
pub use raw::{RawCatalogStore, TableMergeReport};
pub use snapshot::{
    read_snapshot_meta, IntegrityReport, IntegrityStatus, SnapshotMeta, SCHEMA_VERSION,
};

use thiserror::Error;

/// Storage-layer errors.
///
/// Unlike per-identifier lookup failures, these indicate a correctness
/// risk to durable data and abort the enclosing session.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while reading or writing a snapshot.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot exists but failed schema or integrity validation.
    #[error("snapshot failed validation: {0}")]
    CorruptSnapshot(String),

    /// Write rejected because it would shrink the record count past the
    /// configured threshold. The prior snapshot is left untouched.
    #[error(
        "refusing to shrink snapshot from {prior} to {candidate} records \
         (threshold {threshold})"
    )]
    UnsafeShrink {
        prior: usize,
        candidate: usize,
        threshold: f64,
    },

    /// Another writer holds the store's advisory lock.
    #[error("store is locked by another writer: {0}")]
    Locked(String),

    /// Snapshot serialization or deserialization failure.
    #[error("snapshot encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}
