//! Durable store for enriched per-object property records.

use super::snapshot::{
    backup_snapshot, quarantine_snapshot, read_snapshot, verify_snapshot, write_snapshot,
};
use super::{IntegrityReport, StoreError, StoreLock};
use crate::catalog::{Identifier, PropertyRecord};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which enriched dataset a [`CacheStore`] persists.
///
/// The application keeps one enriched snapshot per selection mode, so a
/// distance-limited sample and a magnitude-limited sample accumulate
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetMode {
    /// Objects selected by distance from the Sun.
    Distance,
    /// Objects selected by apparent magnitude.
    Magnitude,
}

impl DatasetMode {
    /// Snapshot file name for this mode.
    pub fn file_name(&self) -> &'static str {
        match self {
            DatasetMode::Distance => "properties-distance.json",
            DatasetMode::Magnitude => "properties-magnitude.json",
        }
    }

    /// Label recorded in snapshot metadata.
    pub fn label(&self) -> &'static str {
        match self {
            DatasetMode::Distance => "distance",
            DatasetMode::Magnitude => "magnitude",
        }
    }
}

/// How a [`CacheStore::merge`] treats existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Field-wise union. Incoming non-empty fields overwrite; incoming
    /// empty fields never clobber populated stored ones. The record count
    /// cannot decrease.
    Incremental,
    /// Per-record replacement for the identifiers named in the update set
    /// (the force-refresh path); records not named are kept. Empty
    /// incoming records still only fill gaps, so a failure placeholder
    /// cannot erase history.
    Refresh,
    /// Snapshot-level replacement: the update set becomes the snapshot.
    /// Used by rebuild and bulk-ingestion flows; this is the mode the
    /// shrink guard exists for.
    Replace,
}

/// Outcome of a merge, for logging and operator reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Records newly added by this merge.
    pub inserted: usize,
    /// Existing records refreshed or replaced.
    pub updated: usize,
    /// Total records in the snapshot after the merge.
    pub total: usize,
}

/// Durable key→record storage for enriched object properties.
///
/// One snapshot file per [`DatasetMode`], written atomically and protected
/// by an advisory single-writer lock, a shrink guard and backup-on-write.
///
/// # Example
///
/// ```ignore
/// use skycat::store::{CacheStore, DatasetMode, MergeMode};
///
/// let store = CacheStore::open_mode("data", DatasetMode::Distance, 0.95)?;
/// let records = store.load()?;
/// store.backup();
/// store.merge(&updates, MergeMode::Incremental)?;
/// ```
pub struct CacheStore {
    path: PathBuf,
    source: String,
    shrink_threshold: f64,
    _lock: StoreLock,
}

impl CacheStore {
    /// Open the store for one dataset mode inside `dir`.
    ///
    /// Acquires the writer lock and validates any existing snapshot. A
    /// corrupt snapshot does not fail the open; it is reported and handled
    /// by the rebuild path on the next load.
    pub fn open_mode(
        dir: impl AsRef<Path>,
        mode: DatasetMode,
        shrink_threshold: f64,
    ) -> Result<Self, StoreError> {
        Self::open(
            dir.as_ref().join(mode.file_name()),
            mode.label(),
            shrink_threshold,
        )
    }

    /// Open the store backed by an explicit snapshot path.
    pub fn open(
        path: impl Into<PathBuf>,
        source: impl Into<String>,
        shrink_threshold: f64,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = StoreLock::acquire(&lock_path(&path))?;
        let store = Self {
            path,
            source: source.into(),
            shrink_threshold,
            _lock: lock,
        };

        match store.load() {
            Ok(records) => {
                debug!(
                    path = %store.path.display(),
                    records = records.len(),
                    "property store opened"
                );
            }
            Err(StoreError::CorruptSnapshot(issue)) => {
                warn!(
                    path = %store.path.display(),
                    issue = %issue,
                    "property store opened with a corrupt snapshot, rebuild pending"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    /// Path of the live snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current snapshot.
    ///
    /// A store that has never been written loads as empty. A snapshot that
    /// exists but fails validation is a [`StoreError::CorruptSnapshot`];
    /// callers wanting the rebuild path use [`CacheStore::load_or_rebuild`].
    pub fn load(&self) -> Result<BTreeMap<Identifier, PropertyRecord>, StoreError> {
        Self::load_readonly(&self.path)
    }

    /// Read a snapshot without holding the writer lock.
    ///
    /// Used by concurrent integrity checks and tests; tolerates reading a
    /// slightly stale snapshot since writes are rename-based.
    pub fn load_readonly(
        path: &Path,
    ) -> Result<BTreeMap<Identifier, PropertyRecord>, StoreError> {
        match read_snapshot::<BTreeMap<Identifier, PropertyRecord>>(path) {
            Ok((meta, records)) => {
                if meta.record_count != records.len() {
                    return Err(StoreError::CorruptSnapshot(format!(
                        "{}: record count mismatch (meta {}, payload {})",
                        path.display(),
                        meta.record_count,
                        records.len()
                    )));
                }
                Ok(records)
            }
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Load, treating a corrupt snapshot as empty.
    ///
    /// The corrupt file is moved aside for forensics and an empty map is
    /// returned so the caller can rebuild. I/O errors still propagate.
    pub fn load_or_rebuild(&self) -> Result<BTreeMap<Identifier, PropertyRecord>, StoreError> {
        match self.load() {
            Ok(records) => Ok(records),
            Err(StoreError::CorruptSnapshot(issue)) => {
                warn!(
                    path = %self.path.display(),
                    issue = %issue,
                    "treating corrupt property snapshot as empty"
                );
                quarantine_snapshot(&self.path);
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Merge updates into the snapshot and persist atomically.
    ///
    /// The shrink guard runs on the candidate result in every mode: a
    /// write whose record count falls below `shrink_threshold` times the
    /// prior count is rejected with [`StoreError::UnsafeShrink`], leaving
    /// the prior snapshot intact.
    pub fn merge(
        &self,
        updates: &BTreeMap<Identifier, PropertyRecord>,
        mode: MergeMode,
    ) -> Result<MergeReport, StoreError> {
        let prior = self.load_or_rebuild()?;
        let prior_count = prior.len();

        let mut inserted = 0;
        let mut updated = 0;
        let candidate = match mode {
            MergeMode::Replace => {
                inserted = updates.keys().filter(|id| !prior.contains_key(*id)).count();
                updated = updates.len() - inserted;
                updates.clone()
            }
            MergeMode::Incremental | MergeMode::Refresh => {
                let mut combined = prior;
                for (id, incoming) in updates {
                    match combined.get_mut(id) {
                        Some(existing) => {
                            let refreshed = if mode == MergeMode::Refresh && !incoming.is_empty()
                            {
                                *existing = incoming.clone();
                                true
                            } else {
                                existing.absorb(incoming)
                            };
                            if refreshed {
                                updated += 1;
                            }
                        }
                        None => {
                            combined.insert(id.clone(), incoming.clone());
                            inserted += 1;
                        }
                    }
                }
                combined
            }
        };

        // Compared in f64: flooring would let a write slip just under the
        // threshold when prior_count * shrink_threshold is non-integer.
        if prior_count > 0
            && (candidate.len() as f64) < prior_count as f64 * self.shrink_threshold
        {
            warn!(
                path = %self.path.display(),
                prior = prior_count,
                candidate = candidate.len(),
                "merge rejected by shrink guard"
            );
            return Err(StoreError::UnsafeShrink {
                prior: prior_count,
                candidate: candidate.len(),
                threshold: self.shrink_threshold,
            });
        }

        write_snapshot(&self.path, &self.source, candidate.len(), &candidate)?;
        let report = MergeReport {
            inserted,
            updated,
            total: candidate.len(),
        };
        debug!(
            path = %self.path.display(),
            inserted = report.inserted,
            updated = report.updated,
            total = report.total,
            ?mode,
            "property snapshot merged"
        );
        Ok(report)
    }

    /// Write a timestamped backup of the current snapshot.
    ///
    /// Idempotent and non-fatal: I/O problems are logged, never surfaced,
    /// so a failed backup cannot abort the caller's primary operation.
    pub fn backup(&self) -> Option<PathBuf> {
        backup_snapshot(&self.path)
    }

    /// Read-only health check of the live snapshot.
    pub fn verify_integrity(&self) -> IntegrityReport {
        Self::verify_file(&self.path)
    }

    /// Read-only health check of an arbitrary property snapshot file.
    pub fn verify_file(path: &Path) -> IntegrityReport {
        verify_snapshot::<BTreeMap<Identifier, PropertyRecord>, _>(path, |m| m.len())
    }

    /// Explicitly clear all accumulated records.
    ///
    /// This is the only deletion path; a backup is taken first and the
    /// shrink guard deliberately does not apply. Returns the backup path
    /// when one was written.
    pub fn clear(&self) -> Result<Option<PathBuf>, StoreError> {
        let backup = self.backup();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "property snapshot cleared");
                Ok(backup)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(backup),
            Err(e) => Err(e.into()),
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot");
    path.with_file_name(format!("{}.lock", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fields, Provenance};
    use crate::store::IntegrityStatus;
    use tempfile::TempDir;

    fn record(vmag: f64) -> PropertyRecord {
        PropertyRecord::new(Provenance::Remote {
            source: "simbad".to_string(),
        })
        .with_field(fields::VMAG, vmag)
    }

    fn updates(ids: &[(&str, f64)]) -> BTreeMap<Identifier, PropertyRecord> {
        ids.iter()
            .map(|(id, vmag)| (Identifier::new(*id), record(*vmag)))
            .collect()
    }

    fn open_store(dir: &TempDir) -> CacheStore {
        CacheStore::open_mode(dir.path(), DatasetMode::Distance, 0.95).unwrap()
    }

    #[test]
    fn test_fresh_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_merge_inserts_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let report = store
            .merge(&updates(&[("HD 1", 5.0), ("HD 2", 6.0)]), MergeMode::Incremental)
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.total, 2);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains_key(&Identifier::new("HD 1")));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store
                .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
                .unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_incremental_merge_never_clobbers_with_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();

        // A terminal placeholder for an already-known object changes nothing.
        let placeholder =
            BTreeMap::from([(Identifier::new("HD 1"), PropertyRecord::terminal())]);
        store.merge(&placeholder, MergeMode::Incremental).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded[&Identifier::new("HD 1")].has_field(fields::VMAG));
    }

    #[test]
    fn test_refresh_mode_replaces_whole_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let seeded = BTreeMap::from([(
            Identifier::new("HD 1"),
            record(5.0).with_field(fields::SPECTRAL_TYPE, "G2V"),
        )]);
        store.merge(&seeded, MergeMode::Incremental).unwrap();

        // Refresh drops the stale spectral type the new record lacks.
        store
            .merge(&updates(&[("HD 1", 4.9)]), MergeMode::Refresh)
            .unwrap();
        let loaded = store.load().unwrap();
        let rec = &loaded[&Identifier::new("HD 1")];
        assert!(!rec.has_field(fields::SPECTRAL_TYPE));
        assert_eq!(rec.get(fields::VMAG).and_then(|v| v.as_f64()), Some(4.9));
    }

    #[test]
    fn test_refresh_mode_keeps_history_on_placeholder() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();

        let placeholder =
            BTreeMap::from([(Identifier::new("HD 1"), PropertyRecord::terminal())]);
        store.merge(&placeholder, MergeMode::Refresh).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded[&Identifier::new("HD 1")].has_field(fields::VMAG));
    }

    #[test]
    fn test_shrink_guard_rejects_and_preserves_prior() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let seeded: Vec<(String, f64)> = (0..20).map(|i| (format!("HD {}", i), 5.0)).collect();
        let seeded: BTreeMap<Identifier, PropertyRecord> = seeded
            .iter()
            .map(|(id, v)| (Identifier::new(id.clone()), record(*v)))
            .collect();
        store.merge(&seeded, MergeMode::Incremental).unwrap();

        // A replace carrying 10 of 20 records (50%) must be rejected.
        let shrunk: BTreeMap<Identifier, PropertyRecord> = seeded
            .iter()
            .take(10)
            .map(|(id, rec)| (id.clone(), rec.clone()))
            .collect();
        let result = store.merge(&shrunk, MergeMode::Replace);
        assert!(matches!(result, Err(StoreError::UnsafeShrink { .. })));

        // Prior snapshot untouched.
        assert_eq!(store.load().unwrap().len(), 20);
    }

    #[test]
    fn test_shrink_guard_rejects_fractional_boundary() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let seeded: BTreeMap<Identifier, PropertyRecord> = (0..10)
            .map(|i| (Identifier::new(format!("HD {}", i)), record(5.0)))
            .collect();
        store.merge(&seeded, MergeMode::Incremental).unwrap();

        // 9 of 10 records is 90%, below the 0.95 fraction (9.5 records).
        let shrunk: BTreeMap<Identifier, PropertyRecord> = seeded
            .iter()
            .take(9)
            .map(|(id, rec)| (id.clone(), rec.clone()))
            .collect();
        assert!(matches!(
            store.merge(&shrunk, MergeMode::Replace),
            Err(StoreError::UnsafeShrink { .. })
        ));
        assert_eq!(store.load().unwrap().len(), 10);
    }

    #[test]
    fn test_replace_within_threshold_is_allowed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let seeded: BTreeMap<Identifier, PropertyRecord> = (0..20)
            .map(|i| (Identifier::new(format!("HD {}", i)), record(5.0)))
            .collect();
        store.merge(&seeded, MergeMode::Incremental).unwrap();

        let replacement: BTreeMap<Identifier, PropertyRecord> = (0..19)
            .map(|i| (Identifier::new(format!("HD {}", i)), record(4.0)))
            .collect();
        let report = store.merge(&replacement, MergeMode::Replace).unwrap();
        assert_eq!(report.total, 19);
    }

    #[test]
    fn test_corrupt_snapshot_is_quarantined_on_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();

        std::fs::write(store.path(), "garbage").unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::CorruptSnapshot(_))
        ));

        let rebuilt = store.load_or_rebuild().unwrap();
        assert!(rebuilt.is_empty());
        assert!(!store.path().exists());

        // The original file is preserved for forensics.
        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(quarantined);
    }

    #[test]
    fn test_backup_before_merge_names_prior_state() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();

        let backup = store.backup().expect("snapshot exists, backup expected");
        store
            .merge(&updates(&[("HD 2", 6.0)]), MergeMode::Incremental)
            .unwrap();

        let backed_up = CacheStore::load_readonly(&backup).unwrap();
        assert_eq!(backed_up.len(), 1);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_second_writer_rejected_while_open() {
        let dir = TempDir::new().unwrap();
        let _store = open_store(&dir);
        let second = CacheStore::open_mode(dir.path(), DatasetMode::Distance, 0.95);
        assert!(matches!(second, Err(StoreError::Locked(_))));

        // A different dataset mode has its own lock.
        let other = CacheStore::open_mode(dir.path(), DatasetMode::Magnitude, 0.95);
        assert!(other.is_ok());
    }

    #[test]
    fn test_clear_removes_records_but_backs_up_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();

        let backup = store.clear().unwrap().expect("backup of cleared snapshot");
        assert!(store.load().unwrap().is_empty());
        assert!(backup.exists());
        assert_eq!(CacheStore::load_readonly(&backup).unwrap().len(), 1);
    }

    #[test]
    fn test_verify_integrity_statuses() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.verify_integrity().status, IntegrityStatus::Missing);

        store
            .merge(&updates(&[("HD 1", 5.0)]), MergeMode::Incremental)
            .unwrap();
        let report = store.verify_integrity();
        assert_eq!(report.status, IntegrityStatus::Ok);
        assert_eq!(report.record_count, 1);

        std::fs::write(store.path(), "{}").unwrap();
        assert_eq!(store.verify_integrity().status, IntegrityStatus::Corrupt);
    }
}
