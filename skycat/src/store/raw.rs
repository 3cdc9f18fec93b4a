//! Durable storage for bulk raw catalog tables.
//!
//! One snapshot per upstream source (`raw-<source>.json`). Tables are
//! merge-on-write: rows deduplicate by identifier with last-write-wins,
//! so re-ingesting a catalog supersedes prior rows instead of appending.

use super::snapshot::{
    backup_snapshot, quarantine_snapshot, read_snapshot, verify_snapshot, write_snapshot,
};
use super::{IntegrityReport, StoreError, StoreLock};
use crate::catalog::{Identifier, RawCatalogRow};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of a table merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMergeReport {
    /// Rows newly added.
    pub inserted: usize,
    /// Prior rows superseded by incoming rows with the same identifier.
    pub superseded: usize,
    /// Incoming rows rejected by schema validation.
    pub rejected: usize,
    /// Total rows in the table after the merge.
    pub total: usize,
}

/// Durable storage for bulk catalog tables, one snapshot per source.
///
/// Shares the atomic-write, backup and shrink-guard discipline of
/// [`crate::store::CacheStore`].
pub struct RawCatalogStore {
    dir: PathBuf,
    shrink_threshold: f64,
    _lock: StoreLock,
}

impl RawCatalogStore {
    /// Open the raw-table family rooted at `dir`.
    ///
    /// One advisory lock covers all tables in the family; two processes
    /// cannot interleave raw-table writes.
    pub fn open(dir: impl Into<PathBuf>, shrink_threshold: f64) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock = StoreLock::acquire(&dir.join("raw.lock"))?;
        Ok(Self {
            dir,
            shrink_threshold,
            _lock: lock,
        })
    }

    /// Snapshot path for one source table.
    pub fn table_path(&self, source: &str) -> PathBuf {
        self.dir.join(format!("raw-{}.json", sanitize_source(source)))
    }

    /// Names of all sources with a table on disk.
    pub fn sources(&self) -> Result<Vec<String>, StoreError> {
        let mut sources = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(source) = name
                .strip_prefix("raw-")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                sources.push(source.to_string());
            }
        }
        sources.sort();
        Ok(sources)
    }

    /// Load one source table. A table never ingested loads as empty.
    pub fn load_table(&self, source: &str) -> Result<Vec<RawCatalogRow>, StoreError> {
        let path = self.table_path(source);
        match read_snapshot::<Vec<RawCatalogRow>>(&path) {
            Ok((meta, rows)) => {
                if meta.record_count != rows.len() {
                    return Err(StoreError::CorruptSnapshot(format!(
                        "{}: row count mismatch (meta {}, payload {})",
                        path.display(),
                        meta.record_count,
                        rows.len()
                    )));
                }
                Ok(rows)
            }
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Load a table, treating a corrupt snapshot as empty after moving it
    /// aside for forensics.
    pub fn load_table_or_rebuild(&self, source: &str) -> Result<Vec<RawCatalogRow>, StoreError> {
        match self.load_table(source) {
            Ok(rows) => Ok(rows),
            Err(StoreError::CorruptSnapshot(issue)) => {
                warn!(
                    source = source,
                    issue = %issue,
                    "treating corrupt raw table as empty"
                );
                quarantine_snapshot(&self.table_path(source));
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Merge rows into a source table and persist atomically.
    ///
    /// Rows failing schema validation are rejected (counted, logged,
    /// skipped). Incoming rows supersede prior rows with the same
    /// identifier. The shrink guard applies to the resulting row count.
    pub fn merge_table(
        &self,
        source: &str,
        rows: &[RawCatalogRow],
    ) -> Result<TableMergeReport, StoreError> {
        let prior = self.load_table_or_rebuild(source)?;
        let prior_count = prior.len();

        let mut table: BTreeMap<Identifier, RawCatalogRow> = prior
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let mut inserted = 0;
        let mut superseded = 0;
        let mut rejected = 0;
        for row in rows {
            if !row.is_valid() {
                rejected += 1;
                warn!(source = source, id = %row.id, "rejecting invalid raw catalog row");
                continue;
            }
            if table.insert(row.id.clone(), row.clone()).is_some() {
                superseded += 1;
            } else {
                inserted += 1;
            }
        }

        if prior_count > 0 && (table.len() as f64) < prior_count as f64 * self.shrink_threshold {
            return Err(StoreError::UnsafeShrink {
                prior: prior_count,
                candidate: table.len(),
                threshold: self.shrink_threshold,
            });
        }

        let ordered: Vec<RawCatalogRow> = table.into_values().collect();
        let path = self.table_path(source);
        write_snapshot(&path, source, ordered.len(), &ordered)?;

        let report = TableMergeReport {
            inserted,
            superseded,
            rejected,
            total: ordered.len(),
        };
        debug!(
            source = source,
            inserted = report.inserted,
            superseded = report.superseded,
            rejected = report.rejected,
            total = report.total,
            "raw table merged"
        );
        Ok(report)
    }

    /// Identifiers present in one source table.
    ///
    /// Supports the coordinator's incremental decision without forcing
    /// callers to hold full rows.
    pub fn extract_identifiers(&self, source: &str) -> Result<HashSet<Identifier>, StoreError> {
        Ok(self
            .load_table(source)?
            .into_iter()
            .map(|row| row.id)
            .collect())
    }

    /// Back up one source table. Non-fatal, like [`crate::store::CacheStore::backup`].
    pub fn backup_table(&self, source: &str) -> Option<PathBuf> {
        backup_snapshot(&self.table_path(source))
    }

    /// Back up every source table, returning the backup paths written.
    pub fn backup_all(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut backups = Vec::new();
        for source in self.sources()? {
            if let Some(path) = self.backup_table(&source) {
                backups.push(path);
            }
        }
        Ok(backups)
    }

    /// Read-only health check of one source table.
    pub fn verify_table(&self, source: &str) -> IntegrityReport {
        Self::verify_file(&self.table_path(source))
    }

    /// Read-only health check of an arbitrary raw-table snapshot file.
    pub fn verify_file(path: &Path) -> IntegrityReport {
        verify_snapshot::<Vec<RawCatalogRow>, _>(path, |rows| rows.len())
    }

    /// Health checks for every table in the family.
    pub fn verify_all(&self) -> Result<Vec<IntegrityReport>, StoreError> {
        let mut reports = Vec::new();
        for source in self.sources()? {
            reports.push(self.verify_table(&source));
        }
        Ok(reports)
    }
}

/// Restrict source names to a filesystem-safe alphabet.
fn sanitize_source(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
