//! Snapshot envelope: metadata, checksums, atomic writes and backups.
//!
//! A snapshot file is a JSON envelope of `{ meta, payload }`. The metadata
//! records the producing source, the fetch epoch, the record count, the
//! schema version and a SHA-256 checksum of the serialized payload, so a
//! truncated or hand-edited file is detected on load rather than silently
//! merged into the caches.

use super::StoreError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current on-disk schema version. Bumped when the envelope or payload
/// layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata describing one snapshot at the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// On-disk schema version.
    pub schema_version: u32,
    /// Catalog or dataset the snapshot belongs to.
    pub source: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Number of records in the payload.
    pub record_count: usize,
    /// Hex SHA-256 of the serialized payload.
    pub checksum: String,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile<T> {
    meta: SnapshotMeta,
    payload: T,
}

#[derive(Serialize)]
struct SnapshotFileRef<'a, T> {
    meta: &'a SnapshotMeta,
    payload: &'a T,
}

fn checksum_hex(payload_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Atomically write a snapshot: serialize to a temp file in the same
/// directory, fsync, rename over the live path, then fsync the directory.
///
/// A crash at any point leaves either the prior snapshot or the new one,
/// never a half-written file.
pub(crate) fn write_snapshot<T: Serialize>(
    path: &Path,
    source: &str,
    record_count: usize,
    payload: &T,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload_json = serde_json::to_string(payload)?;
    let meta = SnapshotMeta {
        schema_version: SCHEMA_VERSION,
        source: source.to_string(),
        saved_at: Utc::now(),
        record_count,
        checksum: checksum_hex(&payload_json),
    };
    let body = serde_json::to_vec(&SnapshotFileRef {
        meta: &meta,
        payload,
    })?;

    let tmp_path = temp_path(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    sync_parent_dir(path);

    debug!(
        path = %path.display(),
        records = record_count,
        source = source,
        "snapshot written"
    );
    Ok(())
}

/// Read and validate a snapshot.
///
/// Fails with [`StoreError::CorruptSnapshot`] when the file exists but its
/// structure, schema version or payload checksum do not validate. A missing
/// file is an `Io` error with `NotFound` kind; callers that treat missing
/// as empty check for it explicitly.
pub(crate) fn read_snapshot<T>(path: &Path) -> Result<(SnapshotMeta, T), StoreError>
where
    T: DeserializeOwned + Serialize,
{
    let body = fs::read_to_string(path)?;
    let file: SnapshotFile<T> = serde_json::from_str(&body)
        .map_err(|e| StoreError::CorruptSnapshot(format!("{}: {}", path.display(), e)))?;

    if file.meta.schema_version != SCHEMA_VERSION {
        return Err(StoreError::CorruptSnapshot(format!(
            "{}: unsupported schema version {}",
            path.display(),
            file.meta.schema_version
        )));
    }

    let payload_json = serde_json::to_string(&file.payload)?;
    let actual = checksum_hex(&payload_json);
    if actual != file.meta.checksum {
        return Err(StoreError::CorruptSnapshot(format!(
            "{}: checksum mismatch (expected {}, found {})",
            path.display(),
            file.meta.checksum,
            actual
        )));
    }

    Ok((file.meta, file.payload))
}

/// Read a snapshot's metadata without validating the payload checksum.
///
/// Cheap enough for reporting tools that only need counts and epochs.
/// Returns `None` when no snapshot has been written.
pub fn read_snapshot_meta(path: &Path) -> Result<Option<SnapshotMeta>, StoreError> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    #[derive(Deserialize)]
    struct MetaOnly {
        meta: SnapshotMeta,
    }
    let file: MetaOnly = serde_json::from_str(&body)
        .map_err(|e| StoreError::CorruptSnapshot(format!("{}: {}", path.display(), e)))?;
    Ok(Some(file.meta))
}

/// Write a timestamped backup copy of the snapshot, if it exists.
///
/// Never fails the caller's primary operation: I/O errors are logged and
/// swallowed. Returns the backup path when a copy was made.
pub(crate) fn backup_snapshot(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let backup = timestamped_sibling(path, "backup");
    match fs::copy(path, &backup) {
        Ok(_) => {
            debug!(path = %path.display(), backup = %backup.display(), "snapshot backed up");
            Some(backup)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "snapshot backup failed, continuing without it"
            );
            None
        }
    }
}

/// Move a corrupt snapshot aside for forensics.
///
/// Returns the quarantine path when the move succeeded.
pub(crate) fn quarantine_snapshot(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let quarantine = timestamped_sibling(path, "corrupt");
    match fs::rename(path, &quarantine) {
        Ok(()) => {
            warn!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                "corrupt snapshot preserved for forensics"
            );
            Some(quarantine)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to quarantine corrupt snapshot");
            None
        }
    }
}

/// Read-only health check of one snapshot file.
///
/// Does not take the writer lock; concurrent checks tolerate reading a
/// slightly stale snapshot because writes are rename-based.
pub(crate) fn verify_snapshot<T, F>(path: &Path, count_of: F) -> IntegrityReport
where
    T: DeserializeOwned + Serialize,
    F: Fn(&T) -> usize,
{
    if !path.exists() {
        return IntegrityReport {
            path: path.to_path_buf(),
            status: IntegrityStatus::Missing,
            record_count: 0,
            issues: Vec::new(),
        };
    }

    match read_snapshot::<T>(path) {
        Ok((meta, payload)) => {
            let actual = count_of(&payload);
            let mut issues = Vec::new();
            if actual != meta.record_count {
                issues.push(format!(
                    "record count mismatch: meta says {}, payload has {}",
                    meta.record_count, actual
                ));
            }
            let status = if issues.is_empty() {
                IntegrityStatus::Ok
            } else {
                IntegrityStatus::Corrupt
            };
            IntegrityReport {
                path: path.to_path_buf(),
                status,
                record_count: actual,
                issues,
            }
        }
        Err(e) => IntegrityReport {
            path: path.to_path_buf(),
            status: IntegrityStatus::Corrupt,
            record_count: 0,
            issues: vec![e.to_string()],
        },
    }
}

/// Outcome of a read-only snapshot health check.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Snapshot file the report describes.
    pub path: PathBuf,
    /// Overall verdict.
    pub status: IntegrityStatus,
    /// Records actually present in the payload (0 when unreadable).
    pub record_count: usize,
    /// Human-readable findings; empty when healthy.
    pub issues: Vec<String>,
}

/// Health verdict for one snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Snapshot present and valid.
    Ok,
    /// No snapshot written yet.
    Missing,
    /// Snapshot present but invalid.
    Corrupt,
}

impl std::fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityStatus::Ok => write!(f, "ok"),
            IntegrityStatus::Missing => write!(f, "missing"),
            IntegrityStatus::Corrupt => write!(f, "corrupt"),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot");
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

fn timestamped_sibling(path: &Path, tag: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot");
    let mut candidate = path.with_file_name(format!("{}.{}-{}", name, tag, stamp));
    let mut seq = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}.{}-{}-{}", name, tag, stamp, seq));
        seq += 1;
    }
    candidate
}

fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_payload() -> BTreeMap<String, u32> {
        BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        let payload = sample_payload();

        write_snapshot(&path, "hipparcos", payload.len(), &payload).unwrap();
        let (meta, back): (SnapshotMeta, BTreeMap<String, u32>) = read_snapshot(&path).unwrap();

        assert_eq!(back, payload);
        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.source, "hipparcos");
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        write_snapshot(&path, "x", 2, &sample_payload()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["snap.json".to_string()]);
    }

    #[test]
    fn test_tampered_payload_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        write_snapshot(&path, "x", 2, &sample_payload()).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        fs::write(&path, body.replace("\"a\":1", "\"a\":9")).unwrap();

        let result = read_snapshot::<BTreeMap<String, u32>>(&path);
        assert!(matches!(result, Err(StoreError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        write_snapshot(&path, "x", 2, &sample_payload()).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        fs::write(&path, &body[..body.len() / 2]).unwrap();

        let result = read_snapshot::<BTreeMap<String, u32>>(&path);
        assert!(matches!(result, Err(StoreError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_read_meta_without_payload_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");

        assert!(read_snapshot_meta(&path).unwrap().is_none());

        write_snapshot(&path, "hipparcos", 2, &sample_payload()).unwrap();
        let meta = read_snapshot_meta(&path).unwrap().unwrap();
        assert_eq!(meta.source, "hipparcos");
        assert_eq!(meta.record_count, 2);

        fs::write(&path, "not a snapshot").unwrap();
        assert!(matches!(
            read_snapshot_meta(&path),
            Err(StoreError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_backup_copies_and_names_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        write_snapshot(&path, "x", 2, &sample_payload()).unwrap();

        let backup = backup_snapshot(&path).expect("backup should be created");
        assert!(backup.exists());
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("snap.json.backup-"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            fs::read_to_string(&backup).unwrap()
        );
    }

    #[test]
    fn test_backup_of_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(backup_snapshot(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn test_quarantine_moves_file_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        fs::write(&path, "not json at all").unwrap();

        let quarantine = quarantine_snapshot(&path).expect("quarantine should succeed");
        assert!(!path.exists());
        assert!(quarantine.exists());
        assert!(quarantine
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains(".corrupt-"));
    }

    #[test]
    fn test_verify_reports_missing_ok_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");

        let report = verify_snapshot::<BTreeMap<String, u32>, _>(&path, |m| m.len());
        assert_eq!(report.status, IntegrityStatus::Missing);

        write_snapshot(&path, "x", 2, &sample_payload()).unwrap();
        let report = verify_snapshot::<BTreeMap<String, u32>, _>(&path, |m| m.len());
        assert_eq!(report.status, IntegrityStatus::Ok);
        assert_eq!(report.record_count, 2);
        assert!(report.issues.is_empty());

        fs::write(&path, "{}").unwrap();
        let report = verify_snapshot::<BTreeMap<String, u32>, _>(&path, |m| m.len());
        assert_eq!(report.status, IntegrityStatus::Corrupt);
        assert!(!report.issues.is_empty());
    }
}
