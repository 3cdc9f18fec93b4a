//! Advisory single-writer lock files.
//!
//! Each store takes one lock for its snapshot family, preventing two
//! orchestration runs in separate processes from interleaving writes.
//! Readers never take the lock; rename-based writes keep reads consistent.

use super::StoreError;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held advisory lock. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock file at `path`, recording this process's pid.
    ///
    /// Fails with [`StoreError::Locked`] when another writer already holds
    /// it. A lock left behind by a crashed process must be removed by the
    /// operator; the error message names the stale holder.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "store lock acquired");
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                let holder = holder.trim();
                Err(StoreError::Locked(format!(
                    "{} held by pid {}",
                    path.display(),
                    if holder.is_empty() { "unknown" } else { holder }
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}
