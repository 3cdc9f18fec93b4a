//! CLI error handling with user-friendly messages.

use skycat::query::EnrichError;
use skycat::store::StoreError;
use std::fmt;
use std::process;

/// CLI-level errors mapped to user-facing messages and exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Failed to open or operate on a store.
    Store(StoreError),
    /// Enrichment session failed.
    Enrich(EnrichError),
    /// Failed to construct the remote resolver.
    Resolver(String),
    /// Failed to start the async runtime.
    Runtime(std::io::Error),
    /// A cache snapshot failed verification.
    Unhealthy { corrupt_files: usize },
}

impl CliError {
    /// Print the error (with remediation hints where useful) and exit.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Store(StoreError::Locked(_)) => {
                eprintln!();
                eprintln!("Another skycat process is writing to this data directory.");
                eprintln!("If no such process is running, remove the stale .lock file.");
            }
            CliError::Unhealthy { .. } => {
                eprintln!();
                eprintln!("Corrupt snapshots are quarantined and rebuilt on the next");
                eprintln!("enrichment run; backups with a .backup- suffix can be");
                eprintln!("restored manually if needed.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Store(e) => write!(f, "store operation failed: {}", e),
            CliError::Enrich(e) => write!(f, "enrichment failed: {}", e),
            CliError::Resolver(msg) => write!(f, "cannot reach lookup service: {}", msg),
            CliError::Runtime(e) => write!(f, "failed to start async runtime: {}", e),
            CliError::Unhealthy { corrupt_files } => {
                write!(f, "{} cache snapshot(s) failed verification", corrupt_files)
            }
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<EnrichError> for CliError {
    fn from(e: EnrichError) -> Self {
        CliError::Enrich(e)
    }
}
