//! Protective backup command.

use crate::error::CliError;
use skycat::config::StoreConfig;
use skycat::store::{CacheStore, RawCatalogStore};

/// Run the protect subcommand.
///
/// Takes the writer locks so backups capture a settled state, then
/// writes a timestamped copy of every snapshot.
pub fn run(config: &StoreConfig) -> Result<(), CliError> {
    let cache = CacheStore::open_mode(
        config.data_dir(),
        config.dataset_mode(),
        config.shrink_threshold(),
    )?;
    let raw = RawCatalogStore::open(config.raw_dir(), config.shrink_threshold())?;

    let mut backups = Vec::new();
    if let Some(path) = cache.backup() {
        backups.push(path);
    }
    backups.extend(raw.backup_all()?);

    if backups.is_empty() {
        println!("No snapshots to protect in {}", config.data_dir().display());
    } else {
        println!("Wrote {} backup(s):", backups.len());
        for path in &backups {
            println!("  {}", path.display());
        }
    }
    Ok(())
}
