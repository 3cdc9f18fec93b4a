//! Enriched-cache clear command.

use crate::error::CliError;
use skycat::config::StoreConfig;
use skycat::store::CacheStore;

/// Run the clear subcommand.
///
/// Removes the enriched snapshot for the selected dataset mode after
/// writing a protective backup. Raw catalog tables are never cleared
/// here; re-ingestion supersedes them instead.
pub fn run(config: &StoreConfig) -> Result<(), CliError> {
    let cache = CacheStore::open_mode(
        config.data_dir(),
        config.dataset_mode(),
        config.shrink_threshold(),
    )?;

    match cache.clear()? {
        Some(backup) => {
            println!(
                "Cleared the {} dataset snapshot.",
                config.dataset_mode().label()
            );
            println!("Backup kept at {}", backup.display());
        }
        None => println!(
            "No {} dataset snapshot to clear.",
            config.dataset_mode().label()
        ),
    }
    Ok(())
}
