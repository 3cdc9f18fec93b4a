//! Snapshot statistics command.
//!
//! Reads snapshot metadata without taking writer locks or validating
//! payload checksums; use `verify` for the full integrity check.

use crate::error::CliError;
use skycat::config::StoreConfig;
use skycat::store::read_snapshot_meta;
use std::path::Path;

/// Run the stats subcommand.
pub fn run(config: &StoreConfig) -> Result<(), CliError> {
    println!("Cache statistics for {}", config.data_dir().display());

    let snapshot = config.data_dir().join(config.dataset_mode().file_name());
    print_stats(&snapshot);

    for table in raw_tables(&config.raw_dir()) {
        print_stats(&table);
    }
    Ok(())
}

fn print_stats(path: &Path) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match read_snapshot_meta(path) {
        Ok(Some(meta)) => {
            println!("  {}", name);
            println!("    source:  {}", meta.source);
            println!("    records: {}", meta.record_count);
            println!("    saved:   {}", meta.saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("    backups: {}", backup_count(path));
        }
        Ok(None) => {
            println!("  {}", name);
            println!("    not written yet");
        }
        Err(e) => {
            println!("  {}", name);
            println!("    unreadable: {}", e);
        }
    }
}

fn raw_tables(raw_dir: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(raw_dir) else {
        return Vec::new();
    };
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("raw-") && n.ends_with(".json"))
        })
        .collect();
    paths.sort();
    paths
}

fn backup_count(path: &Path) -> usize {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return 0;
    };
    let prefix = format!("{}.backup-", name.to_string_lossy());
    std::fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                .count()
        })
        .unwrap_or(0)
}
