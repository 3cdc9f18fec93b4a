//! Read-only cache verification command.
//!
//! Does not take writer locks, so it can run next to an active
//! enrichment session and simply sees the latest complete snapshot.

use crate::error::CliError;
use skycat::config::StoreConfig;
use skycat::store::{CacheStore, IntegrityReport, IntegrityStatus, RawCatalogStore};
use std::path::Path;

/// Run the verify subcommand.
pub fn run(config: &StoreConfig) -> Result<(), CliError> {
    let mut reports = Vec::new();

    let snapshot = config.data_dir().join(config.dataset_mode().file_name());
    reports.push(CacheStore::verify_file(&snapshot));
    reports.extend(raw_reports(&config.raw_dir()));

    println!("Cache health for {}", config.data_dir().display());
    for report in &reports {
        print_report(report);
    }

    let corrupt_files = reports
        .iter()
        .filter(|r| r.status == IntegrityStatus::Corrupt)
        .count();
    let total: usize = reports.iter().map(|r| r.record_count).sum();
    println!();
    println!("{} snapshot(s), {} record(s) total", reports.len(), total);

    if corrupt_files > 0 {
        return Err(CliError::Unhealthy { corrupt_files });
    }
    Ok(())
}

fn raw_reports(raw_dir: &Path) -> Vec<IntegrityReport> {
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
    paths.iter().map(|p| RawCatalogStore::verify_file(p)).collect()
}

fn print_report(report: &IntegrityReport) {
    println!(
        "  {:<10} {:>8} records  {}",
        report.status,
        report.record_count,
        report.path.display()
    );
    for issue in &report.issues {
        println!("             issue: {}", issue);
    }
}
