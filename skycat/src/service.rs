//! High-level facade over stores, resolver and orchestration.
//!
//! Encapsulates component wiring so callers (the visualization layers,
//! the CLI) deal with one object: open it, enrich identifiers, check and
//! protect the caches, close it.

use crate::catalog::{Identifier, PropertyRecord, RawCatalogRow};
use crate::config::{QueryConfig, StoreConfig};
use crate::query::{
    EnrichError, EnrichmentPolicy, LocalCatalog, QueryOrchestrator, QueryOutcome, RemoteResolver,
    Summary,
};
use crate::store::{
    CacheStore, IntegrityReport, IntegrityStatus, RawCatalogStore, StoreError, TableMergeReport,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregated health report across every snapshot family.
#[derive(Debug)]
pub struct CacheHealthReport {
    /// Per-file integrity results: the enriched snapshot first, then one
    /// entry per raw table.
    pub reports: Vec<IntegrityReport>,
}

impl CacheHealthReport {
    /// Whether no snapshot is corrupt (missing snapshots are healthy:
    /// they simply have not been written yet).
    pub fn healthy(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.status != IntegrityStatus::Corrupt)
    }

    /// Total records across all readable snapshots.
    pub fn total_records(&self) -> usize {
        self.reports.iter().map(|r| r.record_count).sum()
    }
}

/// Facade owning the two stores and the enrichment pipeline.
///
/// # Example
///
/// ```ignore
/// use skycat::config::{QueryConfig, StoreConfig};
/// use skycat::query::{EnrichmentPolicy, HttpResolver};
/// use skycat::service::CatalogService;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let resolver = Arc::new(HttpResolver::new(
///     "https://lookup.example/objects",
///     "simbad",
///     Duration::from_secs(20),
/// )?);
/// let service = CatalogService::open(StoreConfig::new(), QueryConfig::new(), resolver)?;
/// let (records, summary) = service
///     .enrich_objects(&ids, &EnrichmentPolicy::new())
///     .await?;
/// ```
pub struct CatalogService {
    cache: CacheStore,
    raw: RawCatalogStore,
    resolver: Arc<dyn RemoteResolver>,
    local: Option<Box<dyn LocalCatalog>>,
    query_config: QueryConfig,
}

impl CatalogService {
    /// Open both stores and wire the enrichment pipeline.
    ///
    /// Validates configuration and acquires the stores' writer locks;
    /// fails if another process is writing to the same data directory.
    pub fn open(
        store_config: StoreConfig,
        query_config: QueryConfig,
        resolver: Arc<dyn RemoteResolver>,
    ) -> Result<Self, EnrichError> {
        store_config.validate()?;
        query_config.validate()?;
        let cache = CacheStore::open_mode(
            store_config.data_dir(),
            store_config.dataset_mode(),
            store_config.shrink_threshold(),
        )?;
        let raw = RawCatalogStore::open(store_config.raw_dir(), store_config.shrink_threshold())?;
        info!(
            data_dir = %store_config.data_dir().display(),
            mode = store_config.dataset_mode().label(),
            "catalog service opened"
        );
        Ok(Self {
            cache,
            raw,
            resolver,
            local: None,
            query_config,
        })
    }

    /// Attach a local catalog consulted before any remote query.
    pub fn with_local_catalog(mut self, local: Box<dyn LocalCatalog>) -> Self {
        self.local = Some(local);
        self
    }

    /// Enrich the requested identifiers, returning a complete record map
    /// and the session summary.
    pub async fn enrich_objects(
        &self,
        ids: &[Identifier],
        policy: &EnrichmentPolicy,
    ) -> Result<(BTreeMap<Identifier, PropertyRecord>, Summary), EnrichError> {
        let outcome = self
            .enrich_objects_with_cancel(ids, policy, CancellationToken::new())
            .await?;
        Ok((outcome.records, outcome.summary))
    }

    /// Enrich with a caller-held cancellation token.
    pub async fn enrich_objects_with_cancel(
        &self,
        ids: &[Identifier],
        policy: &EnrichmentPolicy,
        cancel: CancellationToken,
    ) -> Result<QueryOutcome, EnrichError> {
        let mut orchestrator = QueryOrchestrator::new(
            &self.cache,
            &self.raw,
            Arc::clone(&self.resolver),
            self.query_config.clone(),
        );
        if let Some(local) = &self.local {
            orchestrator = orchestrator.with_local_catalog(local.as_ref());
        }
        orchestrator.enrich(ids, policy, cancel).await
    }

    /// Ingest bulk rows into a raw catalog table (backup first).
    pub fn ingest_raw_table(
        &self,
        source: &str,
        rows: &[RawCatalogRow],
    ) -> Result<TableMergeReport, StoreError> {
        self.raw.backup_table(source);
        self.raw.merge_table(source, rows)
    }

    /// Read-only health check across every snapshot family.
    pub fn verify_all_caches(&self) -> CacheHealthReport {
        let mut reports = vec![self.cache.verify_integrity()];
        match self.raw.verify_all() {
            Ok(raw_reports) => reports.extend(raw_reports),
            Err(e) => reports.push(IntegrityReport {
                path: self.raw.table_path("*"),
                status: IntegrityStatus::Corrupt,
                record_count: 0,
                issues: vec![format!("raw table enumeration failed: {}", e)],
            }),
        }
        CacheHealthReport { reports }
    }

    /// Write protective backups of every snapshot, returning the paths.
    pub fn protect_all_caches(&self) -> Vec<PathBuf> {
        let mut backups = Vec::new();
        if let Some(path) = self.cache.backup() {
            backups.push(path);
        }
        if let Ok(raw_backups) = self.raw.backup_all() {
            backups.extend(raw_backups);
        }
        info!(count = backups.len(), "protective cache backups written");
        backups
    }

    /// Explicitly clear the enriched cache (backed up first).
    ///
    /// Returns the path of the protective backup, when one was written.
    pub fn clear_enriched_cache(&self) -> Result<Option<PathBuf>, StoreError> {
        self.cache.clear()
    }

    /// Flush and release the stores' writer locks.
    ///
    /// Dropping the service has the same effect; `close` makes the
    /// lifecycle explicit at call sites.
    pub fn close(self) {
        info!("catalog service closed");
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fields;
    use crate::query::resolver::tests::FixedResolver;
    use crate::query::Resolution;
    use tempfile::TempDir;

    fn open_service(dir: &TempDir) -> CatalogService {
        let store_config = StoreConfig::new().with_data_dir(dir.path());
        let resolver = Arc::new(FixedResolver {
            resolution: Resolution::Found(BTreeMap::from([
                (fields::RA_DEG.to_string(), 10.0.into()),
                (fields::DEC_DEG.to_string(), 20.0.into()),
                (fields::VMAG.to_string(), 5.0.into()),
            ])),
        });
        CatalogService::open(
            store_config,
            QueryConfig::new().with_queries_per_second(1000.0),
            resolver,
        )
        .unwrap()
    }

    #[test]
    fn test_verify_on_empty_directory() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);

        let report = service.verify_all_caches();
        assert!(report.healthy());
        assert_eq!(report.total_records(), 0);
        assert_eq!(report.reports.len(), 1); // enriched snapshot only
    }

    #[test]
    fn test_protect_with_no_snapshots_is_empty() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);
        assert!(service.protect_all_caches().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_then_verify_and_protect() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);

        let ids = vec![Identifier::new("HD 1")];
        let (records, summary) = service
            .enrich_objects(&ids, &EnrichmentPolicy::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(summary.success_count, 1);

        let report = service.verify_all_caches();
        assert!(report.healthy());
        assert_eq!(report.total_records(), 1);

        let backups = service.protect_all_caches();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].exists());
    }

    #[test]
    fn test_ingest_raw_table_appears_in_verify() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);

        service
            .ingest_raw_table(
                "hipparcos",
                &[RawCatalogRow {
                    id: Identifier::new("HIP 1"),
                    ra_deg: 1.0,
                    dec_deg: 2.0,
                    vmag: Some(9.0),
                    parallax_mas: None,
                    spectral_type: None,
                }],
            )
            .unwrap();

        let report = service.verify_all_caches();
        assert_eq!(report.reports.len(), 2);
        assert!(report.healthy());
        assert_eq!(report.total_records(), 1);
    }

    #[tokio::test]
    async fn test_clear_enriched_cache_backs_up_first() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);
        service
            .enrich_objects(&[Identifier::new("HD 1")], &EnrichmentPolicy::new())
            .await
            .unwrap();

        let backup = service.clear_enriched_cache().unwrap();
        assert!(backup.is_some_and(|p| p.exists()));
        assert_eq!(service.verify_all_caches().total_records(), 0);
    }

    #[test]
    fn test_second_service_on_same_directory_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let service = open_service(&dir);

        let resolver = Arc::new(FixedResolver {
            resolution: Resolution::NotFound,
        });
        let second = CatalogService::open(
            StoreConfig::new().with_data_dir(dir.path()),
            QueryConfig::new(),
            resolver.clone(),
        );
        assert!(matches!(
            second,
            Err(EnrichError::Store(StoreError::Locked(_)))
        ));

        service.close();
        let third = CatalogService::open(
            StoreConfig::new().with_data_dir(dir.path()),
            QueryConfig::new(),
            resolver,
        );
        assert!(third.is_ok());
    }

    #[test]
    fn test_open_rejects_bad_store_config() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(FixedResolver {
            resolution: Resolution::NotFound,
        });
        let result = CatalogService::open(
            StoreConfig::new()
                .with_data_dir(dir.path())
                .with_shrink_threshold(2.0),
            QueryConfig::new(),
            resolver,
        );
        assert!(matches!(result, Err(EnrichError::Config(_))));

        // No locks left behind by the failed open.
        let retry = CatalogService::open(
            StoreConfig::new().with_data_dir(dir.path()),
            QueryConfig::new(),
            Arc::new(FixedResolver {
                resolution: Resolution::NotFound,
            }),
        );
        assert!(retry.is_ok());
    }
}
