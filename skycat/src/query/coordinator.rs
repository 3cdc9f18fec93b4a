//! Cache-aware query planning.
//!
//! The coordinator decides, for a requested identifier set, what is
//! already satisfied by the enriched cache, what can be derived locally
//! without a remote query, and what must actually be fetched. This
//! partitioning is what makes repeated runs fast: session cost is
//! proportional to the must-query partition, not the request size.

use crate::catalog::{fields, Identifier, PropertyRecord};
use crate::query::resolver::LocalCatalog;
use crate::store::{CacheStore, RawCatalogStore, StoreError};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Enrichment policy for one request.
///
/// # Example
///
/// ```
/// use skycat::query::EnrichmentPolicy;
/// use std::time::Duration;
///
/// let policy = EnrichmentPolicy::new()
///     .with_max_age(Duration::from_secs(30 * 24 * 3600))
///     .with_minimum_field_set(vec!["ra_deg".into(), "dec_deg".into()]);
/// assert!(!policy.force_refresh());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentPolicy {
    force_refresh: bool,
    max_age: Option<Duration>,
    minimum_field_set: Vec<String>,
}

impl EnrichmentPolicy {
    /// Policy with defaults: no forced refresh, no age limit, and a
    /// minimum field set of position plus magnitude.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore all cached and derivable data; every identifier is
    /// re-queried and freshly-fetched records replace stored ones.
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Treat records older than `max_age` as unsatisfied regardless of
    /// completeness.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Fields a record must carry (non-empty) to count as satisfied.
    pub fn with_minimum_field_set(mut self, required: Vec<String>) -> Self {
        self.minimum_field_set = required;
        self
    }

    /// Whether cached data is bypassed entirely.
    pub fn force_refresh(&self) -> bool {
        self.force_refresh
    }

    /// Maximum acceptable record age, if any.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Required fields for a record to count as satisfied.
    pub fn minimum_field_set(&self) -> &[String] {
        &self.minimum_field_set
    }

    fn is_fresh(&self, record: &PropertyRecord, now: chrono::DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => match chrono::Duration::from_std(max_age) {
                Ok(limit) => record.age(now) <= limit,
                Err(_) => true,
            },
            None => true,
        }
    }

    /// Whether a cached record satisfies this policy.
    ///
    /// Terminal records count as satisfied while fresh: the identifier is
    /// resolved-but-unavailable, not unresolved, so it is not re-queried
    /// on every run.
    pub fn satisfied_by(&self, record: &PropertyRecord, now: chrono::DateTime<Utc>) -> bool {
        if !self.is_fresh(record, now) {
            return false;
        }
        record.is_terminal() || record.covers(&self.minimum_field_set)
    }
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            force_refresh: false,
            max_age: None,
            minimum_field_set: vec![
                fields::RA_DEG.to_string(),
                fields::DEC_DEG.to_string(),
                fields::VMAG.to_string(),
            ],
        }
    }
}

/// Partitioned plan for one request.
#[derive(Debug, Default)]
pub struct QueryPlan {
    /// Already satisfied by the enriched cache.
    pub satisfied: BTreeMap<Identifier, PropertyRecord>,
    /// Resolvable locally (bundled catalog or raw table) at no rate cost.
    pub derivable: BTreeMap<Identifier, PropertyRecord>,
    /// Must be fetched from the remote service, in request order.
    pub must_query: Vec<Identifier>,
}

/// Partitions requested identifiers against the two stores and an
/// optional local catalog. Holds no persistent state of its own.
pub struct CacheCoordinator<'a> {
    cache: &'a CacheStore,
    raw: &'a RawCatalogStore,
    local: Option<&'a dyn LocalCatalog>,
}

impl<'a> CacheCoordinator<'a> {
    /// Create a coordinator over the given stores.
    pub fn new(cache: &'a CacheStore, raw: &'a RawCatalogStore) -> Self {
        Self {
            cache,
            raw,
            local: None,
        }
    }

    /// Attach a local catalog capability.
    pub fn with_local_catalog(mut self, local: &'a dyn LocalCatalog) -> Self {
        self.local = Some(local);
        self
    }

    /// Partition `requested` into satisfied / derivable / must-query.
    ///
    /// Duplicates collapse to one entry. A corrupt enriched snapshot is
    /// treated as empty (rebuild path); raw tables are consulted only
    /// when the derived minimal record would meet the policy's minimum
    /// field set.
    pub fn plan(
        &self,
        requested: &[Identifier],
        policy: &EnrichmentPolicy,
    ) -> Result<QueryPlan, StoreError> {
        let now = Utc::now();
        let cached = self.cache.load_or_rebuild()?;

        let mut raw_tables: Vec<(String, BTreeMap<Identifier, crate::catalog::RawCatalogRow>)> =
            Vec::new();
        if !policy.force_refresh() {
            for source in self.raw.sources()? {
                let rows = self.raw.load_table_or_rebuild(&source)?;
                let table = rows.into_iter().map(|row| (row.id.clone(), row)).collect();
                raw_tables.push((source, table));
            }
        }

        let mut plan = QueryPlan::default();
        let mut seen: HashSet<&Identifier> = HashSet::new();

        for id in requested {
            if !seen.insert(id) {
                continue;
            }
            if policy.force_refresh() {
                plan.must_query.push(id.clone());
                continue;
            }

            if let Some(record) = cached.get(id) {
                if policy.satisfied_by(record, now) {
                    trace!(id = %id, "satisfied from cache");
                    plan.satisfied.insert(id.clone(), record.clone());
                    continue;
                }
            }

            // Local catalog beats a remote query: no rate cost.
            if let Some(local) = self.local {
                if let Some(resolved) = local.lookup(id) {
                    let record = PropertyRecord::from_fields(
                        resolved,
                        crate::catalog::Provenance::LocalCatalog,
                    );
                    if record.covers(policy.minimum_field_set()) {
                        trace!(id = %id, catalog = local.name(), "derivable from local catalog");
                        plan.derivable.insert(id.clone(), record);
                        continue;
                    }
                }
            }

            if let Some(record) = self.derive_from_raw(id, policy, &raw_tables) {
                plan.derivable.insert(id.clone(), record);
                continue;
            }

            plan.must_query.push(id.clone());
        }

        debug!(
            requested = requested.len(),
            satisfied = plan.satisfied.len(),
            derivable = plan.derivable.len(),
            must_query = plan.must_query.len(),
            "request partitioned"
        );
        Ok(plan)
    }

    fn derive_from_raw(
        &self,
        id: &Identifier,
        policy: &EnrichmentPolicy,
        raw_tables: &[(String, BTreeMap<Identifier, crate::catalog::RawCatalogRow>)],
    ) -> Option<PropertyRecord> {
        for (source, table) in raw_tables {
            if let Some(row) = table.get(id) {
                let record = row.to_minimal_record(source);
                if record.covers(policy.minimum_field_set()) {
                    trace!(id = %id, source = %source, "derivable from raw table");
                    return Some(record);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Provenance, RawCatalogRow};
    use crate::query::resolver::BundledCatalog;
    use crate::store::{DatasetMode, MergeMode};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: CacheStore,
        raw: RawCatalogStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::open_mode(dir.path(), DatasetMode::Distance, 0.95).unwrap();
        let raw = RawCatalogStore::open(dir.path().join("raw"), 0.95).unwrap();
        Fixture {
            _dir: dir,
            cache,
            raw,
        }
    }

    fn complete_record() -> PropertyRecord {
        PropertyRecord::new(Provenance::Remote {
            source: "simbad".to_string(),
        })
        .with_field(fields::RA_DEG, 10.0)
        .with_field(fields::DEC_DEG, 20.0)
        .with_field(fields::VMAG, 5.0)
    }

    fn ids(names: &[&str]) -> Vec<Identifier> {
        names.iter().map(|n| Identifier::new(*n)).collect()
    }

    #[test]
    fn test_empty_cache_sends_everything_to_must_query() {
        let fx = fixture();
        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HD 1", "HD 2"]), &EnrichmentPolicy::new())
            .unwrap();

        assert!(plan.satisfied.is_empty());
        assert!(plan.derivable.is_empty());
        assert_eq!(plan.must_query, ids(&["HD 1", "HD 2"]));
    }

    #[test]
    fn test_duplicates_collapse_to_one_query() {
        let fx = fixture();
        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HD 1", "HD 1", "HD 1"]), &EnrichmentPolicy::new())
            .unwrap();
        assert_eq!(plan.must_query, ids(&["HD 1"]));
    }

    #[test]
    fn test_complete_cached_record_is_satisfied() {
        let fx = fixture();
        let seeded = BTreeMap::from([(Identifier::new("HD 1"), complete_record())]);
        fx.cache.merge(&seeded, MergeMode::Incremental).unwrap();

        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HD 1", "HD 2"]), &EnrichmentPolicy::new())
            .unwrap();

        assert!(plan.satisfied.contains_key(&Identifier::new("HD 1")));
        assert_eq!(plan.must_query, ids(&["HD 2"]));
    }

    #[test]
    fn test_incomplete_record_is_requeried() {
        let fx = fixture();
        let partial = PropertyRecord::new(Provenance::Remote {
            source: "simbad".to_string(),
        })
        .with_field(fields::RA_DEG, 10.0);
        let seeded = BTreeMap::from([(Identifier::new("HD 1"), partial)]);
        fx.cache.merge(&seeded, MergeMode::Incremental).unwrap();

        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HD 1"]), &EnrichmentPolicy::new())
            .unwrap();
        assert_eq!(plan.must_query, ids(&["HD 1"]));
    }

    #[test]
    fn test_terminal_record_counts_as_satisfied() {
        let fx = fixture();
        let seeded = BTreeMap::from([(Identifier::new("HD 1"), PropertyRecord::terminal())]);
        fx.cache.merge(&seeded, MergeMode::Incremental).unwrap();

        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HD 1"]), &EnrichmentPolicy::new())
            .unwrap();
        assert!(plan.satisfied.contains_key(&Identifier::new("HD 1")));
        assert!(plan.must_query.is_empty());
    }

    #[test]
    fn test_stale_record_is_requeried() {
        let fx = fixture();
        let mut old = complete_record();
        old.updated_at = Utc::now() - chrono::Duration::days(90);
        let seeded = BTreeMap::from([(Identifier::new("HD 1"), old)]);
        fx.cache.merge(&seeded, MergeMode::Incremental).unwrap();

        let policy = EnrichmentPolicy::new().with_max_age(Duration::from_secs(24 * 3600));
        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator.plan(&ids(&["HD 1"]), &policy).unwrap();
        assert_eq!(plan.must_query, ids(&["HD 1"]));
    }

    #[test]
    fn test_force_refresh_bypasses_cache_and_local() {
        let fx = fixture();
        let seeded = BTreeMap::from([(Identifier::new("HD 48915"), complete_record())]);
        fx.cache.merge(&seeded, MergeMode::Incremental).unwrap();

        let local = BundledCatalog;
        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw).with_local_catalog(&local);
        let policy = EnrichmentPolicy::new().with_force_refresh(true);
        let plan = coordinator.plan(&ids(&["HD 48915"]), &policy).unwrap();
        assert_eq!(plan.must_query, ids(&["HD 48915"]));
    }

    #[test]
    fn test_local_catalog_takes_precedence_over_remote() {
        let fx = fixture();
        let local = BundledCatalog;
        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw).with_local_catalog(&local);
        let plan = coordinator
            .plan(&ids(&["HD 48915", "HD 2"]), &EnrichmentPolicy::new())
            .unwrap();

        let sirius = &plan.derivable[&Identifier::new("HD 48915")];
        assert_eq!(sirius.provenance, Provenance::LocalCatalog);
        assert_eq!(plan.must_query, ids(&["HD 2"]));
    }

    #[test]
    fn test_raw_table_derivation_honors_minimum_fields() {
        let fx = fixture();
        fx.raw
            .merge_table(
                "hipparcos",
                &[
                    RawCatalogRow {
                        id: Identifier::new("HIP 1"),
                        ra_deg: 1.0,
                        dec_deg: 2.0,
                        vmag: Some(9.0),
                        parallax_mas: None,
                        spectral_type: None,
                    },
                    RawCatalogRow {
                        id: Identifier::new("HIP 2"),
                        ra_deg: 3.0,
                        dec_deg: 4.0,
                        vmag: None,
                        parallax_mas: None,
                        spectral_type: None,
                    },
                ],
            )
            .unwrap();

        let coordinator = CacheCoordinator::new(&fx.cache, &fx.raw);
        let plan = coordinator
            .plan(&ids(&["HIP 1", "HIP 2"]), &EnrichmentPolicy::new())
            .unwrap();

        // HIP 1 has ra/dec/vmag in the raw row; HIP 2 lacks vmag.
        let derived = &plan.derivable[&Identifier::new("HIP 1")];
        assert_eq!(
            derived.provenance,
            Provenance::RawDerived {
                source: "hipparcos".to_string()
            }
        );
        assert_eq!(plan.must_query, ids(&["HIP 2"]));
    }
}
