//! Query orchestration: batched, rate-limited enrichment sessions.
//!
//! A session drains the coordinator's must-query partition in batches.
//! Within a batch, lookups run concurrently up to the configured
//! parallelism, each gated by the rate limiter and an independent
//! timeout. Every batch is persisted (backup, then merge) before the
//! next one starts querying, bounding data loss on an interrupted run
//! to at most one batch.
//!
//! # Session states
//!
//! ```text
//! Idle → Planning → Batching → AwaitingRateToken → Querying
//!      → Retrying (per identifier, up to max_retries)
//!      → Persisting (after each batch) → Done
//! ```
//!
//! A per-identifier terminal failure never aborts the session; only
//! storage-layer errors do.

use crate::catalog::{Identifier, PropertyRecord, Provenance};
use crate::config::{ConfigError, QueryConfig, MAX_RETRY_BACKOFF};
use crate::query::coordinator::{CacheCoordinator, EnrichmentPolicy};
use crate::query::resolver::{LocalCatalog, RemoteResolver, Resolution};
use crate::query::stats::{QueryStats, Summary};
use crate::ratelimit::RateLimiter;
use crate::store::{CacheStore, MergeMode, RawCatalogStore, StoreError};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Errors that abort an enrichment session.
///
/// Per-identifier lookup failures are absorbed into the result map and
/// never appear here.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Configuration rejected before any work was performed.
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    /// Storage-layer failure; durable data can no longer be trusted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one enrichment session.
#[derive(Debug)]
pub struct QueryOutcome {
    /// One record per requested identifier (deduplicated). Identifiers
    /// that terminally failed carry empty placeholder records.
    pub records: BTreeMap<Identifier, PropertyRecord>,
    /// Session statistics.
    pub summary: Summary,
    /// Whether the session stopped early at a cancellation checkpoint.
    /// Already-persisted batches are kept.
    pub cancelled: bool,
}

/// Phase of an enrichment session, for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Planning,
    Batching,
    AwaitingRateToken,
    Querying,
    Retrying,
    Persisting,
    Done,
    FailedTerminal,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Planning => "planning",
            SessionState::Batching => "batching",
            SessionState::AwaitingRateToken => "awaiting_rate_token",
            SessionState::Querying => "querying",
            SessionState::Retrying => "retrying",
            SessionState::Persisting => "persisting",
            SessionState::Done => "done",
            SessionState::FailedTerminal => "failed_terminal",
        };
        f.write_str(name)
    }
}

/// Transient per-run state. Owned by exactly one orchestration run and
/// discarded when it finishes; only the summary outlives it.
struct QuerySession {
    stats: Arc<QueryStats>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl QuerySession {
    fn new(config: &QueryConfig, cancel: CancellationToken) -> Self {
        debug!(state = %SessionState::Idle, "session created");
        Self {
            stats: Arc::new(QueryStats::new(config.max_error_log())),
            limiter: Arc::new(RateLimiter::new(
                config.queries_per_second(),
                config.burst(),
            )),
            cancel,
        }
    }
}

/// Top-level enrichment service for one pair of stores.
///
/// Stores are passed in by reference and never owned: their lifecycle
/// (open, validate, close) belongs to the caller.
///
/// # Example
///
/// ```ignore
/// use skycat::query::{EnrichmentPolicy, QueryOrchestrator};
/// use tokio_util::sync::CancellationToken;
///
/// let orchestrator = QueryOrchestrator::new(&cache, &raw, resolver, config);
/// let outcome = orchestrator
///     .enrich(&ids, &EnrichmentPolicy::new(), CancellationToken::new())
///     .await?;
/// ```
pub struct QueryOrchestrator<'a> {
    cache: &'a CacheStore,
    raw: &'a RawCatalogStore,
    local: Option<&'a dyn LocalCatalog>,
    resolver: Arc<dyn RemoteResolver>,
    config: QueryConfig,
}

impl<'a> QueryOrchestrator<'a> {
    /// Create an orchestrator over the given stores and resolver.
    pub fn new(
        cache: &'a CacheStore,
        raw: &'a RawCatalogStore,
        resolver: Arc<dyn RemoteResolver>,
        config: QueryConfig,
    ) -> Self {
        Self {
            cache,
            raw,
            local: None,
            resolver,
            config,
        }
    }

    /// Attach a local catalog capability consulted before remote queries.
    pub fn with_local_catalog(mut self, local: &'a dyn LocalCatalog) -> Self {
        self.local = Some(local);
        self
    }

    /// Run one enrichment session.
    ///
    /// Returns a record for every requested identifier together with the
    /// session summary. Cancellation is cooperative: between batches the
    /// session stops cleanly; mid-batch, in-flight lookups finish but no
    /// new rate tokens are requested.
    pub async fn enrich(
        &self,
        requested: &[Identifier],
        policy: &EnrichmentPolicy,
        cancel: CancellationToken,
    ) -> Result<QueryOutcome, EnrichError> {
        self.config.validate()?;
        let session = QuerySession::new(&self.config, cancel);

        debug!(state = %SessionState::Planning, requested = requested.len(), "planning session");
        let mut coordinator = CacheCoordinator::new(self.cache, self.raw);
        if let Some(local) = self.local {
            coordinator = coordinator.with_local_catalog(local);
        }
        let plan = coordinator.plan(requested, policy)?;

        for id in plan.satisfied.keys() {
            trace!(id = %id, "cache hit");
            session.stats.log_cache_hit();
        }
        let mut records = plan.satisfied;

        // Locally derived records are persisted up front so the next run
        // finds them in the satisfied partition.
        if !plan.derivable.is_empty() {
            debug!(
                state = %SessionState::Persisting,
                records = plan.derivable.len(),
                "persisting locally derived records"
            );
            self.cache.backup();
            self.cache.merge(&plan.derivable, MergeMode::Incremental)?;
            records.extend(plan.derivable);
        }

        let merge_mode = if policy.force_refresh() {
            MergeMode::Refresh
        } else {
            MergeMode::Incremental
        };

        debug!(
            state = %SessionState::Batching,
            pending = plan.must_query.len(),
            batch_size = self.config.batch_size(),
            "draining must-query partition"
        );
        let mut cancelled = false;
        for (index, batch) in plan.must_query.chunks(self.config.batch_size()).enumerate() {
            if session.cancel.is_cancelled() {
                info!(batches_done = index, "session cancelled at batch checkpoint");
                cancelled = true;
                break;
            }

            let fetched = self.run_batch(batch, &session).await;
            cancelled = session.cancel.is_cancelled();

            debug!(
                state = %SessionState::Persisting,
                batch = index,
                records = fetched.len(),
                "persisting batch"
            );
            self.cache.backup();
            self.cache.merge(&fetched, merge_mode)?;
            records.extend(fetched);
        }

        // The caller always receives a complete map: identifiers never
        // attempted (cancellation) get unpersisted placeholders.
        for id in requested {
            if !records.contains_key(id) {
                records.insert(id.clone(), PropertyRecord::terminal());
            }
        }

        let summary = session.stats.summary();
        let limiter_stats = session.limiter.stats();
        info!(
            state = %SessionState::Done,
            successes = summary.success_count,
            failures = summary.failure_count,
            retries = summary.retry_count,
            cache_hits = summary.cache_hit_count,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            effective_rate = format!("{:.2}", limiter_stats.effective_rate),
            cancelled = cancelled,
            "enrichment session complete"
        );
        Ok(QueryOutcome {
            records,
            summary,
            cancelled,
        })
    }

    /// Run the lookups of one batch with bounded parallelism.
    async fn run_batch(
        &self,
        batch: &[Identifier],
        session: &QuerySession,
    ) -> BTreeMap<Identifier, PropertyRecord> {
        let pending: Arc<DashMap<Identifier, PropertyRecord>> = Arc::new(DashMap::new());
        let gate = Arc::new(Semaphore::new(self.config.parallelism()));
        let mut tasks = JoinSet::new();

        for id in batch {
            let id = id.clone();
            let gate = Arc::clone(&gate);
            let pending = Arc::clone(&pending);
            let resolver = Arc::clone(&self.resolver);
            let stats = Arc::clone(&session.stats);
            let limiter = Arc::clone(&session.limiter);
            let cancel = session.cancel.clone();
            let timeout = self.config.timeout();
            let max_retries = self.config.max_retries();
            let retry_delay = self.config.retry_delay();

            tasks.spawn(async move {
                let _permit = gate.acquire_owned().await.expect("semaphore closed");

                // Mid-batch cancellation: in-flight lookups finish, but no
                // new rate tokens are requested.
                if cancel.is_cancelled() {
                    return;
                }
                let waited = limiter.acquire().await;
                if !waited.is_zero() {
                    trace!(
                        state = %SessionState::AwaitingRateToken,
                        id = %id,
                        waited_ms = waited.as_millis() as u64,
                        "rate token acquired"
                    );
                }

                let record = lookup_with_retries(
                    resolver.as_ref(),
                    &id,
                    timeout,
                    max_retries,
                    retry_delay,
                    &stats,
                )
                .await;
                pending.insert(id, record);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "lookup task failed to join");
            }
        }

        match Arc::try_unwrap(pending) {
            Ok(map) => map.into_iter().collect(),
            Err(arc) => arc
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

/// Resolve one identifier, retrying transient failures with exponential
/// backoff. Always returns a record: a successful resolution, or a
/// terminal placeholder after not-found or exhausted retries.
async fn lookup_with_retries(
    resolver: &dyn RemoteResolver,
    id: &Identifier,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    stats: &QueryStats,
) -> PropertyRecord {
    let mut attempt: u32 = 0;
    loop {
        trace!(state = %SessionState::Querying, id = %id, attempt = attempt, "issuing lookup");
        let outcome = match tokio::time::timeout(timeout, resolver.resolve(id)).await {
            Ok(resolution) => resolution,
            Err(_) => Resolution::Transient(format!("lookup timed out after {:?}", timeout)),
        };

        match outcome {
            Resolution::Found(resolved) => {
                stats.log_success();
                return PropertyRecord::from_fields(
                    resolved,
                    Provenance::Remote {
                        source: resolver.source_name().to_string(),
                    },
                );
            }
            Resolution::NotFound => {
                // Authoritative miss: terminal immediately, no retry.
                debug!(state = %SessionState::FailedTerminal, id = %id, "identifier not found");
                stats.log_failure(id, "not found in remote catalog");
                return PropertyRecord::terminal();
            }
            Resolution::Transient(cause) => {
                if attempt < max_retries {
                    attempt += 1;
                    stats.log_retry();
                    let delay = backoff_delay(retry_delay, attempt);
                    debug!(
                        state = %SessionState::Retrying,
                        id = %id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        cause = %cause,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    warn!(
                        state = %SessionState::FailedTerminal,
                        id = %id,
                        attempts = attempt + 1,
                        cause = %cause,
                        "retries exhausted"
                    );
                    stats.log_failure(id, &cause);
                    return PropertyRecord::terminal();
                }
            }
        }
    }
}

/// Exponential backoff: `base × 2^(attempt-1)`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = (attempt.saturating_sub(1)).min(16);
    base.saturating_mul(1u32 << shift).min(MAX_RETRY_BACKOFF)
}
