//! Per-session query statistics.
//!
//! One [`QueryStats`] lives for the duration of a single orchestration
//! run and is safely updated from concurrent lookup tasks.

use crate::catalog::Identifier;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One terminal lookup failure retained for the session summary.
#[derive(Debug, Clone)]
pub struct FailureEntry {
    /// Identifier that could not be resolved.
    pub id: Identifier,
    /// Why the lookup terminally failed.
    pub cause: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

/// Session summary emitted at the end of an orchestration run.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Wall-clock duration of the session so far.
    pub elapsed: Duration,
    /// Identifiers resolved by a remote lookup.
    pub success_count: u64,
    /// Identifiers that terminally failed.
    pub failure_count: u64,
    /// Retry attempts across all identifiers.
    pub retry_count: u64,
    /// Identifiers satisfied from the cache without any lookup.
    pub cache_hit_count: u64,
    /// Terminal failures, oldest first, bounded by the configured cap.
    pub error_log: Vec<FailureEntry>,
}

/// Thread-safe, purely additive counters for one orchestration run.
///
/// The error log is bounded so a pathological run over a huge identifier
/// list cannot exhaust memory; when full, the oldest entries are evicted
/// first.
pub struct QueryStats {
    started: Instant,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    error_log: Mutex<VecDeque<FailureEntry>>,
    max_error_log: usize,
}

impl QueryStats {
    /// Create a stats tracker retaining at most `max_error_log` failures.
    pub fn new(max_error_log: usize) -> Self {
        Self {
            started: Instant::now(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            error_log: Mutex::new(VecDeque::new()),
            max_error_log,
        }
    }

    /// Record a successful remote resolution.
    pub fn log_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal failure and retain its cause.
    pub fn log_failure(&self, id: &Identifier, cause: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut log = self.error_log.lock().expect("error log poisoned");
        if log.len() >= self.max_error_log {
            log.pop_front();
        }
        log.push_back(FailureEntry {
            id: id.clone(),
            cause: cause.to_string(),
            at: Utc::now(),
        });
    }

    /// Record one retry attempt.
    pub fn log_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an identifier satisfied from cache.
    pub fn log_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the session summary.
    pub fn summary(&self) -> Summary {
        let error_log = self
            .error_log
            .lock()
            .expect("error log poisoned")
            .iter()
            .cloned()
            .collect();
        Summary {
            elapsed: self.started.elapsed(),
            success_count: self.successes.load(Ordering::Relaxed),
            failure_count: self.failures.load(Ordering::Relaxed),
            retry_count: self.retries.load(Ordering::Relaxed),
            cache_hit_count: self.cache_hits.load(Ordering::Relaxed),
            error_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_stats_are_zero() {
        let summary = QueryStats::new(10).summary();
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.failure_count, 0);
        assert_eq!(summary.retry_count, 0);
        assert_eq!(summary.cache_hit_count, 0);
        assert!(summary.error_log.is_empty());
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = QueryStats::new(10);
        stats.log_success();
        stats.log_success();
        stats.log_retry();
        stats.log_cache_hit();
        stats.log_failure(&Identifier::new("HD 1"), "timed out");

        let summary = stats.summary();
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.retry_count, 1);
        assert_eq!(summary.cache_hit_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.error_log.len(), 1);
        assert_eq!(summary.error_log[0].id, Identifier::new("HD 1"));
        assert_eq!(summary.error_log[0].cause, "timed out");
    }

    #[test]
    fn test_error_log_evicts_oldest_first() {
        let stats = QueryStats::new(3);
        for i in 0..5 {
            stats.log_failure(&Identifier::new(format!("HD {}", i)), "unreachable");
        }

        let summary = stats.summary();
        assert_eq!(summary.failure_count, 5);
        assert_eq!(summary.error_log.len(), 3);
        assert_eq!(summary.error_log[0].id, Identifier::new("HD 2"));
        assert_eq!(summary.error_log[2].id, Identifier::new("HD 4"));
    }

    #[test]
    fn test_thread_safety() {
        let stats = Arc::new(QueryStats::new(1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.log_success();
                    stats.log_retry();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.summary();
        assert_eq!(summary.success_count, 800);
        assert_eq!(summary.retry_count, 800);
    }

    #[test]
    fn test_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryStats>();
    }
}
