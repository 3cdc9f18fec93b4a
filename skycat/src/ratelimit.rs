//! Token-bucket rate limiting for outbound catalog queries.
//!
//! Remote lookup services throttle aggressive clients, so every remote
//! query passes through a [`RateLimiter`] before it is issued. The limiter
//! cannot fail, only delay: a call either consumes a token immediately or
//! blocks until the bucket refills.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

/// Token bucket with capacity `C` and refill rate `R` tokens/second.
///
/// Token issuance is serialized through an async mutex, so concurrent
/// callers queue fairly and the observed outbound rate never exceeds the
/// configured rate regardless of parallelism.
///
/// # Example
///
/// ```ignore
/// use skycat::ratelimit::RateLimiter;
///
/// let limiter = RateLimiter::new(5.0, 1);
/// let waited = limiter.acquire().await;
/// // issue the remote lookup...
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    tokens_issued: AtomicU64,
    total_wait_micros: AtomicU64,
    started: Instant,
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// Point-in-time view of limiter activity.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    /// Tokens issued since construction.
    pub tokens_issued: u64,
    /// Total time callers spent blocked waiting for tokens.
    pub total_wait: Duration,
    /// Observed issue rate in tokens/second since construction.
    pub effective_rate: f64,
}

impl RateLimiter {
    /// Create a limiter issuing `queries_per_second` tokens with burst
    /// capacity `burst`. The bucket starts full.
    ///
    /// # Panics
    ///
    /// Panics if `queries_per_second` is not finite and positive, or if
    /// `burst` is 0. Configuration validation rejects these values before
    /// a session starts; the assertions guard direct construction.
    pub fn new(queries_per_second: f64, burst: u32) -> Self {
        assert!(
            queries_per_second.is_finite() && queries_per_second > 0.0,
            "queries_per_second must be positive"
        );
        assert!(burst > 0, "burst must be > 0");

        Self {
            bucket: Mutex::new(Bucket {
                capacity: f64::from(burst),
                refill_per_sec: queries_per_second,
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
            tokens_issued: AtomicU64::new(0),
            total_wait_micros: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Take one token, blocking until it is available.
    ///
    /// Returns the actual time spent blocked (zero when a token was free).
    pub async fn acquire(&self) -> Duration {
        let requested = Instant::now();
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());

        // Sleeping while holding the lock serializes issuance: waiters
        // behind us cannot overdraw the bucket.
        while bucket.tokens + 1e-9 < 1.0 {
            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / bucket.refill_per_sec);
            trace!(?wait, "waiting for rate token");
            tokio::time::sleep(wait).await;
            bucket.refill(Instant::now());
        }
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
        drop(bucket);

        let waited = requested.elapsed();
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
        self.total_wait_micros
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
        waited
    }

    /// Current limiter statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let issued = self.tokens_issued.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        RateLimiterStats {
            tokens_issued: issued,
            total_wait: Duration::from_micros(self.total_wait_micros.load(Ordering::Relaxed)),
            effective_rate: if elapsed > 0.0 {
                issued as f64 / elapsed
            } else {
                0.0
            },
        }
    }
}
