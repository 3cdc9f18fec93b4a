//! Default configuration values.
//!
//! All of these are operator-tunable; the defaults are conservative
//! enough for public astronomical lookup services.

use std::time::Duration;

/// Default outbound query rate.
pub const DEFAULT_QUERIES_PER_SECOND: f64 = 5.0;

/// Default token-bucket burst capacity.
pub const DEFAULT_BURST: u32 = 1;

/// Default identifiers per batch.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default retry attempts per identifier after the first failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay before the first retry; doubles per attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for exponential backoff between retries.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Default per-lookup timeout.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Default concurrent lookups within one batch.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Default shrink guard: a write may not drop the record count below
/// this fraction of the prior snapshot's count.
pub const DEFAULT_SHRINK_THRESHOLD: f64 = 0.95;

/// Default cap on retained terminal-failure log entries per session.
pub const DEFAULT_MAX_ERROR_LOG: usize = 1000;
