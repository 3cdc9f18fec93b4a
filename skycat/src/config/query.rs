//! Query/orchestration configuration.

use super::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_BURST, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_MAX_ERROR_LOG,
    DEFAULT_MAX_RETRIES, DEFAULT_PARALLELISM, DEFAULT_QUERIES_PER_SECOND, DEFAULT_RETRY_DELAY,
};
use super::ConfigError;
use std::time::Duration;

/// Configuration for one orchestration session.
///
/// # Example
///
/// ```
/// use skycat::config::QueryConfig;
/// use std::time::Duration;
///
/// let config = QueryConfig::new()
///     .with_queries_per_second(2.0)
///     .with_batch_size(10)
///     .with_max_retries(5)
///     .with_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    queries_per_second: f64,
    burst: u32,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    parallelism: usize,
    max_error_log: usize,
}

impl QueryConfig {
    /// Configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outbound query rate in tokens/second.
    pub fn with_queries_per_second(mut self, rate: f64) -> Self {
        self.queries_per_second = rate;
        self
    }

    /// Set the token-bucket burst capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Set the number of identifiers per persisted batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set retry attempts per identifier after the first failure.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base retry delay; backoff doubles it per attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-lookup timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set concurrent lookups within one batch.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the cap on retained failure-log entries.
    pub fn with_max_error_log(mut self, cap: usize) -> Self {
        self.max_error_log = cap;
        self
    }

    /// Outbound query rate in tokens/second.
    pub fn queries_per_second(&self) -> f64 {
        self.queries_per_second
    }

    /// Token-bucket burst capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Identifiers per persisted batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Retry attempts per identifier after the first failure.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Base retry delay.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Per-lookup timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Concurrent lookups within one batch.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Cap on retained failure-log entries.
    pub fn max_error_log(&self) -> usize {
        self.max_error_log
    }

    /// Reject invalid values before a session performs any work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.queries_per_second.is_finite() || self.queries_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate(self.queries_per_second));
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidParallelism);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            queries_per_second: DEFAULT_QUERIES_PER_SECOND,
            burst: DEFAULT_BURST,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            parallelism: DEFAULT_PARALLELISM,
            max_error_log: DEFAULT_MAX_ERROR_LOG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = QueryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queries_per_second(), DEFAULT_QUERIES_PER_SECOND);
        assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(config.max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_builder_chain() {
        let config = QueryConfig::new()
            .with_queries_per_second(2.5)
            .with_burst(4)
            .with_batch_size(10)
            .with_max_retries(1)
            .with_retry_delay(Duration::from_millis(50))
            .with_timeout(Duration::from_secs(5))
            .with_parallelism(8)
            .with_max_error_log(16);

        assert_eq!(config.queries_per_second(), 2.5);
        assert_eq!(config.burst(), 4);
        assert_eq!(config.batch_size(), 10);
        assert_eq!(config.max_retries(), 1);
        assert_eq!(config.retry_delay(), Duration::from_millis(50));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.parallelism(), 8);
        assert_eq!(config.max_error_log(), 16);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            QueryConfig::new().with_queries_per_second(0.0).validate(),
            Err(ConfigError::InvalidRate(0.0))
        );
        assert!(matches!(
            QueryConfig::new()
                .with_queries_per_second(f64::NAN)
                .validate(),
            Err(ConfigError::InvalidRate(_))
        ));
        assert_eq!(
            QueryConfig::new().with_burst(0).validate(),
            Err(ConfigError::InvalidBurst)
        );
        assert_eq!(
            QueryConfig::new().with_batch_size(0).validate(),
            Err(ConfigError::InvalidBatchSize)
        );
        assert_eq!(
            QueryConfig::new().with_parallelism(0).validate(),
            Err(ConfigError::InvalidParallelism)
        );
        assert_eq!(
            QueryConfig::new().with_timeout(Duration::ZERO).validate(),
            Err(ConfigError::InvalidTimeout)
        );
    }

    #[test]
    fn test_zero_retries_is_valid() {
        // Retries are optional; zero means one attempt only.
        assert!(QueryConfig::new().with_max_retries(0).validate().is_ok());
    }
}
