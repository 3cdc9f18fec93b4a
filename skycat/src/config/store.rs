//! Store configuration.

use super::defaults::DEFAULT_SHRINK_THRESHOLD;
use super::ConfigError;
use crate::store::DatasetMode;
use std::path::PathBuf;

/// Configuration for the on-disk snapshot stores.
///
/// The data directory holds the enriched snapshot for the selected
/// dataset mode, the raw-table family under `raw/`, and their backup
/// files.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    data_dir: PathBuf,
    dataset_mode: DatasetMode,
    shrink_threshold: f64,
}

impl StoreConfig {
    /// Configuration with the platform data directory and defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory holding all snapshot families.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Select which enriched dataset the cache store persists.
    pub fn with_dataset_mode(mut self, mode: DatasetMode) -> Self {
        self.dataset_mode = mode;
        self
    }

    /// Set the shrink guard fraction.
    pub fn with_shrink_threshold(mut self, threshold: f64) -> Self {
        self.shrink_threshold = threshold;
        self
    }

    /// Directory holding all snapshot families.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Directory of the raw-table family.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Selected enriched dataset mode.
    pub fn dataset_mode(&self) -> DatasetMode {
        self.dataset_mode
    }

    /// Shrink guard fraction.
    pub fn shrink_threshold(&self) -> f64 {
        self.shrink_threshold
    }

    /// Reject invalid values before any store is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.shrink_threshold.is_finite()
            || self.shrink_threshold <= 0.0
            || self.shrink_threshold > 1.0
        {
            return Err(ConfigError::InvalidShrinkThreshold(self.shrink_threshold));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycat");
        Self {
            data_dir,
            dataset_mode: DatasetMode::Distance,
            shrink_threshold: DEFAULT_SHRINK_THRESHOLD,
        }
    }
}
