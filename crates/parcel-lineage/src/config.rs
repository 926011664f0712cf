//! Staleness resolution configuration.
//!
//! Dependency data-version comparisons are skipped above these thresholds to
//! bound the number of store lookups per status check. A skipped dependency
//! never makes an asset stale.

use parcel_core::config::env_usize;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Env var overriding [`StalenessConfig::dependency_partition_threshold`].
pub const DEPENDENCY_THRESHOLD_ENV: &str = "PARCEL_STALE_DEPENDENCY_THRESHOLD";
/// Env var overriding [`StalenessConfig::self_dependency_partition_threshold`].
pub const SELF_DEPENDENCY_THRESHOLD_ENV: &str = "PARCEL_STALE_SELF_DEPENDENCY_THRESHOLD";

const DEFAULT_DEPENDENCY_THRESHOLD: usize = 10_000;
const DEFAULT_SELF_DEPENDENCY_THRESHOLD: usize = 100;

/// Thresholds for skipping dependency comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// An upstream mapping to at least this many partitions is not compared.
    #[serde(default = "default_dependency_threshold")]
    pub dependency_partition_threshold: usize,
    /// A self-dependency of an asset with at least this many partitions is
    /// not compared.
    #[serde(default = "default_self_dependency_threshold")]
    pub self_dependency_partition_threshold: usize,
}

fn default_dependency_threshold() -> usize {
    DEFAULT_DEPENDENCY_THRESHOLD
}

fn default_self_dependency_threshold() -> usize {
    DEFAULT_SELF_DEPENDENCY_THRESHOLD
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            dependency_partition_threshold: DEFAULT_DEPENDENCY_THRESHOLD,
            self_dependency_partition_threshold: DEFAULT_SELF_DEPENDENCY_THRESHOLD,
        }
    }
}

impl StalenessConfig {
    /// Defaults overridden by `PARCEL_STALE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error naming the variable if a value is not a `usize`, or
    /// if the resulting config fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(threshold) = env_usize(DEPENDENCY_THRESHOLD_ENV)? {
            config.dependency_partition_threshold = threshold;
        }
        if let Some(threshold) = env_usize(SELF_DEPENDENCY_THRESHOLD_ENV)? {
            config.self_dependency_partition_threshold = threshold;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the dependency partition threshold.
    #[must_use]
    pub fn with_dependency_partition_threshold(mut self, threshold: usize) -> Self {
        self.dependency_partition_threshold = threshold;
        self
    }

    /// Sets the self-dependency partition threshold.
    #[must_use]
    pub fn with_self_dependency_partition_threshold(mut self, threshold: usize) -> Self {
        self.self_dependency_partition_threshold = threshold;
        self
    }

    /// Rejects zero thresholds, which would skip every comparison.
    ///
    /// # Errors
    ///
    /// Returns [`parcel_core::Error::InvalidInput`] naming the field.
    pub fn validate(&self) -> Result<()> {
        if self.dependency_partition_threshold == 0 {
            return Err(parcel_core::Error::InvalidInput(
                "dependency_partition_threshold must be greater than zero".into(),
            )
            .into());
        }
        if self.self_dependency_partition_threshold == 0 {
            return Err(parcel_core::Error::InvalidInput(
                "self_dependency_partition_threshold must be greater than zero".into(),
            )
            .into());
        }
        Ok(())
    }
}
