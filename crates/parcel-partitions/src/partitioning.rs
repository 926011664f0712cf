//! A single- or multi-dimensional partitioning, as attached to an asset.

use std::sync::Arc;

use crate::context::PartitionLoadingContext;
use crate::dimension::PartitionsDefinition;
use crate::error::{Error, Result};
use crate::multi::MultiPartitionsDefinition;
use crate::time_window::{TimeWindow, TimeWindowPartitions};

/// How an asset is partitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partitioning {
    /// One dimension.
    Single(PartitionsDefinition),
    /// Several named dimensions.
    Multi(Arc<MultiPartitionsDefinition>),
}

impl Partitioning {
    /// All partition keys as strings, in enumeration order.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors.
    pub fn partition_keys(&self, ctx: &PartitionLoadingContext<'_>) -> Result<Vec<String>> {
        match self {
            Self::Single(def) => def.partition_keys(ctx),
            Self::Multi(def) => Ok(def
                .partition_keys(ctx)?
                .into_iter()
                .map(String::from)
                .collect()),
        }
    }

    /// Number of partitions.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors.
    pub fn num_partitions(&self, ctx: &PartitionLoadingContext<'_>) -> Result<usize> {
        match self {
            Self::Single(def) => def.num_partitions(ctx),
            Self::Multi(def) => def.num_partitions(ctx),
        }
    }

    /// Returns true if `key` is a current member. Never errors.
    #[must_use]
    pub fn has_partition_key(&self, key: &str, ctx: &PartitionLoadingContext<'_>) -> bool {
        match self {
            Self::Single(def) => def.has_partition_key(key, ctx),
            Self::Multi(def) => def.has_partition_key(key, ctx),
        }
    }

    /// The time-window series of a single-dimension time partitioning.
    #[must_use]
    pub fn as_time_window(&self) -> Option<&TimeWindowPartitions> {
        match self {
            Self::Single(def) => def.as_time_window(),
            Self::Multi(_) => None,
        }
    }

    /// The multi-dimensional definition, if any.
    #[must_use]
    pub fn as_multi(&self) -> Option<&MultiPartitionsDefinition> {
        match self {
            Self::Single(_) => None,
            Self::Multi(def) => Some(def),
        }
    }

    /// Returns true if any dimension is a time-window series.
    #[must_use]
    pub fn is_time_partitioned(&self) -> bool {
        match self {
            Self::Single(def) => def.as_time_window().is_some(),
            Self::Multi(def) => def.time_dimension().is_some(),
        }
    }

    /// Time window covered by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the partitioning has no time dimension.
    pub fn time_window_for_key(&self, key: &str) -> Result<TimeWindow> {
        match self {
            Self::Single(PartitionsDefinition::TimeWindow(series)) => series.time_window_for_key(key),
            Self::Single(_) => Err(Error::usage("expected a single time dimension")),
            Self::Multi(def) => def.time_window_for_key(key),
        }
    }
}

impl From<PartitionsDefinition> for Partitioning {
    fn from(def: PartitionsDefinition) -> Self {
        Self::Single(def)
    }
}

impl From<TimeWindowPartitions> for Partitioning {
    fn from(series: TimeWindowPartitions) -> Self {
        Self::Single(PartitionsDefinition::TimeWindow(series))
    }
}

impl From<MultiPartitionsDefinition> for Partitioning {
    fn from(def: MultiPartitionsDefinition) -> Self {
        Self::Multi(Arc::new(def))
    }
}
