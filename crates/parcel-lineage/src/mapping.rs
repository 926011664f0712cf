//! Partition mappings between a downstream asset and one of its upstreams.
//!
//! A mapping answers: which upstream partitions does this downstream
//! partition read? Results are upstream partition keys in the upstream's
//! enumeration order, restricted to partitions that currently exist.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parcel_partitions::dimension::Dimension;
use parcel_partitions::time_window::TimeWindowPartitions;
use parcel_partitions::{MultiPartitionKey, PartitionLoadingContext, Partitioning};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How one dimension of a multi-partitioned downstream maps onto the
/// same-named dimension upstream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DimensionMapping {
    /// The same value.
    #[default]
    Identity,
    /// Windows shifted by offsets counted in downstream windows.
    TimeWindow {
        /// Offset applied to the window start.
        start_offset: i64,
        /// Offset applied to the window end.
        end_offset: i64,
    },
}

/// How downstream partitions map onto upstream partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PartitionMapping {
    /// The partition with the same key.
    Identity,
    /// Every upstream partition.
    All,
    /// Upstream windows overlapping the downstream window shifted by the
    /// offsets. `(-1, -1)` reads the previous window.
    TimeWindow {
        /// Offset applied to the window start.
        start_offset: i64,
        /// Offset applied to the window end.
        end_offset: i64,
    },
    /// An explicit downstream key to upstream keys table.
    Static {
        /// Upstream keys read by each downstream key.
        downstream_to_upstream: BTreeMap<String, BTreeSet<String>>,
    },
    /// Dimensions of a multi-partitioned downstream mapped independently
    /// onto a multi-partitioned upstream. Dimensions not listed use
    /// [`DimensionMapping::Identity`]; upstream dimensions the downstream
    /// lacks contribute all their keys.
    Multi {
        /// Per-dimension mappings keyed by dimension name.
        dimensions: BTreeMap<String, DimensionMapping>,
    },
}

impl PartitionMapping {
    /// The mapping used when an edge declares none.
    ///
    /// [`Self::Identity`] when both sides share one partition space,
    /// [`Self::TimeWindow`] with zero offsets between two different
    /// time-window series, and [`Self::All`] otherwise, including for an
    /// unpartitioned downstream.
    #[must_use]
    pub fn default_for(
        downstream: Option<&Partitioning>,
        upstream: Option<&Partitioning>,
    ) -> Self {
        let (Some(downstream), Some(upstream)) = (downstream, upstream) else {
            return Self::All;
        };
        if downstream == upstream {
            Self::Identity
        } else if downstream.as_time_window().is_some() && upstream.as_time_window().is_some() {
            Self::time_window(0, 0)
        } else {
            Self::All
        }
    }

    /// Shorthand for [`Self::TimeWindow`].
    #[must_use]
    pub fn time_window(start_offset: i64, end_offset: i64) -> Self {
        Self::TimeWindow {
            start_offset,
            end_offset,
        }
    }

    /// Builds a [`Self::Static`] mapping from `(downstream, upstream)` pairs.
    #[must_use]
    pub fn static_pairs<I, D, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (D, U)>,
        D: Into<String>,
        U: Into<String>,
    {
        let mut downstream_to_upstream: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (downstream, upstream) in pairs {
            downstream_to_upstream
                .entry(downstream.into())
                .or_default()
                .insert(upstream.into());
        }
        Self::Static {
            downstream_to_upstream,
        }
    }

    /// Returns true for [`Self::All`].
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Upstream partitions read by `downstream_partition`.
    ///
    /// With no downstream partition (an unpartitioned downstream, or the
    /// asset-level view of a partitioned one) every upstream partition is
    /// read.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the mapping does not fit the two partitionings
    /// (a time-window mapping between non-time-window assets, a multi mapping
    /// between single-dimension assets), and propagates key resolution errors.
    pub fn upstream_partitions(
        &self,
        downstream_partition: Option<&str>,
        downstream: Option<&Partitioning>,
        upstream: &Partitioning,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<String>> {
        let Some(partition) = downstream_partition else {
            return Ok(upstream.partition_keys(ctx)?);
        };
        match self {
            Self::All => Ok(upstream.partition_keys(ctx)?),
            Self::Identity => Ok(if upstream.has_partition_key(partition, ctx) {
                vec![partition.to_string()]
            } else {
                Vec::new()
            }),
            Self::TimeWindow {
                start_offset,
                end_offset,
            } => {
                let downstream_series = downstream
                    .and_then(Partitioning::as_time_window)
                    .ok_or_else(|| usage("time window mapping needs a time-partitioned downstream"))?;
                let upstream_series = upstream
                    .as_time_window()
                    .ok_or_else(|| usage("time window mapping needs a time-partitioned upstream"))?;
                shifted_windows(
                    partition,
                    downstream_series,
                    upstream_series,
                    *start_offset,
                    *end_offset,
                    ctx.effective_dt(),
                )
            }
            Self::Static {
                downstream_to_upstream,
            } => Ok(downstream_to_upstream
                .get(partition)
                .into_iter()
                .flatten()
                .filter(|key| upstream.has_partition_key(key, ctx))
                .cloned()
                .collect()),
            Self::Multi { dimensions } => {
                let downstream = downstream
                    .and_then(Partitioning::as_multi)
                    .ok_or_else(|| usage("multi mapping requires a multi-partitioned downstream"))?;
                let upstream = upstream
                    .as_multi()
                    .ok_or_else(|| usage("multi mapping requires a multi-partitioned upstream"))?;
                let key = downstream.parse_key(partition)?;

                let mut per_dimension = Vec::with_capacity(upstream.dimensions().len());
                for dimension in upstream.dimensions() {
                    let name = dimension.name();
                    let values = match (key.dimension_key(name), downstream.dimension(name)) {
                        (Some(value), Some(downstream_dimension)) => map_dimension(
                            dimensions.get(name).unwrap_or(&DimensionMapping::Identity),
                            value,
                            downstream_dimension,
                            dimension,
                            ctx,
                        )?,
                        _ => dimension.partitions().partition_keys(ctx)?,
                    };
                    per_dimension.push((name, values));
                }

                let mut combinations: Vec<Vec<(&str, &str)>> = vec![Vec::new()];
                for (name, values) in &per_dimension {
                    let mut next = Vec::with_capacity(combinations.len() * values.len());
                    for prefix in &combinations {
                        for value in values {
                            let mut combination = prefix.clone();
                            combination.push((*name, value.as_str()));
                            next.push(combination);
                        }
                    }
                    combinations = next;
                }
                Ok(combinations
                    .into_iter()
                    .map(|pairs| MultiPartitionKey::from_dimension_values(pairs).map(String::from))
                    .collect::<parcel_partitions::Result<Vec<_>>>()?)
            }
        }
    }
}

fn usage(message: impl Into<String>) -> parcel_partitions::Error {
    parcel_partitions::Error::usage(message)
}

fn map_dimension(
    mapping: &DimensionMapping,
    value: &str,
    downstream: &Dimension,
    upstream: &Dimension,
    ctx: &PartitionLoadingContext<'_>,
) -> Result<Vec<String>> {
    match mapping {
        DimensionMapping::Identity => Ok(if upstream.partitions().has_partition_key(value, ctx) {
            vec![value.to_string()]
        } else {
            Vec::new()
        }),
        DimensionMapping::TimeWindow {
            start_offset,
            end_offset,
        } => {
            let name = upstream.name();
            let downstream_series = downstream.partitions().as_time_window().ok_or_else(|| {
                usage(format!("dimension '{name}' is not time-partitioned downstream"))
            })?;
            let upstream_series = upstream.partitions().as_time_window().ok_or_else(|| {
                usage(format!("dimension '{name}' is not time-partitioned upstream"))
            })?;
            shifted_windows(
                value,
                downstream_series,
                upstream_series,
                *start_offset,
                *end_offset,
                ctx.effective_dt(),
            )
        }
    }
}

fn shifted_windows(
    partition: &str,
    downstream: &TimeWindowPartitions,
    upstream: &TimeWindowPartitions,
    start_offset: i64,
    end_offset: i64,
    effective: DateTime<Utc>,
) -> Result<Vec<String>> {
    let index = downstream
        .index_of_key(partition)
        .and_then(|index| i64::try_from(index).ok())
        .ok_or_else(|| {
            parcel_partitions::Error::invalid_key(partition, "not a window of the downstream series")
        })?;
    let start = index
        .checked_add(start_offset)
        .and_then(|i| downstream.window_start(i));
    let end = index
        .checked_add(1)
        .and_then(|i| i.checked_add(end_offset))
        .and_then(|i| downstream.window_start(i));
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(Vec::new());
    };
    if end <= start {
        return Ok(Vec::new());
    }
    Ok(upstream
        .indices_overlapping(start, end, effective)
        .filter_map(|i| upstream.key_at(i))
        .collect())
}
