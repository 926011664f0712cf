//! # parcel-partitions
//!
//! Multi-dimensional partition key spaces.
//!
//! This crate provides:
//!
//! - **Dimensions**: static lists, time-window series and dynamically
//!   registered keys, each resolvable against a [`PartitionLoadingContext`]
//! - **Composite keys**: [`MultiPartitionKey`] with a durable `|`-joined
//!   canonical form
//! - **Pagination**: cursor-based paging over the cartesian product without
//!   materialising it
//! - **Ranges**: inclusive key ranges, with a fast path when one dimension
//!   varies
//! - **Subsets**: set algebra and backward-compatible serialization
//!
//! ## Guarantees
//!
//! - **Deterministic**: dimension order is the sorted dimension names, so a
//!   definition built in any order yields the same keys and cursors
//! - **No ambient state**: "now" and the dynamic store always come from the
//!   caller's context
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use parcel_partitions::prelude::*;
//!
//! let def = MultiPartitionsDefinition::new([
//!     ("date", TimeWindowPartitions::daily("2024-01-01")?.into()),
//!     ("region", PartitionsDefinition::static_keys(["eu", "us"])?),
//! ])?;
//! let now = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
//! let ctx = PartitionLoadingContext::new(now);
//!
//! let page = def.get_paginated_partition_keys(&ctx, 3, true, None)?;
//! let keys: Vec<String> = page.results.into_iter().map(String::from).collect();
//! assert_eq!(keys, vec!["2024-01-01|eu", "2024-01-01|us", "2024-01-02|eu"]);
//! assert!(page.has_more);
//! # Ok::<(), parcel_partitions::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod dimension;
pub mod dynamic;
pub mod error;
pub mod multi;
pub mod paginate;
pub mod partitioning;
pub mod range;
pub mod subset;
pub mod time_window;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::PartitionLoadingContext;
    pub use crate::dimension::{Dimension, DynamicPartitions, PartitionsDefinition, StaticPartitions};
    pub use crate::dynamic::{DynamicPartitionsStore, InMemoryDynamicPartitionsStore};
    pub use crate::error::{Error, Result};
    pub use crate::multi::{MultiPartitionKey, MultiPartitionsDefinition};
    pub use crate::paginate::PaginatedResults;
    pub use crate::partitioning::Partitioning;
    pub use crate::range::PartitionKeyRange;
    pub use crate::subset::MultiPartitionsSubset;
    pub use crate::time_window::{Cadence, TimeWindow, TimeWindowPartitions};
}

pub use context::PartitionLoadingContext;
pub use error::{Error, Result};
pub use multi::{MultiPartitionKey, MultiPartitionsDefinition};
pub use partitioning::Partitioning;
