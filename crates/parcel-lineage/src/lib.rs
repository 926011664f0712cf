//! # parcel-lineage
//!
//! Data versions, provenance and staleness for partitioned assets.
//!
//! This crate provides:
//!
//! - **Data versions**: [`DataVersion`] fingerprints derived from code and
//!   input versions, and the provenance tags recorded with them
//! - **Event store**: the [`EventStore`] trait plus an in-memory store
//! - **Asset graph**: [`AssetGraph`] with per-edge [`PartitionMapping`]s
//! - **Recording**: [`MaterializationRecorder`] writes materializations and
//!   observations with provenance
//! - **Staleness**: [`StaleStatusResolver`] answers `MISSING`, `FRESH` or
//!   `STALE`, with causes and root causes
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use parcel_core::AssetKey;
//! use parcel_lineage::prelude::*;
//! use parcel_partitions::PartitionLoadingContext;
//!
//! let graph = AssetGraph::new([
//!     AssetNode::external("raw"),
//!     AssetNode::materializable("clean")
//!         .with_code_version("1")
//!         .with_dependency("raw"),
//! ])?;
//! let store = InMemoryEventStore::new();
//! let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let ctx = PartitionLoadingContext::new(now);
//!
//! let recorder = MaterializationRecorder::new(&graph, &store, ctx);
//! recorder.materialize(MaterializeRequest::new(AssetKey::new("clean"), now))?;
//! recorder.observe(AssetKey::new("raw"), "v2", now)?;
//!
//! let resolver = StaleStatusResolver::new(&graph, &store, ctx);
//! let clean = AssetKey::new("clean");
//! assert_eq!(resolver.get_status(&clean, None)?, StaleStatus::Stale);
//! # Ok::<(), parcel_lineage::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod data_version;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod metrics;
pub mod recorder;
pub mod stale;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::StalenessConfig;
    pub use crate::data_version::{compute_logical_data_version, DataProvenance, DataVersion};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{AssetGraph, AssetKind, AssetNode, DependencyGraph};
    pub use crate::mapping::{DimensionMapping, PartitionMapping};
    pub use crate::recorder::{MaterializationRecorder, MaterializeRequest};
    pub use crate::stale::{StaleCause, StaleCauseCategory, StaleStatus, StaleStatusResolver};
    pub use crate::store::memory::InMemoryEventStore;
    pub use crate::store::{DataVersionRecord, EventStore, StorageId};
}

pub use data_version::DataVersion;
pub use error::{Error, Result};
pub use graph::{AssetGraph, AssetNode, DependencyGraph};
pub use mapping::PartitionMapping;
pub use recorder::MaterializationRecorder;
pub use stale::{StaleStatus, StaleStatusResolver};
pub use store::EventStore;
