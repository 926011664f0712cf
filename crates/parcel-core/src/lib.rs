//! # parcel-core
//!
//! Shared primitives for the parcel partitioning and lineage crates.
//!
//! - **Asset identity**: [`AssetKey`] and [`AssetPartitionKey`]
//! - **Errors**: the shared [`Error`] type and [`Result`] alias
//! - **Observability**: logging initialisation and span helpers
//! - **Configuration**: `PARCEL_*` environment helpers
//!
//! ## Example
//!
//! ```rust
//! use parcel_core::prelude::*;
//!
//! let key = AssetKey::from_path(["warehouse", "orders"])?;
//! let partition = AssetPartitionKey::partition(key, "2024-01-01");
//! assert_eq!(partition.to_string(), "warehouse/orders[2024-01-01]");
//! # Ok::<(), parcel_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod asset_key;
pub mod config;
pub mod error;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::asset_key::{AssetKey, AssetPartitionKey};
    pub use crate::error::{Error, Result};
}

pub use asset_key::{AssetKey, AssetPartitionKey};
pub use error::{Error, Result};
pub use observability::{init_logging, LogFormat};
