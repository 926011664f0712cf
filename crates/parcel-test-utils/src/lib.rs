//! Shared test utilities for parcel integration tests.
//!
//! This crate provides:
//! - [`fixtures`]: fixed clocks, contexts and partition definitions
//! - [`LineageHarness`]: an asset graph plus in-memory event store with a
//!   ticking clock, for staleness scenarios
//!
//! # Example
//!
//! ```rust
//! use parcel_lineage::prelude::*;
//! use parcel_test_utils::LineageHarness;
//!
//! let harness = LineageHarness::new([AssetNode::materializable("asset1")]);
//! assert_eq!(harness.status("asset1", None), StaleStatus::Missing);
//! harness.materialize("asset1", None);
//! assert_eq!(harness.status("asset1", None), StaleStatus::Fresh);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities panic on setup errors instead of propagating them.
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parcel=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
