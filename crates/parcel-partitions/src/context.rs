//! The temporal and storage context threaded through partition queries.
//!
//! Nothing in this crate reads the wall clock or a global store. Every
//! enumeration-dependent call receives a [`PartitionLoadingContext`]; callers
//! that need consistency across a batch reuse one context for the batch.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::dynamic::DynamicPartitionsStore;
use crate::error::{Error, Result};

/// Snapshot of "now" plus the optional dynamic partitions store.
#[derive(Clone, Copy)]
pub struct PartitionLoadingContext<'a> {
    effective_dt: DateTime<Utc>,
    last_event_id: Option<i64>,
    dynamic_partitions_store: Option<&'a dyn DynamicPartitionsStore>,
}

impl<'a> PartitionLoadingContext<'a> {
    /// Creates a context evaluated at `effective_dt` with no dynamic store.
    #[must_use]
    pub fn new(effective_dt: DateTime<Utc>) -> Self {
        Self {
            effective_dt,
            last_event_id: None,
            dynamic_partitions_store: None,
        }
    }

    /// Attaches a dynamic partitions store.
    #[must_use]
    pub fn with_dynamic_partitions_store(mut self, store: &'a dyn DynamicPartitionsStore) -> Self {
        self.dynamic_partitions_store = Some(store);
        self
    }

    /// Pins the last event id the caller has observed.
    #[must_use]
    pub fn with_last_event_id(mut self, last_event_id: i64) -> Self {
        self.last_event_id = Some(last_event_id);
        self
    }

    /// The instant partition enumeration is evaluated at.
    #[must_use]
    pub fn effective_dt(&self) -> DateTime<Utc> {
        self.effective_dt
    }

    /// The last event id observed by the caller, if pinned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<i64> {
        self.last_event_id
    }

    /// The dynamic partitions store, if one was supplied.
    #[must_use]
    pub fn dynamic_partitions_store(&self) -> Option<&'a dyn DynamicPartitionsStore> {
        self.dynamic_partitions_store
    }

    /// Returns the dynamic partitions store or a usage error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when no store was supplied.
    pub fn require_dynamic_partitions_store(&self) -> Result<&'a dyn DynamicPartitionsStore> {
        self.dynamic_partitions_store
            .ok_or_else(|| Error::usage("dynamic partitions store required"))
    }
}

impl fmt::Debug for PartitionLoadingContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionLoadingContext")
            .field("effective_dt", &self.effective_dt)
            .field("last_event_id", &self.last_event_id)
            .field(
                "dynamic_partitions_store",
                &self.dynamic_partitions_store.map(|_| "<store>"),
            )
            .finish()
    }
}
