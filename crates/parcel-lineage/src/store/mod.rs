//! Event and metadata storage for data version records.
//!
//! The [`EventStore`] trait is the seam between staleness resolution and
//! whatever persists materializations and observations. Records are
//! append-only and addressed by a monotonically increasing [`StorageId`],
//! which partitioned dependency checks use as a cursor.
//!
//! [`memory::InMemoryEventStore`] backs tests and embedded use.

pub mod memory;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parcel_core::{AssetKey, AssetPartitionKey};
use serde::{Deserialize, Serialize};

use crate::data_version::{extract_data_version_from_tags, DataProvenance, DataVersion};
use crate::error::Result;

/// Position of a record in the store. Later records have larger ids.
pub type StorageId = i64;

/// What produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A computation wrote the asset.
    Materialization,
    /// The version of an external asset was observed.
    Observation,
}

/// A record as supplied to [`EventStore::store_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Asset and partition the record belongs to.
    pub key: AssetPartitionKey,
    /// What produced the record.
    pub kind: RecordKind,
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Data version and provenance tags.
    pub tags: BTreeMap<String, String>,
}

impl NewRecord {
    /// A materialization record with no tags.
    #[must_use]
    pub fn materialization(key: impl Into<AssetPartitionKey>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            kind: RecordKind::Materialization,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    /// An observation record with no tags.
    #[must_use]
    pub fn observation(key: impl Into<AssetPartitionKey>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            kind: RecordKind::Observation,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds several tags, replacing existing values.
    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersionRecord {
    /// Position in the store.
    pub storage_id: StorageId,
    /// Asset and partition the record belongs to.
    pub key: AssetPartitionKey,
    /// What produced the record.
    pub kind: RecordKind,
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Data version and provenance tags.
    pub tags: BTreeMap<String, String>,
}

impl DataVersionRecord {
    /// The recorded data version, if any.
    #[must_use]
    pub fn data_version(&self) -> Option<DataVersion> {
        extract_data_version_from_tags(&self.tags)
    }

    /// The recorded provenance, if any.
    #[must_use]
    pub fn provenance(&self) -> Option<DataProvenance> {
        DataProvenance::from_tags(&self.tags)
    }
}

/// Storage of data version records.
///
/// Every query considers both materializations and observations and returns
/// the record with the largest storage id that matches.
pub trait EventStore: Send + Sync {
    /// Appends a record and returns its storage id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn store_record(&self, record: NewRecord) -> Result<StorageId>;

    /// The most recent record for an asset partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn latest_record(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<Option<DataVersionRecord>>;

    /// The most recent record stored after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn latest_record_after(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        after: StorageId,
    ) -> Result<Option<DataVersionRecord>>;

    /// The most recent record with a storage id no greater than `at_or_before`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn latest_record_at_or_before(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        at_or_before: StorageId,
    ) -> Result<Option<DataVersionRecord>>;
}
