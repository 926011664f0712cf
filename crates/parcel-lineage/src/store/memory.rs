//! In-memory event store for tests and embedded use.
//!
//! ## Limitations
//!
//! - **No persistence**: all records are lost when the store is dropped
//! - **Linear scans**: queries walk every record of the asset partition

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use parcel_core::{AssetKey, AssetPartitionKey};
use tracing::debug;

use super::{DataVersionRecord, EventStore, NewRecord, StorageId};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    next_id: StorageId,
    records: HashMap<AssetPartitionKey, Vec<DataVersionRecord>>,
}

/// Thread-safe in-memory [`EventStore`].
///
/// Storage ids start at 1 and increase by one per record.
///
/// ## Example
///
/// ```rust
/// use chrono::Utc;
/// use parcel_core::AssetKey;
/// use parcel_lineage::store::{memory::InMemoryEventStore, EventStore, NewRecord};
///
/// let store = InMemoryEventStore::new();
/// let id = store.store_record(NewRecord::materialization(AssetKey::new("orders"), Utc::now()))?;
/// assert_eq!(id, 1);
/// # Ok::<(), parcel_lineage::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn record_count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.records.values().map(Vec::len).sum())
    }

    fn find<P>(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        predicate: P,
    ) -> Result<Option<DataVersionRecord>>
    where
        P: Fn(StorageId) -> bool,
    {
        let inner = self.inner.read().map_err(poison_err)?;
        let key = AssetPartitionKey::new(asset_key.clone(), partition_key.map(str::to_string));
        Ok(inner.records.get(&key).and_then(|records| {
            records
                .iter()
                .rev()
                .find(|record| predicate(record.storage_id))
                .cloned()
        }))
    }
}

impl EventStore for InMemoryEventStore {
    fn store_record(&self, record: NewRecord) -> Result<StorageId> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.next_id += 1;
        let storage_id = inner.next_id;
        debug!(key = %record.key, storage_id, kind = ?record.kind, "stored record");
        inner
            .records
            .entry(record.key.clone())
            .or_default()
            .push(DataVersionRecord {
                storage_id,
                key: record.key,
                kind: record.kind,
                timestamp: record.timestamp,
                tags: record.tags,
            });
        Ok(storage_id)
    }

    fn latest_record(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<Option<DataVersionRecord>> {
        self.find(asset_key, partition_key, |_| true)
    }

    fn latest_record_after(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        after: StorageId,
    ) -> Result<Option<DataVersionRecord>> {
        self.find(asset_key, partition_key, |id| id > after)
    }

    fn latest_record_at_or_before(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        at_or_before: StorageId,
    ) -> Result<Option<DataVersionRecord>> {
        self.find(asset_key, partition_key, |id| id <= at_or_before)
    }
}
