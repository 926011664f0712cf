//! A lineage harness: graph, store and clock in one place.
//!
//! Every write advances the clock by one minute, so record timestamps are
//! strictly increasing. Each query builds a fresh resolver, so it sees every
//! write made before it.

use std::cell::Cell;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use parcel_core::{AssetKey, AssetPartitionKey};
use parcel_lineage::prelude::*;
use parcel_lineage::store::NewRecord;
use parcel_partitions::PartitionLoadingContext;

use crate::fixtures::utc;

/// Graph plus in-memory store for staleness scenarios.
pub struct LineageHarness {
    graph: AssetGraph,
    store: InMemoryEventStore,
    config: StalenessConfig,
    effective_dt: DateTime<Utc>,
    clock: Cell<DateTime<Utc>>,
}

impl LineageHarness {
    /// A harness over `nodes`, effective at 2024-06-01.
    pub fn new<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = AssetNode>,
    {
        Self {
            graph: AssetGraph::new(nodes).expect("valid asset graph"),
            store: InMemoryEventStore::new(),
            config: StalenessConfig::default(),
            effective_dt: utc(2024, 6, 1, 0),
            clock: Cell::new(utc(2024, 1, 1, 0)),
        }
    }

    /// Replaces the thresholds used by queries.
    #[must_use]
    pub fn with_config(mut self, config: StalenessConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the effective time used to enumerate partitions.
    #[must_use]
    pub fn with_effective_dt(mut self, effective_dt: DateTime<Utc>) -> Self {
        self.effective_dt = effective_dt;
        self
    }

    /// Swaps in new asset definitions, keeping every record. This is how a
    /// scenario changes code versions or dependencies.
    pub fn redefine<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = AssetNode>,
    {
        self.graph = AssetGraph::new(nodes).expect("valid asset graph");
    }

    /// The current graph.
    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    /// The event store.
    pub fn store(&self) -> &InMemoryEventStore {
        &self.store
    }

    /// The partition loading context used by every call.
    pub fn context(&self) -> PartitionLoadingContext<'static> {
        PartitionLoadingContext::new(self.effective_dt)
    }

    fn tick(&self) -> DateTime<Utc> {
        let now = self.clock.get() + Duration::minutes(1);
        self.clock.set(now);
        now
    }

    fn recorder(&self) -> MaterializationRecorder<'_> {
        MaterializationRecorder::new(&self.graph, &self.store, self.context())
    }

    fn resolver(&self) -> StaleStatusResolver<'_> {
        StaleStatusResolver::new(&self.graph, &self.store, self.context()).with_config(self.config)
    }

    /// Materializes with no user data version.
    pub fn materialize(&self, asset: &str, partition: Option<&str>) -> StorageId {
        self.materialize_with(asset, partition, |request| request)
    }

    /// Materializes with a user-provided data version.
    pub fn materialize_version(
        &self,
        asset: &str,
        partition: Option<&str>,
        data_version: &str,
    ) -> StorageId {
        self.materialize_with(asset, partition, |request| {
            request.with_data_version(data_version)
        })
    }

    /// Materializes with a customised request.
    pub fn materialize_with<F>(&self, asset: &str, partition: Option<&str>, customise: F) -> StorageId
    where
        F: FnOnce(MaterializeRequest) -> MaterializeRequest,
    {
        let request = customise(MaterializeRequest::new(key(asset, partition), self.tick()));
        self.recorder()
            .materialize(request)
            .expect("materialization recorded")
    }

    /// Records an observed version of an external asset.
    pub fn observe(&self, asset: &str, partition: Option<&str>, data_version: &str) -> StorageId {
        self.recorder()
            .observe(key(asset, partition), data_version, self.tick())
            .expect("observation recorded")
    }

    /// Stores a raw materialization record with the given tags, bypassing
    /// the recorder (as an external writer would).
    pub fn record_raw(
        &self,
        asset: &str,
        partition: Option<&str>,
        tags: BTreeMap<String, String>,
    ) -> StorageId {
        self.store
            .store_record(NewRecord::materialization(key(asset, partition), self.tick()).with_tags(tags))
            .expect("record stored")
    }

    /// Current status.
    pub fn status(&self, asset: &str, partition: Option<&str>) -> StaleStatus {
        self.resolver()
            .get_status(&AssetKey::new(asset), partition)
            .expect("status resolved")
    }

    /// Immediate causes.
    pub fn causes(&self, asset: &str, partition: Option<&str>) -> Vec<StaleCause> {
        self.resolver()
            .get_stale_causes(&AssetKey::new(asset), partition)
            .expect("causes resolved")
    }

    /// Root causes.
    pub fn root_causes(&self, asset: &str, partition: Option<&str>) -> Vec<StaleCause> {
        self.resolver()
            .get_stale_root_causes(&AssetKey::new(asset), partition)
            .expect("root causes resolved")
    }

    /// Current data version.
    pub fn data_version(&self, asset: &str, partition: Option<&str>) -> DataVersion {
        self.resolver()
            .current_data_version(&AssetKey::new(asset), partition)
            .expect("data version resolved")
    }

    /// Provenance of the latest record.
    pub fn provenance(&self, asset: &str, partition: Option<&str>) -> Option<DataProvenance> {
        self.store
            .latest_record(&AssetKey::new(asset), partition)
            .expect("store readable")
            .and_then(|record| record.provenance())
    }
}

fn key(asset: &str, partition: Option<&str>) -> AssetPartitionKey {
    AssetPartitionKey::new(AssetKey::new(asset), partition.map(str::to_string))
}
