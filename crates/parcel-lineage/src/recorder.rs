//! Recording materializations and observations with their provenance.
//!
//! The recorder reads each input's latest record at write time, so the
//! provenance it stores is exactly what staleness resolution later compares
//! against. Inputs that span several upstream partitions are recorded as one
//! combined data version, with the largest storage id among them as the
//! pointer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parcel_core::observability::lineage_span;
use parcel_core::{AssetKey, AssetPartitionKey};
use parcel_partitions::{PartitionLoadingContext, Partitioning};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::data_version::{
    combine_partition_data_versions, compute_logical_data_version, input_data_version_tag,
    input_event_pointer_tag, DataVersion, CODE_VERSION_TAG, DATA_VERSION_IS_USER_PROVIDED_TAG,
    DATA_VERSION_TAG,
};
use crate::error::{Error, Result};
use crate::graph::{AssetNode, DependencyGraph};
use crate::store::{DataVersionRecord, EventStore, NewRecord, StorageId};

/// A materialization to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeRequest {
    /// Asset and partition written.
    pub key: AssetPartitionKey,
    /// When the write happened.
    pub timestamp: DateTime<Utc>,
    /// Data version reported by user code, if any.
    pub data_version: Option<DataVersion>,
    /// Input versions the computation saw when it started.
    pub observed_input_versions: BTreeMap<AssetKey, DataVersion>,
    /// Extra tags, applied last.
    pub tags: BTreeMap<String, String>,
}

impl MaterializeRequest {
    /// A request with no user data version and no observed inputs.
    #[must_use]
    pub fn new(key: impl Into<AssetPartitionKey>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            timestamp,
            data_version: None,
            observed_input_versions: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Sets a user-provided data version.
    #[must_use]
    pub fn with_data_version(mut self, data_version: impl Into<DataVersion>) -> Self {
        self.data_version = Some(data_version.into());
        self
    }

    /// Records the version of `input` seen at step start.
    #[must_use]
    pub fn with_observed_input(
        mut self,
        input: impl Into<AssetKey>,
        data_version: impl Into<DataVersion>,
    ) -> Self {
        self.observed_input_versions
            .insert(input.into(), data_version.into());
        self
    }

    /// Adds a tag. Tags override derived ones, including input pointers.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// The version of one input as it will be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInput {
    /// Data version of the input.
    pub data_version: DataVersion,
    /// Storage id of the newest record read, if any.
    pub storage_id: Option<StorageId>,
}

/// Writes materialization and observation records.
pub struct MaterializationRecorder<'a> {
    graph: &'a dyn DependencyGraph,
    store: &'a dyn EventStore,
    ctx: PartitionLoadingContext<'a>,
}

impl std::fmt::Debug for MaterializationRecorder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializationRecorder")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl<'a> MaterializationRecorder<'a> {
    /// Creates a recorder.
    #[must_use]
    pub fn new(
        graph: &'a dyn DependencyGraph,
        store: &'a dyn EventStore,
        ctx: PartitionLoadingContext<'a>,
    ) -> Self {
        Self { graph, store, ctx }
    }

    /// Records a materialization and returns its storage id.
    ///
    /// Without a user data version, the data version is derived from the
    /// code version and input versions; an asset without a code version uses
    /// a fresh run id instead, so each of its materializations gets a new
    /// data version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAsset`] for an asset outside the graph,
    /// [`Error::InvalidRequest`] for an external asset or a partition key
    /// that does not fit the asset, and propagates store errors.
    pub fn materialize(&self, request: MaterializeRequest) -> Result<StorageId> {
        let span = lineage_span("materialize", &request.key.to_string());
        let _guard = span.enter();

        let node = self.node(&request.key.asset_key)?;
        if node.is_external() {
            return Err(Error::invalid_request(
                &request.key,
                "external assets are observed, not materialized",
            ));
        }
        self.check_partition(node, &request.key)?;

        let inputs = self.input_versions(&request.key)?;
        for (input, recorded) in &inputs {
            if let Some(observed) = request.observed_input_versions.get(input) {
                if observed != &recorded.data_version {
                    warn!(
                        asset = %request.key,
                        input = %input,
                        observed = %observed,
                        latest = %recorded.data_version,
                        "Data version mismatch for input; recording the latest record's version"
                    );
                }
            }
        }

        let code_version = node
            .code_version()
            .map_or_else(|| Ulid::new().to_string(), str::to_string);
        let input_data_versions: BTreeMap<AssetKey, DataVersion> = inputs
            .iter()
            .map(|(input, recorded)| (input.clone(), recorded.data_version.clone()))
            .collect();
        let is_user_provided = request.data_version.is_some();
        let data_version = request
            .data_version
            .unwrap_or_else(|| compute_logical_data_version(&code_version, &input_data_versions));

        let mut record = NewRecord::materialization(request.key.clone(), request.timestamp)
            .with_tag(DATA_VERSION_TAG, data_version.as_str())
            .with_tag(CODE_VERSION_TAG, code_version);
        if is_user_provided {
            record = record.with_tag(DATA_VERSION_IS_USER_PROVIDED_TAG, "true");
        }
        for (input, recorded) in &inputs {
            record =
                record.with_tag(input_data_version_tag(input), recorded.data_version.as_str());
            if let Some(storage_id) = recorded.storage_id {
                record = record.with_tag(input_event_pointer_tag(input), storage_id.to_string());
            }
        }
        if let (Some(Partitioning::Multi(def)), Some(partition)) =
            (node.partitioning(), request.key.partition_key.as_deref())
        {
            record = record.with_tags(def.parse_key(partition)?.tags());
        }
        let record = record.with_tags(request.tags);

        let storage_id = self.store.store_record(record)?;
        debug!(%data_version, storage_id, inputs = inputs.len(), "recorded materialization");
        Ok(storage_id)
    }

    /// Records an observed version of an external asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a materializable asset or a
    /// partition key that does not fit, and propagates store errors.
    pub fn observe(
        &self,
        key: impl Into<AssetPartitionKey>,
        data_version: impl Into<DataVersion>,
        timestamp: DateTime<Utc>,
    ) -> Result<StorageId> {
        let key = key.into();
        let data_version = data_version.into();
        let node = self.node(&key.asset_key)?;
        if !node.is_external() {
            return Err(Error::invalid_request(&key, "only external assets are observed"));
        }
        self.check_partition(node, &key)?;
        let storage_id = self.store.store_record(
            NewRecord::observation(key.clone(), timestamp)
                .with_tag(DATA_VERSION_TAG, data_version.as_str())
                .with_tag(DATA_VERSION_IS_USER_PROVIDED_TAG, "true"),
        )?;
        debug!(asset = %key, %data_version, storage_id, "recorded observation");
        Ok(storage_id)
    }

    /// The inputs a materialization of `key` would record right now.
    ///
    /// Upstreams whose mapping selects no partition (the first window of a
    /// self-dependency, say) are left out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAsset`] for an asset outside the graph and
    /// propagates mapping and store errors.
    pub fn input_versions(
        &self,
        key: &AssetPartitionKey,
    ) -> Result<BTreeMap<AssetKey, RecordedInput>> {
        let node = self.node(&key.asset_key)?;
        let mut inputs = BTreeMap::new();
        for upstream in self.graph.upstream_of(&key.asset_key) {
            let upstream_node = self.node(&upstream)?;
            let recorded = match upstream_node.partitioning() {
                None => {
                    let record = self.store.latest_record(&upstream, None)?;
                    RecordedInput {
                        data_version: current_data_version(upstream_node, record.as_ref()),
                        storage_id: record.map(|r| r.storage_id),
                    }
                }
                Some(upstream_partitioning) => {
                    let mapping = self.graph.partition_mapping(&key.asset_key, &upstream);
                    let partitions = mapping.upstream_partitions(
                        key.partition_key.as_deref(),
                        node.partitioning(),
                        upstream_partitioning,
                        &self.ctx,
                    )?;
                    let mut versions = BTreeMap::new();
                    let mut storage_id = None;
                    for partition in partitions {
                        let record = self.store.latest_record(&upstream, Some(&partition))?;
                        storage_id = storage_id.max(record.as_ref().map(|r| r.storage_id));
                        versions.insert(
                            partition,
                            current_data_version(upstream_node, record.as_ref()),
                        );
                    }
                    let data_version = match versions.len() {
                        0 => continue,
                        1 => versions.into_values().next().unwrap_or_else(DataVersion::null),
                        _ => combine_partition_data_versions(&versions),
                    };
                    RecordedInput {
                        data_version,
                        storage_id,
                    }
                }
            };
            inputs.insert(upstream, recorded);
        }
        Ok(inputs)
    }

    fn node(&self, key: &AssetKey) -> Result<&'a AssetNode> {
        self.graph.node(key).ok_or_else(|| Error::unknown_asset(key))
    }

    fn check_partition(&self, node: &AssetNode, key: &AssetPartitionKey) -> Result<()> {
        match (node.partitioning(), key.partition_key.as_deref()) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(Error::invalid_request(key, "asset is not partitioned")),
            (Some(_), None) => Err(Error::invalid_request(key, "a partition key is required")),
            (Some(partitioning), Some(partition)) => {
                if partitioning.has_partition_key(partition, &self.ctx) {
                    Ok(())
                } else {
                    Err(Error::invalid_request(key, "partition does not exist"))
                }
            }
        }
    }
}

/// Data version of `node` given its latest record.
pub(crate) fn current_data_version(
    node: &AssetNode,
    record: Option<&DataVersionRecord>,
) -> DataVersion {
    match record {
        Some(record) => record.data_version().unwrap_or_else(DataVersion::unknown),
        None if node.is_external() => DataVersion::initial(),
        None => DataVersion::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AssetGraph;
    use crate::mapping::PartitionMapping;
    use crate::store::memory::InMemoryEventStore;
    use chrono::TimeZone;
    use parcel_partitions::time_window::TimeWindowPartitions;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn ctx() -> PartitionLoadingContext<'static> {
        PartitionLoadingContext::new(at(10))
    }

    #[test]
    fn first_window_of_self_dependency_has_no_input() {
        let graph = AssetGraph::new([AssetNode::materializable("daily")
            .with_partitioning(TimeWindowPartitions::daily("2024-01-01").unwrap())
            .with_mapped_dependency("daily", PartitionMapping::time_window(-1, -1))])
        .unwrap();
        let store = InMemoryEventStore::new();
        let recorder = MaterializationRecorder::new(&graph, &store, ctx());

        let first = AssetPartitionKey::partition(AssetKey::new("daily"), "2024-01-01");
        assert!(recorder.input_versions(&first).unwrap().is_empty());
        let id = recorder
            .materialize(MaterializeRequest::new(first, at(2)))
            .unwrap();

        let second = AssetPartitionKey::partition(AssetKey::new("daily"), "2024-01-02");
        let inputs = recorder.input_versions(&second).unwrap();
        assert_eq!(inputs[&AssetKey::new("daily")].storage_id, Some(id));
    }

    #[test]
    fn code_version_seeds_the_derived_version() {
        let graph = AssetGraph::new([AssetNode::materializable("a").with_code_version("7")]).unwrap();
        let store = InMemoryEventStore::new();
        let recorder = MaterializationRecorder::new(&graph, &store, ctx());
        recorder
            .materialize(MaterializeRequest::new(AssetKey::new("a"), at(2)))
            .unwrap();

        let record = store.latest_record(&AssetKey::new("a"), None).unwrap().unwrap();
        assert_eq!(record.tags[CODE_VERSION_TAG], "7");
        assert_eq!(
            record.data_version(),
            Some(compute_logical_data_version("7", &BTreeMap::new()))
        );
        assert!(!record.tags.contains_key(DATA_VERSION_IS_USER_PROVIDED_TAG));
    }

    #[test]
    fn missing_record_versions() {
        let external = AssetNode::external("source");
        let plain = AssetNode::materializable("plain");
        assert_eq!(current_data_version(&external, None), DataVersion::initial());
        assert_eq!(current_data_version(&plain, None), DataVersion::null());
    }
}
