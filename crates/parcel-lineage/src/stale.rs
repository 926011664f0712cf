//! Staleness resolution.
//!
//! An asset partition is [`StaleStatus::Stale`] when its latest record no
//! longer matches its current inputs: its code version changed, a
//! dependency was added or removed, or a dependency's data version moved
//! since the record was written. Staleness is not transitive: a downstream
//! only goes stale once its upstream actually records a new version.
//!
//! Comparisons against very wide dependencies are skipped (see
//! [`StalenessConfig`]); a skipped dependency never makes an asset stale.
//!
//! A [`StaleStatusResolver`] memoises every lookup for its lifetime, so one
//! instance gives a consistent answer across a batch of queries. Build a new
//! one to observe newer records.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

use parcel_core::observability::lineage_span;
use parcel_core::{AssetKey, AssetPartitionKey};
use parcel_partitions::PartitionLoadingContext;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StalenessConfig;
use crate::data_version::{DataProvenance, DataVersion, DATA_VERSION_IS_USER_PROVIDED_TAG};
use crate::error::{Error, Result};
use crate::graph::{AssetNode, DependencyGraph};
use crate::metrics::{skip_reasons, LineageMetrics, TimingGuard};
use crate::recorder::current_data_version;
use crate::store::{DataVersionRecord, EventStore};

/// Whether a record is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaleStatus {
    /// Never materialized.
    Missing,
    /// Consistent with current code and inputs.
    Fresh,
    /// Out of date; see [`StaleStatusResolver::get_stale_causes`].
    Stale,
}

impl StaleStatus {
    /// Lowercase name, used as a metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for StaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change behind a [`StaleCause`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaleCauseCategory {
    /// The code version changed.
    Code,
    /// An input's data changed.
    Data,
    /// The set of inputs changed.
    Dependencies,
}

type CauseKey = (
    AssetPartitionKey,
    StaleCauseCategory,
    String,
    Option<AssetPartitionKey>,
);

/// One reason an asset partition is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaleCause {
    /// The stale asset partition.
    pub key: AssetPartitionKey,
    /// Kind of change.
    pub category: StaleCauseCategory,
    /// Human-readable reason, e.g. `"has a new code version"`.
    pub reason: String,
    /// The dependency involved, if any.
    pub dependency: Option<AssetPartitionKey>,
    /// What changed upstream. Empty for a terminal cause.
    pub children: Vec<StaleCause>,
}

impl StaleCause {
    /// A terminal cause with no dependency.
    #[must_use]
    pub fn new(
        key: AssetPartitionKey,
        category: StaleCauseCategory,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            key,
            category,
            reason: reason.into(),
            dependency: None,
            children: Vec::new(),
        }
    }

    /// Sets the dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: AssetPartitionKey) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Sets the upstream explanation.
    #[must_use]
    pub fn with_children(mut self, children: Vec<StaleCause>) -> Self {
        self.children = children;
        self
    }

    /// Returns true if nothing further explains this cause.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    fn dedupe_key(&self) -> CauseKey {
        (
            self.key.clone(),
            self.category,
            self.reason.clone(),
            self.dependency.clone(),
        )
    }
}

impl Ord for StaleCause {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.category, &self.key, &self.dependency, &self.reason, &self.children).cmp(&(
            other.category,
            &other.key,
            &other.dependency,
            &other.reason,
            &other.children,
        ))
    }
}

impl PartialOrd for StaleCause {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StaleCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.reason)
    }
}

/// Resolves staleness against one snapshot of the graph and store.
pub struct StaleStatusResolver<'a> {
    graph: &'a dyn DependencyGraph,
    store: &'a dyn EventStore,
    ctx: PartitionLoadingContext<'a>,
    config: StalenessConfig,
    metrics: LineageMetrics,
    records: RefCell<HashMap<AssetPartitionKey, Option<DataVersionRecord>>>,
    data_versions: RefCell<HashMap<AssetPartitionKey, DataVersion>>,
    statuses: RefCell<HashMap<AssetPartitionKey, StaleStatus>>,
    causes: RefCell<HashMap<AssetPartitionKey, Vec<StaleCause>>>,
}

impl fmt::Debug for StaleStatusResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleStatusResolver")
            .field("ctx", &self.ctx)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> StaleStatusResolver<'a> {
    /// Creates a resolver with default thresholds.
    #[must_use]
    pub fn new(
        graph: &'a dyn DependencyGraph,
        store: &'a dyn EventStore,
        ctx: PartitionLoadingContext<'a>,
    ) -> Self {
        Self {
            graph,
            store,
            ctx,
            config: StalenessConfig::default(),
            metrics: LineageMetrics::new(),
            records: RefCell::default(),
            data_versions: RefCell::default(),
            statuses: RefCell::default(),
            causes: RefCell::default(),
        }
    }

    /// Replaces the thresholds.
    #[must_use]
    pub fn with_config(mut self, config: StalenessConfig) -> Self {
        self.config = config;
        self
    }

    /// Status of an asset partition.
    ///
    /// External assets and the asset-level view of a partitioned asset are
    /// always [`StaleStatus::Fresh`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAsset`] for assets outside the graph, and
    /// propagates store and partition resolution errors.
    pub fn get_status(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<StaleStatus> {
        let key = AssetPartitionKey::new(asset_key.clone(), partition_key.map(str::to_string));
        if let Some(status) = self.statuses.borrow().get(&key) {
            return Ok(*status);
        }
        let span = lineage_span("stale_status", &key.to_string());
        let _guard = span.enter();
        let _timing = TimingGuard::new(|elapsed| self.metrics.observe_resolve_duration(elapsed));

        let node = self.node(asset_key)?;
        let status = if skips_resolution(node, &key) {
            StaleStatus::Fresh
        } else if self.data_version(&key)?.is_null() {
            StaleStatus::Missing
        } else if self.causes(&key)?.is_empty() {
            StaleStatus::Fresh
        } else {
            StaleStatus::Stale
        };
        debug!(%status, "resolved stale status");
        self.metrics.record_status(status.as_str());
        self.statuses.borrow_mut().insert(key, status);
        Ok(status)
    }

    /// Immediate reasons an asset partition is stale, each explained one
    /// level upstream. Empty unless the status is [`StaleStatus::Stale`].
    ///
    /// # Errors
    ///
    /// See [`get_status`](Self::get_status).
    pub fn get_stale_causes(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<Vec<StaleCause>> {
        let key = AssetPartitionKey::new(asset_key.clone(), partition_key.map(str::to_string));
        self.causes(&key)
    }

    /// Terminal causes reached by following cause children breadth-first,
    /// deduplicated and in discovery order.
    ///
    /// # Errors
    ///
    /// See [`get_status`](Self::get_status).
    pub fn get_stale_root_causes(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<Vec<StaleCause>> {
        let mut candidates = self.get_stale_causes(asset_key, partition_key)?;
        let mut visited = HashSet::new();
        let mut roots = Vec::new();
        while !candidates.is_empty() {
            let mut next = Vec::new();
            for cause in candidates {
                if !visited.insert(cause.dedupe_key()) {
                    continue;
                }
                if cause.is_terminal() {
                    roots.push(cause);
                } else {
                    next.extend(cause.children);
                }
            }
            candidates = next;
        }
        Ok(roots)
    }

    /// Current data version of an asset partition: the latest record's
    /// version, `INITIAL` for an unobserved external asset, `NULL` for a
    /// never-materialized one.
    ///
    /// # Errors
    ///
    /// See [`get_status`](Self::get_status).
    pub fn current_data_version(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
    ) -> Result<DataVersion> {
        let key = AssetPartitionKey::new(asset_key.clone(), partition_key.map(str::to_string));
        self.data_version(&key)
    }

    fn node(&self, key: &AssetKey) -> Result<&'a AssetNode> {
        self.graph.node(key).ok_or_else(|| Error::unknown_asset(key))
    }

    fn record(&self, key: &AssetPartitionKey) -> Result<Option<DataVersionRecord>> {
        if let Some(record) = self.records.borrow().get(key) {
            return Ok(record.clone());
        }
        let record = self
            .store
            .latest_record(&key.asset_key, key.partition_key.as_deref())?;
        self.records.borrow_mut().insert(key.clone(), record.clone());
        Ok(record)
    }

    fn data_version(&self, key: &AssetPartitionKey) -> Result<DataVersion> {
        if let Some(version) = self.data_versions.borrow().get(key) {
            return Ok(version.clone());
        }
        let node = self.node(&key.asset_key)?;
        let version = current_data_version(node, self.record(key)?.as_ref());
        self.data_versions.borrow_mut().insert(key.clone(), version.clone());
        Ok(version)
    }

    fn causes(&self, key: &AssetPartitionKey) -> Result<Vec<StaleCause>> {
        if let Some(causes) = self.causes.borrow().get(key) {
            return Ok(causes.clone());
        }
        let causes = self.resolve_causes(key)?;
        self.causes.borrow_mut().insert(key.clone(), causes.clone());
        Ok(causes)
    }

    fn resolve_causes(&self, key: &AssetPartitionKey) -> Result<Vec<StaleCause>> {
        let node = self.node(&key.asset_key)?;
        if skips_resolution(node, key) {
            return Ok(Vec::new());
        }
        let Some(record) = self.record(key)? else {
            return Ok(Vec::new());
        };

        let mut causes = match record.provenance() {
            Some(provenance) => self.provenance_causes(key, node, &provenance)?,
            None => self.timestamp_causes(key, node, &record)?,
        };
        causes.sort_by(|a, b| (&a.key, &a.dependency).cmp(&(&b.key, &b.dependency)));
        Ok(causes)
    }

    fn provenance_causes(
        &self,
        key: &AssetPartitionKey,
        node: &AssetNode,
        provenance: &DataProvenance,
    ) -> Result<Vec<StaleCause>> {
        let mut causes = Vec::new();
        if let Some(code_version) = node.code_version() {
            if code_version != provenance.code_version {
                causes.push(StaleCause::new(
                    key.clone(),
                    StaleCauseCategory::Code,
                    "has a new code version",
                ));
            }
        }

        let upstream = self.graph.upstream_of(&key.asset_key);
        for removed in provenance
            .input_data_versions
            .keys()
            .filter(|input| !upstream.contains(*input))
        {
            causes.push(
                StaleCause::new(
                    key.clone(),
                    StaleCauseCategory::Dependencies,
                    format!("removed dependency on {removed}"),
                )
                .with_dependency(AssetPartitionKey::unpartitioned(removed.clone())),
            );
        }

        for dependency in self.dependencies(key, node)? {
            if !provenance
                .input_data_versions
                .contains_key(&dependency.asset_key)
            {
                causes.push(
                    StaleCause::new(
                        key.clone(),
                        StaleCauseCategory::Dependencies,
                        format!("has a new dependency on {}", dependency.asset_key),
                    )
                    .with_dependency(dependency),
                );
            } else if self.is_dependency_updated(provenance, &dependency)? {
                let (reason, child_reason) = if self.reports_data_version(&dependency)? {
                    ("has a new dependency data version", "has a new data version")
                } else {
                    ("has a new dependency materialization", "has a new materialization")
                };
                let child =
                    StaleCause::new(dependency.clone(), StaleCauseCategory::Data, child_reason);
                causes.push(
                    StaleCause::new(key.clone(), StaleCauseCategory::Data, reason)
                        .with_dependency(dependency)
                        .with_children(vec![child]),
                );
            }
        }
        Ok(causes)
    }

    /// Records written outside a tracked computation carry no provenance;
    /// fall back to comparing record times against materialized inputs.
    fn timestamp_causes(
        &self,
        key: &AssetPartitionKey,
        node: &AssetNode,
        record: &DataVersionRecord,
    ) -> Result<Vec<StaleCause>> {
        let mut causes = Vec::new();
        for dependency in self.dependencies(key, node)? {
            if self.node(&dependency.asset_key)?.is_external() {
                continue;
            }
            let newer = self
                .record(&dependency)?
                .is_some_and(|upstream| upstream.timestamp > record.timestamp);
            if newer {
                causes.push(
                    StaleCause::new(key.clone(), StaleCauseCategory::Data, "has a new input")
                        .with_dependency(dependency),
                );
            }
        }
        Ok(causes)
    }

    /// Upstream partitions compared for `key`, sorted, with skipped
    /// dependencies left out. A partition never depends on itself, whatever
    /// the graph provider says.
    fn dependencies(
        &self,
        key: &AssetPartitionKey,
        node: &AssetNode,
    ) -> Result<Vec<AssetPartitionKey>> {
        let mut dependencies = Vec::new();
        for upstream in self.graph.upstream_of(&key.asset_key) {
            let upstream_node = self.node(&upstream)?;
            if upstream == key.asset_key {
                let partitions = match node.partitioning() {
                    Some(partitioning) => partitioning.num_partitions(&self.ctx)?,
                    None => 0,
                };
                if partitions >= self.config.self_dependency_partition_threshold {
                    self.skip(&upstream, skip_reasons::SELF_DEPENDENCY);
                    continue;
                }
            }
            let Some(upstream_partitioning) = upstream_node.partitioning() else {
                dependencies.push(AssetPartitionKey::unpartitioned(upstream));
                continue;
            };
            let mapping = self.graph.partition_mapping(&key.asset_key, &upstream);
            if mapping.is_all() && upstream_partitioning.is_time_partitioned() {
                self.skip(&upstream, skip_reasons::ALL_TIME_WINDOW);
                continue;
            }
            let partitions = mapping.upstream_partitions(
                key.partition_key.as_deref(),
                node.partitioning(),
                upstream_partitioning,
                &self.ctx,
            )?;
            if partitions.len() >= self.config.dependency_partition_threshold {
                self.skip(&upstream, skip_reasons::PARTITION_THRESHOLD);
                continue;
            }
            dependencies.extend(
                partitions
                    .into_iter()
                    .map(|partition| AssetPartitionKey::partition(upstream.clone(), partition)),
            );
        }
        dependencies.retain(|dependency| dependency != key);
        dependencies.sort();
        Ok(dependencies)
    }

    fn skip(&self, upstream: &AssetKey, reason: &'static str) {
        debug!(upstream = %upstream, reason, "skipped dependency comparison");
        self.metrics.record_dependency_skip(reason);
    }

    /// An unpartitioned dependency is compared by data version. A partition
    /// is compared through the recorded storage id: it changed if a newer
    /// record carries a different version than the one read at the time.
    fn is_dependency_updated(
        &self,
        provenance: &DataProvenance,
        dependency: &AssetPartitionKey,
    ) -> Result<bool> {
        let Some(partition) = dependency.partition_key.as_deref() else {
            let current = self.data_version(dependency)?;
            let recorded = provenance.input_data_versions.get(&dependency.asset_key);
            return Ok(recorded != Some(&current));
        };
        let cursor = provenance.input_storage_ids.get(&dependency.asset_key).copied();
        let updated = match cursor {
            Some(cursor) => self
                .store
                .latest_record_after(&dependency.asset_key, Some(partition), cursor)?,
            None => self.record(dependency)?,
        };
        let Some(updated) = updated else {
            return Ok(false);
        };
        let previous = match cursor {
            Some(cursor) => self
                .store
                .latest_record_at_or_before(&dependency.asset_key, Some(partition), cursor)?,
            None => None,
        };
        Ok(previous.and_then(|record| record.data_version()) != updated.data_version())
    }

    fn reports_data_version(&self, dependency: &AssetPartitionKey) -> Result<bool> {
        let node = self.node(&dependency.asset_key)?;
        if node.code_version().is_some() || node.is_external() {
            return Ok(true);
        }
        Ok(self.record(dependency)?.is_some_and(|record| {
            record
                .tags
                .get(DATA_VERSION_IS_USER_PROVIDED_TAG)
                .is_some_and(|value| value == "true")
        }))
    }
}

/// External assets and the asset-level view of a partitioned asset are
/// never stale.
fn skips_resolution(node: &AssetNode, key: &AssetPartitionKey) -> bool {
    node.is_external() || (node.partitioning().is_some() && key.partition_key.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use crate::recorder::{MaterializationRecorder, MaterializeRequest};
    use crate::store::memory::InMemoryEventStore;

    fn cause(name: &str, category: StaleCauseCategory, reason: &str) -> StaleCause {
        StaleCause::new(AssetPartitionKey::unpartitioned(AssetKey::new(name)), category, reason)
    }

    #[test]
    fn categories_order_code_first() {
        assert!(StaleCauseCategory::Code < StaleCauseCategory::Data);
        assert!(StaleCauseCategory::Data < StaleCauseCategory::Dependencies);
        let code = cause("b", StaleCauseCategory::Code, "has a new code version");
        let data = cause("a", StaleCauseCategory::Data, "has a new data version");
        assert!(code < data);
    }

    #[test]
    fn display() {
        let c = cause("asset1", StaleCauseCategory::Code, "has a new code version");
        assert_eq!(c.to_string(), "asset1 has a new code version");
        assert_eq!(StaleStatus::Stale.to_string(), "stale");
    }

    #[test]
    fn serialized_names() {
        assert_eq!(serde_json::to_string(&StaleStatus::Missing).unwrap(), r#""MISSING""#);
        assert_eq!(
            serde_json::to_string(&StaleCauseCategory::Dependencies).unwrap(),
            r#""DEPENDENCIES""#
        );
    }

    /// A provider that does no validation of its own.
    struct UncheckedGraph(BTreeMap<AssetKey, AssetNode>);

    impl DependencyGraph for UncheckedGraph {
        fn node(&self, key: &AssetKey) -> Option<&AssetNode> {
            self.0.get(key)
        }
    }

    #[test]
    fn unpartitioned_self_dependency_is_never_compared() {
        let node = AssetNode::materializable("a")
            .with_code_version("1")
            .with_dependency("a");
        let graph = UncheckedGraph(BTreeMap::from([(AssetKey::new("a"), node)]));
        let store = InMemoryEventStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let recorder =
            MaterializationRecorder::new(&graph, &store, PartitionLoadingContext::new(now));
        for minute in 1..=2 {
            recorder
                .materialize(MaterializeRequest::new(
                    AssetKey::new("a"),
                    now + chrono::Duration::minutes(minute),
                ))
                .unwrap();
            let resolver =
                StaleStatusResolver::new(&graph, &store, PartitionLoadingContext::new(now));
            let key = AssetKey::new("a");
            assert_eq!(resolver.get_status(&key, None).unwrap(), StaleStatus::Fresh);
            assert!(resolver.get_stale_causes(&key, None).unwrap().is_empty());
        }
    }

    #[test]
    fn terminal_causes_have_no_children() {
        let leaf = cause("a", StaleCauseCategory::Data, "has a new data version");
        let parent = cause("b", StaleCauseCategory::Data, "has a new dependency data version")
            .with_dependency(leaf.key.clone())
            .with_children(vec![leaf.clone()]);
        assert!(leaf.is_terminal());
        assert!(!parent.is_terminal());
    }
}
