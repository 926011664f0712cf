//! The asset dependency graph consulted by staleness resolution.
//!
//! [`DependencyGraph`] is the provider seam: anything that can describe an
//! asset and its upstreams can drive the resolver. [`AssetGraph`] is the
//! in-process implementation, backed by a petgraph `DiGraph`.
//!
//! A self-dependency is only valid as a time-partitioned asset reading its
//! own earlier windows, through a time-window mapping with negative offsets.
//! It is kept out of the cycle check. Any other cycle, and any other shape of
//! self-dependency, is rejected at construction.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use parcel_core::AssetKey;
use parcel_partitions::dimension::Dimension;
use parcel_partitions::Partitioning;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mapping::{DimensionMapping, PartitionMapping};

/// Whether parcel produces the asset or only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Produced by a tracked computation.
    Materializable,
    /// Produced elsewhere; versions arrive as observations.
    External,
}

/// An edge to an upstream asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDependency {
    /// The upstream asset.
    pub asset_key: AssetKey,
    /// Explicit mapping; `None` uses [`PartitionMapping::default_for`].
    pub partition_mapping: Option<PartitionMapping>,
}

/// One asset in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNode {
    key: AssetKey,
    kind: AssetKind,
    code_version: Option<String>,
    partitioning: Option<Partitioning>,
    dependencies: Vec<AssetDependency>,
}

impl AssetNode {
    /// A materializable asset with no dependencies.
    #[must_use]
    pub fn materializable(key: impl Into<AssetKey>) -> Self {
        Self::with_kind(key.into(), AssetKind::Materializable)
    }

    /// An external (observable source) asset.
    #[must_use]
    pub fn external(key: impl Into<AssetKey>) -> Self {
        Self::with_kind(key.into(), AssetKind::External)
    }

    fn with_kind(key: AssetKey, kind: AssetKind) -> Self {
        Self {
            key,
            kind,
            code_version: None,
            partitioning: None,
            dependencies: Vec::new(),
        }
    }

    /// Declares a code version.
    #[must_use]
    pub fn with_code_version(mut self, code_version: impl Into<String>) -> Self {
        self.code_version = Some(code_version.into());
        self
    }

    /// Partitions the asset.
    #[must_use]
    pub fn with_partitioning(mut self, partitioning: impl Into<Partitioning>) -> Self {
        self.partitioning = Some(partitioning.into());
        self
    }

    /// Adds an upstream using the default mapping.
    #[must_use]
    pub fn with_dependency(mut self, upstream: impl Into<AssetKey>) -> Self {
        self.dependencies.push(AssetDependency {
            asset_key: upstream.into(),
            partition_mapping: None,
        });
        self
    }

    /// Adds an upstream with an explicit mapping.
    #[must_use]
    pub fn with_mapped_dependency(
        mut self,
        upstream: impl Into<AssetKey>,
        mapping: PartitionMapping,
    ) -> Self {
        self.dependencies.push(AssetDependency {
            asset_key: upstream.into(),
            partition_mapping: Some(mapping),
        });
        self
    }

    /// The asset key.
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    /// Materializable or external.
    #[must_use]
    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Returns true for external assets.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.kind == AssetKind::External
    }

    /// The declared code version.
    #[must_use]
    pub fn code_version(&self) -> Option<&str> {
        self.code_version.as_deref()
    }

    /// The partitioning, if the asset is partitioned.
    #[must_use]
    pub fn partitioning(&self) -> Option<&Partitioning> {
        self.partitioning.as_ref()
    }

    /// Upstream edges in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[AssetDependency] {
        &self.dependencies
    }

    /// The explicit mapping declared for `upstream`, if any.
    #[must_use]
    pub fn mapping_for(&self, upstream: &AssetKey) -> Option<&PartitionMapping> {
        self.dependencies
            .iter()
            .find(|dep| &dep.asset_key == upstream)
            .and_then(|dep| dep.partition_mapping.as_ref())
    }
}

/// Describes assets and their upstreams.
pub trait DependencyGraph {
    /// The asset, if known.
    fn node(&self, key: &AssetKey) -> Option<&AssetNode>;

    /// Direct upstreams of `key`, including `key` itself for a
    /// self-dependency.
    fn upstream_of(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.node(key)
            .map(|node| {
                node.dependencies()
                    .iter()
                    .map(|dep| dep.asset_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The mapping from `downstream` partitions to `upstream` partitions.
    fn partition_mapping(&self, downstream: &AssetKey, upstream: &AssetKey) -> PartitionMapping {
        let node = self.node(downstream);
        node.and_then(|node| node.mapping_for(upstream))
            .cloned()
            .unwrap_or_else(|| {
                PartitionMapping::default_for(
                    node.and_then(AssetNode::partitioning),
                    self.node(upstream).and_then(AssetNode::partitioning),
                )
            })
    }
}

/// Validated, acyclic asset graph.
#[derive(Debug, Clone)]
pub struct AssetGraph {
    nodes: BTreeMap<AssetKey, AssetNode>,
}

impl AssetGraph {
    /// Builds a graph from its assets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAsset`] for an upstream that is not among
    /// `nodes`, [`Error::CycleDetected`] for a cycle between distinct assets,
    /// [`Error::InvalidDependency`] for a self-dependency that does not read
    /// earlier time windows, and an invalid input error for an asset given
    /// twice.
    pub fn new<I>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = AssetNode>,
    {
        let mut by_key = BTreeMap::new();
        for node in nodes {
            let key = node.key.clone();
            if by_key.insert(key.clone(), node).is_some() {
                return Err(parcel_core::Error::InvalidInput(format!(
                    "asset {key} defined more than once"
                ))
                .into());
            }
        }

        let mut graph = DiGraph::new();
        let mut index_map = HashMap::with_capacity(by_key.len());
        for key in by_key.keys() {
            index_map.insert(key.clone(), graph.add_node(key.clone()));
        }
        for (key, node) in &by_key {
            let Some(&to) = index_map.get(key) else {
                continue;
            };
            for dep in node.dependencies() {
                if &dep.asset_key == key {
                    check_self_dependency(node, dep)?;
                    continue;
                }
                let from = *index_map
                    .get(&dep.asset_key)
                    .ok_or_else(|| Error::unknown_asset(&dep.asset_key))?;
                graph.update_edge(from, to, ());
            }
        }

        check_acyclic(&graph)?;
        debug!(assets = by_key.len(), edges = graph.edge_count(), "built asset graph");
        Ok(Self { nodes: by_key })
    }

    /// Number of assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl DependencyGraph for AssetGraph {
    fn node(&self, key: &AssetKey) -> Option<&AssetNode> {
        self.nodes.get(key)
    }
}

/// A self-dependency must read strictly earlier windows of a time-partitioned
/// asset. Anything else would compare the asset against its own latest
/// record and never settle.
fn check_self_dependency(node: &AssetNode, dep: &AssetDependency) -> Result<()> {
    let reads_earlier_windows = match (node.partitioning(), dep.partition_mapping.as_ref()) {
        (Some(partitioning), Some(PartitionMapping::TimeWindow { start_offset, end_offset })) => {
            partitioning.as_time_window().is_some()
                && *start_offset <= *end_offset
                && *end_offset < 0
        }
        (Some(Partitioning::Multi(def)), Some(PartitionMapping::Multi { dimensions })) => {
            let time_name = def
                .time_dimension()
                .and_then(|(index, _)| def.dimensions().get(index))
                .map(Dimension::name);
            time_name.is_some_and(|name| {
                matches!(
                    dimensions.get(name),
                    Some(DimensionMapping::TimeWindow { start_offset, end_offset })
                        if start_offset <= end_offset && *end_offset < 0
                )
            })
        }
        _ => false,
    };
    if reads_earlier_windows {
        Ok(())
    } else {
        Err(Error::invalid_dependency(
            &node.key,
            "a self-dependency must read earlier windows of a time-partitioned asset",
        ))
    }
}

/// Kahn's algorithm over the edges between distinct assets.
fn check_acyclic(graph: &DiGraph<AssetKey, ()>) -> Result<()> {
    let mut in_degree = vec![0_usize; graph.node_count()];
    for edge in graph.edge_references() {
        in_degree[edge.target().index()] += 1;
    }

    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();
    let mut visited = 0_usize;

    while let Some(idx) = queue.pop_front() {
        visited += 1;
        let mut neighbors: Vec<NodeIndex> =
            graph.neighbors_directed(idx, Direction::Outgoing).collect();
        neighbors.sort();
        for neighbor in neighbors {
            let degree = &mut in_degree[neighbor.index()];
            *degree = degree.saturating_sub(1);
            if *degree == 0 {
                queue.push_back(neighbor);
            }
        }
    }

    if visited != graph.node_count() {
        let cycle = graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] > 0)
            .filter_map(|idx| graph.node_weight(idx))
            .map(ToString::to_string)
            .collect();
        return Err(Error::CycleDetected { cycle });
    }
    Ok(())
}
