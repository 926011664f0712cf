//! Single partition dimensions.
//!
//! A [`PartitionsDefinition`] is a closed set of key-space kinds: a fixed
//! static list, a time-window series, or a dynamically registered list. Every
//! kind resolves, against a [`PartitionLoadingContext`], to a
//! [`DimensionKeys`] view that supports positional access without copying
//! the key space.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::debug;

use crate::context::PartitionLoadingContext;
use crate::error::{Error, Result};
use crate::time_window::{TimeWindow, TimeWindowPartitions};

/// A fixed, ordered list of distinct keys.
#[derive(Debug, Clone)]
pub struct StaticPartitions {
    keys: Vec<String>,
    positions: HashMap<String, usize>,
}

impl StaticPartitions {
    /// Creates a static key list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Definition`] if a key appears twice.
    pub fn new<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if positions.insert(key.clone(), index).is_some() {
                return Err(Error::definition(format!("duplicate static partition key '{key}'")));
            }
        }
        Ok(Self { keys, positions })
    }

    /// The keys, in declaration order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Position of `key`, if present.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }
}

impl PartialEq for StaticPartitions {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for StaticPartitions {}

/// Keys registered at runtime under `name` in a dynamic partitions store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicPartitions {
    name: String,
}

impl DynamicPartitions {
    /// Creates a dynamic definition reading keys registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The store name keys are registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The key space of one partition dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionsDefinition {
    /// Fixed key list.
    Static(StaticPartitions),
    /// Time-window series.
    TimeWindow(TimeWindowPartitions),
    /// Runtime-registered keys.
    Dynamic(DynamicPartitions),
}

impl PartitionsDefinition {
    /// Shorthand for a static definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Definition`] on duplicate keys.
    pub fn static_keys<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticPartitions::new(keys).map(Self::Static)
    }

    /// Shorthand for a dynamic definition.
    #[must_use]
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self::Dynamic(DynamicPartitions::new(name))
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::TimeWindow(_) => "time_window",
            Self::Dynamic(_) => "dynamic",
        }
    }

    /// The time-window series, if this is one.
    #[must_use]
    pub fn as_time_window(&self) -> Option<&TimeWindowPartitions> {
        match self {
            Self::TimeWindow(series) => Some(series),
            _ => None,
        }
    }

    /// Resolves the current key space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when a dynamic definition is resolved without
    /// a store, [`Error::Definition`] when it has no name, and store errors
    /// as-is.
    pub fn resolve_keys<'a>(&'a self, ctx: &PartitionLoadingContext<'_>) -> Result<DimensionKeys<'a>> {
        match self {
            Self::Static(partitions) => Ok(DimensionKeys::Static(partitions)),
            Self::TimeWindow(series) => Ok(DimensionKeys::Windows {
                series,
                len: series.num_windows(ctx.effective_dt()),
            }),
            Self::Dynamic(dynamic) => {
                if dynamic.name.is_empty() {
                    return Err(Error::definition("dynamic partitions definition must have a name"));
                }
                let store = ctx.require_dynamic_partitions_store()?;
                let keys = store.get_dynamic_partitions(&dynamic.name)?;
                debug!(name = %dynamic.name, count = keys.len(), "resolved dynamic partitions");
                Ok(DimensionKeys::dynamic(keys))
            }
        }
    }

    /// All keys, in order.
    ///
    /// # Errors
    ///
    /// See [`PartitionsDefinition::resolve_keys`].
    pub fn partition_keys(&self, ctx: &PartitionLoadingContext<'_>) -> Result<Vec<String>> {
        Ok(self.resolve_keys(ctx)?.to_vec())
    }

    /// Number of keys.
    ///
    /// # Errors
    ///
    /// See [`PartitionsDefinition::resolve_keys`].
    pub fn num_partitions(&self, ctx: &PartitionLoadingContext<'_>) -> Result<usize> {
        Ok(self.resolve_keys(ctx)?.len())
    }

    /// Returns true if `key` is currently a member. Never errors: anything
    /// that cannot be resolved is not a member.
    #[must_use]
    pub fn has_partition_key(&self, key: &str, ctx: &PartitionLoadingContext<'_>) -> bool {
        match self {
            Self::Static(partitions) => partitions.position(key).is_some(),
            Self::TimeWindow(series) => series.contains(key, ctx.effective_dt()),
            Self::Dynamic(dynamic) => ctx
                .dynamic_partitions_store()
                .and_then(|store| store.has_dynamic_partition(&dynamic.name, key).ok())
                .unwrap_or(false),
        }
    }

    /// Keys from `start` to `end`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if either endpoint is not a member or
    /// `end` precedes `start`.
    pub fn keys_in_range(
        &self,
        start: &str,
        end: &str,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<String>> {
        let keys = self.resolve_keys(ctx)?;
        let (first, last) = keys.span(start, end)?;
        Ok((first..=last)
            .filter_map(|index| keys.get(index).map(Cow::into_owned))
            .collect())
    }

    /// Time window for `key` on a time-window definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for non-time definitions and
    /// [`Error::InvalidKey`] for keys outside the series.
    pub fn time_window_for_key(&self, key: &str) -> Result<TimeWindow> {
        self.as_time_window()
            .ok_or_else(|| Error::usage("expected a time-window partitions definition"))?
            .time_window_for_key(key)
    }
}

impl From<StaticPartitions> for PartitionsDefinition {
    fn from(partitions: StaticPartitions) -> Self {
        Self::Static(partitions)
    }
}

impl From<TimeWindowPartitions> for PartitionsDefinition {
    fn from(series: TimeWindowPartitions) -> Self {
        Self::TimeWindow(series)
    }
}

impl From<DynamicPartitions> for PartitionsDefinition {
    fn from(dynamic: DynamicPartitions) -> Self {
        Self::Dynamic(dynamic)
    }
}

/// A named axis of a multi-dimensional key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    name: String,
    partitions: PartitionsDefinition,
}

impl Dimension {
    /// Creates a dimension.
    #[must_use]
    pub fn new(name: impl Into<String>, partitions: PartitionsDefinition) -> Self {
        Self {
            name: name.into(),
            partitions,
        }
    }

    /// Dimension name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dimension's key space.
    #[must_use]
    pub fn partitions(&self) -> &PartitionsDefinition {
        &self.partitions
    }
}

/// A resolved, positionally addressable key space.
#[derive(Debug)]
pub enum DimensionKeys<'a> {
    /// Borrowed static keys.
    Static(&'a StaticPartitions),
    /// Snapshot of dynamically registered keys.
    Dynamic {
        /// Keys in registration order.
        keys: Vec<String>,
        /// Key positions.
        positions: HashMap<String, usize>,
    },
    /// The first `len` windows of a series.
    Windows {
        /// The series.
        series: &'a TimeWindowPartitions,
        /// Number of closed windows.
        len: usize,
    },
}

impl DimensionKeys<'_> {
    fn dynamic(keys: Vec<String>) -> Self {
        let positions = keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), index))
            .collect();
        Self::Dynamic { keys, positions }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Static(partitions) => partitions.keys.len(),
            Self::Dynamic { keys, .. } => keys.len(),
            Self::Windows { len, .. } => *len,
        }
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        match self {
            Self::Static(partitions) => partitions.keys.get(index).map(|k| Cow::Borrowed(k.as_str())),
            Self::Dynamic { keys, .. } => keys.get(index).map(|k| Cow::Borrowed(k.as_str())),
            Self::Windows { series, len } => {
                if index >= *len {
                    return None;
                }
                series.key_at(index).map(Cow::Owned)
            }
        }
    }

    /// Position of `key`.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        match self {
            Self::Static(partitions) => partitions.position(key),
            Self::Dynamic { positions, .. } => positions.get(key).copied(),
            Self::Windows { series, len } => series.index_of_key(key).filter(|index| index < len),
        }
    }

    /// Returns true if `key` is a member.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Copies the keys out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        (0..self.len())
            .filter_map(|index| self.get(index).map(Cow::into_owned))
            .collect()
    }

    /// Positions of `start` and `end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if either is not a member or `end`
    /// precedes `start`.
    pub fn span(&self, start: &str, end: &str) -> Result<(usize, usize)> {
        let first = self
            .position(start)
            .ok_or_else(|| Error::invalid_range(start, end, format!("'{start}' is not a partition")))?;
        let last = self
            .position(end)
            .ok_or_else(|| Error::invalid_range(start, end, format!("'{end}' is not a partition")))?;
        if last < first {
            return Err(Error::invalid_range(start, end, "end precedes start"));
        }
        Ok((first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::{DynamicPartitionsStore, InMemoryDynamicPartitionsStore};
    use chrono::{TimeZone, Utc};

    fn ctx() -> PartitionLoadingContext<'static> {
        PartitionLoadingContext::new(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap())
    }

    #[test]
    fn static_keys_keep_declaration_order() {
        let def = PartitionsDefinition::static_keys(["c", "a", "b"]).unwrap();
        assert_eq!(def.partition_keys(&ctx()).unwrap(), vec!["c", "a", "b"]);
        assert!(def.has_partition_key("a", &ctx()));
        assert!(!def.has_partition_key("z", &ctx()));
    }

    #[test]
    fn duplicate_static_keys_are_rejected() {
        let err = PartitionsDefinition::static_keys(["a", "a"]).unwrap_err();
        assert!(matches!(err, Error::Definition { .. }));
    }

    #[test]
    fn time_window_keys_follow_effective_time() {
        let def: PartitionsDefinition = TimeWindowPartitions::daily("2024-01-01").unwrap().into();
        assert_eq!(def.num_partitions(&ctx()).unwrap(), 5);
        let keys = def.resolve_keys(&ctx()).unwrap();
        assert_eq!(keys.get(4).as_deref(), Some("2024-01-05"));
        assert_eq!(keys.get(5), None);
        assert_eq!(keys.position("2024-01-06"), None);
    }

    #[test]
    fn dynamic_without_store_is_usage_error() {
        let def = PartitionsDefinition::dynamic("customers");
        let err = def.partition_keys(&ctx()).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
        assert!(!def.has_partition_key("x", &ctx()));
    }

    #[test]
    fn dynamic_reads_store_in_registration_order() {
        let store = InMemoryDynamicPartitionsStore::new();
        store
            .add_dynamic_partitions("customers", &["z".to_string(), "m".to_string()])
            .unwrap();
        let ctx = ctx().with_dynamic_partitions_store(&store);
        let def = PartitionsDefinition::dynamic("customers");
        assert_eq!(def.partition_keys(&ctx).unwrap(), vec!["z", "m"]);
        assert!(def.has_partition_key("m", &ctx));
    }

    #[test]
    fn unnamed_dynamic_is_definition_error() {
        let store = InMemoryDynamicPartitionsStore::new();
        let ctx = ctx().with_dynamic_partitions_store(&store);
        let err = PartitionsDefinition::dynamic("").partition_keys(&ctx).unwrap_err();
        assert!(matches!(err, Error::Definition { .. }));
    }

    #[test]
    fn keys_in_range_is_inclusive_and_ordered() {
        let def = PartitionsDefinition::static_keys(["1", "2", "3", "4", "5"]).unwrap();
        assert_eq!(def.keys_in_range("2", "4", &ctx()).unwrap(), vec!["2", "3", "4"]);
        assert!(matches!(
            def.keys_in_range("4", "2", &ctx()).unwrap_err(),
            Error::InvalidRange { .. }
        ));
        assert!(matches!(
            def.keys_in_range("0", "2", &ctx()).unwrap_err(),
            Error::InvalidRange { .. }
        ));
    }
}
