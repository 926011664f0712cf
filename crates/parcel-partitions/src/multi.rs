//! Multi-dimensional partition definitions and composite keys.
//!
//! A [`MultiPartitionsDefinition`] is the cartesian product of named
//! [`Dimension`]s. Dimensions are held sorted by name; that fixed order
//! decides the canonical string of a [`MultiPartitionKey`] (values joined by
//! `|`), the digit order used by the paginator, and which dimension varies
//! slowest during enumeration.
//!
//! ```rust
//! use parcel_partitions::prelude::*;
//!
//! let def = MultiPartitionsDefinition::new([
//!     ("region", PartitionsDefinition::static_keys(["eu", "us"])?),
//!     ("date", TimeWindowPartitions::daily("2024-01-01")?.into()),
//! ])?;
//! assert_eq!(def.dimension_names(), vec!["date", "region"]);
//! assert_eq!(def.primary_dimension().name(), "date");
//! # Ok::<(), parcel_partitions::Error>(())
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::context::PartitionLoadingContext;
use crate::dimension::{Dimension, DimensionKeys, PartitionsDefinition};
use crate::error::{Error, Result};
use crate::time_window::{TimeWindow, TimeWindowPartitions};

/// Separator between dimension values in a canonical key.
pub const MULTIPARTITION_KEY_DELIMITER: char = '|';

/// Characters a static key may not contain when used as a dimension.
pub const RESERVED_KEY_CHARACTERS: [char; 4] = ['|', '[', ']', ','];

/// Tag prefix for per-dimension partition tags.
pub const MULTIDIMENSIONAL_PARTITION_PREFIX: &str = "parcel/partition/";

/// Tag name carrying the value of `dimension`.
#[must_use]
pub fn multidimensional_partition_tag(dimension: &str) -> String {
    format!("{MULTIDIMENSIONAL_PARTITION_PREFIX}{dimension}")
}

/// A composite key with one value per dimension.
///
/// Identity, hashing and `Ord` are all on the canonical string.
#[derive(Debug, Clone)]
pub struct MultiPartitionKey {
    canonical: String,
    keys_by_dimension: BTreeMap<String, String>,
}

impl MultiPartitionKey {
    /// Builds a key from `(dimension, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if no pairs are given, a dimension
    /// repeats, or a value contains the `|` delimiter.
    pub fn from_dimension_values<I, K, V>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut keys_by_dimension = BTreeMap::new();
        for (dimension, value) in values {
            let dimension = dimension.into();
            let value = value.into();
            if value.contains(MULTIPARTITION_KEY_DELIMITER) {
                return Err(Error::invalid_key(value, "contains the '|' delimiter"));
            }
            if keys_by_dimension.insert(dimension.clone(), value).is_some() {
                return Err(Error::invalid_key(
                    dimension,
                    "dimension given more than once",
                ));
            }
        }
        if keys_by_dimension.is_empty() {
            return Err(Error::invalid_key("", "at least one dimension is required"));
        }
        Ok(Self::from_sorted(keys_by_dimension))
    }

    /// Parses a canonical string against dimension names given in fixed
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the number of parts does not match.
    pub fn parse<S: AsRef<str>>(canonical: &str, dimension_names: &[S]) -> Result<Self> {
        let parts: Vec<&str> = canonical.split(MULTIPARTITION_KEY_DELIMITER).collect();
        if parts.len() != dimension_names.len() {
            return Err(Error::invalid_key(
                canonical,
                format!(
                    "expected {} dimension values, found {}",
                    dimension_names.len(),
                    parts.len()
                ),
            ));
        }
        Self::from_dimension_values(
            dimension_names
                .iter()
                .map(|name| name.as_ref().to_string())
                .zip(parts),
        )
    }

    /// Rebuilds a key from per-dimension partition tags.
    ///
    /// Returns `None` when no dimension tags are present.
    #[must_use]
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Option<Self> {
        let values: BTreeMap<String, String> = tags
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(MULTIDIMENSIONAL_PARTITION_PREFIX)
                    .map(|dimension| (dimension.to_string(), value.clone()))
            })
            .collect();
        if values.is_empty() {
            return None;
        }
        Self::from_dimension_values(values).ok()
    }

    fn from_sorted(keys_by_dimension: BTreeMap<String, String>) -> Self {
        let canonical = keys_by_dimension
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|");
        Self {
            canonical,
            keys_by_dimension,
        }
    }

    /// The canonical `|`-joined string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Values keyed by dimension name.
    #[must_use]
    pub fn keys_by_dimension(&self) -> &BTreeMap<String, String> {
        &self.keys_by_dimension
    }

    /// Value of one dimension.
    #[must_use]
    pub fn dimension_key(&self, dimension: &str) -> Option<&str> {
        self.keys_by_dimension.get(dimension).map(String::as_str)
    }

    /// Returns true if the key is over exactly `dimension_names`.
    #[must_use]
    pub fn has_dimensions<S: AsRef<str>>(&self, dimension_names: &[S]) -> bool {
        self.keys_by_dimension.len() == dimension_names.len()
            && dimension_names
                .iter()
                .all(|name| self.keys_by_dimension.contains_key(name.as_ref()))
    }

    /// One `parcel/partition/<dimension>` tag per dimension.
    #[must_use]
    pub fn tags(&self) -> BTreeMap<String, String> {
        self.keys_by_dimension
            .iter()
            .map(|(dimension, value)| (multidimensional_partition_tag(dimension), value.clone()))
            .collect()
    }
}

impl PartialEq for MultiPartitionKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for MultiPartitionKey {}

impl Hash for MultiPartitionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for MultiPartitionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MultiPartitionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for MultiPartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<MultiPartitionKey> for String {
    fn from(key: MultiPartitionKey) -> Self {
        key.canonical
    }
}

/// The cartesian product of named dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartitionsDefinition {
    dimensions: Vec<Dimension>,
    primary: Option<usize>,
}

impl MultiPartitionsDefinition {
    /// Creates a definition from `(name, definition)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Definition`] if there are no dimensions, a name is
    /// empty or repeated, more than one dimension is a time-window series, a
    /// static key contains a reserved character, or a dynamic dimension has
    /// no name.
    pub fn new<I, S>(dimensions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, PartitionsDefinition)>,
        S: Into<String>,
    {
        let mut dimensions: Vec<Dimension> = dimensions
            .into_iter()
            .map(|(name, partitions)| Dimension::new(name, partitions))
            .collect();
        if dimensions.is_empty() {
            return Err(Error::definition("at least one dimension is required"));
        }
        dimensions.sort_by(|a, b| a.name().cmp(b.name()));

        for pair in dimensions.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(Error::definition(format!(
                    "dimension names must be distinct, '{}' appears twice",
                    pair[0].name()
                )));
            }
        }

        let mut time_dimensions = 0;
        for dimension in &dimensions {
            if dimension.name().is_empty() {
                return Err(Error::definition("dimension names must be non-empty"));
            }
            match dimension.partitions() {
                PartitionsDefinition::Static(partitions) => {
                    if let Some(bad) = partitions
                        .keys()
                        .iter()
                        .find(|key| key.contains(RESERVED_KEY_CHARACTERS.as_slice()))
                    {
                        return Err(Error::definition(format!(
                            "static partition key '{bad}' in dimension '{}' contains a reserved character ('|', '[', ']' or ',')",
                            dimension.name()
                        )));
                    }
                }
                PartitionsDefinition::Dynamic(dynamic) => {
                    if dynamic.name().is_empty() {
                        return Err(Error::definition(format!(
                            "dynamic partitions definition in dimension '{}' must have a name",
                            dimension.name()
                        )));
                    }
                }
                PartitionsDefinition::TimeWindow(_) => time_dimensions += 1,
            }
        }
        if time_dimensions > 1 {
            return Err(Error::definition(
                "at most one dimension may be a time-window partitions definition",
            ));
        }

        Ok(Self {
            dimensions,
            primary: None,
        })
    }

    /// Declares the primary dimension explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Definition`] if no dimension has that name.
    pub fn with_primary_dimension(mut self, name: &str) -> Result<Self> {
        let index = self
            .dimension_index(name)
            .ok_or_else(|| Error::definition(format!("unknown primary dimension '{name}'")))?;
        self.primary = Some(index);
        Ok(self)
    }

    /// Dimensions in fixed order.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Dimension names in fixed order.
    #[must_use]
    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(Dimension::name).collect()
    }

    /// Looks up a dimension by name.
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimension_index(name).map(|index| &self.dimensions[index])
    }

    fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions
            .binary_search_by(|dimension| dimension.name().cmp(name))
            .ok()
    }

    /// The primary dimension: declared, else the time dimension, else the
    /// first.
    #[must_use]
    pub fn primary_dimension(&self) -> &Dimension {
        let index = self
            .primary
            .or_else(|| self.time_dimension().map(|(index, _)| index))
            .unwrap_or(0);
        &self.dimensions[index]
    }

    /// Every dimension other than the primary.
    pub fn secondary_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        let primary = self.primary_dimension().name().to_string();
        self.dimensions
            .iter()
            .filter(move |dimension| dimension.name() != primary)
    }

    /// The time-window dimension and its position, if any.
    #[must_use]
    pub fn time_dimension(&self) -> Option<(usize, &TimeWindowPartitions)> {
        self.dimensions
            .iter()
            .enumerate()
            .find_map(|(index, dimension)| {
                dimension.partitions().as_time_window().map(|series| (index, series))
            })
    }

    /// Dimension names joined by `|`, for logs.
    #[must_use]
    pub fn description(&self) -> String {
        self.dimension_names().join("|")
    }

    /// Resolves every dimension's key space.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors, notably [`Error::Usage`] for a dynamic
    /// dimension without a store.
    pub fn resolve_dimension_keys<'a>(
        &'a self,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<DimensionKeys<'a>>> {
        self.dimensions
            .iter()
            .map(|dimension| dimension.partitions().resolve_keys(ctx))
            .collect()
    }

    /// Product of dimension sizes, saturating at `usize::MAX`.
    ///
    /// # Errors
    ///
    /// Propagates dimension resolution errors.
    pub fn num_partitions(&self, ctx: &PartitionLoadingContext<'_>) -> Result<usize> {
        Ok(self
            .resolve_dimension_keys(ctx)?
            .iter()
            .fold(1_usize, |total, keys| total.saturating_mul(keys.len())))
    }

    /// Every composite key in enumeration order (first dimension slowest).
    ///
    /// # Errors
    ///
    /// Propagates dimension resolution errors.
    pub fn partition_keys(&self, ctx: &PartitionLoadingContext<'_>) -> Result<Vec<MultiPartitionKey>> {
        let dims = self.resolve_dimension_keys(ctx)?;
        let ranges: Vec<(usize, usize)> = dims.iter().map(|keys| (0, keys.len())).collect();
        let keys = self.product(&dims, &ranges);
        debug!(definition = %self.description(), count = keys.len(), "enumerated multi-partition keys");
        Ok(keys)
    }

    /// Returns true if `key` is a current member. Parts are matched to
    /// dimensions positionally. Never errors.
    #[must_use]
    pub fn has_partition_key(&self, key: &str, ctx: &PartitionLoadingContext<'_>) -> bool {
        let parts: Vec<&str> = key.split(MULTIPARTITION_KEY_DELIMITER).collect();
        parts.len() == self.dimensions.len()
            && self
                .dimensions
                .iter()
                .zip(parts)
                .all(|(dimension, part)| dimension.partitions().has_partition_key(part, ctx))
    }

    /// Parses a canonical string into a key over this definition's
    /// dimensions. Membership is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the part count does not match.
    pub fn parse_key(&self, key: &str) -> Result<MultiPartitionKey> {
        MultiPartitionKey::parse(key, &self.dimension_names())
    }

    /// Every key whose `dimension` value is `value`, in enumeration order.
    /// Empty if `value` is not currently a member of the dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for an unknown dimension and propagates
    /// resolution errors.
    pub fn keys_with_dimension_value(
        &self,
        dimension: &str,
        value: &str,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<MultiPartitionKey>> {
        let fixed = self
            .dimension_index(dimension)
            .ok_or_else(|| Error::usage(format!("unknown dimension '{dimension}'")))?;
        let dims = self.resolve_dimension_keys(ctx)?;
        let Some(position) = dims[fixed].position(value) else {
            return Ok(Vec::new());
        };
        let ranges: Vec<(usize, usize)> = dims
            .iter()
            .enumerate()
            .map(|(index, keys)| {
                if index == fixed {
                    (position, position + 1)
                } else {
                    (0, keys.len())
                }
            })
            .collect();
        Ok(self.product(&dims, &ranges))
    }

    /// Time window of the time dimension value in `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the definition has no time dimension and
    /// [`Error::InvalidKey`] if `key` does not parse or its time value is not
    /// a window of the series.
    pub fn time_window_for_key(&self, key: &str) -> Result<TimeWindow> {
        let (index, series) = self
            .time_dimension()
            .ok_or_else(|| Error::usage("expected a single time dimension"))?;
        let parsed = self.parse_key(key)?;
        let value = parsed
            .dimension_key(self.dimensions[index].name())
            .ok_or_else(|| Error::invalid_key(key, "missing time dimension value"))?;
        series.time_window_for_key(value)
    }

    /// Builds the key for one digit per dimension.
    pub(crate) fn compose(&self, dims: &[DimensionKeys<'_>], digits: &[usize]) -> Option<MultiPartitionKey> {
        let mut keys_by_dimension = BTreeMap::new();
        for ((dimension, keys), digit) in self.dimensions.iter().zip(dims).zip(digits) {
            let value: Cow<'_, str> = keys.get(*digit)?;
            keys_by_dimension.insert(dimension.name().to_string(), value.into_owned());
        }
        Some(MultiPartitionKey::from_sorted(keys_by_dimension))
    }

    /// Enumerates the product of half-open per-dimension position ranges,
    /// first dimension slowest.
    pub(crate) fn product(
        &self,
        dims: &[DimensionKeys<'_>],
        ranges: &[(usize, usize)],
    ) -> Vec<MultiPartitionKey> {
        if ranges.iter().any(|(lo, hi)| lo >= hi) {
            return Vec::new();
        }
        let capacity = ranges
            .iter()
            .fold(1_usize, |total, (lo, hi)| total.saturating_mul(hi - lo));
        let mut keys = Vec::with_capacity(capacity.min(1 << 16));
        let mut digits: Vec<usize> = ranges.iter().map(|(lo, _)| *lo).collect();
        loop {
            if let Some(key) = self.compose(dims, &digits) {
                keys.push(key);
            }
            // Odometer step: advance the last dimension, carrying leftwards.
            let mut position = digits.len();
            loop {
                if position == 0 {
                    return keys;
                }
                position -= 1;
                digits[position] += 1;
                if digits[position] < ranges[position].1 {
                    break;
                }
                digits[position] = ranges[position].0;
            }
        }
    }
}
