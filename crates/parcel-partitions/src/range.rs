//! Inclusive ranges of composite keys.

use parcel_core::observability::partitions_span;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::PartitionLoadingContext;
use crate::error::{Error, Result};
use crate::multi::{MultiPartitionKey, MultiPartitionsDefinition};

/// An inclusive `start..=end` range of partition keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    /// First key.
    pub start: String,
    /// Last key.
    pub end: String,
}

impl PartitionKeyRange {
    /// Creates a range.
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl MultiPartitionsDefinition {
    /// Keys between the range endpoints, inclusive, in enumeration order.
    ///
    /// When the endpoints differ in one dimension only, that dimension's own
    /// range is walked with the others held fixed. Otherwise each dimension
    /// is restricted to its own `[start, end]` sub-range and the restricted
    /// product is enumerated, first dimension slowest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if either endpoint is not a member or
    /// a dimension's end precedes its start.
    pub fn get_partition_keys_in_range(
        &self,
        range: &PartitionKeyRange,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<MultiPartitionKey>> {
        let span = partitions_span("range", &self.description());
        let _guard = span.enter();

        let names = self.dimension_names();
        let as_range_error =
            |e: Error| Error::invalid_range(&range.start, &range.end, e.to_string());
        let start = MultiPartitionKey::parse(&range.start, &names).map_err(as_range_error)?;
        let end = MultiPartitionKey::parse(&range.end, &names).map_err(as_range_error)?;

        let dims = self.resolve_dimension_keys(ctx)?;
        let mut spans = Vec::with_capacity(dims.len());
        for (name, keys) in names.iter().zip(&dims) {
            let lo = start.dimension_key(name).unwrap_or_default();
            let hi = end.dimension_key(name).unwrap_or_default();
            let (first, last) = keys
                .span(lo, hi)
                .map_err(|e| Error::invalid_range(&range.start, &range.end, format!("dimension '{name}': {e}")))?;
            spans.push((first, last + 1));
        }

        let varying: Vec<usize> = spans
            .iter()
            .enumerate()
            .filter(|(_, (lo, hi))| hi - lo > 1)
            .map(|(index, _)| index)
            .collect();

        if let [only] = varying.as_slice() {
            debug!(dimension = names[*only], "single varying dimension");
            let mut digits: Vec<usize> = spans.iter().map(|(lo, _)| *lo).collect();
            let (lo, hi) = spans[*only];
            let mut keys = Vec::with_capacity(hi - lo);
            for position in lo..hi {
                digits[*only] = position;
                if let Some(key) = self.compose(&dims, &digits) {
                    keys.push(key);
                }
            }
            return Ok(keys);
        }

        debug!(varying = varying.len(), "restricted product range");
        Ok(self.product(&dims, &spans))
    }
}
