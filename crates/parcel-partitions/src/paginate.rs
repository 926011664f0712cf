//! Cursor-based pagination over the cartesian product.
//!
//! Dimensions form a mixed-radix number: digit `d` ranges over the positions
//! of dimension `d`, the first dimension is the most significant digit. A
//! page is produced by walking consecutive ordinals and decoding each one,
//! so the cost of a page is proportional to `limit`, never to the product.
//!
//! The cursor is the digit vector of the last key returned, serialised as
//! base64url JSON. It carries no server-side state.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parcel_core::observability::partitions_span;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::PartitionLoadingContext;
use crate::dimension::DimensionKeys;
use crate::error::{Error, Result};
use crate::multi::{MultiPartitionKey, MultiPartitionsDefinition};

const CURSOR_VERSION: u32 = 1;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedResults<T> {
    /// Items on this page.
    pub results: Vec<T>,
    /// Resume token; `None` only when nothing has been returned yet.
    pub cursor: Option<String>,
    /// Whether another call would return more items.
    pub has_more: bool,
}

impl<T> PaginatedResults<T> {
    fn empty(cursor: Option<String>) -> Self {
        Self {
            results: Vec::new(),
            cursor,
            has_more: false,
        }
    }
}

/// Decoded pagination position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCursor {
    /// Format version.
    pub version: u32,
    /// Direction the cursor was produced for.
    pub ascending: bool,
    /// Position of the last returned key in each dimension.
    pub digits: Vec<usize>,
}

impl PartitionCursor {
    /// Encodes the cursor as an opaque token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if JSON encoding fails.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization {
            message: format!("failed to encode cursor: {e}"),
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes an opaque token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCursor`] for anything that is not a cursor of
    /// a supported version.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| Error::invalid_cursor(format!("not base64url: {e}")))?;
        let cursor: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_cursor(format!("malformed cursor: {e}")))?;
        if cursor.version != CURSOR_VERSION {
            return Err(Error::invalid_cursor(format!(
                "unsupported cursor version {}",
                cursor.version
            )));
        }
        Ok(cursor)
    }
}

impl MultiPartitionsDefinition {
    /// Returns up to `limit` keys following `cursor` in enumeration order
    /// (or its reverse when `ascending` is false).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCursor`] for a cursor from another definition
    /// shape or direction, and propagates dimension resolution errors.
    pub fn get_paginated_partition_keys(
        &self,
        ctx: &PartitionLoadingContext<'_>,
        limit: usize,
        ascending: bool,
        cursor: Option<&str>,
    ) -> Result<PaginatedResults<MultiPartitionKey>> {
        let span = partitions_span("paginate", &self.description());
        let _guard = span.enter();

        let dims = self.resolve_dimension_keys(ctx)?;
        let radices: Vec<usize> = dims.iter().map(DimensionKeys::len).collect();
        let total = radices.iter().try_fold(1_u128, |total, radix| {
            total.checked_mul(*radix as u128)
        });
        let Some(total) = total else {
            return Err(Error::usage("partition space is too large to paginate"));
        };
        let passthrough = cursor.map(ToString::to_string);
        if total == 0 {
            debug!("empty dimension, nothing to paginate");
            return Ok(PaginatedResults::empty(passthrough));
        }

        let resume = cursor
            .map(|token| decode_position(token, ascending, &radices))
            .transpose()?;
        let mut next: Option<u128> = match (resume, ascending) {
            (None, true) => Some(0),
            (None, false) => Some(total - 1),
            (Some(last), true) => Some(last + 1).filter(|n| *n < total),
            (Some(last), false) => last.checked_sub(1),
        };

        let mut results = Vec::with_capacity(limit.min(1 << 16));
        let mut last_digits = None;
        while results.len() < limit {
            let Some(ordinal) = next else { break };
            let digits = decode_ordinal(ordinal, &radices);
            if let Some(key) = self.compose(&dims, &digits) {
                results.push(key);
            }
            last_digits = Some(digits);
            next = if ascending {
                Some(ordinal + 1).filter(|n| *n < total)
            } else {
                ordinal.checked_sub(1)
            };
        }

        let cursor = match last_digits {
            Some(digits) => Some(
                PartitionCursor {
                    version: CURSOR_VERSION,
                    ascending,
                    digits,
                }
                .encode()?,
            ),
            None => passthrough,
        };
        debug!(returned = results.len(), has_more = next.is_some(), "paginated partition keys");
        Ok(PaginatedResults {
            results,
            cursor,
            has_more: next.is_some(),
        })
    }
}

fn decode_position(token: &str, ascending: bool, radices: &[usize]) -> Result<u128> {
    let cursor = PartitionCursor::decode(token)?;
    if cursor.ascending != ascending {
        return Err(Error::invalid_cursor(
            "cursor was produced for the opposite direction",
        ));
    }
    if cursor.digits.len() != radices.len() {
        return Err(Error::invalid_cursor(format!(
            "cursor has {} digits, definition has {} dimensions",
            cursor.digits.len(),
            radices.len()
        )));
    }
    let mut ordinal: u128 = 0;
    for (digit, radix) in cursor.digits.iter().zip(radices) {
        if digit >= radix {
            return Err(Error::invalid_cursor(format!(
                "cursor position {digit} is outside a dimension of size {radix}"
            )));
        }
        ordinal = ordinal * (*radix as u128) + (*digit as u128);
    }
    Ok(ordinal)
}

fn decode_ordinal(mut ordinal: u128, radices: &[usize]) -> Vec<usize> {
    let mut digits = vec![0; radices.len()];
    for (slot, radix) in digits.iter_mut().zip(radices).rev() {
        let radix = *radix as u128;
        // Bounded by `radix`, which came from a usize.
        *slot = usize::try_from(ordinal % radix).unwrap_or(usize::MAX);
        ordinal /= radix;
    }
    digits
}
