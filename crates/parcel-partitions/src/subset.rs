//! Sets of composite keys over one multi-dimensional definition.
//!
//! A [`MultiPartitionsSubset`] is a value: every operation returns a new
//! subset. Equality is set equality over member keys, so two subsets built
//! from the same keys in different orders compare equal.
//!
//! # Serialization
//!
//! `serialize` always writes the versioned form:
//!
//! ```text
//! {"version":1,"subset":["2024-01-01|eu","2024-01-01|us"]}
//! ```
//!
//! `deserialize` also accepts the legacy bare array (`["2024-01-01|eu"]`),
//! which older writers produced. The canonical key strings are a durable
//! format and must not change.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::PartitionLoadingContext;
use crate::error::{Error, Result};
use crate::multi::{MultiPartitionKey, MultiPartitionsDefinition};

/// Current serialization version.
pub const SUBSET_SERIALIZATION_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum SerializedSubset {
    Versioned { version: u32, subset: Vec<String> },
    Legacy(Vec<String>),
}

/// A set of composite keys sharing one set of dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartitionsSubset {
    dimension_names: Vec<String>,
    keys: BTreeSet<MultiPartitionKey>,
}

impl MultiPartitionsDefinition {
    /// An empty subset of this definition.
    #[must_use]
    pub fn empty_subset(&self) -> MultiPartitionsSubset {
        MultiPartitionsSubset {
            dimension_names: self.dimension_names().into_iter().map(String::from).collect(),
            keys: BTreeSet::new(),
        }
    }

    /// Reads a subset written by [`MultiPartitionsSubset::serialize`] or by a
    /// legacy writer.
    ///
    /// # Errors
    ///
    /// See [`MultiPartitionsSubset::deserialize`].
    pub fn deserialize_subset(&self, serialized: &str) -> Result<MultiPartitionsSubset> {
        MultiPartitionsSubset::deserialize(self, serialized)
    }
}

impl MultiPartitionsSubset {
    /// Dimension names in fixed order.
    #[must_use]
    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    /// A new subset with the canonical key strings added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a string that does not parse against
    /// this subset's dimensions.
    pub fn with_partition_keys<I>(&self, keys: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let parsed = keys
            .into_iter()
            .map(|key| MultiPartitionKey::parse(key.as_ref(), &self.dimension_names))
            .collect::<Result<Vec<_>>>()?;
        self.with_keys(parsed)
    }

    /// A new subset with the keys added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a key over different dimensions.
    pub fn with_keys<I>(&self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = MultiPartitionKey>,
    {
        let mut merged = self.keys.clone();
        for key in keys {
            if !key.has_dimensions(&self.dimension_names) {
                return Err(Error::invalid_key(
                    key.as_str(),
                    format!("expected dimensions {:?}", self.dimension_names),
                ));
            }
            merged.insert(key);
        }
        Ok(Self {
            dimension_names: self.dimension_names.clone(),
            keys: merged,
        })
    }

    /// Members of either subset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the subsets have different dimensions.
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(Self {
            dimension_names: self.dimension_names.clone(),
            keys: self.keys.union(&other.keys).cloned().collect(),
        })
    }

    /// Members of `self` that are not in `other`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the subsets have different dimensions.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(Self {
            dimension_names: self.dimension_names.clone(),
            keys: self.keys.difference(&other.keys).cloned().collect(),
        })
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.dimension_names != other.dimension_names {
            return Err(Error::usage(format!(
                "cannot combine subsets over {:?} and {:?}",
                self.dimension_names, other.dimension_names
            )));
        }
        Ok(())
    }

    /// Member keys, ordered by canonical string.
    #[must_use]
    pub fn get_partition_keys(&self) -> &BTreeSet<MultiPartitionKey> {
        &self.keys
    }

    /// Returns true if `key` is a member.
    #[must_use]
    pub fn contains(&self, key: &MultiPartitionKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Every current key of `definition` that is not a member, in
    /// enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if `definition` has different dimensions, and
    /// propagates enumeration errors.
    pub fn get_partition_keys_not_in_subset(
        &self,
        definition: &MultiPartitionsDefinition,
        ctx: &PartitionLoadingContext<'_>,
    ) -> Result<Vec<MultiPartitionKey>> {
        if definition.dimension_names() != self.dimension_names {
            return Err(Error::usage(format!(
                "subset over {:?} does not belong to definition {}",
                self.dimension_names,
                definition.description()
            )));
        }
        let missing: Vec<MultiPartitionKey> = definition
            .partition_keys(ctx)?
            .into_iter()
            .filter(|key| !self.keys.contains(key))
            .collect();
        debug!(members = self.keys.len(), missing = missing.len(), "computed keys not in subset");
        Ok(missing)
    }

    /// Writes the versioned JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if JSON encoding fails.
    pub fn serialize(&self) -> Result<String> {
        let payload = SerializedSubset::Versioned {
            version: SUBSET_SERIALIZATION_VERSION,
            subset: self.keys.iter().map(|key| key.as_str().to_string()).collect(),
        };
        serde_json::to_string(&payload).map_err(|e| Error::Serialization {
            message: format!("failed to serialize subset: {e}"),
        })
    }

    /// Reads either the versioned or the legacy bare-array form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for malformed JSON or an unsupported
    /// version, and [`Error::InvalidKey`] for keys with the wrong number of
    /// dimension values.
    pub fn deserialize(definition: &MultiPartitionsDefinition, serialized: &str) -> Result<Self> {
        let payload: SerializedSubset =
            serde_json::from_str(serialized).map_err(|e| Error::Serialization {
                message: format!("failed to deserialize subset: {e}"),
            })?;
        let keys = match payload {
            SerializedSubset::Legacy(keys) => keys,
            SerializedSubset::Versioned { version, subset } => {
                if version > SUBSET_SERIALIZATION_VERSION {
                    return Err(Error::Serialization {
                        message: format!("unsupported subset version {version}"),
                    });
                }
                subset
            }
        };
        definition.empty_subset().with_partition_keys(keys)
    }
}
