//! Data versions and the provenance recorded alongside them.
//!
//! A data version is an opaque fingerprint of what a computation produced.
//! Each record carries its data version and, when produced by a tracked
//! computation, its provenance: the code version and the data version of
//! every input as observed when the computation ran. Both travel as string
//! tags so records stay readable by older and newer writers.
//!
//! Legacy writers used `logical_version` naming; readers accept both.

use std::collections::BTreeMap;
use std::fmt;

use parcel_core::AssetKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::StorageId;

/// Tag holding a record's data version.
pub const DATA_VERSION_TAG: &str = "parcel/data_version";
/// Legacy name of [`DATA_VERSION_TAG`].
pub const LEGACY_DATA_VERSION_TAG: &str = "parcel/logical_version";
/// Tag holding the code version a record was produced with.
pub const CODE_VERSION_TAG: &str = "parcel/code_version";
/// Prefix of per-input data version tags, followed by `/<asset>`.
pub const INPUT_DATA_VERSION_TAG_PREFIX: &str = "parcel/input_data_version";
/// Legacy name of [`INPUT_DATA_VERSION_TAG_PREFIX`].
pub const LEGACY_INPUT_DATA_VERSION_TAG_PREFIX: &str = "parcel/input_logical_version";
/// Prefix of per-input storage id tags, followed by `/<asset>`.
pub const INPUT_EVENT_POINTER_TAG_PREFIX: &str = "parcel/input_event_pointer";
/// Tag set to `"true"` when the data version was supplied by user code.
pub const DATA_VERSION_IS_USER_PROVIDED_TAG: &str = "parcel/data_version_is_user_provided";

/// An opaque data fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataVersion(String);

/// Version of an external asset that has never been observed.
pub const DEFAULT_DATA_VERSION: &str = "INITIAL";
/// Version of a materializable asset that has never been materialized.
pub const NULL_DATA_VERSION: &str = "NULL";
/// Version of a record that carries no data version.
pub const UNKNOWN_DATA_VERSION: &str = "UNKNOWN";

impl DataVersion {
    /// Wraps a version string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// [`DEFAULT_DATA_VERSION`].
    #[must_use]
    pub fn initial() -> Self {
        Self::new(DEFAULT_DATA_VERSION)
    }

    /// [`NULL_DATA_VERSION`].
    #[must_use]
    pub fn null() -> Self {
        Self::new(NULL_DATA_VERSION)
    }

    /// [`UNKNOWN_DATA_VERSION`].
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_DATA_VERSION)
    }

    /// Returns true for [`NULL_DATA_VERSION`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == NULL_DATA_VERSION
    }

    /// The version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DataVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Derives a data version from a code version and the input data versions.
///
/// SHA-256 over the code version followed by the input versions in asset
/// key order, hex encoded. Equal inputs always give an equal version.
#[must_use]
pub fn compute_logical_data_version(
    code_version: &str,
    input_data_versions: &BTreeMap<AssetKey, DataVersion>,
) -> DataVersion {
    let mut hasher = Sha256::new();
    hasher.update(code_version.as_bytes());
    for version in input_data_versions.values() {
        hasher.update(version.as_str().as_bytes());
    }
    DataVersion(hex::encode(hasher.finalize()))
}

/// Combines the versions of several partitions of one input into one
/// version, independent of the order they were read in.
#[must_use]
pub fn combine_partition_data_versions(versions: &BTreeMap<String, DataVersion>) -> DataVersion {
    let mut hasher = Sha256::new();
    for (partition, version) in versions {
        hasher.update(partition.as_bytes());
        hasher.update([0]);
        hasher.update(version.as_str().as_bytes());
        hasher.update([0]);
    }
    DataVersion(hex::encode(hasher.finalize()))
}

/// Reads a record's data version, accepting the legacy tag name.
#[must_use]
pub fn extract_data_version_from_tags(tags: &BTreeMap<String, String>) -> Option<DataVersion> {
    tags.get(DATA_VERSION_TAG)
        .or_else(|| tags.get(LEGACY_DATA_VERSION_TAG))
        .map(|value| DataVersion::new(value.as_str()))
}

/// Tag carrying the data version of `input`.
#[must_use]
pub fn input_data_version_tag(input: &AssetKey) -> String {
    format!("{INPUT_DATA_VERSION_TAG_PREFIX}/{}", input.to_user_string())
}

/// Tag carrying the storage id of the record `input` was read from.
#[must_use]
pub fn input_event_pointer_tag(input: &AssetKey) -> String {
    format!("{INPUT_EVENT_POINTER_TAG_PREFIX}/{}", input.to_user_string())
}

/// What a record was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataProvenance {
    /// Code version of the computation.
    pub code_version: String,
    /// Data version of each input when the computation ran.
    pub input_data_versions: BTreeMap<AssetKey, DataVersion>,
    /// Storage id of the record each input was read from.
    pub input_storage_ids: BTreeMap<AssetKey, StorageId>,
    /// Whether the output data version was supplied by user code.
    pub is_user_provided: bool,
}

impl DataProvenance {
    /// Reads provenance from record tags. A record without a code version
    /// tag has no provenance.
    #[must_use]
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Option<Self> {
        let code_version = tags.get(CODE_VERSION_TAG)?.clone();
        let mut input_data_versions = BTreeMap::new();
        let mut input_storage_ids = BTreeMap::new();
        for (tag, value) in tags {
            if let Some(asset) = strip_asset_suffix(tag, INPUT_DATA_VERSION_TAG_PREFIX)
                .or_else(|| strip_asset_suffix(tag, LEGACY_INPUT_DATA_VERSION_TAG_PREFIX))
            {
                input_data_versions.insert(asset, DataVersion::new(value.as_str()));
            } else if let Some(asset) = strip_asset_suffix(tag, INPUT_EVENT_POINTER_TAG_PREFIX) {
                if let Ok(storage_id) = value.parse::<StorageId>() {
                    input_storage_ids.insert(asset, storage_id);
                }
            }
        }
        Some(Self {
            code_version,
            input_data_versions,
            input_storage_ids,
            is_user_provided: tags
                .get(DATA_VERSION_IS_USER_PROVIDED_TAG)
                .is_some_and(|value| value == "true"),
        })
    }
}

fn strip_asset_suffix(tag: &str, prefix: &str) -> Option<AssetKey> {
    let rest = tag.strip_prefix(prefix)?.strip_prefix('/')?;
    rest.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn logical_version_is_deterministic() {
        let empty = BTreeMap::new();
        assert_eq!(
            compute_logical_data_version("a", &empty),
            compute_logical_data_version("a", &empty)
        );
        assert_ne!(
            compute_logical_data_version("a", &empty),
            compute_logical_data_version("b", &empty)
        );
    }

    #[test]
    fn logical_version_depends_on_inputs() {
        let mut inputs = BTreeMap::new();
        inputs.insert(AssetKey::new("foo"), DataVersion::new("1"));
        let first = compute_logical_data_version("a", &inputs);
        inputs.insert(AssetKey::new("foo"), DataVersion::new("2"));
        assert_ne!(first, compute_logical_data_version("a", &inputs));
    }

    #[test]
    fn partition_combination_is_keyed() {
        let mut one = BTreeMap::new();
        one.insert("alpha".to_string(), DataVersion::new("1"));
        one.insert("beta".to_string(), DataVersion::new("2"));
        let mut swapped = BTreeMap::new();
        swapped.insert("alpha".to_string(), DataVersion::new("2"));
        swapped.insert("beta".to_string(), DataVersion::new("1"));
        assert_ne!(
            combine_partition_data_versions(&one),
            combine_partition_data_versions(&swapped)
        );
    }

    #[test]
    fn provenance_requires_code_version() {
        assert!(DataProvenance::from_tags(&tags(&[(DATA_VERSION_TAG, "x")])).is_none());
    }

    #[test]
    fn provenance_reads_current_tags() {
        let provenance = DataProvenance::from_tags(&tags(&[
            (CODE_VERSION_TAG, "abc"),
            ("parcel/input_data_version/warehouse/orders", "v1"),
            ("parcel/input_event_pointer/warehouse/orders", "42"),
            (DATA_VERSION_IS_USER_PROVIDED_TAG, "true"),
        ]))
        .unwrap();
        let orders = AssetKey::from_path(["warehouse", "orders"]).unwrap();
        assert_eq!(provenance.code_version, "abc");
        assert_eq!(provenance.input_data_versions[&orders], DataVersion::new("v1"));
        assert_eq!(provenance.input_storage_ids[&orders], 42);
        assert!(provenance.is_user_provided);
    }

    #[test]
    fn legacy_tags_are_read() {
        let record_tags = tags(&[
            (LEGACY_DATA_VERSION_TAG, "bar"),
            (CODE_VERSION_TAG, "1"),
            ("parcel/input_logical_version/foo", "foo"),
        ]);
        assert_eq!(
            extract_data_version_from_tags(&record_tags),
            Some(DataVersion::new("bar"))
        );
        let provenance = DataProvenance::from_tags(&record_tags).unwrap();
        assert_eq!(
            provenance.input_data_versions[&AssetKey::new("foo")],
            DataVersion::new("foo")
        );
        assert!(!provenance.is_user_provided);
    }

    #[test]
    fn malformed_pointer_is_ignored() {
        let provenance = DataProvenance::from_tags(&tags(&[
            (CODE_VERSION_TAG, "1"),
            ("parcel/input_event_pointer/foo", "not-a-number"),
        ]))
        .unwrap();
        assert!(provenance.input_storage_ids.is_empty());
    }
}
