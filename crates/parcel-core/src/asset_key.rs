//! Asset identity.
//!
//! An [`AssetKey`] is a non-empty path of string components, rendered for
//! users as the components joined by `/`. An [`AssetPartitionKey`] pairs an
//! asset key with an optional partition key and is the unit that lineage
//! and staleness operate on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator used by [`AssetKey::to_user_string`].
pub const ASSET_KEY_SEPARATOR: char = '/';

/// Path-based asset identifier.
///
/// Ordering is component-wise, which keeps sorted dependency lists stable
/// regardless of how keys were constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    /// Creates a single-component asset key.
    ///
    /// Use [`AssetKey::from_path`] for multi-component keys.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Creates an asset key from path components.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or any component is empty or
    /// contains the `/` separator.
    pub fn from_path<I, S>(path: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            return Err(Error::InvalidAssetKey {
                message: "asset key path must not be empty".into(),
            });
        }
        if let Some(bad) = path
            .iter()
            .find(|c| c.is_empty() || c.contains(ASSET_KEY_SEPARATOR))
        {
            return Err(Error::InvalidAssetKey {
                message: format!("invalid path component '{bad}'"),
            });
        }
        Ok(Self(path))
    }

    /// Returns the path components.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Returns the user-facing representation (`a/b/c`).
    #[must_use]
    pub fn to_user_string(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_user_string())
    }
}

impl FromStr for AssetKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_path(s.split(ASSET_KEY_SEPARATOR))
    }
}

impl From<&str> for AssetKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An asset together with an optional partition.
///
/// `partition_key` is `None` for unpartitioned assets, and for the
/// asset-level view of a partitioned one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPartitionKey {
    /// The asset.
    pub asset_key: AssetKey,
    /// The partition within the asset, if any.
    pub partition_key: Option<String>,
}

impl AssetPartitionKey {
    /// Creates a key addressing one partition of an asset.
    #[must_use]
    pub fn new(asset_key: AssetKey, partition_key: Option<String>) -> Self {
        Self {
            asset_key,
            partition_key,
        }
    }

    /// Creates a key addressing an unpartitioned asset.
    #[must_use]
    pub fn unpartitioned(asset_key: AssetKey) -> Self {
        Self::new(asset_key, None)
    }

    /// Creates a key addressing a named partition.
    #[must_use]
    pub fn partition(asset_key: AssetKey, partition_key: impl Into<String>) -> Self {
        Self::new(asset_key, Some(partition_key.into()))
    }
}

impl From<AssetKey> for AssetPartitionKey {
    fn from(asset_key: AssetKey) -> Self {
        Self::unpartitioned(asset_key)
    }
}

impl fmt::Display for AssetPartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition_key {
            Some(partition) => write!(f, "{}[{partition}]", self.asset_key),
            None => write!(f, "{}", self.asset_key),
        }
    }
}
