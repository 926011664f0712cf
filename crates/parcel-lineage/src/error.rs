//! Error types for lineage and staleness resolution.

/// The result type used throughout parcel-lineage.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when recording or resolving lineage.
///
/// A missing record is never an error: it resolves to
/// [`StaleStatus::Missing`](crate::stale::StaleStatus::Missing).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The asset is not part of the dependency graph.
    #[error("unknown asset: {asset_key}")]
    UnknownAsset {
        /// The asset key as rendered by the caller.
        asset_key: String,
    },

    /// The dependency graph contains a cycle that is not a self-dependency.
    #[error("cycle detected in asset graph: {cycle:?}")]
    CycleDetected {
        /// Assets participating in the cycle.
        cycle: Vec<String>,
    },

    /// An asset declares a dependency the graph cannot resolve.
    #[error("invalid dependency for {asset_key}: {reason}")]
    InvalidDependency {
        /// The downstream asset.
        asset_key: String,
        /// Why the dependency was rejected.
        reason: String,
    },

    /// A record request does not fit the asset it targets.
    #[error("invalid record request for {asset_key}: {reason}")]
    InvalidRequest {
        /// The asset the request targeted.
        asset_key: String,
        /// Why the request was rejected.
        reason: String,
    },

    /// A partition space could not be resolved.
    #[error("partitions error: {0}")]
    Partitions(#[from] parcel_partitions::Error),

    /// An event store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from parcel-core.
    #[error("core error: {0}")]
    Core(#[from] parcel_core::Error),
}

impl Error {
    /// Creates an unknown asset error.
    #[must_use]
    pub fn unknown_asset(asset_key: impl ToString) -> Self {
        Self::UnknownAsset {
            asset_key: asset_key.to_string(),
        }
    }

    /// Creates an invalid request error.
    #[must_use]
    pub fn invalid_request(asset_key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            asset_key: asset_key.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid dependency error.
    #[must_use]
    pub fn invalid_dependency(asset_key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidDependency {
            asset_key: asset_key.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }
}
