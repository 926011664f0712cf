//! Error types for partition definitions and queries.

/// The result type used throughout parcel-partitions.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when defining or querying partition spaces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A partitions definition is invalid. Raised at construction and never
    /// retried.
    #[error("invalid partitions definition: {message}")]
    Definition {
        /// Description of the violated constraint.
        message: String,
    },

    /// A time-window definition is misconfigured (unaligned start, bad format).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },

    /// The caller did not supply something the operation needs, such as a
    /// dynamic partitions store. Retry with the missing context.
    #[error("usage error: {message}")]
    Usage {
        /// Description of the missing context.
        message: String,
    },

    /// A range endpoint is not a member of the definition, or the range is
    /// reversed.
    #[error("invalid partition range {start}..={end}: {reason}")]
    InvalidRange {
        /// Range start as supplied.
        start: String,
        /// Range end as supplied.
        end: String,
        /// Why the range was rejected.
        reason: String,
    },

    /// A partition key could not be interpreted against a definition.
    #[error("invalid partition key '{key}': {reason}")]
    InvalidKey {
        /// The key as supplied.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// A pagination cursor could not be decoded or does not belong to the
    /// current pagination session.
    #[error("invalid pagination cursor: {message}")]
    InvalidCursor {
        /// Why the cursor was rejected.
        message: String,
    },

    /// A subset or cursor payload could not be (de)serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A dynamic partitions store operation failed.
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
    /// Creates a definition error.
    #[must_use]
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a usage error.
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid range error.
    #[must_use]
    pub fn invalid_range(
        start: impl Into<String>,
        end: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRange {
            start: start.into(),
            end: end.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid cursor error.
    #[must_use]
    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursor {
            message: message.into(),
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
