//! Error types and result aliases for parcel.
//!
//! This module defines the error type shared by every parcel crate. Domain
//! crates wrap it in their own error enums via `#[from]`.

/// The result type used throughout parcel-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shared parcel primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An asset key could not be constructed or parsed.
    #[error("invalid asset key: {message}")]
    InvalidAssetKey {
        /// Description of what made the key invalid.
        message: String,
    },

    /// Invalid input was provided (including malformed configuration).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::storage_with_source("failed to read record", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn invalid_input_display() {
        let err = Error::InvalidInput("PARCEL_X must be a usize".into());
        assert_eq!(err.to_string(), "invalid input: PARCEL_X must be a usize");
    }
}
