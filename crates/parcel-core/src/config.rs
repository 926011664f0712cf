//! Environment-driven configuration helpers.
//!
//! Configuration structs in parcel start from `Default` and are overridden
//! field by field from `PARCEL_*` environment variables. Unset or blank
//! variables leave the default in place; malformed values are rejected with
//! [`Error::InvalidInput`] naming the variable.

use crate::error::{Error, Result};

/// Reads a trimmed, non-empty environment variable.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Reads an environment variable as a `usize`.
///
/// # Errors
///
/// Returns an error if the variable is set but is not a valid `usize`.
pub fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_usize(name, &v).map(Some)
}

/// Parses a `usize` value attributed to `name`.
///
/// # Errors
///
/// Returns an error naming `name` if `value` is not a valid `usize`.
pub fn parse_usize(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}
