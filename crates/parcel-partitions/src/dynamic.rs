//! Runtime-registered partition keys.
//!
//! Dynamic partitions live outside the definition: a [`DynamicPartitionsStore`]
//! holds the registered keys per definition name, in registration order.
//! [`InMemoryDynamicPartitionsStore`] is provided for tests and embedding.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};

/// Source of dynamically registered partition keys.
pub trait DynamicPartitionsStore: Send + Sync {
    /// Returns the registered keys for `name`, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get_dynamic_partitions(&self, name: &str) -> Result<Vec<String>>;

    /// Registers `keys` under `name`. Keys already present are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn add_dynamic_partitions(&self, name: &str, keys: &[String]) -> Result<()>;

    /// Returns true if `key` is registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn has_dynamic_partition(&self, name: &str, key: &str) -> Result<bool> {
        Ok(self.get_dynamic_partitions(name)?.iter().any(|k| k == key))
    }

    /// Removes `key` from `name`. Returns true if it was registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn delete_dynamic_partition(&self, name: &str, key: &str) -> Result<bool>;
}

/// In-memory dynamic partitions store.
///
/// Thread-safe via `RwLock`; not durable.
#[derive(Debug, Default)]
pub struct InMemoryDynamicPartitionsStore {
    partitions: RwLock<HashMap<String, Vec<String>>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryDynamicPartitionsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DynamicPartitionsStore for InMemoryDynamicPartitionsStore {
    fn get_dynamic_partitions(&self, name: &str) -> Result<Vec<String>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions.get(name).cloned().unwrap_or_default())
    }

    fn add_dynamic_partitions(&self, name: &str, keys: &[String]) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        let registered = partitions.entry(name.to_string()).or_default();
        for key in keys {
            if !registered.contains(key) {
                registered.push(key.clone());
            }
        }
        tracing::debug!(name, count = registered.len(), "registered dynamic partitions");
        Ok(())
    }

    fn has_dynamic_partition(&self, name: &str, key: &str) -> Result<bool> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions
            .get(name)
            .is_some_and(|keys| keys.iter().any(|k| k == key)))
    }

    fn delete_dynamic_partition(&self, name: &str, key: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        let Some(registered) = partitions.get_mut(name) else {
            return Ok(false);
        };
        let before = registered.len();
        registered.retain(|k| k != key);
        Ok(registered.len() != before)
    }
}
