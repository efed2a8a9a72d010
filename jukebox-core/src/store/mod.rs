//! Persistent Stores
//!
//! Play history and bookmarks live behind a small key-value interface.
//! Read-modify-write sequences are serialized per key; different keys never
//! wait on each other.

mod bookmarks;
mod file;
mod history;
mod memory;

pub use bookmarks::*;
pub use file::*;
pub use history::*;
pub use memory::*;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Store-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value storage.
///
/// A single `get` or `put` is atomic for its key. Sequences of calls are not;
/// use [`Records::modify`] for read-modify-write.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// One lock per key, kept only while someone holds it
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock guarding `key`
    pub fn for_key(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Hand back a lock taken with [`KeyLocks::for_key`].
    ///
    /// The entry is dropped once no other caller holds it. Handles are only
    /// cloned under the map lock, so the count cannot grow while we look.
    pub fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Number of keys with a live lock
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Typed records on top of a [`KeyValueStore`]
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyLocks>,
}

impl Records {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::new()),
        }
    }

    /// Read a record, or its default if absent
    pub fn read<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        match self.store.get(key)? {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            }),
            None => Ok(T::default()),
        }
    }

    /// Read, change and write back a record while holding the key's lock.
    ///
    /// Nothing is written if `change` left the record as it was.
    pub fn modify<T, R>(&self, key: &str, change: impl FnOnce(&mut T) -> R) -> Result<(T, R), StoreError>
    where
        T: DeserializeOwned + Serialize + Default + Clone + PartialEq,
    {
        let lock = self.locks.for_key(key);
        let outcome = {
            let _guard = lock.lock();
            self.modify_locked(key, change)
        };
        self.locks.release(key, lock);
        outcome
    }

    fn modify_locked<T, R>(&self, key: &str, change: impl FnOnce(&mut T) -> R) -> Result<(T, R), StoreError>
    where
        T: DeserializeOwned + Serialize + Default + Clone + PartialEq,
    {
        let before: T = self.read(key)?;
        let mut after = before.clone();
        let result = change(&mut after);

        if after != before {
            let value = serde_json::to_value(&after).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })?;
            self.store.put(key, value)?;
        }

        Ok((after, result))
    }
}
