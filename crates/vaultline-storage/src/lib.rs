//! Storage areas for vaultline.
//!
//! A [`Storage`] is a JSON key-value map with three properties the wallet
//! relies on:
//! - writes are committed atomically per call and change sets are delivered to
//!   every subscriber in commit order;
//! - a single key can be updated with [`Storage::compare_and_swap`], which is
//!   how read-modify-write of the vault record and the approval slot stay
//!   consistent;
//! - there are two isolated areas, long-lived ([`StorageArea::Persistent`])
//!   and per-session ([`StorageArea::Session`]).

pub mod error;
pub mod file;
pub mod memory;
mod state;

pub use error::StorageError;
pub use file::JsonFileStorage;
pub use memory::MemoryStorage;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Which storage area a store represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Survives restarts: vault record, approval slot, permissions.
    Persistent,
    /// Cleared on lock or teardown: unlocked accounts and session key.
    Session,
}

/// Old and new value of one key in a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Keys changed by one committed write.
pub type StorageChanges = BTreeMap<String, StorageChange>;

/// Values returned by [`Storage::get`]; absent keys are omitted.
pub type StorageValues = BTreeMap<String, Value>;

/// Partial update: `Some` sets a key, `None` removes it.
pub type StorageUpdate = BTreeMap<String, Option<Value>>;

/// Receiving end of a change subscription.
pub type ChangeReceiver = mpsc::UnboundedReceiver<StorageChanges>;

/// Abstract key-value store with change notification.
pub trait Storage: Send + Sync {
    fn area(&self) -> StorageArea;

    /// Read the given keys.
    fn get(&self, keys: &[&str]) -> Result<StorageValues, StorageError>;

    /// Apply a partial update as one commit.
    fn set(&self, update: StorageUpdate) -> Result<(), StorageError>;

    /// Replace `key` with `new` only if it currently equals `expected`.
    ///
    /// Returns `false` (and writes nothing) when the current value differs.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, StorageError>;

    /// Subscribe to change sets committed after this call.
    fn subscribe(&self) -> Result<ChangeReceiver, StorageError>;
}

/// Typed helpers over any [`Storage`].
pub trait StorageExt {
    /// Read and deserialize one key.
    fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;

    /// Read one key as raw JSON.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Serialize and write one key.
    fn set_item<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError>;

    /// Remove keys in one commit.
    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> StorageExt for S {
    fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get(&[key])?.remove(key))
    }

    fn set_item<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let mut update = StorageUpdate::new();
        update.insert(key.to_string(), Some(serde_json::to_value(value)?));
        self.set(update)
    }

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        let update = keys.iter().map(|k| (k.to_string(), None)).collect();
        self.set(update)
    }
}
