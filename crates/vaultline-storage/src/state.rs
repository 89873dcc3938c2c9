//! Map + subscriber list shared by the storage backends.

use crate::{ChangeReceiver, StorageChange, StorageChanges, StorageUpdate, StorageValues};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// A write computed against the current map but not yet committed.
pub(crate) struct Staged {
    pub values: BTreeMap<String, Value>,
    pub changes: StorageChanges,
}

pub(crate) struct StoreState {
    values: BTreeMap<String, Value>,
    subscribers: Vec<mpsc::UnboundedSender<StorageChanges>>,
}

impl StoreState {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self, keys: &[&str]) -> StorageValues {
        keys.iter()
            .filter_map(|k| self.values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    /// Compute the map after `update`. Keys whose value does not change are
    /// left out of the change set.
    pub fn stage(&self, update: StorageUpdate) -> Staged {
        let mut values = self.values.clone();
        let mut changes = StorageChanges::new();
        for (key, new_value) in update {
            let old_value = values.get(&key).cloned();
            if old_value == new_value {
                continue;
            }
            match &new_value {
                Some(v) => {
                    values.insert(key.clone(), v.clone());
                }
                None => {
                    values.remove(&key);
                }
            }
            changes.insert(
                key,
                StorageChange {
                    old_value,
                    new_value,
                },
            );
        }
        Staged { values, changes }
    }

    /// Stage a single-key swap, or `None` when `expected` does not match.
    pub fn stage_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Option<Staged> {
        if self.values.get(key) != expected {
            return None;
        }
        let mut update = StorageUpdate::new();
        update.insert(key.to_string(), new);
        Some(self.stage(update))
    }

    /// Install a staged write and notify subscribers in commit order.
    pub fn commit(&mut self, staged: Staged) {
        self.values = staged.values;
        if staged.changes.is_empty() {
            return;
        }
        let changes = staged.changes;
        self.subscribers.retain(|tx| tx.send(changes.clone()).is_ok());
    }

    pub fn subscribe(&mut self) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }
}
