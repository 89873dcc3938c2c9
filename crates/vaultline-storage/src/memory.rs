//! In-memory storage area.

use crate::error::StorageError;
use crate::state::StoreState;
use crate::{ChangeReceiver, Storage, StorageArea, StorageUpdate, StorageValues};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Storage area held entirely in memory.
///
/// Used for the session area, and for isolated persistent areas in tests.
pub struct MemoryStorage {
    area: StorageArea,
    state: Mutex<StoreState>,
}

impl MemoryStorage {
    pub fn new(area: StorageArea) -> Self {
        Self {
            area,
            state: Mutex::new(StoreState::new(BTreeMap::new())),
        }
    }

    pub fn persistent() -> Self {
        Self::new(StorageArea::Persistent)
    }

    pub fn session() -> Self {
        Self::new(StorageArea::Session)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }
}

impl Storage for MemoryStorage {
    fn area(&self) -> StorageArea {
        self.area
    }

    fn get(&self, keys: &[&str]) -> Result<StorageValues, StorageError> {
        Ok(self.lock()?.get(keys))
    }

    fn set(&self, update: StorageUpdate) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let staged = state.stage(update);
        state.commit(staged);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        match state.stage_swap(key, expected, new) {
            Some(staged) => {
                state.commit(staged);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> Result<ChangeReceiver, StorageError> {
        Ok(self.lock()?.subscribe())
    }
}
