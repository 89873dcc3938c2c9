//! JSON-file backed persistent storage area.
//!
//! The whole map is rewritten on every commit: the new contents go to a
//! sibling temp file which is then renamed over the original, so a crash
//! mid-write leaves either the old or the new map on disk.

use crate::error::StorageError;
use crate::state::{Staged, StoreState};
use crate::{ChangeReceiver, Storage, StorageArea, StorageUpdate, StorageValues};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub struct JsonFileStorage {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStorage {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let data = std::fs::read(&path)?;
            if data.is_empty() {
                BTreeMap::new()
            } else {
                let parsed: Value = serde_json::from_slice(&data)?;
                match parsed {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => {
                        return Err(StorageError::InvalidFile(format!(
                            "{} does not contain a JSON object",
                            path.display()
                        )))
                    }
                }
            }
        } else {
            BTreeMap::new()
        };
        log::debug!("opened storage file {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            state: Mutex::new(StoreState::new(values)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Write the staged map to disk, then install it in memory.
    fn persist(&self, state: &mut StoreState, staged: Staged) -> Result<(), StorageError> {
        if staged.changes.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&staged.values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        state.commit(staged);
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn area(&self) -> StorageArea {
        StorageArea::Persistent
    }

    fn get(&self, keys: &[&str]) -> Result<StorageValues, StorageError> {
        Ok(self.lock()?.get(keys))
    }

    fn set(&self, update: StorageUpdate) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let staged = state.stage(update);
        self.persist(&mut state, staged)
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
                self.persist(&mut state, staged)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> Result<ChangeReceiver, StorageError> {
        Ok(self.lock()?.subscribe())
    }
}
