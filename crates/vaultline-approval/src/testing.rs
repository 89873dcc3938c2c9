//! Storage double for exercising write failures.

use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vaultline_storage::{
    ChangeReceiver, MemoryStorage, Storage, StorageArea, StorageError, StorageUpdate,
    StorageValues,
};

/// In-memory storage whose compare-and-swap can be made to fail.
#[derive(Clone)]
pub struct FailingCasStorage {
    inner: Arc<MemoryStorage>,
    fail: Arc<AtomicBool>,
}

impl FailingCasStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStorage::persistent()),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Storage for FailingCasStorage {
    fn area(&self) -> StorageArea {
        self.inner.area()
    }

    fn get(&self, keys: &[&str]) -> Result<StorageValues, StorageError> {
        self.inner.get(keys)
    }

    fn set(&self, update: StorageUpdate) -> Result<(), StorageError> {
        self.inner.set(update)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.compare_and_swap(key, expected, new)
    }

    fn subscribe(&self) -> Result<ChangeReceiver, StorageError> {
        self.inner.subscribe()
    }
}
