//! The single persisted approval slot.

use crate::error::ApprovalError;
use serde_json::Value;
use std::sync::Arc;
use vaultline_storage::{ChangeReceiver, Storage, StorageExt};
use vaultline_types::constants::storage_keys::APPROVAL_REQUEST;
use vaultline_types::{ApprovalRequest, RequestId};

/// A committed change to the slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotChange {
    pub old: Option<ApprovalRequest>,
    pub new: Option<ApprovalRequest>,
}

/// Holds zero or one [`ApprovalRequest`] in a persistent [`Storage`].
#[derive(Clone)]
pub struct ApprovalStore {
    storage: Arc<dyn Storage>,
}

impl ApprovalStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The pending request, if any.
    pub fn current(&self) -> Result<Option<ApprovalRequest>, ApprovalError> {
        Ok(self
            .storage
            .get_raw(APPROVAL_REQUEST)?
            .and_then(|raw| parse_request(&raw)))
    }

    /// Put `request` in the slot, replacing whatever was there.
    pub fn replace(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        self.storage.set_item(APPROVAL_REQUEST, request)?;
        log::debug!("approval slot now holds {}", request.id);
        Ok(())
    }

    /// Vacate the slot if it still holds request `id`.
    ///
    /// Returns `false` when the slot is empty or holds another request.
    pub fn clear_if(&self, id: RequestId) -> Result<bool, ApprovalError> {
        loop {
            let Some(raw) = self.storage.get_raw(APPROVAL_REQUEST)? else {
                return Ok(false);
            };
            if parse_request(&raw).map(|r| r.id) != Some(id) {
                return Ok(false);
            }
            if self
                .storage
                .compare_and_swap(APPROVAL_REQUEST, Some(&raw), None)?
            {
                log::debug!("approval slot cleared ({})", id);
                return Ok(true);
            }
        }
    }

    /// Changes to the slot committed after this call.
    pub fn subscribe(&self) -> Result<SlotSubscription, ApprovalError> {
        Ok(SlotSubscription {
            changes: self.storage.subscribe()?,
        })
    }
}

/// Stream of [`SlotChange`]s in commit order.
pub struct SlotSubscription {
    changes: ChangeReceiver,
}

impl SlotSubscription {
    /// Next change to the slot; `None` once the store is gone.
    pub async fn next(&mut self) -> Option<SlotChange> {
        loop {
            let mut changes = self.changes.recv().await?;
            if let Some(change) = changes.remove(APPROVAL_REQUEST) {
                return Some(SlotChange {
                    old: change.old_value.as_ref().and_then(parse_request),
                    new: change.new_value.as_ref().and_then(parse_request),
                });
            }
        }
    }
}

fn parse_request(raw: &Value) -> Option<ApprovalRequest> {
    match serde_json::from_value(raw.clone()) {
        Ok(request) => Some(request),
        Err(e) => {
            log::warn!("ignoring malformed approval request: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultline_storage::MemoryStorage;
    use vaultline_types::{ApprovalPayload, DappInfo};

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(DappInfo::new("https://dapp.example"), ApprovalPayload::Connect)
    }

    #[test]
    fn test_replace_and_current() {
        let store = ApprovalStore::new(Arc::new(MemoryStorage::persistent()));
        assert_eq!(store.current().unwrap(), None);

        let r1 = request();
        store.replace(&r1).unwrap();
        assert_eq!(store.current().unwrap(), Some(r1.clone()));

        let r2 = request();
        store.replace(&r2).unwrap();
        assert_eq!(store.current().unwrap().map(|r| r.id), Some(r2.id));
    }

    #[test]
    fn test_clear_if_only_matching_id() {
        let store = ApprovalStore::new(Arc::new(MemoryStorage::persistent()));
        let r1 = request();
        let r2 = request();
        store.replace(&r2).unwrap();

        assert!(!store.clear_if(r1.id).unwrap());
        assert_eq!(store.current().unwrap().map(|r| r.id), Some(r2.id));

        assert!(store.clear_if(r2.id).unwrap());
        assert_eq!(store.current().unwrap(), None);
        assert!(!store.clear_if(r2.id).unwrap());
    }

    #[test]
    fn test_malformed_slot_reads_as_empty() {
        let storage = Arc::new(MemoryStorage::persistent());
        storage.set_item(APPROVAL_REQUEST, &"garbage").unwrap();
        let store = ApprovalStore::new(storage);
        assert_eq!(store.current().unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscription_sees_slot_changes_only() {
        let storage = Arc::new(MemoryStorage::persistent());
        let store = ApprovalStore::new(storage.clone());
        let mut sub = store.subscribe().unwrap();

        storage.set_item("unrelated", &1).unwrap();
        let r1 = request();
        store.replace(&r1).unwrap();
        store.clear_if(r1.id).unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.old, None);
        assert_eq!(change.new.map(|r| r.id), Some(r1.id));

        let change = sub.next().await.unwrap();
        assert_eq!(change.old.map(|r| r.id), Some(r1.id));
        assert_eq!(change.new, None);
    }
}
