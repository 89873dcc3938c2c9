//! Which accounts each dApp domain may see.

use crate::error::ApprovalError;
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultline_storage::{Storage, StorageError, StorageExt};
use vaultline_types::constants::storage_keys::DAPP_PERMISSIONS;

/// Domain -> connected account addresses.
pub type Permissions = BTreeMap<String, Vec<String>>;

/// Persisted connection permissions.
#[derive(Clone)]
pub struct PermissionService {
    storage: Arc<dyn Storage>,
}

impl PermissionService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn all(&self) -> Result<Permissions, ApprovalError> {
        Ok(self
            .storage
            .get_item::<Permissions>(DAPP_PERMISSIONS)?
            .unwrap_or_default())
    }

    pub fn is_domain_allowed(&self, domain: &str, address: &str) -> Result<bool, ApprovalError> {
        Ok(self
            .all()?
            .get(domain)
            .is_some_and(|addresses| addresses.iter().any(|a| a == address)))
    }

    pub fn add_domain(&self, domain: &str, address: &str) -> Result<(), ApprovalError> {
        self.update(|permissions| {
            let addresses = permissions.entry(domain.to_string()).or_default();
            if !addresses.iter().any(|a| a == address) {
                addresses.push(address.to_string());
            }
        })?;
        log::info!("{} connected to {}", address, domain);
        Ok(())
    }

    pub fn remove_domain(&self, domain: &str, address: &str) -> Result<(), ApprovalError> {
        self.update(|permissions| {
            if let Some(addresses) = permissions.get_mut(domain) {
                addresses.retain(|a| a != address);
                if addresses.is_empty() {
                    permissions.remove(domain);
                }
            }
        })?;
        log::info!("{} disconnected from {}", address, domain);
        Ok(())
    }

    fn update<F>(&self, mut edit: F) -> Result<(), ApprovalError>
    where
        F: FnMut(&mut Permissions),
    {
        loop {
            let raw = self.storage.get_raw(DAPP_PERMISSIONS)?;
            let mut permissions: Permissions = match &raw {
                Some(value) => serde_json::from_value(value.clone())
                    .map_err(StorageError::from)?,
                None => Permissions::new(),
            };
            edit(&mut permissions);
            let next = serde_json::to_value(&permissions)
                .map_err(StorageError::from)?;
            if self
                .storage
                .compare_and_swap(DAPP_PERMISSIONS, raw.as_ref(), Some(next))?
            {
                return Ok(());
            }
        }
    }
}
