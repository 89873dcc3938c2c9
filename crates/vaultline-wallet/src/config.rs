//! Vault configuration.

use vaultline_crypto::KdfParams;
use vaultline_types::constants::{algorithm, SALT_SIZE};

/// Configuration for an [`EncryptedVault`](crate::EncryptedVault).
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Cost parameters for the built-in key-derivation algorithms.
    pub kdf: KdfParams,
    /// Algorithm used for new vaults and password changes.
    pub preferred_algorithm: String,
    /// Salt length for new vaults.
    pub salt_size: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            preferred_algorithm: algorithm::ARGON2.to_string(),
            salt_size: SALT_SIZE,
        }
    }
}
