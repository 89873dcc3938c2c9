//! Password-encrypted account vault.
//!
//! The whole vault lives under a single persistent key so that the
//! ciphertext, salt, algorithm and schema version can never be observed out
//! of step. Every write is a compare-and-swap against the record that was
//! read, so a concurrent writer makes the update fail instead of being
//! silently overwritten.
//!
//! The record also carries the KDF cost parameters it was sealed with, so a
//! vault opens correctly whatever parameters the current process is
//! configured with. Records written before the parameters were stored fall
//! back to the configured ones.
//!
//! Key derivation is CPU-heavy and runs on the blocking pool.

use crate::config::VaultConfig;
use crate::error::{MigrationError, WalletError};
use crate::migration::{MigrationContext, MigrationEngine, VaultDiff};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use vaultline_crypto::{
    decrypt_accounts, encrypt_accounts, generate_salt, CryptoError, EncryptionKey, KdfParams,
    KdfRegistry,
};
use vaultline_storage::{Storage, StorageExt};
use vaultline_types::constants::storage_keys;
use vaultline_types::encoding::hex_bytes;
use vaultline_types::{Accounts, EncryptedAccounts};
use zeroize::Zeroizing;

/// The persisted vault record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVaultState {
    pub encrypted_accounts: EncryptedAccounts,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    pub key_derivation_algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<KdfParams>,
    #[serde(default)]
    pub schema_version: u32,
}

impl EncryptedVaultState {
    /// Apply a migration diff in place.
    pub fn apply(&mut self, diff: &VaultDiff) {
        if let Some(accounts) = &diff.encrypted_accounts {
            self.encrypted_accounts = accounts.clone();
        }
        if let Some(salt) = &diff.salt {
            self.salt = salt.clone();
        }
        if let Some(alg) = &diff.key_derivation_algorithm {
            self.key_derivation_algorithm = alg.clone();
        }
        if let Some(params) = diff.kdf_params {
            self.kdf_params = Some(params);
        }
        if let Some(version) = diff.schema_version {
            self.schema_version = version;
        }
    }

    /// Parameters the ciphertext was sealed with, or `fallback` for records
    /// that predate storing them.
    pub fn sealed_params(&self, fallback: &KdfParams) -> KdfParams {
        self.kdf_params.unwrap_or(*fallback)
    }

    fn migration_context(&self, password: &str, fallback: &KdfParams) -> MigrationContext {
        MigrationContext {
            password: Zeroizing::new(password.to_string()),
            salt: self.salt.clone(),
            encrypted_accounts: self.encrypted_accounts.clone(),
            key_derivation_algorithm: self.key_derivation_algorithm.clone(),
            kdf_params: self.sealed_params(fallback),
        }
    }
}

/// Stored record plus the raw JSON it was read from, for compare-and-swap.
struct Snapshot {
    raw: Value,
    state: EncryptedVaultState,
}

/// Handle to the vault record in a persistent [`Storage`].
#[derive(Clone)]
pub struct EncryptedVault {
    storage: Arc<dyn Storage>,
    kdf: Arc<KdfRegistry>,
    migrations: Arc<MigrationEngine>,
    config: VaultConfig,
}

impl EncryptedVault {
    pub fn new(storage: Arc<dyn Storage>, config: VaultConfig) -> Self {
        Self {
            storage,
            kdf: Arc::new(KdfRegistry::standard(&config.kdf)),
            migrations: Arc::new(MigrationEngine::standard()),
            config,
        }
    }

    /// Replace the migration chain.
    pub fn with_migrations(mut self, engine: MigrationEngine) -> Self {
        self.migrations = Arc::new(engine);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn kdf(&self) -> &KdfRegistry {
        &self.kdf
    }

    pub fn migrations(&self) -> &MigrationEngine {
        &self.migrations
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ── Reading ──────────────────────────────────────────────────────────

    /// The stored record, if any.
    pub fn load(&self) -> Result<Option<EncryptedVaultState>, WalletError> {
        Ok(self.snapshot()?.map(|s| s.state))
    }

    pub fn is_initialized(&self) -> Result<bool, WalletError> {
        Ok(self.storage.get_raw(storage_keys::ENCRYPTED_VAULT)?.is_some())
    }

    fn snapshot(&self) -> Result<Option<Snapshot>, WalletError> {
        let Some(raw) = self.storage.get_raw(storage_keys::ENCRYPTED_VAULT)? else {
            return Ok(None);
        };
        let state = serde_json::from_value(raw.clone())
            .map_err(|e| WalletError::Storage(e.into()))?;
        Ok(Some(Snapshot { raw, state }))
    }

    fn require_snapshot(&self) -> Result<Snapshot, WalletError> {
        self.snapshot()?.ok_or(WalletError::NotInitialized)
    }

    // ── Keys ─────────────────────────────────────────────────────────────

    /// Derive a key with the configured parameters on the blocking pool.
    pub async fn derive_key(
        &self,
        algorithm: &str,
        password: &str,
        salt: &[u8],
    ) -> Result<EncryptionKey, WalletError> {
        derive_on_blocking_pool(Arc::clone(&self.kdf), algorithm, password, salt).await
    }

    /// Registry matching `params`, reusing the configured one when they agree.
    fn registry_for(&self, params: &KdfParams) -> Arc<KdfRegistry> {
        if *params == self.config.kdf {
            Arc::clone(&self.kdf)
        } else {
            log::debug!("opening vault with stored KDF parameters {:?}", params);
            Arc::new(KdfRegistry::standard(params))
        }
    }

    /// Fresh random salt of the configured size.
    pub fn rotate_salt(&self) -> Vec<u8> {
        generate_salt(self.config.salt_size)
    }

    /// Derive the key for `state` and check that it opens the vault.
    async fn open_state(
        &self,
        state: &EncryptedVaultState,
        password: &str,
    ) -> Result<(Accounts, EncryptionKey), WalletError> {
        let kdf = self.registry_for(&state.sealed_params(&self.config.kdf));
        let key =
            derive_on_blocking_pool(kdf, &state.key_derivation_algorithm, password, &state.salt)
                .await?;
        let accounts = decrypt_with(&state.encrypted_accounts, &key)?;
        Ok((accounts, key))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Create a vault with the preferred algorithm at the target version.
    ///
    /// Returns the derived key so the caller can start a session without
    /// deriving it again.
    pub async fn create(
        &self,
        password: &str,
        accounts: &Accounts,
    ) -> Result<EncryptionKey, WalletError> {
        let algorithm = self.config.preferred_algorithm.clone();
        let version = self.migrations.target_version();
        self.create_with_algorithm(password, accounts, &algorithm, version)
            .await
    }

    /// Create a vault under an explicit algorithm and schema version.
    ///
    /// Fails with [`WalletError::AlreadyInitialized`] if a vault exists.
    pub async fn create_with_algorithm(
        &self,
        password: &str,
        accounts: &Accounts,
        algorithm: &str,
        schema_version: u32,
    ) -> Result<EncryptionKey, WalletError> {
        if password.is_empty() {
            return Err(WalletError::EmptyPassword);
        }
        if !self.kdf.is_supported(algorithm) {
            return Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()).into());
        }

        let salt = self.rotate_salt();
        let key = self.derive_key(algorithm, password, &salt).await?;
        let state = EncryptedVaultState {
            encrypted_accounts: encrypt_accounts(accounts, &key)?,
            salt,
            key_derivation_algorithm: algorithm.to_string(),
            kdf_params: Some(self.config.kdf),
            schema_version,
        };

        let value = serde_json::to_value(&state).map_err(|e| WalletError::Storage(e.into()))?;
        if !self
            .storage
            .compare_and_swap(storage_keys::ENCRYPTED_VAULT, None, Some(value))?
        {
            return Err(WalletError::AlreadyInitialized);
        }

        log::info!(
            "created vault with {} accounts ({}, version {})",
            accounts.len(),
            algorithm,
            schema_version
        );
        Ok(key)
    }

    /// Decrypt the vault with `password`.
    pub async fn unlock(&self, password: &str) -> Result<Accounts, WalletError> {
        Ok(self.open(password).await?.0)
    }

    /// Decrypt the vault and return the accounts together with the key.
    pub async fn open(&self, password: &str) -> Result<(Accounts, EncryptionKey), WalletError> {
        let snapshot = self.require_snapshot()?;
        self.open_state(&snapshot.state, password).await
    }

    /// Re-encrypt `accounts` under the vault's current algorithm and salt.
    ///
    /// The password is verified against the stored ciphertext first.
    pub async fn save(&self, accounts: &Accounts, password: &str) -> Result<(), WalletError> {
        let snapshot = self.require_snapshot()?;
        let (_, key) = self.open_state(&snapshot.state, password).await?;
        self.write_accounts(&snapshot, accounts, &key)
    }

    /// Like [`save`](Self::save) with an already-derived session key.
    ///
    /// Fails with [`WalletError::StaleSessionKey`] if the key no longer opens
    /// the vault (password changed or vault migrated since it was derived).
    pub fn save_with_key(
        &self,
        accounts: &Accounts,
        key: &EncryptionKey,
    ) -> Result<(), WalletError> {
        let snapshot = self.require_snapshot()?;
        match decrypt_accounts(&snapshot.state.encrypted_accounts, key) {
            Ok(_) => {}
            Err(CryptoError::DecryptionFailed) => return Err(WalletError::StaleSessionKey),
            Err(e) => return Err(e.into()),
        }
        self.write_accounts(&snapshot, accounts, key)
    }

    fn write_accounts(
        &self,
        snapshot: &Snapshot,
        accounts: &Accounts,
        key: &EncryptionKey,
    ) -> Result<(), WalletError> {
        let mut next = snapshot.state.clone();
        next.encrypted_accounts = encrypt_accounts(accounts, key)?;
        self.swap(snapshot, &next)?;
        log::debug!("saved {} accounts", accounts.len());
        Ok(())
    }

    /// Re-encrypt under a new password and a fresh salt.
    ///
    /// The vault moves to the preferred algorithm and the target version.
    /// Returns the new key.
    pub async fn change_password(
        &self,
        current: &str,
        new: &str,
    ) -> Result<EncryptionKey, WalletError> {
        if new.is_empty() {
            return Err(WalletError::EmptyPassword);
        }
        let snapshot = self.require_snapshot()?;
        let (accounts, _) = self.open_state(&snapshot.state, current).await?;

        let algorithm = self.config.preferred_algorithm.clone();
        let salt = self.rotate_salt();
        let key = self.derive_key(&algorithm, new, &salt).await?;
        let next = EncryptedVaultState {
            encrypted_accounts: encrypt_accounts(&accounts, &key)?,
            salt,
            key_derivation_algorithm: algorithm,
            kdf_params: Some(self.config.kdf),
            schema_version: self.migrations.target_version(),
        };
        self.swap(&snapshot, &next)?;
        log::info!("vault password changed");
        Ok(key)
    }

    /// Move the vault to `to_version` through the migration chain.
    ///
    /// The merged diff is applied in one write. Any failing step aborts the
    /// migration and leaves the stored record untouched. Returns the applied
    /// diff, empty when the vault was already at `to_version`.
    pub async fn migrate(&self, password: &str, to_version: u32) -> Result<VaultDiff, WalletError> {
        let snapshot = self.require_snapshot()?;
        let from = snapshot.state.schema_version;
        if from == to_version {
            return Ok(VaultDiff::default());
        }

        let ctx = snapshot.state.migration_context(password, &self.config.kdf);
        let engine = Arc::clone(&self.migrations);
        let params = self.config.kdf;
        let result =
            tokio::task::spawn_blocking(move || engine.migrate(&ctx, from, to_version, &params))
                .await
                .map_err(|e| WalletError::Task(e.to_string()))?;

        let diff = match result {
            Ok(diff) => diff,
            Err(MigrationError::Crypto(CryptoError::DecryptionFailed)) => {
                log::warn!(
                    "vault migration {} -> {} aborted: invalid password",
                    from,
                    to_version
                );
                return Err(WalletError::InvalidPassword);
            }
            Err(e) => {
                log::warn!("vault migration {} -> {} aborted: {}", from, to_version, e);
                return Err(WalletError::MigrationAborted(e));
            }
        };

        if !diff.is_empty() {
            let mut next = snapshot.state.clone();
            next.apply(&diff);
            self.swap(&snapshot, &next)?;
            log::info!(
                "vault migrated from version {} to {} ({})",
                from,
                to_version,
                next.key_derivation_algorithm
            );
        }
        Ok(diff)
    }

    /// Migrate to the engine's target version.
    pub async fn migrate_to_target(&self, password: &str) -> Result<VaultDiff, WalletError> {
        let target = self.migrations.target_version();
        self.migrate(password, target).await
    }

    /// Remove the vault record.
    pub fn clear(&self) -> Result<(), WalletError> {
        self.storage.remove_items(&[storage_keys::ENCRYPTED_VAULT])?;
        log::info!("vault cleared");
        Ok(())
    }

    fn swap(&self, snapshot: &Snapshot, next: &EncryptedVaultState) -> Result<(), WalletError> {
        let value = serde_json::to_value(next).map_err(|e| WalletError::Storage(e.into()))?;
        let swapped = self.storage.compare_and_swap(
            storage_keys::ENCRYPTED_VAULT,
            Some(&snapshot.raw),
            Some(value),
        )?;
        if swapped {
            Ok(())
        } else {
            Err(WalletError::ConcurrentModification)
        }
    }
}

async fn derive_on_blocking_pool(
    kdf: Arc<KdfRegistry>,
    algorithm: &str,
    password: &str,
    salt: &[u8],
) -> Result<EncryptionKey, WalletError> {
    let algorithm = algorithm.to_string();
    let password = Zeroizing::new(password.to_string());
    let salt = salt.to_vec();
    let key = tokio::task::spawn_blocking(move || {
        kdf.derive(&algorithm, password.as_bytes(), &salt)
    })
    .await
    .map_err(|e| WalletError::Task(e.to_string()))??;
    Ok(key)
}

/// Decrypt, mapping an authentication failure to a wrong password.
fn decrypt_with(
    encrypted: &EncryptedAccounts,
    key: &EncryptionKey,
) -> Result<Accounts, WalletError> {
    decrypt_accounts(encrypted, key).map_err(|e| match e {
        CryptoError::DecryptionFailed => WalletError::InvalidPassword,
        other => other.into(),
    })
}
