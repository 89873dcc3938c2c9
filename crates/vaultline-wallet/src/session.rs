//! Unlocked wallet session.
//!
//! Unlocking decrypts the vault (migrating it first if it is behind the
//! target version) and places the accounts and the derived key in session
//! storage. Account edits re-encrypt with that key, so the password is only
//! needed to unlock and to change the password. The active account's address
//! and public key are mirrored to persistent storage so they are readable
//! while locked.

use crate::error::WalletError;
use crate::signer::{Signer, SigningDevice};
use crate::vault::EncryptedVault;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use vaultline_crypto::EncryptionKey;
use vaultline_storage::{Storage, StorageExt, StorageUpdate};
use vaultline_types::constants::storage_keys;
use vaultline_types::{Account, Accounts};

pub struct WalletSession {
    vault: EncryptedVault,
    session: Arc<dyn Storage>,
}

impl WalletSession {
    pub fn new(vault: EncryptedVault, session: Arc<dyn Storage>) -> Self {
        Self { vault, session }
    }

    pub fn vault(&self) -> &EncryptedVault {
        &self.vault
    }

    fn persistent(&self) -> &Arc<dyn Storage> {
        self.vault.storage()
    }

    // ── Lock state ───────────────────────────────────────────────────────

    /// Create the vault and start a session with `accounts`.
    ///
    /// The first account (by address) becomes active.
    pub async fn initialize(&self, password: &str, accounts: Accounts) -> Result<(), WalletError> {
        let key = self.vault.create(password, &accounts).await?;
        self.set_active(accounts.values().next())?;
        self.write_session(&accounts, Some(&key))
    }

    /// Decrypt the vault and start a session.
    ///
    /// A vault behind the target schema version is migrated first; if that
    /// fails the vault is left unchanged and the wallet stays locked.
    pub async fn unlock(&self, password: &str) -> Result<Accounts, WalletError> {
        let state = self.vault.load()?.ok_or(WalletError::NotInitialized)?;
        let target = self.vault.migrations().target_version();
        if state.schema_version != target {
            log::info!(
                "vault at version {}, migrating to {}",
                state.schema_version,
                target
            );
            self.vault.migrate(password, target).await?;
        }

        let (accounts, key) = self.vault.open(password).await?;
        self.write_session(&accounts, Some(&key))?;
        log::info!("wallet unlocked ({} accounts)", accounts.len());
        Ok(accounts)
    }

    /// Drop the session accounts and key.
    pub fn lock(&self) -> Result<(), WalletError> {
        self.session.remove_items(&[
            storage_keys::SESSION_ACCOUNTS,
            storage_keys::SESSION_ENCRYPTION_KEY,
        ])?;
        log::info!("wallet locked");
        Ok(())
    }

    pub fn is_unlocked(&self) -> Result<bool, WalletError> {
        Ok(self
            .session
            .get_raw(storage_keys::SESSION_ENCRYPTION_KEY)?
            .is_some())
    }

    /// Lock the session once `delay` elapses.
    ///
    /// Abort the returned handle to cancel.
    pub fn autolock_after(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = session.lock() {
                log::warn!("autolock failed: {}", e);
            }
        })
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    /// Unlocked accounts.
    pub fn accounts(&self) -> Result<Accounts, WalletError> {
        Ok(self.unlocked()?.0)
    }

    pub fn add_account(&self, account: Account) -> Result<(), WalletError> {
        let (mut accounts, key) = self.unlocked()?;
        if accounts.contains_key(&account.address) {
            return Err(WalletError::AccountExists(account.address));
        }
        accounts.insert(account.address.clone(), account.clone());
        self.commit(&accounts, &key)?;
        self.set_active(Some(&account))?;
        log::info!("added account {}", account.address);
        Ok(())
    }

    /// Remove accounts. If the active account is removed, the first
    /// remaining account becomes active.
    pub fn remove_accounts(&self, addresses: &[&str]) -> Result<(), WalletError> {
        let (mut accounts, key) = self.unlocked()?;
        for address in addresses {
            if accounts.remove(*address).is_none() {
                return Err(WalletError::AccountNotFound(address.to_string()));
            }
        }
        self.commit(&accounts, &key)?;

        let active = self.active_account_address()?;
        if active.is_some_and(|a| !accounts.contains_key(&a)) {
            self.set_active(accounts.values().next())?;
        }
        log::info!("removed {} accounts", addresses.len());
        Ok(())
    }

    pub fn rename_account(&self, address: &str, name: &str) -> Result<(), WalletError> {
        let (mut accounts, key) = self.unlocked()?;
        let account = accounts
            .get_mut(address)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        account.name = Some(name.to_string());
        self.commit(&accounts, &key)
    }

    /// Replace an existing account with `account`.
    pub fn update_account(&self, account: Account) -> Result<(), WalletError> {
        let (mut accounts, key) = self.unlocked()?;
        let existing = accounts
            .get_mut(&account.address)
            .ok_or_else(|| WalletError::AccountNotFound(account.address.clone()))?;
        *existing = account;
        self.commit(&accounts, &key)
    }

    pub fn switch_account(&self, address: &str) -> Result<(), WalletError> {
        let accounts = self.accounts()?;
        let account = accounts
            .get(address)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        self.set_active(Some(account))
    }

    /// Address of the active account; readable while locked.
    pub fn active_account_address(&self) -> Result<Option<String>, WalletError> {
        Ok(self
            .persistent()
            .get_item(storage_keys::ACTIVE_ACCOUNT_ADDRESS)?)
    }

    /// Public key of the active account; readable while locked.
    pub fn active_account_public_key(&self) -> Result<Option<String>, WalletError> {
        Ok(self
            .persistent()
            .get_item(storage_keys::ACTIVE_ACCOUNT_PUBLIC_KEY)?)
    }

    /// The active account with its secrets. Requires an unlocked session.
    pub fn active_account(&self) -> Result<Option<Account>, WalletError> {
        let accounts = self.accounts()?;
        Ok(self
            .active_account_address()?
            .and_then(|address| accounts.get(&address).cloned()))
    }

    // ── Signing ──────────────────────────────────────────────────────────

    pub fn signer_for(
        &self,
        address: &str,
        device: Option<Arc<dyn SigningDevice>>,
    ) -> Result<Signer, WalletError> {
        let accounts = self.accounts()?;
        let account = accounts
            .get(address)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        Signer::from_account(account, device)
    }

    pub fn signer_for_active(
        &self,
        device: Option<Arc<dyn SigningDevice>>,
    ) -> Result<Signer, WalletError> {
        let account = self
            .active_account()?
            .ok_or_else(|| WalletError::AccountNotFound("no active account".into()))?;
        Signer::from_account(&account, device)
    }

    // ── Password and reset ───────────────────────────────────────────────

    /// Change the vault password. An open session switches to the new key.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), WalletError> {
        let key = self.vault.change_password(current, new).await?;
        if self.is_unlocked()? {
            self.session.set_item(
                storage_keys::SESSION_ENCRYPTION_KEY,
                &Value::String(key.to_hex()),
            )?;
        }
        Ok(())
    }

    /// Delete the vault, the active-account mirror and the session.
    pub fn reset(&self) -> Result<(), WalletError> {
        self.vault.clear()?;
        self.set_active(None)?;
        self.lock()
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn unlocked(&self) -> Result<(Accounts, EncryptionKey), WalletError> {
        let values = self.session.get(&[
            storage_keys::SESSION_ACCOUNTS,
            storage_keys::SESSION_ENCRYPTION_KEY,
        ])?;
        let (Some(accounts), Some(Value::String(key))) = (
            values.get(storage_keys::SESSION_ACCOUNTS),
            values.get(storage_keys::SESSION_ENCRYPTION_KEY),
        ) else {
            return Err(WalletError::Locked);
        };
        let accounts: Accounts = serde_json::from_value(accounts.clone())
            .map_err(|e| WalletError::Storage(e.into()))?;
        Ok((accounts, EncryptionKey::from_hex(key)?))
    }

    fn commit(&self, accounts: &Accounts, key: &EncryptionKey) -> Result<(), WalletError> {
        self.vault.save_with_key(accounts, key)?;
        self.write_session(accounts, None)
    }

    fn write_session(
        &self,
        accounts: &Accounts,
        key: Option<&EncryptionKey>,
    ) -> Result<(), WalletError> {
        let mut update = StorageUpdate::new();
        update.insert(
            storage_keys::SESSION_ACCOUNTS.to_string(),
            Some(serde_json::to_value(accounts).map_err(|e| WalletError::Storage(e.into()))?),
        );
        if let Some(key) = key {
            update.insert(
                storage_keys::SESSION_ENCRYPTION_KEY.to_string(),
                Some(Value::String(key.to_hex())),
            );
        }
        self.session.set(update)?;
        Ok(())
    }

    fn set_active(&self, account: Option<&Account>) -> Result<(), WalletError> {
        let mut update = StorageUpdate::new();
        update.insert(
            storage_keys::ACTIVE_ACCOUNT_ADDRESS.to_string(),
            account.map(|a| json!(a.address)),
        );
        update.insert(
            storage_keys::ACTIVE_ACCOUNT_PUBLIC_KEY.to_string(),
            account.map(|a| json!(a.public_key)),
        );
        self.persistent().set(update)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::signer::generate_local_account;
    use vaultline_crypto::KdfParams;
    use vaultline_storage::MemoryStorage;

    fn session() -> WalletSession {
        let config = VaultConfig {
            kdf: KdfParams {
                pbkdf2_rounds: 1000,
                argon2_memory_kib: 1024,
                argon2_iterations: 1,
                argon2_parallelism: 1,
            },
            ..VaultConfig::default()
        };
        let vault = EncryptedVault::new(Arc::new(MemoryStorage::persistent()), config);
        WalletSession::new(vault, Arc::new(MemoryStorage::session()))
    }

    fn one_account(address: &str) -> Accounts {
        let mut accounts = Accounts::new();
        accounts.insert(address.into(), Account::local(address, "0xaa", "0xbb"));
        accounts
    }

    #[tokio::test]
    async fn test_initialize_unlocks_and_sets_active() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        assert!(s.is_unlocked().unwrap());
        assert_eq!(s.active_account_address().unwrap().as_deref(), Some("0x1"));
        assert_eq!(s.active_account_public_key().unwrap().as_deref(), Some("0xaa"));
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        s.lock().unwrap();
        assert!(!s.is_unlocked().unwrap());
        assert!(matches!(s.accounts().unwrap_err(), WalletError::Locked));
        // Active account stays readable while locked.
        assert_eq!(s.active_account_address().unwrap().as_deref(), Some("0x1"));

        assert!(matches!(
            s.unlock("wrong").await.unwrap_err(),
            WalletError::InvalidPassword
        ));
        assert!(!s.is_unlocked().unwrap());

        let accounts = s.unlock("pw1").await.unwrap();
        assert_eq!(accounts, one_account("0x1"));
        assert!(s.is_unlocked().unwrap());
    }

    #[tokio::test]
    async fn test_add_account_persists_and_activates() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();

        let added = generate_local_account(Some("second"));
        s.add_account(added.clone()).unwrap();
        assert_eq!(
            s.active_account_address().unwrap().as_deref(),
            Some(added.address.as_str())
        );
        assert!(matches!(
            s.add_account(added.clone()).unwrap_err(),
            WalletError::AccountExists(_)
        ));

        s.lock().unwrap();
        let accounts = s.unlock("pw1").await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[&added.address].name.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_remove_active_falls_back() {
        let s = session();
        let mut accounts = one_account("0x1");
        accounts.insert("0x2".into(), Account::local("0x2", "0xcc", "0xdd"));
        s.initialize("pw1", accounts).await.unwrap();
        s.switch_account("0x2").unwrap();

        s.remove_accounts(&["0x2"]).unwrap();
        assert_eq!(s.active_account_address().unwrap().as_deref(), Some("0x1"));

        s.remove_accounts(&["0x1"]).unwrap();
        assert_eq!(s.active_account_address().unwrap(), None);
        assert_eq!(s.active_account_public_key().unwrap(), None);
        assert!(s.accounts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_account() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        assert!(matches!(
            s.remove_accounts(&["0x9"]).unwrap_err(),
            WalletError::AccountNotFound(_)
        ));
        assert_eq!(s.accounts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_and_update() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        s.rename_account("0x1", "main").unwrap();
        assert_eq!(s.active_account().unwrap().unwrap().name.as_deref(), Some("main"));

        let mut account = s.active_account().unwrap().unwrap();
        account.mnemonic = Some("words".into());
        s.update_account(account).unwrap();
        assert_eq!(
            s.active_account().unwrap().unwrap().mnemonic.as_deref(),
            Some("words")
        );

        assert!(matches!(
            s.rename_account("0x9", "x").unwrap_err(),
            WalletError::AccountNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_edits_require_unlock() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        s.lock().unwrap();
        assert!(matches!(
            s.add_account(generate_local_account(None)).unwrap_err(),
            WalletError::Locked
        ));
        assert!(matches!(s.switch_account("0x1").unwrap_err(), WalletError::Locked));
    }

    #[tokio::test]
    async fn test_change_password_keeps_session_usable() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        s.change_password("pw1", "pw2").await.unwrap();

        s.add_account(generate_local_account(None)).unwrap();

        s.lock().unwrap();
        assert!(matches!(
            s.unlock("pw1").await.unwrap_err(),
            WalletError::InvalidPassword
        ));
        assert_eq!(s.unlock("pw2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reset() {
        let s = session();
        s.initialize("pw1", one_account("0x1")).await.unwrap();
        s.reset().unwrap();
        assert!(!s.is_unlocked().unwrap());
        assert!(!s.vault().is_initialized().unwrap());
        assert_eq!(s.active_account_address().unwrap(), None);
        assert!(matches!(
            s.unlock("pw1").await.unwrap_err(),
            WalletError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn test_signer_for_active() {
        let s = session();
        let account = generate_local_account(None);
        let mut accounts = Accounts::new();
        accounts.insert(account.address.clone(), account.clone());
        s.initialize("pw1", accounts).await.unwrap();

        let signer = s.signer_for_active(None).unwrap();
        assert_eq!(signer.sign(b"msg").unwrap().len(), 64);
        assert!(s.signer_for(&account.address, None).is_ok());
        assert!(matches!(
            s.signer_for("0x9", None).unwrap_err(),
            WalletError::AccountNotFound(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autolock() {
        let s = Arc::new(session());
        s.initialize("pw1", one_account("0x1")).await.unwrap();

        let handle = s.autolock_after(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(s.is_unlocked().unwrap());

        handle.await.unwrap();
        assert!(!s.is_unlocked().unwrap());
    }
}
