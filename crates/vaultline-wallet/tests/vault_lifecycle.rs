//! End-to-end vault lifecycle against file-backed storage.
//! Run: cargo test -p vaultline-wallet --test vault_lifecycle

use std::sync::Arc;
use vaultline_crypto::KdfParams;
use vaultline_storage::{JsonFileStorage, MemoryStorage, Storage, StorageExt};
use vaultline_types::constants::{algorithm, storage_keys};
use vaultline_wallet::migration::ARGON2_KEY_DERIVATION;
use vaultline_wallet::{
    generate_local_account, Accounts, EncryptedVault, EncryptedVaultState, MigrationContext,
    MigrationEngine, MigrationError, VaultConfig, VaultDiff, VaultMigration, WalletError,
    WalletSession,
};

fn light_config() -> VaultConfig {
    VaultConfig {
        kdf: KdfParams {
            pbkdf2_rounds: 1000,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        },
        ..VaultConfig::default()
    }
}

fn accounts_of(n: usize) -> Accounts {
    (0..n)
        .map(|i| generate_local_account(Some(&format!("account {}", i))))
        .map(|a| (a.address.clone(), a))
        .collect()
}

#[tokio::test]
async fn test_password_roundtrip_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.json");
    let accounts = accounts_of(2);

    {
        let storage = Arc::new(JsonFileStorage::open(&path).expect("open"));
        let vault = EncryptedVault::new(storage, light_config());
        vault.create("pw1", &accounts).await.expect("create");
    }

    // Reopen from disk.
    let storage = Arc::new(JsonFileStorage::open(&path).expect("reopen"));
    let vault = EncryptedVault::new(storage, light_config());
    assert_eq!(vault.unlock("pw1").await.expect("unlock"), accounts);
    assert!(matches!(
        vault.unlock("wrong").await,
        Err(WalletError::InvalidPassword)
    ));

    let raw = std::fs::read_to_string(&path).expect("read");
    for account in accounts.values() {
        assert!(!raw.contains(account.private_key.trim_start_matches("0x")));
    }
}

#[tokio::test]
async fn test_reopen_with_different_cost_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.json");
    let accounts = accounts_of(1);

    {
        let storage = Arc::new(JsonFileStorage::open(&path).expect("open"));
        let vault = EncryptedVault::new(storage, light_config());
        vault.create("pw1", &accounts).await.expect("create");
    }

    let mut config = light_config();
    config.kdf.argon2_memory_kib = 2048;
    let storage = Arc::new(JsonFileStorage::open(&path).expect("reopen"));
    let vault = EncryptedVault::new(storage, config);
    assert_eq!(vault.unlock("pw1").await.expect("unlock"), accounts);

    let stored = vault.load().expect("load").expect("present");
    assert_eq!(stored.kdf_params, Some(light_config().kdf));
}

#[tokio::test]
async fn test_legacy_vault_upgraded_on_unlock() {
    let persistent: Arc<dyn Storage> = Arc::new(MemoryStorage::persistent());
    let vault = EncryptedVault::new(Arc::clone(&persistent), light_config());
    let accounts = accounts_of(1);
    vault
        .create_with_algorithm("pw1", &accounts, algorithm::PBKDF2, 0)
        .await
        .expect("create legacy");
    let legacy: EncryptedVaultState = persistent
        .get_item(storage_keys::ENCRYPTED_VAULT)
        .expect("get")
        .expect("present");

    let session = WalletSession::new(vault.clone(), Arc::new(MemoryStorage::session()));

    // Wrong password: no migration is persisted.
    assert!(session.unlock("wrong").await.is_err());
    assert_eq!(vault.load().expect("load"), Some(legacy.clone()));

    assert_eq!(session.unlock("pw1").await.expect("unlock"), accounts);
    let upgraded = vault.load().expect("load").expect("present");
    assert_eq!(upgraded.key_derivation_algorithm, "argon2");
    assert_eq!(upgraded.schema_version, 1);
    assert_eq!(upgraded.salt, legacy.salt);
}

#[tokio::test]
async fn test_downgrade_and_upgrade_preserve_accounts() {
    let vault = EncryptedVault::new(Arc::new(MemoryStorage::persistent()), light_config());
    let accounts = accounts_of(3);
    vault.create("pw1", &accounts).await.expect("create");

    vault.migrate("pw1", 0).await.expect("downgrade");
    let state = vault.load().expect("load").expect("present");
    assert_eq!(state.key_derivation_algorithm, "pbkdf2");
    assert_eq!(state.schema_version, 0);
    assert_eq!(vault.unlock("pw1").await.expect("unlock"), accounts);

    vault.migrate_to_target("pw1").await.expect("upgrade");
    let state = vault.load().expect("load").expect("present");
    assert_eq!(state.key_derivation_algorithm, "argon2");
    assert_eq!(vault.unlock("pw1").await.expect("unlock"), accounts);
}

fn broken(_: &MigrationContext, _: &KdfParams) -> Result<VaultDiff, MigrationError> {
    Err(MigrationError::Unavailable(99))
}

#[tokio::test]
async fn test_failed_chain_is_atomic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.json");
    let storage = Arc::new(JsonFileStorage::open(&path).expect("open"));
    let engine = MigrationEngine::new(vec![
        ARGON2_KEY_DERIVATION,
        VaultMigration {
            name: "broken",
            upgrade: broken,
            downgrade: None,
        },
    ]);
    let vault = EncryptedVault::new(storage, light_config()).with_migrations(engine);
    vault
        .create_with_algorithm("pw1", &accounts_of(1), algorithm::PBKDF2, 0)
        .await
        .expect("create");
    let before = std::fs::read_to_string(&path).expect("read");

    // Step 1 would succeed; step 2 fails, so nothing is written.
    assert!(matches!(
        vault.migrate_to_target("pw1").await,
        Err(WalletError::MigrationAborted(_))
    ));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    assert_eq!(vault.load().expect("load").expect("present").schema_version, 0);
}
