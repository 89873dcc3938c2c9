//! Wallet error types.

use thiserror::Error;
use vaultline_crypto::CryptoError;
use vaultline_storage::StorageError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid password")]
    InvalidPassword,

    #[error("password must be at least 1 character")]
    EmptyPassword,

    #[error("migration aborted: {0}")]
    MigrationAborted(#[source] MigrationError),

    #[error("vault is not initialized")]
    NotInitialized,

    #[error("vault is already initialized")]
    AlreadyInitialized,

    #[error("vault record changed during update")]
    ConcurrentModification,

    #[error("wallet is locked")]
    Locked,

    #[error("session key no longer matches the vault")]
    StaleSessionKey,

    #[error("account already exists in wallet: {0}")]
    AccountExists(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("unsupported signer type: {0}")]
    UnsupportedSignerType(String),

    #[error("signing device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("migration with version {0} not available")]
    Unavailable(u32),

    #[error("migration to version {0} cannot be downgraded")]
    NotDowngradable(u32),
}
