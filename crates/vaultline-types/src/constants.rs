//! Algorithm identifiers, storage key names and sizing constants.

/// Key-derivation algorithm identifiers as persisted in the vault record.
pub mod algorithm {
    /// PBKDF2-HMAC-SHA256.
    pub const PBKDF2: &str = "pbkdf2";
    /// Argon2id.
    pub const ARGON2: &str = "argon2";
}

/// Keys used in the persistent and session storage areas.
pub mod storage_keys {
    /// Persistent: the whole `EncryptedVaultState` record.
    pub const ENCRYPTED_VAULT: &str = "encryptedVault";
    /// Persistent: the single pending approval request slot.
    pub const APPROVAL_REQUEST: &str = "approvalRequest";
    /// Persistent: address of the active account.
    pub const ACTIVE_ACCOUNT_ADDRESS: &str = "activeAccountAddress";
    /// Persistent: public key of the active account.
    pub const ACTIVE_ACCOUNT_PUBLIC_KEY: &str = "activeAccountPublicKey";
    /// Persistent: domain -> allowed addresses.
    pub const DAPP_PERMISSIONS: &str = "dappPermissions";
    /// Persistent: the network the wallet is pointed at.
    pub const ACTIVE_NETWORK: &str = "activeNetwork";
    /// Session: decrypted account set.
    pub const SESSION_ACCOUNTS: &str = "accounts";
    /// Session: hex-encoded derived encryption key.
    pub const SESSION_ENCRYPTION_KEY: &str = "encryptionKey";
}

/// Symmetric key length produced by every key-derivation algorithm.
pub const KEY_SIZE: usize = 32;

/// Default vault salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;
