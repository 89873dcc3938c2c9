//! vaultline wallet core.
//!
//! Provides the password-encrypted account vault, the versioned
//! key-derivation migration engine, the unlocked session built on top of
//! them, and per-account signers.

pub mod config;
pub mod error;
pub mod migration;
pub mod session;
pub mod signer;
pub mod vault;

pub use config::VaultConfig;
pub use error::{MigrationError, WalletError};
pub use migration::{MigrationContext, MigrationEngine, VaultDiff, VaultMigration};
pub use session::WalletSession;
pub use signer::{generate_local_account, HardwareSigner, LocalSigner, Signer, SigningDevice};
pub use vault::{EncryptedVault, EncryptedVaultState};

// Re-export the data model for convenience.
pub use vaultline_types::{Account, AccountKind, Accounts, EncryptedAccounts};
