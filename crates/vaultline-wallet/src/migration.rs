//! Versioned vault migrations.
//!
//! A vault carries a `schema_version`. Migration number `v` moves a vault
//! from version `v - 1` to `v` (upgrade) and, when it has a downgrade, back.
//! Steps never write anything themselves: each returns a [`VaultDiff`], the
//! engine feeds the merged diff into the next step, and the caller applies
//! the final diff to the stored record in one write.
//!
//! Steps read keys with the cost parameters recorded in the vault and write
//! new keys with the parameters the engine is driven with.

use crate::error::MigrationError;
use std::fmt;
use vaultline_crypto::{decrypt_accounts, encrypt_accounts, KdfParams, KdfRegistry};
use vaultline_types::constants::algorithm;
use vaultline_types::EncryptedAccounts;
use zeroize::Zeroizing;

// ── Diff ─────────────────────────────────────────────────────────────────────

/// Partial update to a vault record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultDiff {
    pub encrypted_accounts: Option<EncryptedAccounts>,
    pub salt: Option<Vec<u8>>,
    pub key_derivation_algorithm: Option<String>,
    pub kdf_params: Option<KdfParams>,
    pub schema_version: Option<u32>,
}

impl VaultDiff {
    pub fn is_empty(&self) -> bool {
        self.encrypted_accounts.is_none()
            && self.salt.is_none()
            && self.key_derivation_algorithm.is_none()
            && self.kdf_params.is_none()
            && self.schema_version.is_none()
    }

    /// Overlay `other` on top of this diff; fields set in `other` win.
    pub fn merge(&mut self, other: VaultDiff) {
        if other.encrypted_accounts.is_some() {
            self.encrypted_accounts = other.encrypted_accounts;
        }
        if other.salt.is_some() {
            self.salt = other.salt;
        }
        if other.key_derivation_algorithm.is_some() {
            self.key_derivation_algorithm = other.key_derivation_algorithm;
        }
        if other.kdf_params.is_some() {
            self.kdf_params = other.kdf_params;
        }
        if other.schema_version.is_some() {
            self.schema_version = other.schema_version;
        }
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

/// Everything a migration step may read: the password and the vault fields.
#[derive(Clone)]
pub struct MigrationContext {
    pub password: Zeroizing<String>,
    pub salt: Vec<u8>,
    pub encrypted_accounts: EncryptedAccounts,
    pub key_derivation_algorithm: String,
    /// Cost parameters the current ciphertext was sealed with.
    pub kdf_params: KdfParams,
}

impl MigrationContext {
    /// The context as it looks after `diff` has been applied.
    pub fn with_diff(&self, diff: &VaultDiff) -> Self {
        let mut next = self.clone();
        if let Some(accounts) = &diff.encrypted_accounts {
            next.encrypted_accounts = accounts.clone();
        }
        if let Some(salt) = &diff.salt {
            next.salt = salt.clone();
        }
        if let Some(alg) = &diff.key_derivation_algorithm {
            next.key_derivation_algorithm = alg.clone();
        }
        if let Some(params) = diff.kdf_params {
            next.kdf_params = params;
        }
        next
    }
}

impl fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationContext")
            .field("password", &"<redacted>")
            .field("salt", &hex::encode(&self.salt))
            .field("key_derivation_algorithm", &self.key_derivation_algorithm)
            .field("kdf_params", &self.kdf_params)
            .finish()
    }
}

// ── Migrations ───────────────────────────────────────────────────────────────

/// One migration step. The second argument holds the cost parameters for
/// any key the step derives anew.
pub type MigrationFn = fn(&MigrationContext, &KdfParams) -> Result<VaultDiff, MigrationError>;

/// A numbered migration with an upgrade and an optional downgrade.
#[derive(Clone, Copy)]
pub struct VaultMigration {
    pub name: &'static str,
    pub upgrade: MigrationFn,
    pub downgrade: Option<MigrationFn>,
}

impl fmt::Debug for VaultMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultMigration")
            .field("name", &self.name)
            .field("downgradable", &self.downgrade.is_some())
            .finish()
    }
}

/// Re-encrypt the vault under `target`, keeping the salt.
///
/// The current key is derived with `ctx.kdf_params`, the new one with
/// `params`, which the diff records. Returns an empty diff when the vault already uses `target`. Fails with
/// [`CryptoError::DecryptionFailed`](vaultline_crypto::CryptoError) when the
/// password does not open the vault.
pub fn rekey(
    ctx: &MigrationContext,
    params: &KdfParams,
    target: &str,
) -> Result<VaultDiff, MigrationError> {
    if ctx.key_derivation_algorithm == target {
        return Ok(VaultDiff::default());
    }

    let password = ctx.password.as_bytes();
    let current = KdfRegistry::standard(&ctx.kdf_params).derive(
        &ctx.key_derivation_algorithm,
        password,
        &ctx.salt,
    )?;
    let accounts = decrypt_accounts(&ctx.encrypted_accounts, &current)?;

    let next = KdfRegistry::standard(params).derive(target, password, &ctx.salt)?;
    let encrypted = encrypt_accounts(&accounts, &next)?;

    log::debug!(
        "re-encrypted {} accounts: {} -> {}",
        accounts.len(),
        ctx.key_derivation_algorithm,
        target
    );

    Ok(VaultDiff {
        encrypted_accounts: Some(encrypted),
        key_derivation_algorithm: Some(target.to_string()),
        kdf_params: Some(*params),
        ..VaultDiff::default()
    })
}

fn upgrade_to_argon2(
    ctx: &MigrationContext,
    params: &KdfParams,
) -> Result<VaultDiff, MigrationError> {
    rekey(ctx, params, algorithm::ARGON2)
}

fn downgrade_to_pbkdf2(
    ctx: &MigrationContext,
    params: &KdfParams,
) -> Result<VaultDiff, MigrationError> {
    rekey(ctx, params, algorithm::PBKDF2)
}

/// Migration 1: PBKDF2 to Argon2id.
pub const ARGON2_KEY_DERIVATION: VaultMigration = VaultMigration {
    name: "argon2-key-derivation",
    upgrade: upgrade_to_argon2,
    downgrade: Some(downgrade_to_pbkdf2),
};

// ── Engine ───────────────────────────────────────────────────────────────────

/// Ordered migration chain.
///
/// `migrations[i]` is migration number `first_available_version + i + 1`.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    first_available_version: u32,
    migrations: Vec<VaultMigration>,
    target_version: Option<u32>,
}

impl MigrationEngine {
    pub fn new(migrations: Vec<VaultMigration>) -> Self {
        Self {
            first_available_version: 0,
            migrations,
            target_version: None,
        }
    }

    /// The built-in chain: version 1 moves key derivation to Argon2id.
    pub fn standard() -> Self {
        Self::new(vec![ARGON2_KEY_DERIVATION])
    }

    /// Oldest version the chain can start from.
    pub fn with_first_available_version(mut self, version: u32) -> Self {
        self.first_available_version = version;
        self
    }

    /// Pin the version vaults are migrated to on unlock.
    pub fn with_target_version(mut self, version: u32) -> Self {
        self.target_version = Some(version);
        self
    }

    /// Newest version reachable through the chain.
    pub fn latest_version(&self) -> u32 {
        let steps = u32::try_from(self.migrations.len()).unwrap_or(u32::MAX);
        self.first_available_version.saturating_add(steps)
    }

    /// Version vaults are migrated to on unlock; the latest unless pinned.
    pub fn target_version(&self) -> u32 {
        self.target_version.unwrap_or_else(|| self.latest_version())
    }

    fn migration(&self, version: u32) -> Result<&VaultMigration, MigrationError> {
        version
            .checked_sub(self.first_available_version)
            .and_then(|offset| offset.checked_sub(1))
            .and_then(|index| self.migrations.get(index as usize))
            .ok_or(MigrationError::Unavailable(version))
    }

    /// Compute the diff that moves a vault at `from` to `to`.
    ///
    /// Steps run in order, each seeing the vault as left by the previous
    /// one. Keys derived along the way use `params`. Equal versions produce
    /// an empty diff. Any failing step aborts the whole chain and nothing is
    /// returned.
    pub fn migrate(
        &self,
        ctx: &MigrationContext,
        from: u32,
        to: u32,
        params: &KdfParams,
    ) -> Result<VaultDiff, MigrationError> {
        let mut diff = VaultDiff::default();
        if from == to {
            return Ok(diff);
        }

        if from < to {
            for version in from + 1..=to {
                let migration = self.migration(version)?;
                let step = (migration.upgrade)(&ctx.with_diff(&diff), params)?;
                diff.merge(step);
                diff.schema_version = Some(version);
                log::debug!("migration {} ({}) upgraded", version, migration.name);
            }
        } else {
            for version in (to + 1..=from).rev() {
                let migration = self.migration(version)?;
                let downgrade = migration
                    .downgrade
                    .ok_or(MigrationError::NotDowngradable(version))?;
                let step = downgrade(&ctx.with_diff(&diff), params)?;
                diff.merge(step);
                diff.schema_version = Some(version - 1);
                log::debug!("migration {} ({}) downgraded", version, migration.name);
            }
        }

        Ok(diff)
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::standard()
    }
}
