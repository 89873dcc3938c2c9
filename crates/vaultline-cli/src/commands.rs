//! CLI command implementations.

use crate::AppContext;
use std::io::Write;
use std::sync::Arc;
use vaultline_storage::{JsonFileStorage, MemoryStorage};
use vaultline_types::constants::algorithm;
use vaultline_types::encoding::{decode_hex_32, encode_hex_prefixed};
use vaultline_types::{Account, Accounts};
use vaultline_wallet::{generate_local_account, EncryptedVault, LocalSigner, WalletSession};

type Result = std::result::Result<(), Box<dyn std::error::Error>>;
type BoxResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn prompt_password(prompt: &str) -> BoxResult<String> {
    let pass = rpassword::prompt_password(prompt)?;
    if pass.is_empty() {
        return Err("password cannot be empty".into());
    }
    Ok(pass)
}

fn prompt_password_confirm(prompt: &str) -> BoxResult<String> {
    let pass = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;
    if pass != confirm {
        return Err("passwords do not match".into());
    }
    Ok(pass)
}

fn open_session(ctx: &AppContext) -> BoxResult<WalletSession> {
    log::debug!("opening vault file {}", ctx.vault_path.display());
    let storage = JsonFileStorage::open(&ctx.vault_path)?;
    let vault = EncryptedVault::new(Arc::new(storage), ctx.config.clone());
    Ok(WalletSession::new(vault, Arc::new(MemoryStorage::session())))
}

/// Like [`open_session`], but fails when there is no vault yet.
fn open_existing(ctx: &AppContext) -> BoxResult<WalletSession> {
    if !ctx.vault_path.exists() {
        return Err(format!(
            "vault file not found: {}\nUse 'create' first, or specify --vault-file",
            ctx.vault_path.display()
        )
        .into());
    }
    let session = open_session(ctx)?;
    if !session.vault().is_initialized()? {
        return Err(format!("no vault in {}", ctx.vault_path.display()).into());
    }
    Ok(session)
}

/// A local account from an imported key, or a freshly generated one.
fn build_account(name: Option<String>, private_key: Option<String>) -> BoxResult<Account> {
    let Some(private_key) = private_key else {
        return Ok(generate_local_account(name.as_deref()));
    };
    let signer = LocalSigner::from_private_key_hex(&private_key)?;
    let mut account = Account::local(
        &signer.address(),
        &encode_hex_prefixed(&signer.public_key()),
        &encode_hex_prefixed(&decode_hex_32(&private_key)?),
    );
    account.name = name;
    Ok(account)
}

fn print_accounts(accounts: &Accounts, active: Option<&str>) {
    if accounts.is_empty() {
        println!("No accounts.");
        return;
    }
    for account in accounts.values() {
        let marker = if active == Some(account.address.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {}  {:<8} {}",
            marker,
            account.address,
            account.kind.name(),
            account.name.as_deref().unwrap_or("")
        );
    }
}

// ─── Operations ─────────────────────────────────────────────────────────────

/// Create the vault holding `account`.
///
/// A legacy vault is sealed with pbkdf2 at schema version 0, the shape
/// vaults had before the argon2 migration.
async fn create_vault(
    session: &WalletSession,
    password: &str,
    account: Account,
    legacy: bool,
) -> BoxResult<()> {
    let mut accounts = Accounts::new();
    accounts.insert(account.address.clone(), account);
    if legacy {
        session
            .vault()
            .create_with_algorithm(password, &accounts, algorithm::PBKDF2, 0)
            .await?;
    } else {
        session.initialize(password, accounts).await?;
    }
    Ok(())
}

/// Migrate to `to_version` (default: latest). Returns (from, to).
async fn migrate_vault(
    session: &WalletSession,
    password: &str,
    to_version: Option<u32>,
) -> BoxResult<(u32, u32)> {
    let vault = session.vault();
    let from = vault
        .load()?
        .ok_or("vault is not initialized")?
        .schema_version;
    let to = to_version.unwrap_or_else(|| vault.migrations().latest_version());
    vault.migrate(password, to).await?;
    Ok((from, to))
}

// ─── Commands ───────────────────────────────────────────────────────────────

pub async fn create(
    ctx: &AppContext,
    name: Option<String>,
    private_key: Option<String>,
    legacy: bool,
) -> Result {
    let session = open_session(ctx)?;
    if session.vault().is_initialized()? {
        return Err(format!(
            "vault already exists: {}\nUse 'reset' first to replace it",
            ctx.vault_path.display()
        )
        .into());
    }

    let account = build_account(name, private_key)?;
    let address = account.address.clone();
    let password = prompt_password_confirm("Vault password: ")?;

    println!("Deriving vault key...");
    create_vault(&session, &password, account, legacy).await?;

    println!("Vault created: {}", ctx.vault_path.display());
    println!("Account: {}", address);
    Ok(())
}

pub async fn unlock(ctx: &AppContext, json: bool) -> Result {
    let session = open_existing(ctx)?;
    let password = prompt_password("Vault password: ")?;
    let accounts = session.unlock(&password).await?;

    if json {
        let public: Vec<_> = accounts.values().map(Account::public).collect();
        println!("{}", serde_json::to_string_pretty(&public)?);
    } else {
        let active = session.active_account_address()?;
        print_accounts(&accounts, active.as_deref());
    }
    Ok(())
}

pub async fn add_account(
    ctx: &AppContext,
    name: Option<String>,
    private_key: Option<String>,
) -> Result {
    let session = open_existing(ctx)?;
    let account = build_account(name, private_key)?;
    let address = account.address.clone();

    let password = prompt_password("Vault password: ")?;
    session.unlock(&password).await?;
    session.add_account(account)?;
    session.lock()?;

    println!("Added account: {}", address);
    Ok(())
}

pub fn info(ctx: &AppContext) -> Result {
    let session = open_existing(ctx)?;
    let vault = session.vault();
    let state = vault.load()?.ok_or("vault is not initialized")?;

    println!("Vault:          {}", ctx.vault_path.display());
    println!("Algorithm:      {}", state.key_derivation_algorithm);
    println!(
        "Schema version: {} (latest {})",
        state.schema_version,
        vault.migrations().latest_version()
    );
    println!("Salt:           {}", hex::encode(&state.salt));
    let params = state.sealed_params(&vault.config().kdf);
    println!(
        "KDF cost:       pbkdf2 {} rounds, argon2 {} KiB x{} (p={})",
        params.pbkdf2_rounds,
        params.argon2_memory_kib,
        params.argon2_iterations,
        params.argon2_parallelism
    );
    if let Some(address) = session.active_account_address()? {
        println!("Active account: {}", address);
    }
    Ok(())
}

pub async fn migrate(ctx: &AppContext, to_version: Option<u32>) -> Result {
    let session = open_existing(ctx)?;
    let password = prompt_password("Vault password: ")?;

    println!("Migrating vault...");
    let (from, to) = migrate_vault(&session, &password, to_version).await?;
    if from == to {
        println!("Vault already at version {}.", to);
    } else {
        let state = session.vault().load()?.ok_or("vault is not initialized")?;
        println!(
            "Migrated version {} -> {} ({})",
            from, to, state.key_derivation_algorithm
        );
    }
    Ok(())
}

pub async fn change_password(ctx: &AppContext) -> Result {
    let session = open_existing(ctx)?;
    let current = prompt_password("Current password: ")?;
    let new = prompt_password_confirm("New password: ")?;

    session.change_password(&current, &new).await?;
    println!("Password changed.");
    Ok(())
}

pub fn reset(ctx: &AppContext, yes: bool) -> Result {
    let session = open_existing(ctx)?;
    if !yes {
        print!(
            "Delete the vault in {}? This cannot be undone [y/N]: ",
            ctx.vault_path.display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }
    session.reset()?;
    println!("Vault deleted.");
    Ok(())
}
