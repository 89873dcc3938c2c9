use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaultline_crypto::KdfParams;
use vaultline_wallet::VaultConfig;

mod commands;

/// vaultline command-line interface.
#[derive(Parser)]
#[command(name = "vaultline")]
#[command(about = "Manage an encrypted wallet vault")]
#[command(version)]
struct Cli {
    /// Vault file path.
    #[arg(long)]
    vault_file: Option<String>,

    /// PBKDF2-HMAC-SHA256 rounds for newly sealed pbkdf2 vaults.
    #[arg(long)]
    pbkdf2_rounds: Option<u32>,

    /// Argon2id memory cost in KiB for newly sealed argon2 vaults.
    /// Existing vaults always open with the cost they were sealed with.
    #[arg(long)]
    argon2_memory: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault holding one account.
    Create {
        /// Account name.
        #[arg(long)]
        name: Option<String>,

        /// Import this hex Ed25519 private key instead of generating one.
        #[arg(long)]
        private_key: Option<String>,

        /// Create a version 0 vault sealed with pbkdf2.
        #[arg(long)]
        legacy: bool,
    },

    /// Unlock the vault (upgrading it if needed) and list its accounts.
    Unlock {
        /// Print the accounts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add an account to an existing vault.
    AddAccount {
        /// Account name.
        #[arg(long)]
        name: Option<String>,

        /// Import this hex Ed25519 private key instead of generating one.
        #[arg(long)]
        private_key: Option<String>,
    },

    /// Show the vault's algorithm and schema version.
    Info,

    /// Move the vault to another schema version.
    Migrate {
        /// Target version (defaults to the latest).
        #[arg(long)]
        to_version: Option<u32>,
    },

    /// Re-encrypt the vault under a new password.
    ChangePassword,

    /// Delete the vault.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

/// Application context shared across commands.
pub struct AppContext {
    pub vault_path: PathBuf,
    pub config: VaultConfig,
}

impl AppContext {
    fn from_cli(cli: &Cli) -> Self {
        let vault_path = match cli.vault_file {
            Some(ref path) => PathBuf::from(path),
            None => default_vault_dir().join("vault.json"),
        };

        let defaults = KdfParams::default();
        let kdf = KdfParams {
            pbkdf2_rounds: cli.pbkdf2_rounds.unwrap_or(defaults.pbkdf2_rounds),
            argon2_memory_kib: cli.argon2_memory.unwrap_or(defaults.argon2_memory_kib),
            ..defaults
        };

        Self {
            vault_path,
            config: VaultConfig {
                kdf,
                ..VaultConfig::default()
            },
        }
    }
}

fn default_vault_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultline")
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let ctx = AppContext::from_cli(&cli);

    let result = match cli.command {
        Commands::Create {
            name,
            private_key,
            legacy,
        } => commands::create(&ctx, name, private_key, legacy).await,
        Commands::Unlock { json } => commands::unlock(&ctx, json).await,
        Commands::AddAccount { name, private_key } => {
            commands::add_account(&ctx, name, private_key).await
        }
        Commands::Info => commands::info(&ctx),
        Commands::Migrate { to_version } => commands::migrate(&ctx, to_version).await,
        Commands::ChangePassword => commands::change_password(&ctx).await,
        Commands::Reset { yes } => commands::reset(&ctx, yes),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
