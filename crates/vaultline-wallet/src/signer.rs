//! Per-account signers.
//!
//! Local accounts sign with the Ed25519 key held in the vault. Ledger
//! accounts delegate to a [`SigningDevice`] supplied by the host; Keystone
//! accounts have no signing path and fail with
//! [`WalletError::UnsupportedSignerType`].

use crate::error::WalletError;
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use tiny_keccak::{Hasher, Sha3};
use vaultline_types::encoding::{decode_hex_32, encode_hex_prefixed};
use vaultline_types::{Account, AccountKind};
use zeroize::Zeroize;

/// Scheme byte appended to a single-key public key when deriving an address.
const ED25519_SCHEME: u8 = 0x00;

/// A hardware wallet reachable from the host.
pub trait SigningDevice: Send + Sync {
    /// Sign `payload` with the key at `hd_path`.
    fn sign(&self, hd_path: &str, payload: &[u8]) -> Result<Vec<u8>, WalletError>;
}

// ── Local ────────────────────────────────────────────────────────────────────

/// Ed25519 signer over a vault-held private key.
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, WalletError> {
        let mut bytes =
            decode_hex_32(private_key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_bytes(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Account address: SHA3-256 of the public key followed by the scheme byte.
    pub fn address(&self) -> String {
        let mut hasher = Sha3::v256();
        hasher.update(&self.public_key());
        hasher.update(&[ED25519_SCHEME]);
        let mut out = [0u8; 32];
        hasher.finalize(&mut out);
        encode_hex_prefixed(&out)
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.key.sign(payload).to_bytes().to_vec()
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

/// Generate a fresh local account with a random Ed25519 key.
pub fn generate_local_account(name: Option<&str>) -> Account {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let signer = LocalSigner {
        key: SigningKey::from_bytes(&seed),
    };
    let mut account = Account::local(
        &signer.address(),
        &encode_hex_prefixed(&signer.public_key()),
        &encode_hex_prefixed(&seed),
    );
    account.name = name.map(str::to_string);
    seed.zeroize();
    account
}

// ── Hardware ─────────────────────────────────────────────────────────────────

/// Signer that forwards to an external device.
#[derive(Clone)]
pub struct HardwareSigner {
    pub hd_path: String,
    pub public_key: String,
    device: Option<Arc<dyn SigningDevice>>,
}

impl HardwareSigner {
    pub fn new(hd_path: &str, public_key: &str, device: Option<Arc<dyn SigningDevice>>) -> Self {
        Self {
            hd_path: hd_path.to_string(),
            public_key: public_key.to_string(),
            device,
        }
    }
}

impl fmt::Debug for HardwareSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareSigner")
            .field("hd_path", &self.hd_path)
            .field("public_key", &self.public_key)
            .field("connected", &self.device.is_some())
            .finish()
    }
}

// ── Signer ───────────────────────────────────────────────────────────────────

/// Signer for one account, selected by its [`AccountKind`].
#[derive(Debug)]
pub enum Signer {
    Local(LocalSigner),
    Ledger(HardwareSigner),
    Keystone(HardwareSigner),
}

impl Signer {
    pub fn from_account(
        account: &Account,
        device: Option<Arc<dyn SigningDevice>>,
    ) -> Result<Self, WalletError> {
        match &account.kind {
            AccountKind::Local => Ok(Self::Local(LocalSigner::from_private_key_hex(
                &account.private_key,
            )?)),
            AccountKind::Ledger { hd_path } => Ok(Self::Ledger(HardwareSigner::new(
                hd_path,
                &account.public_key,
                device,
            ))),
            AccountKind::Keystone { hd_path } => Ok(Self::Keystone(HardwareSigner::new(
                hd_path,
                &account.public_key,
                device,
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Ledger(_) => "ledger",
            Self::Keystone(_) => "keystone",
        }
    }

    /// Sign raw bytes.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError> {
        match self {
            Self::Local(signer) => Ok(signer.sign(payload)),
            Self::Ledger(signer) => {
                let device = signer
                    .device
                    .as_ref()
                    .ok_or_else(|| WalletError::DeviceUnavailable("ledger".into()))?;
                device.sign(&signer.hd_path, payload)
            }
            Self::Keystone(_) => Err(WalletError::UnsupportedSignerType("keystone".into())),
        }
    }
}
