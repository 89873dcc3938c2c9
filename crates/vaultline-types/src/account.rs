//! Wallet accounts and their encrypted envelope.

use crate::encoding::hex_bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// How an account's signing key is held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountKind {
    /// Private key lives in the vault.
    #[default]
    Local,
    /// Key lives on a Ledger device at the given derivation path.
    Ledger {
        #[serde(rename = "hdPath")]
        hd_path: String,
    },
    /// Key lives on an air-gapped Keystone device.
    Keystone {
        #[serde(rename = "hdPath")]
        hd_path: String,
    },
}

impl AccountKind {
    /// Short lowercase name, matching the serialized tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ledger { .. } => "ledger",
            Self::Keystone { .. } => "keystone",
        }
    }
}

/// A wallet account. Only ever persisted inside the encrypted vault.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub public_key: String,
    /// Hex private key. Empty for hardware-backed accounts.
    #[serde(default)]
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: AccountKind,
}

impl Account {
    /// Create a local account from its address and hex keys.
    pub fn local(address: &str, public_key: &str, private_key: &str) -> Self {
        Self {
            address: address.to_string(),
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
            mnemonic: None,
            name: None,
            kind: AccountKind::Local,
        }
    }

    /// Public view of the account, safe to hand to a dApp.
    pub fn public(&self) -> PublicAccount {
        PublicAccount {
            address: self.address.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The plaintext account set, keyed by address.
pub type Accounts = BTreeMap<String, Account>;

/// Address and public key of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub address: String,
    pub public_key: String,
}

/// Authenticated ciphertext of an account set plus the nonce used to seal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAccounts {
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
}
