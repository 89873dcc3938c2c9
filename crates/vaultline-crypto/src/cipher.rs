//! Account set encryption.
//!
//! The account set is serialized to JSON and sealed with AES-256-GCM under a
//! derived key. Each call draws a fresh random 96-bit nonce, so a key never
//! seals two messages with the same nonce in practice.

use crate::error::CryptoError;
use crate::kdf::EncryptionKey;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use vaultline_types::constants::NONCE_SIZE;
use vaultline_types::{Accounts, EncryptedAccounts};
use zeroize::Zeroizing;

/// Encrypt an account set.
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn encrypt_accounts(
    accounts: &Accounts,
    key: &EncryptionKey,
) -> Result<EncryptedAccounts, CryptoError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(accounts).map_err(|e| CryptoError::Encryption(e.to_string()))?,
    );

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedAccounts {
        ciphertext,
        nonce: nonce_bytes.to_vec(),
    })
}

/// Decrypt an account set.
///
/// Fails with [`CryptoError::DecryptionFailed`] when the key is wrong or the
/// envelope was tampered with.
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn decrypt_accounts(
    encrypted: &EncryptedAccounts,
    key: &EncryptionKey,
) -> Result<Accounts, CryptoError> {
    if encrypted.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&encrypted.nonce);
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(nonce, encrypted.ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)?,
    );

    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidPlaintext(e.to_string()))
}

/// Random salt of `len` bytes.
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
