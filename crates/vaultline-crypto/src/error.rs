//! Crypto error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported key derivation algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    #[error("decrypted data is not a valid account set: {0}")]
    InvalidPlaintext(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}
