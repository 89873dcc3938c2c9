//! Crypto primitives for vaultline.
//!
//! Two pieces live here:
//! - [`kdf`]: a registry of named password-based key-derivation functions
//!   (`"pbkdf2"`, `"argon2"`), each turning `(password, salt)` into a 32-byte
//!   symmetric key deterministically.
//! - [`cipher`]: authenticated encryption (AES-256-GCM) of the account set
//!   under a derived key, with a fresh random nonce per call.

pub mod cipher;
pub mod error;
pub mod kdf;

pub use cipher::{decrypt_accounts, encrypt_accounts, generate_salt};
pub use error::CryptoError;
pub use kdf::{Argon2Kdf, EncryptionKey, KdfParams, KdfRegistry, KeyDerivationFunction, Pbkdf2Kdf};
