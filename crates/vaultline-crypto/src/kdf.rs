//! Password-based key derivation.
//!
//! Every algorithm is identified by the name stored in the vault record and
//! must be deterministic: unlocking and migrating both rely on re-deriving
//! exactly the key that sealed the ciphertext. Cost parameters are therefore
//! recorded next to the ciphertext, and a vault is always opened with the
//! parameters it was sealed with.

use crate::error::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use vaultline_types::constants::{algorithm, KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2-HMAC-SHA256 rounds.
const PBKDF2_ROUNDS: u32 = 10_000;

/// Argon2id parameters (OWASP recommended minimums).
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Tunable cost parameters for the built-in algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub pbkdf2_rounds: u32,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            pbkdf2_rounds: PBKDF2_ROUNDS,
            argon2_memory_kib: ARGON2_M_COST,
            argon2_iterations: ARGON2_T_COST,
            argon2_parallelism: ARGON2_PARALLELISM,
        }
    }
}

/// Derived symmetric key (zeroized on drop).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse a key previously exported with [`EncryptionKey::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let decoded = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if decoded.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                decoded.len()
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// A named password-based key-derivation function.
pub trait KeyDerivationFunction: Send + Sync {
    /// Identifier stored in the vault record.
    fn id(&self) -> &'static str;

    /// Derive a key. Must return the same key for the same inputs.
    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<EncryptionKey, CryptoError>;
}

/// PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct Pbkdf2Kdf {
    rounds: u32,
}

impl Pbkdf2Kdf {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl KeyDerivationFunction for Pbkdf2Kdf {
    fn id(&self) -> &'static str {
        algorithm::PBKDF2
    }

    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<EncryptionKey, CryptoError> {
        if self.rounds == 0 {
            return Err(CryptoError::KeyDerivation("pbkdf2 rounds must be non-zero".into()));
        }
        let mut key = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, self.rounds, &mut key);
        let derived = EncryptionKey::from_bytes(key);
        key.zeroize();
        Ok(derived)
    }
}

/// Argon2id, version 0x13.
#[derive(Debug, Clone)]
pub struct Argon2Kdf {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Argon2Kdf {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }
}

impl KeyDerivationFunction for Argon2Kdf {
    fn id(&self) -> &'static str {
        algorithm::ARGON2
    }

    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<EncryptionKey, CryptoError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| CryptoError::KeyDerivation(format!("argon2 failed: {e}")))?;
        let derived = EncryptionKey::from_bytes(key);
        key.zeroize();
        Ok(derived)
    }
}

/// Closed set of key-derivation algorithms, looked up by identifier.
pub struct KdfRegistry {
    algorithms: Vec<Box<dyn KeyDerivationFunction>>,
}

impl KdfRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            algorithms: Vec::new(),
        }
    }

    /// Registry with PBKDF2 and Argon2id configured from `params`.
    pub fn standard(params: &KdfParams) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Pbkdf2Kdf::new(params.pbkdf2_rounds)));
        registry.register(Box::new(Argon2Kdf::new(
            params.argon2_memory_kib,
            params.argon2_iterations,
            params.argon2_parallelism,
        )));
        registry
    }

    /// Add an algorithm, replacing any previous one with the same id.
    pub fn register(&mut self, kdf: Box<dyn KeyDerivationFunction>) {
        self.algorithms.retain(|existing| existing.id() != kdf.id());
        self.algorithms.push(kdf);
    }

    pub fn is_supported(&self, algorithm: &str) -> bool {
        self.algorithms.iter().any(|kdf| kdf.id() == algorithm)
    }

    /// Identifiers of all registered algorithms, in registration order.
    pub fn algorithms(&self) -> Vec<&'static str> {
        self.algorithms.iter().map(|kdf| kdf.id()).collect()
    }

    /// Derive a key under the named algorithm.
    pub fn derive(
        &self,
        algorithm: &str,
        password: &[u8],
        salt: &[u8],
    ) -> Result<EncryptionKey, CryptoError> {
        let kdf = self
            .algorithms
            .iter()
            .find(|kdf| kdf.id() == algorithm)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(algorithm.to_string()))?;
        log::debug!("deriving key with {}", algorithm);
        kdf.derive(password, salt)
    }
}

impl Default for KdfRegistry {
    fn default() -> Self {
        Self::standard(&KdfParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> KdfRegistry {
        KdfRegistry::standard(&KdfParams {
            pbkdf2_rounds: 1000,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        })
    }

    #[test]
    fn test_derive_deterministic() {
        let registry = light();
        for alg in [algorithm::PBKDF2, algorithm::ARGON2] {
            let k1 = registry.derive(alg, b"password123", &[1u8; 16]).unwrap();
            let k2 = registry.derive(alg, b"password123", &[1u8; 16]).unwrap();
            assert_eq!(k1, k2, "{} must be deterministic", alg);
        }
    }

    #[test]
    fn test_algorithms_produce_different_keys() {
        let registry = light();
        let a = registry.derive(algorithm::PBKDF2, b"pw", &[9u8; 16]).unwrap();
        let b = registry.derive(algorithm::ARGON2, b"pw", &[9u8; 16]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let registry = light();
        let a = registry.derive(algorithm::ARGON2, b"pw", &[1u8; 16]).unwrap();
        let b = registry.derive(algorithm::ARGON2, b"pw", &[2u8; 16]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_passwords_different_keys() {
        let registry = light();
        let a = registry.derive(algorithm::PBKDF2, b"pw1", &[1u8; 16]).unwrap();
        let b = registry.derive(algorithm::PBKDF2, b"pw2", &[1u8; 16]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = light();
        let err = registry.derive("scrypt", b"pw", &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm(ref id) if id == "scrypt"));
        assert!(!registry.is_supported("scrypt"));
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = light();
        registry.register(Box::new(Pbkdf2Kdf::new(2000)));
        assert_eq!(registry.algorithms(), vec![algorithm::ARGON2, algorithm::PBKDF2]);
    }

    #[test]
    fn test_pbkdf2_zero_rounds_rejected() {
        let kdf = Pbkdf2Kdf::new(0);
        assert!(matches!(
            kdf.derive(b"pw", &[0u8; 16]),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_argon2_short_salt_rejected() {
        let kdf = Argon2Kdf::new(1024, 1, 1);
        assert!(matches!(
            kdf.derive(b"pw", &[0u8; 4]),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_key_hex_roundtrip() {
        let key = EncryptionKey::from_bytes([0x5a; KEY_SIZE]);
        let parsed = EncryptionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed, key);
        assert!(EncryptionKey::from_hex("abcd").is_err());
        assert_eq!(format!("{:?}", key), "EncryptionKey(<redacted>)");
    }

    #[test]
    fn test_params_json_shape() {
        let json = serde_json::to_value(KdfParams::default()).unwrap();
        assert_eq!(json["pbkdf2Rounds"], 10_000);
        assert_eq!(json["argon2MemoryKib"], 65536);
        let back: KdfParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, KdfParams::default());
    }
}
