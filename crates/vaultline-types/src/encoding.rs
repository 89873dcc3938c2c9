//! Hex helpers for byte fields in persisted JSON records.

use crate::account::TypesError;

/// Serde adapter storing `Vec<u8>` fields as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Decode a hex string, accepting an optional `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, TypesError> {
    hex::decode(s.trim_start_matches("0x")).map_err(|e| TypesError::InvalidHex(e.to_string()))
}

/// Decode a hex string into a fixed 32-byte array.
pub fn decode_hex_32(s: &str) -> Result<[u8; 32], TypesError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 32 {
        return Err(TypesError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Encode bytes as `0x`-prefixed hex, the format used for account keys.
pub fn encode_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
