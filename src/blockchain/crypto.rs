use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Number of leading zero bytes a block hash needs to count as proof of work
pub const POW_LEADING_ZERO_BYTES: usize = 2;

/// Errors that can occur during hashing operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encoding error: {0}")]
    EncodingError(#[from] serde_json::Error),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A SHA-256 digest, rendered as lowercase hex on the wire
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// The all-zero hash, used as the parent of the first block
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::DecodingError(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Hash(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// Hashes the canonical JSON form of a value
///
/// Struct fields serialize in declaration order, so the same logical value
/// always produces the same bytes and therefore the same digest.
///
/// # Arguments
///
/// * `value` - The value to hash
///
/// # Returns
///
/// The SHA-256 digest of the serialized value
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<Hash, CryptoError> {
    let encoded = serde_json::to_vec(value)?;
    Ok(Hash(Sha256::digest(&encoded).into()))
}

/// Checks the fixed difficulty predicate: the first `POW_LEADING_ZERO_BYTES`
/// bytes of the hash must all be zero
pub fn is_valid_proof_of_work(hash: &Hash) -> bool {
    hash.0[..POW_LEADING_ZERO_BYTES].iter().all(|b| *b == 0)
}
