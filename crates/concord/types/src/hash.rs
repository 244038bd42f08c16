use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hex digest: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("digest must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("canonical encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// 32-byte BLAKE3 digest, rendered as lowercase hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// Parent hash of the first entry in a chain.
    pub const GENESIS: ChainHash = ChainHash([0u8; 32]);

    /// Domain-separated digest over a sequence of byte strings.
    pub fn digest(domain: &[u8], parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Domain-separated digest over the canonical JSON encoding of `value`.
    pub fn of_json<T: Serialize>(domain: &[u8], value: &T) -> Result<Self, HashError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::digest(domain, &[&bytes]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn is_genesis(&self) -> bool {
        self == &Self::GENESIS
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
