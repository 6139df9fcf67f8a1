//! Commitment hash and domain tag types using BLAKE3

use std::fmt;

/// A 32-byte BLAKE3 hash committing to a node's content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Length of a hash in bytes
    pub const LEN: usize = 32;

    /// The zero hash (used as a sentinel/null value)
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Hash arbitrary data
    pub fn digest(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }

    /// Hash multiple pieces of data
    pub fn digest_many(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Domain separation tag
///
/// Every node variant commits under its own tag, so two variants can never
/// produce the same hash for the same field data. Family tags are derived
/// from a label; variant tags are derived from their family tag and a
/// per-variant label.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashTag(Hash);

impl HashTag {
    /// Tag derived from a label
    pub fn new(label: &str) -> Self {
        HashTag(Hash::digest(label.as_bytes()))
    }

    /// Derive a sub-tag: `H(self || H(label))`
    pub fn derive(&self, label: &str) -> Self {
        let sub = Hash::digest(label.as_bytes());
        HashTag(Hash::digest_many(&[self.0.as_bytes(), sub.as_bytes()]))
    }

    /// Final commitment of a node: `H(tag || data_hash)`
    pub fn commit(&self, data_hash: &Hash) -> Hash {
        Hash::digest_many(&[self.0.as_bytes(), data_hash.as_bytes()])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for HashTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashTag({})", self.0.short())
    }
}
