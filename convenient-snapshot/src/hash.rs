//! Content hashes and the hasher used to combine them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;
use xxhash_rust::xxh3::xxh3_64;

/// Hash used for locations that do not exist.
pub static MISSING_FILE_SIGNATURE: LazyLock<ContentHash> =
    LazyLock::new(|| ContentHash::from_bytes(b"MISSING"));

/// Hash used for directory entries in a fingerprint. Directory content is
/// represented by the entries below it, not by this hash.
pub static DIRECTORY_SIGNATURE: LazyLock<ContentHash> =
    LazyLock::new(|| ContentHash::from_bytes(b"DIRECTORY"));

/// Combined hash of a file collection with no entries.
pub static EMPTY_COLLECTION_HASH: LazyLock<ContentHash> =
    LazyLock::new(|| ContentHasher::new().finish());

/// Algorithm used to hash regular file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, hex encoded
    #[default]
    Sha256,

    /// xxh3 64-bit, hex encoded. Fast, not collision resistant.
    Xxh3,
}

impl HashAlgorithm {
    /// Hash raw bytes with this algorithm.
    #[must_use]
    pub fn hash_bytes(self, bytes: &[u8]) -> ContentHash {
        match self {
            HashAlgorithm::Sha256 => ContentHash::from_bytes(bytes),
            HashAlgorithm::Xxh3 => ContentHash(format!("{:016x}", xxh3_64(bytes))),
        }
    }

    /// Stable name, used when hashing strategy configurations.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Xxh3 => "xxh3",
        }
    }
}

/// Content hash, stored as a lowercase hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// SHA-256 of raw bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an existing hex string
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Get hex string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show first 8 chars
        write!(f, "{}", self.0.get(..8).unwrap_or(&self.0))
    }
}

/// Incremental SHA-256 hasher for structural hashes.
///
/// Every string is length-prefixed, so `("ab", "c")` and `("a", "bc")`
/// produce different hashes.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a length-prefixed string.
    pub fn put_str(&mut self, value: &str) {
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
    }

    /// Feed another hash.
    pub fn put_hash(&mut self, hash: &ContentHash) {
        self.put_str(hash.as_str());
    }

    /// Feed a single tag byte.
    pub fn put_tag(&mut self, tag: u8) {
        self.inner.update([tag]);
    }

    /// Finish and return the hex digest.
    #[must_use]
    pub fn finish(self) -> ContentHash {
        ContentHash(format!("{:x}", self.inner.finalize()))
    }
}
