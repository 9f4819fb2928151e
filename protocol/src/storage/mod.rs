//! # Storage Module
//!
//! Content-addressed blob storage for sealed messages.
//!
//! A blob is named by the BLAKE3 hash of its bytes. The hash is what the
//! sender records on the ledger as the payload hash, so a receiver that
//! fetches a blob can check it got exactly what the sender committed to.
//! Both stores re-hash on every read and refuse to return bytes that no
//! longer match their name.
//!
//! ```text
//! memory.rs — MemoryBlobStore, DashMap-backed, for tests and the devnet
//! db.rs     — SledBlobStore, persistent, one sled tree
//! ```

pub mod db;
pub mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CONTENT_HASH_LENGTH;
use crate::crypto::blake3_hash;

pub use db::SledBlobStore;
pub use memory::MemoryBlobStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    /// No blob is stored under this hash.
    #[error("blob not found: {0}")]
    NotFound(ContentHash),

    /// The backing store could not be reached. Retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes no longer hash to their name.
    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// The name the blob was requested by.
        expected: ContentHash,
        /// The hash of the bytes actually read.
        actual: ContentHash,
    },

    /// A content hash could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for BlobError {
    fn from(e: sled::Error) -> Self {
        BlobError::Unavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// BLAKE3-256 digest naming a blob. Rendered as `0x` + 64 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; CONTENT_HASH_LENGTH]);

impl ContentHash {
    /// Hashes `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(blake3_hash(data))
    }

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; CONTENT_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_LENGTH] {
        &self.0
    }

    /// `0x` + 64 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Re-hashes `data` and compares against `self`.
    pub fn verify(&self, data: &[u8]) -> Result<(), BlobError> {
        let actual = Self::of(data);
        if actual != *self {
            return Err(BlobError::IntegrityMismatch {
                expected: *self,
                actual,
            });
        }
        Ok(())
    }
}

impl FromStr for ContentHash {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits)
            .map_err(|e| BlobError::Serialization(format!("content hash: {}", e)))?;
        let arr: [u8; CONTENT_HASH_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            BlobError::Serialization(format!(
                "content hash: expected {} bytes, got {}",
                CONTENT_HASH_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..18])
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = BlobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// Content-addressed blob storage.
///
/// `put` is idempotent: storing the same bytes twice yields the same hash
/// and leaves one copy. `get` verifies the bytes against the hash before
/// returning them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` and returns its content hash.
    async fn put(&self, data: &[u8]) -> Result<ContentHash, BlobError>;

    /// Fetches the blob named `hash`.
    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, BlobError>;

    /// True if a blob named `hash` is stored.
    async fn contains(&self, hash: &ContentHash) -> Result<bool, BlobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex_round_trip() {
        let h = ContentHash::of(b"ciphertext");
        assert_eq!(h.to_hex().len(), 66);
        assert_eq!(h.to_hex().parse::<ContentHash>().unwrap(), h);
    }

    #[test]
    fn test_content_hash_rejects_short() {
        assert!(matches!(
            "0xabcd".parse::<ContentHash>(),
            Err(BlobError::Serialization(_))
        ));
    }

    #[test]
    fn test_verify_detects_tamper() {
        let h = ContentHash::of(b"original");
        assert!(h.verify(b"original").is_ok());
        assert!(matches!(
            h.verify(b"tampered"),
            Err(BlobError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let h = ContentHash::of(b"x");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
