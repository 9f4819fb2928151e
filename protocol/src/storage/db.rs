//! # SledBlobStore — Persistent Blob Storage
//!
//! One sled tree, `blobs`, keyed by the 32-byte content hash with the raw
//! blob bytes as value. Writes are flushed before `put` returns so a hash
//! handed to the ledger always names a durable blob.

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, Tree};

use super::{BlobError, BlobStore, ContentHash};

/// Name of the sled tree holding blobs.
const BLOBS_TREE: &str = "blobs";

/// A [`BlobStore`] persisted with sled.
///
/// sled handles are cheap to clone and thread-safe, so the store can be
/// shared via `Arc` without extra locking.
#[derive(Debug, Clone)]
pub struct SledBlobStore {
    db: Db,
    blobs: Tree,
}

impl SledBlobStore {
    /// Opens or creates a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlobError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in a temporary directory and is removed on drop.
    pub fn open_temporary() -> Result<Self, BlobError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, BlobError> {
        let blobs = db.open_tree(BLOBS_TREE)?;
        Ok(Self { db, blobs })
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for SledBlobStore {
    async fn put(&self, data: &[u8]) -> Result<ContentHash, BlobError> {
        let hash = ContentHash::of(data);
        if !self.blobs.contains_key(hash.as_bytes())? {
            self.blobs.insert(hash.as_bytes(), data)?;
        }
        // A repeated put may follow an insert whose flush failed.
        self.db.flush_async().await?;
        tracing::debug!(hash = %hash, size = data.len(), "blob persisted");
        Ok(hash)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, BlobError> {
        let data = self
            .blobs
            .get(hash.as_bytes())?
            .ok_or(BlobError::NotFound(*hash))?
            .to_vec();
        if let Err(e) = hash.verify(&data) {
            tracing::error!(hash = %hash, "stored blob failed integrity check");
            return Err(e);
        }
        Ok(data)
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(hash.as_bytes())?)
    }
}
