//! In-memory blob store.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BlobError, BlobStore, ContentHash};

/// A [`BlobStore`] kept in a `DashMap`.
///
/// Can be switched offline to simulate an unreachable backend, which is
/// how retry behaviour above it gets exercised.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: DashMap<ContentHash, Vec<u8>>,
    online: AtomicBool,
}

impl MemoryBlobStore {
    /// Creates an empty, online store.
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Toggles availability. While offline every call fails with
    /// [`BlobError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Overwrites the bytes stored under `hash` without re-hashing.
    /// Only useful for corruption tests.
    pub fn corrupt(&self, hash: &ContentHash, data: Vec<u8>) {
        self.blobs.insert(*hash, data);
    }

    fn ensure_online(&self) -> Result<(), BlobError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BlobError::Unavailable("memory blob store is offline".into()))
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: &[u8]) -> Result<ContentHash, BlobError> {
        self.ensure_online()?;
        let hash = ContentHash::of(data);
        self.blobs.entry(hash).or_insert_with(|| data.to_vec());
        tracing::debug!(hash = %hash, size = data.len(), "blob stored");
        Ok(hash)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, BlobError> {
        self.ensure_online()?;
        let data = self
            .blobs
            .get(hash)
            .map(|entry| entry.value().clone())
            .ok_or(BlobError::NotFound(*hash))?;
        hash.verify(&data)?;
        Ok(data)
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, BlobError> {
        self.ensure_online()?;
        Ok(self.blobs.contains_key(hash))
    }
}
