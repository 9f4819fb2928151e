//! # Hashing Utilities
//!
//! BLAKE3 is the only hash in the exchange. It names blobs in the content
//! store, derives party addresses from public keys, and tags the scalars a
//! [`ScalarSampler`](super::ScalarSampler) has already handed out.

/// Compute the BLAKE3 hash of the input data.
///
/// ```
/// use edelivery_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"registered delivery");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3's `derive_key` mode.
///
/// Two contexts never collide even over identical data, because the
/// context string selects a different internal IV.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
