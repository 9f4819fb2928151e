//! # Ledger Addresses
//!
//! ```text
//! public_key (SEC1 uncompressed, tag byte dropped: X || Y, 64 bytes)
//!     -> BLAKE3(X || Y) -> 32 bytes
//!     -> last 20 bytes -> 0x + 40 hex digits
//! ```
//!
//! Addresses are what deliveries record as sender and receivers, and what a
//! caller presents to the ledger. They are compared byte-wise; the hex form
//! is always lowercase on output and accepted in any case on input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;
use crate::crypto::hash::blake3_hash;
use crate::crypto::CurvePoint;

/// Errors that can occur while parsing an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input was not hex.
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),

    /// Decoded to the wrong number of bytes.
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length found.
        got: usize,
    },
}

/// A 20-byte party address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Derives the address of a public key.
    pub fn from_public_key(public: &CurvePoint) -> Self {
        let encoded = public.encode(false);
        let digest = blake3_hash(&encoded[1..]);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[digest.len() - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Wraps raw address bytes.
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// `0x` + 40 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
