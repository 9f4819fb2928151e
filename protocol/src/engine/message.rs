//! # Ciphertext Records
//!
//! The sender's message is a one-time pad over the commitment secret `v`:
//!
//! ```text
//! m (len bytes) -> left-pad with zeros to 32 bytes -> C = v XOR pad32(m)
//! ```
//!
//! The blob store keeps `C` together with the original length so the
//! receiver strips exactly the padding the sender added. The record is
//! bincode-encoded; the body travels as fixed-width hex inside it.

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use crate::config::{MAX_MESSAGE_LENGTH, SCALAR_LENGTH};
use crate::crypto::{CryptoError, FixedUint};

/// A sealed message body and its plaintext length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    body: FixedUint,
    message_len: usize,
}

impl Ciphertext {
    /// Wraps a masked body. `message_len` may not exceed the body width.
    pub fn new(body: FixedUint, message_len: usize) -> Result<Self, ProtocolError> {
        if body.width() != SCALAR_LENGTH {
            return Err(CryptoError::EncodingError {
                expected: SCALAR_LENGTH,
                actual: body.width(),
            }
            .into());
        }
        if message_len > MAX_MESSAGE_LENGTH {
            return Err(ProtocolError::MessageTooLong {
                len: message_len,
                max: MAX_MESSAGE_LENGTH,
            });
        }
        Ok(Self { body, message_len })
    }

    /// The masked 32-byte body `C`.
    pub fn body(&self) -> &FixedUint {
        &self.body
    }

    /// Length of the plaintext before padding.
    pub fn message_len(&self) -> usize {
        self.message_len
    }

    /// Encodes the record for the blob store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| {
            CryptoError::MalformedEncoding(format!("ciphertext record: {}", e)).into()
        })
    }

    /// Decodes a record fetched from the blob store, re-checking widths.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: Ciphertext = bincode::deserialize(bytes).map_err(|e| {
            ProtocolError::from(CryptoError::MalformedEncoding(format!(
                "ciphertext record: {}",
                e
            )))
        })?;
        Self::new(raw.body, raw.message_len)
    }
}

/// Left-pads a message to pad width.
pub fn pad_message(message: &[u8]) -> Result<FixedUint, ProtocolError> {
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(ProtocolError::MessageTooLong {
            len: message.len(),
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(FixedUint::from_be_bytes(message, SCALAR_LENGTH)?)
}

/// Strips the left padding added by [`pad_message`].
///
/// Every stripped byte must be zero. The check folds over all of them
/// before deciding.
pub fn unpad_message(padded: &FixedUint, message_len: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = padded.as_bytes();
    if message_len > bytes.len() {
        return Err(CryptoError::EncodingError {
            expected: bytes.len(),
            actual: message_len,
        }
        .into());
    }
    let (pad, message) = bytes.split_at(bytes.len() - message_len);
    if pad.iter().fold(0u8, |acc, b| acc | b) != 0 {
        return Err(ProtocolError::PaddingMismatch);
    }
    Ok(message.to_vec())
}
