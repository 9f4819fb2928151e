//! Error types for the exchange engine.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors returned by the four role algorithms.
///
/// Split into two families. [`ProtocolError::Crypto`] means a value could
/// not be decoded or combined at all. The other variants mean the inputs
/// decoded fine but the data supplied by a caller or counterparty is not
/// what the exchange requires. [`is_caller_error`](ProtocolError::is_caller_error)
/// tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Point, scalar or width failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The message does not fit the one-time pad.
    #[error("message too long: {len} bytes, at most {max}")]
    MessageTooLong {
        /// Supplied message length.
        len: usize,
        /// Largest message that fits.
        max: usize,
    },

    /// The blinding recovered from `(Z1, Z2)` does not open to the
    /// receiver's public key.
    #[error("recovered blinding value does not match the receiver public key")]
    BlindingMismatch,

    /// Decryption produced non-zero padding, so the recovered pad is not
    /// the one the sender used.
    #[error("decrypted padding is not zero")]
    PaddingMismatch,
}

impl ProtocolError {
    /// True when the failure comes from caller- or counterparty-supplied
    /// data rather than from a malformed encoding.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, ProtocolError::Crypto(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_error_split() {
        assert!(ProtocolError::BlindingMismatch.is_caller_error());
        assert!(ProtocolError::PaddingMismatch.is_caller_error());
        assert!(ProtocolError::MessageTooLong { len: 40, max: 32 }.is_caller_error());
        assert!(!ProtocolError::from(CryptoError::InvalidPoint("x".into())).is_caller_error());
    }
}
