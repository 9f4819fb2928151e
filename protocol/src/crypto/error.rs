//! Errors shared by the curve and scalar layers.

use thiserror::Error;

/// Failures of point handling and fixed-width integer encoding.
///
/// Messages name the operand but never echo secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A point that is the identity (or otherwise unusable) where a proper
    /// group element is required.
    #[error("invalid point: {0}")]
    InvalidPoint(String),

    /// Bytes or hex that do not decode to the expected structure, or decode
    /// to a point that is not on the curve.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// Operand widths disagree, or a value does not fit the declared width.
    #[error("encoding error: expected {expected} bytes, got {actual}")]
    EncodingError {
        /// Width the operation requires.
        expected: usize,
        /// Width actually supplied.
        actual: usize,
    },
}
