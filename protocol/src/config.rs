//! # Protocol Configuration & Constants
//!
//! Every fixed parameter of the e-delivery exchange lives here: curve
//! parameters, encoding widths, default delivery terms and the timeouts
//! applied at the adapter boundary.
//!
//! Widths are the part to be careful with. Both parties XOR values of
//! exactly [`SCALAR_LENGTH`] bytes, so changing it after deliveries exist
//! makes every published `Z2` and ciphertext unreadable.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the exchange protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Protocol fingerprint used by the node in its status output.
pub const PROTOCOL_FINGERPRINT: &str = "CMRED-NO-TTP-2026";

// ---------------------------------------------------------------------------
// Curve Parameters
// ---------------------------------------------------------------------------

/// The curve every point and scalar lives on. Same curve as Ethereum, which
/// is where the reference deployment anchored its deliveries.
pub const CURVE_NAME: &str = "secp256k1";

/// Group order `n` of secp256k1, big-endian hex.
pub const CURVE_ORDER_HEX: &str =
    "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

/// Byte width of a scalar (and of every XOR operand).
pub const SCALAR_LENGTH: usize = 32;

/// Byte width of one affine coordinate.
pub const COORDINATE_LENGTH: usize = 32;

/// SEC1 compressed point length: tag byte + X.
pub const COMPRESSED_POINT_LENGTH: usize = 1 + COORDINATE_LENGTH;

/// SEC1 uncompressed point length: tag byte + X + Y.
pub const UNCOMPRESSED_POINT_LENGTH: usize = 1 + 2 * COORDINATE_LENGTH;

/// Longest message that fits the one-time pad. The pad is the commitment
/// secret `v` itself, so a message can be at most one scalar wide.
pub const MAX_MESSAGE_LENGTH: usize = SCALAR_LENGTH;

/// Content hash length (BLAKE3-256).
pub const CONTENT_HASH_LENGTH: usize = 32;

/// Address length in bytes (the tail of the public-key digest).
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Delivery Terms
// ---------------------------------------------------------------------------

/// Default acceptance window in seconds (term1).
pub const DEFAULT_TERM1_SECS: u64 = 600;

/// Default finish window in seconds after acceptance (term2).
pub const DEFAULT_TERM2_SECS: u64 = 1_200;

/// Minimum deposit a sender must escrow at creation.
pub const DEFAULT_MIN_DEPOSIT: u64 = 1;

/// Longest accepted term1 or term2, ten years in seconds.
pub const MAX_TERM_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Upper bound on receivers per delivery. Keeps a single delivery record
/// and its settlement bounded.
pub const MAX_RECEIVERS: usize = 64;

// ---------------------------------------------------------------------------
// Adapter Timing
// ---------------------------------------------------------------------------

/// Per-call timeout for ledger and blob store operations.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts per adapter call, first try included.
pub const ADAPTER_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry; doubles on every subsequent attempt.
pub const ADAPTER_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Default HTTP API port of the devnet node.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default Prometheus metrics port of the devnet node.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_lengths() {
        assert_eq!(COMPRESSED_POINT_LENGTH, 33);
        assert_eq!(UNCOMPRESSED_POINT_LENGTH, 65);
    }

    #[test]
    fn test_curve_order_is_scalar_width() {
        assert_eq!(CURVE_ORDER_HEX.len(), SCALAR_LENGTH * 2);
        assert!(hex::decode(CURVE_ORDER_HEX).is_ok());
    }

    #[test]
    fn test_message_fits_pad() {
        assert!(MAX_MESSAGE_LENGTH <= SCALAR_LENGTH);
    }

    #[test]
    fn test_retry_constants_sanity() {
        assert!(ADAPTER_MAX_ATTEMPTS >= 1);
        assert!(ADAPTER_RETRY_BASE_DELAY < ADAPTER_TIMEOUT);
    }

    #[test]
    fn test_default_terms_positive() {
        assert!(DEFAULT_TERM1_SECS > 0);
        assert!(DEFAULT_TERM2_SECS > 0);
        assert!(DEFAULT_TERM1_SECS <= MAX_TERM_SECS);
        assert_ne!(DEFAULT_API_PORT, DEFAULT_METRICS_PORT);
    }
}
