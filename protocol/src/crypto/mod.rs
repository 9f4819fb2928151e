//! # Cryptographic Primitives
//!
//! Everything the exchange computes on lives here: secp256k1 points,
//! scalars modulo the group order, fixed-width integers for XOR masking,
//! party keypairs and the BLAKE3 helpers.
//!
//! The module is pure. No I/O, no shared state, no logging of values. Point
//! and scalar operations go through `k256`; the only arithmetic that does
//! not is [`Modulus`], which exists for arbitrary moduli and is never used
//! on live secrets.

pub mod curve;
pub mod error;
pub mod hash;
pub mod keys;
pub mod scalar;

pub use curve::{scalar_multiply, CurvePoint};
pub use error::CryptoError;
pub use hash::{blake3_hash, domain_separated_hash};
pub use keys::PartyKeypair;
pub use scalar::{
    decode_hex, encode_hex, random_scalar, CurveScalar, FixedUint, Modulus, ScalarSampler,
    SecretScalar, CURVE_ORDER,
};
