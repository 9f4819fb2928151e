//! # Scalars and Fixed-Width Integers
//!
//! Three kinds of number flow through the exchange:
//!
//! - **Curve scalars** modulo the secp256k1 order `n`. Secret ones (`v`,
//!   `s`, `b`) are [`SecretScalar`]; published ones (`c`, `r`) are
//!   [`CurveScalar`]. Arithmetic on them goes through `k256::Scalar`, which
//!   is constant-time.
//! - **Masked values** such as `Z2 = x(S) XOR b` and the ciphertext body.
//!   These are not scalars (they can exceed `n`), so they are
//!   [`FixedUint`]: raw big-endian bytes with an explicit width.
//! - **Generic modular arithmetic** through [`Modulus`], backed by
//!   `num-bigint`. It works for any modulus, which is what interop checks
//!   and small worked examples need. It is *not* constant-time and never
//!   sees live secrets inside the engine.
//!
//! ## Width rules
//!
//! XOR is only defined between equal widths. Shorter inputs are left-padded
//! with zeros when a value is constructed; inputs that are too long fail
//! with [`CryptoError::EncodingError`] unless the excess leading bytes are
//! all zero.

use std::collections::HashSet;
use std::fmt;

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, NonZeroScalar, Scalar, U256};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::error::CryptoError;
use super::hash::domain_separated_hash;
use crate::config::SCALAR_LENGTH;

const SAMPLER_CONTEXT: &str = "edelivery 2026 scalar sampler issued tag";

/// Group order of secp256k1, big-endian.
pub const CURVE_ORDER: [u8; SCALAR_LENGTH] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

/// Decodes `0x`-prefixed (or bare) hex into bytes. Odd-length input gets a
/// leading zero nibble, matching how big integers are usually printed.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(CryptoError::MalformedEncoding("empty hex string".into()));
    }
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|e| CryptoError::MalformedEncoding(format!("bad hex: {}", e)))
}

/// Encodes bytes as `0x`-prefixed lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// FixedUint
// ---------------------------------------------------------------------------

/// An unsigned big-endian integer with an explicit byte width.
///
/// Used for every value that is combined with XOR. Two `FixedUint`s of
/// different widths never XOR silently.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixedUint {
    bytes: Vec<u8>,
}

impl FixedUint {
    /// The all-zero value of `width` bytes.
    pub fn zero(width: usize) -> Self {
        Self {
            bytes: vec![0u8; width],
        }
    }

    /// Builds a value of exactly `width` bytes from big-endian input.
    ///
    /// Shorter input is left-padded with zeros. Longer input is accepted
    /// only if the surplus leading bytes are zero.
    pub fn from_be_bytes(bytes: &[u8], width: usize) -> Result<Self, CryptoError> {
        if bytes.len() > width {
            let (surplus, tail) = bytes.split_at(bytes.len() - width);
            if surplus.iter().any(|b| *b != 0) {
                return Err(CryptoError::EncodingError {
                    expected: width,
                    actual: bytes.len(),
                });
            }
            return Ok(Self {
                bytes: tail.to_vec(),
            });
        }
        let mut padded = vec![0u8; width];
        padded[width - bytes.len()..].copy_from_slice(bytes);
        Ok(Self { bytes: padded })
    }

    /// Parses hex into a value of exactly `width` bytes.
    pub fn from_hex(input: &str, width: usize) -> Result<Self, CryptoError> {
        Self::from_be_bytes(&decode_hex(input)?, width)
    }

    /// Converts an arbitrary-precision integer, failing if it does not fit.
    pub fn from_biguint(value: &BigUint, width: usize) -> Result<Self, CryptoError> {
        Self::from_be_bytes(&value.to_bytes_be(), width)
    }

    /// Byte width of this value.
    pub fn width(&self) -> usize {
        self.bytes.len()
    }

    /// Big-endian bytes, always `width()` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the value and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `0x`-prefixed hex of all `width()` bytes.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.bytes)
    }

    /// The value as an arbitrary-precision integer.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.bytes)
    }

    /// True when every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().fold(0u8, |acc, b| acc | b) == 0
    }

    /// Bitwise XOR of two values of the same width.
    ///
    /// Touches every byte regardless of content.
    pub fn xor(&self, other: &FixedUint) -> Result<FixedUint, CryptoError> {
        if self.width() != other.width() {
            return Err(CryptoError::EncodingError {
                expected: self.width(),
                actual: other.width(),
            });
        }
        let bytes = self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        Ok(FixedUint { bytes })
    }
}

impl fmt::Debug for FixedUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedUint({})", self.to_hex())
    }
}

impl From<FixedUint> for String {
    fn from(value: FixedUint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for FixedUint {
    type Error = CryptoError;

    /// The width is taken from the digit count, so `0x0005` is two bytes.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = decode_hex(&value)?;
        let width = bytes.len();
        Self::from_be_bytes(&bytes, width)
    }
}

// ---------------------------------------------------------------------------
// Modulus
// ---------------------------------------------------------------------------

/// Modular arithmetic over an arbitrary modulus with a fixed output width.
///
/// Results are always reduced and returned as [`FixedUint`]s of the
/// modulus width, so they can be fed straight into XOR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modulus {
    n: BigUint,
    width: usize,
}

impl Modulus {
    /// Creates a modulus. `n` must be at least 2 and fit in `width` bytes.
    pub fn new(n: BigUint, width: usize) -> Result<Self, CryptoError> {
        if n < BigUint::from(2u8) {
            return Err(CryptoError::MalformedEncoding(
                "modulus must be at least 2".into(),
            ));
        }
        let needed = n.to_bytes_be().len();
        if needed > width {
            return Err(CryptoError::EncodingError {
                expected: width,
                actual: needed,
            });
        }
        Ok(Self { n, width })
    }

    /// The secp256k1 group order at scalar width.
    pub fn secp256k1() -> Self {
        Self {
            n: BigUint::from_bytes_be(&CURVE_ORDER),
            width: SCALAR_LENGTH,
        }
    }

    /// The modulus value.
    pub fn order(&self) -> &BigUint {
        &self.n
    }

    /// Output width in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// `a mod n`.
    pub fn reduce(&self, a: &FixedUint) -> FixedUint {
        self.fit(a.to_biguint() % &self.n)
    }

    /// `(a + b) mod n`.
    pub fn add(&self, a: &FixedUint, b: &FixedUint) -> FixedUint {
        self.fit((a.to_biguint() + b.to_biguint()) % &self.n)
    }

    /// `(a - b) mod n`, always non-negative.
    pub fn sub(&self, a: &FixedUint, b: &FixedUint) -> FixedUint {
        let a = a.to_biguint() % &self.n;
        let b = b.to_biguint() % &self.n;
        self.fit((a + &self.n - b) % &self.n)
    }

    /// `(a * b) mod n`.
    pub fn mul(&self, a: &FixedUint, b: &FixedUint) -> FixedUint {
        self.fit((a.to_biguint() * b.to_biguint()) % &self.n)
    }

    /// Left-pads a reduced value to the modulus width. Reduced values are
    /// below `n`, which fits `width` by construction.
    fn fit(&self, value: BigUint) -> FixedUint {
        let raw = value.to_bytes_be();
        let mut bytes = vec![0u8; self.width];
        let start = self.width.saturating_sub(raw.len());
        bytes[start..].copy_from_slice(&raw[raw.len() - (self.width - start)..]);
        FixedUint { bytes }
    }
}

// ---------------------------------------------------------------------------
// CurveScalar
// ---------------------------------------------------------------------------

/// A published scalar modulo `n` (the challenge `c`, the response `r`).
///
/// Serializes as `0x` + 64 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurveScalar(Scalar);

impl CurveScalar {
    /// Wraps a `k256` scalar.
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    /// Parses a canonical big-endian scalar. Values `>= n` are rejected,
    /// not reduced.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let fixed = FixedUint::from_be_bytes(bytes, SCALAR_LENGTH)?;
        let repr = field_bytes(&fixed)?;
        Option::<Scalar>::from(Scalar::from_repr(repr))
            .map(Self)
            .ok_or_else(|| CryptoError::MalformedEncoding("scalar is not below the group order".into()))
    }

    /// Parses hex (see [`decode_hex`]).
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&decode_hex(input)?)
    }

    /// Reduces a 32-byte value modulo `n`. This is how a recovered
    /// blinding value becomes a scalar.
    pub fn reduce(value: &FixedUint) -> Result<Self, CryptoError> {
        let repr = field_bytes(value)?;
        Ok(Self(<Scalar as Reduce<U256>>::reduce_bytes(&repr)))
    }

    /// The underlying `k256` scalar.
    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    /// Big-endian bytes.
    pub fn to_bytes(&self) -> [u8; SCALAR_LENGTH] {
        let mut out = [0u8; SCALAR_LENGTH];
        out.copy_from_slice(&self.0.to_repr());
        out
    }

    /// As a fixed-width integer, for XOR.
    pub fn to_fixed(&self) -> FixedUint {
        FixedUint {
            bytes: self.to_bytes().to_vec(),
        }
    }

    /// `0x` + 64 hex digits.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.to_bytes())
    }

    /// True for the zero scalar.
    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }
}

impl fmt::Debug for CurveScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurveScalar({})", self.to_hex())
    }
}

impl From<CurveScalar> for String {
    fn from(value: CurveScalar) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for CurveScalar {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

// ---------------------------------------------------------------------------
// SecretScalar
// ---------------------------------------------------------------------------

/// A non-zero secret scalar (`v`, `s`, a long-term private key).
///
/// Deliberately has no `Serialize` impl and a redacted `Debug`. Exporting
/// the bytes is an explicit call to [`to_bytes`](Self::to_bytes).
#[derive(Clone)]
pub struct SecretScalar(NonZeroScalar);

impl SecretScalar {
    /// Draws a uniform scalar in `[1, n-1]` from `OsRng`.
    pub fn random() -> Self {
        Self(NonZeroScalar::random(&mut OsRng))
    }

    /// Parses a canonical, non-zero big-endian scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let fixed = FixedUint::from_be_bytes(bytes, SCALAR_LENGTH)?;
        let repr = field_bytes(&fixed)?;
        Option::<NonZeroScalar>::from(NonZeroScalar::from_repr(repr))
            .map(Self)
            .ok_or_else(|| {
                CryptoError::MalformedEncoding("secret scalar must be in [1, n-1]".into())
            })
    }

    /// Parses hex (see [`decode_hex`]).
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&decode_hex(input)?)
    }

    /// The underlying `k256` scalar.
    pub fn as_scalar(&self) -> Scalar {
        *self.0
    }

    /// The non-zero form, for point multiplication.
    pub fn as_nonzero(&self) -> &NonZeroScalar {
        &self.0
    }

    /// Exports the raw big-endian bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; SCALAR_LENGTH] {
        let mut out = [0u8; SCALAR_LENGTH];
        out.copy_from_slice(&self.0.to_repr());
        out
    }

    /// As a fixed-width integer, for XOR masking.
    pub fn to_fixed(&self) -> FixedUint {
        FixedUint {
            bytes: self.to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar(<redacted>)")
    }
}

impl PartialEq for SecretScalar {
    fn eq(&self, other: &Self) -> bool {
        bool::from(k256::elliptic_curve::subtle::ConstantTimeEq::ct_eq(
            &self.as_scalar(),
            &other.as_scalar(),
        ))
    }
}

impl Eq for SecretScalar {}

/// Uniform scalar in `[1, n-1]` from the OS RNG.
pub fn random_scalar() -> SecretScalar {
    SecretScalar::random()
}

fn field_bytes(value: &FixedUint) -> Result<FieldBytes, CryptoError> {
    if value.width() != SCALAR_LENGTH {
        return Err(CryptoError::EncodingError {
            expected: SCALAR_LENGTH,
            actual: value.width(),
        });
    }
    Ok(*FieldBytes::from_slice(value.as_bytes()))
}

// ---------------------------------------------------------------------------
// ScalarSampler
// ---------------------------------------------------------------------------

/// Source of fresh scalars for one protocol run.
///
/// Beyond drawing from a CSPRNG, the sampler remembers a BLAKE3 digest of
/// every scalar it has handed out and redraws on a repeat, so no two values
/// issued by the same sampler are ever equal.
///
/// The digest set grows by one entry per scalar and is never pruned. Scope
/// a sampler to one seal or one accept rather than keeping it for the life
/// of a process.
pub struct ScalarSampler<R = OsRng> {
    rng: R,
    issued: HashSet<[u8; 32]>,
}

impl ScalarSampler<OsRng> {
    /// A sampler over the OS RNG.
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl Default for ScalarSampler<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore + CryptoRng> ScalarSampler<R> {
    /// A sampler over a caller-supplied CSPRNG (seeded RNGs in tests).
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            issued: HashSet::new(),
        }
    }

    /// Next secret scalar, never equal to an earlier one from this sampler.
    pub fn next_secret(&mut self) -> SecretScalar {
        loop {
            let candidate = NonZeroScalar::random(&mut self.rng);
            let tag = domain_separated_hash(SAMPLER_CONTEXT, &candidate.to_repr());
            if self.issued.insert(tag) {
                return SecretScalar(candidate);
            }
            tracing::warn!("scalar sampler drew a repeated value, redrawing");
        }
    }

    /// Next public scalar (a challenge), drawn from the same pool.
    pub fn next_public(&mut self) -> CurveScalar {
        CurveScalar(self.next_secret().as_scalar())
    }

    /// Number of scalars handed out so far.
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}
