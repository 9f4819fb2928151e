//! # Curve Points
//!
//! Thin, type-safe wrapper around `k256` affine points.
//!
//! A [`CurvePoint`] is never the point at infinity. Every constructor checks
//! for it, and multiplication by a secret scalar cannot produce it because
//! secrets are non-zero and the group has prime order. That lets the rest
//! of the exchange take `x(P)` without worrying about a missing coordinate.
//!
//! ## Encodings
//!
//! - SEC1 compressed (`0x02`/`0x03` + X, 33 bytes). The default for hex
//!   and serde.
//! - SEC1 uncompressed (`0x04` + X + Y, 65 bytes). Used for addresses and
//!   for the coordinate-pair wire form.
//!
//! Decoding accepts either form. Off-curve input is
//! [`CryptoError::MalformedEncoding`]; the encoded identity is
//! [`CryptoError::InvalidPoint`].

use std::fmt;

use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};

use super::error::CryptoError;
use super::scalar::{decode_hex, encode_hex, FixedUint, SecretScalar};
use crate::config::{COORDINATE_LENGTH, UNCOMPRESSED_POINT_LENGTH};

/// A non-identity point on secp256k1.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurvePoint(AffinePoint);

impl CurvePoint {
    /// The standard base point `G`.
    pub fn generator() -> Self {
        Self(AffinePoint::GENERATOR)
    }

    /// Wraps an affine point, rejecting the identity.
    pub fn from_affine(point: AffinePoint) -> Result<Self, CryptoError> {
        if point == AffinePoint::IDENTITY {
            return Err(CryptoError::InvalidPoint("point at infinity".into()));
        }
        Ok(Self(point))
    }

    /// Converts from projective form, rejecting the identity.
    pub fn from_projective(point: ProjectivePoint) -> Result<Self, CryptoError> {
        Self::from_affine(point.to_affine())
    }

    /// `k·G` for a secret scalar. Never the identity.
    pub fn mul_base(k: &SecretScalar) -> Self {
        Self((ProjectivePoint::GENERATOR * k.as_scalar()).to_affine())
    }

    /// `k·P` for a secret scalar. Never the identity when `P` is not.
    pub fn mul_secret(&self, k: &SecretScalar) -> Self {
        Self((ProjectivePoint::from(self.0) * k.as_scalar()).to_affine())
    }

    /// `k·P` for an arbitrary scalar. Fails if `k` is zero.
    pub fn mul_scalar(&self, k: &Scalar) -> Result<Self, CryptoError> {
        Self::from_projective(ProjectivePoint::from(self.0) * k)
    }

    /// Projective form, for sums that may legitimately hit the identity.
    pub fn to_projective(&self) -> ProjectivePoint {
        ProjectivePoint::from(self.0)
    }

    /// The underlying affine point.
    pub fn as_affine(&self) -> &AffinePoint {
        &self.0
    }

    /// Builds a point from big-endian affine coordinates.
    pub fn from_coordinates(x: &FixedUint, y: &FixedUint) -> Result<Self, CryptoError> {
        let x = coordinate_bytes(x)?;
        let y = coordinate_bytes(y)?;
        let encoded = EncodedPoint::from_affine_coordinates(&x, &y, false);
        Self::from_encoded(&encoded)
    }

    /// Decodes SEC1 bytes, compressed or uncompressed.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let encoded = EncodedPoint::from_bytes(bytes)
            .map_err(|_| CryptoError::MalformedEncoding("not a SEC1 point encoding".into()))?;
        Self::from_encoded(&encoded)
    }

    /// Decodes SEC1 hex.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Self::decode(&decode_hex(input)?)
    }

    fn from_encoded(encoded: &EncodedPoint) -> Result<Self, CryptoError> {
        if encoded.is_identity() {
            return Err(CryptoError::InvalidPoint("point at infinity".into()));
        }
        let point = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(encoded))
            .ok_or_else(|| CryptoError::MalformedEncoding("point is not on secp256k1".into()))?;
        Self::from_affine(point)
    }

    /// SEC1 bytes.
    pub fn encode(&self, compress: bool) -> Vec<u8> {
        self.0.to_encoded_point(compress).as_bytes().to_vec()
    }

    /// Compressed SEC1 hex.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.encode(true))
    }

    /// The X coordinate as a 32-byte value. This is what gets XORed with
    /// the blinding scalar.
    pub fn x_coordinate(&self) -> FixedUint {
        FixedUint::from_be_bytes(&self.0.x(), COORDINATE_LENGTH)
            .unwrap_or_else(|_| FixedUint::zero(COORDINATE_LENGTH))
    }

    /// Both affine coordinates, big-endian, 32 bytes each.
    pub fn coordinates(&self) -> (FixedUint, FixedUint) {
        let encoded = self.0.to_encoded_point(false);
        let bytes = encoded.as_bytes();
        debug_assert_eq!(bytes.len(), UNCOMPRESSED_POINT_LENGTH);
        let split = 1 + COORDINATE_LENGTH;
        let x = FixedUint::from_be_bytes(&bytes[1..split], COORDINATE_LENGTH)
            .unwrap_or_else(|_| FixedUint::zero(COORDINATE_LENGTH));
        let y = FixedUint::from_be_bytes(&bytes[split..], COORDINATE_LENGTH)
            .unwrap_or_else(|_| FixedUint::zero(COORDINATE_LENGTH));
        (x, y)
    }
}

/// `k·P`, failing with [`CryptoError::InvalidPoint`] when the product is
/// the identity.
pub fn scalar_multiply(point: &CurvePoint, k: &Scalar) -> Result<CurvePoint, CryptoError> {
    point.mul_scalar(k)
}

fn coordinate_bytes(value: &FixedUint) -> Result<FieldBytes, CryptoError> {
    if value.width() != COORDINATE_LENGTH {
        return Err(CryptoError::EncodingError {
            expected: COORDINATE_LENGTH,
            actual: value.width(),
        });
    }
    Ok(*FieldBytes::from_slice(value.as_bytes()))
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint({})", self.to_hex())
    }
}

impl fmt::Display for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<CurvePoint> for String {
    fn from(value: CurvePoint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for CurvePoint {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::scalar::random_scalar;

    #[test]
    fn test_generator_round_trips() {
        let g = CurvePoint::generator();
        assert_eq!(CurvePoint::decode(&g.encode(true)).unwrap(), g);
        assert_eq!(CurvePoint::decode(&g.encode(false)).unwrap(), g);
        assert!(g
            .to_hex()
            .starts_with("0x0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"));
    }

    #[test]
    fn test_identity_is_rejected() {
        assert!(matches!(
            CurvePoint::decode(&[0x00]),
            Err(CryptoError::InvalidPoint(_))
        ));
        assert!(matches!(
            CurvePoint::from_affine(AffinePoint::IDENTITY),
            Err(CryptoError::InvalidPoint(_))
        ));
        let g = CurvePoint::generator();
        assert!(g.mul_scalar(&Scalar::ZERO).is_err());
    }

    #[test]
    fn test_scalar_multiply() {
        let g = CurvePoint::generator();
        let k = random_scalar();
        assert_eq!(
            scalar_multiply(&g, &k.as_scalar()).unwrap(),
            CurvePoint::mul_base(&k)
        );

        let two_g = scalar_multiply(&g, &Scalar::from(2u64)).unwrap();
        assert_eq!(
            two_g.to_projective(),
            g.to_projective() + g.to_projective()
        );

        assert!(matches!(
            scalar_multiply(&g, &Scalar::ZERO),
            Err(CryptoError::InvalidPoint(_))
        ));
        let minus_one = -Scalar::ONE;
        let neg = scalar_multiply(&g, &minus_one).unwrap();
        assert!(matches!(
            CurvePoint::from_projective(neg.to_projective() + g.to_projective()),
            Err(CryptoError::InvalidPoint(_))
        ));
    }

    #[test]
    fn test_off_curve_is_malformed() {
        let mut bytes = CurvePoint::generator().encode(false);
        bytes[64] ^= 0x01;
        assert!(matches!(
            CurvePoint::decode(&bytes),
            Err(CryptoError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            CurvePoint::decode(&[0x05; 10]),
            Err(CryptoError::MalformedEncoding(_))
        ));
        assert!(CurvePoint::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_coordinates_round_trip() {
        let p = CurvePoint::mul_base(&random_scalar());
        let (x, y) = p.coordinates();
        assert_eq!(x, p.x_coordinate());
        assert_eq!(CurvePoint::from_coordinates(&x, &y).unwrap(), p);
    }

    #[test]
    fn test_diffie_hellman_commutes() {
        let a = random_scalar();
        let s = random_scalar();
        let big_a = CurvePoint::mul_base(&a);
        let z1 = CurvePoint::mul_base(&s);
        assert_eq!(z1.mul_secret(&a), big_a.mul_secret(&s));
    }

    #[test]
    fn test_serde_uses_compressed_hex() {
        let p = CurvePoint::generator();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.starts_with("\"0x02"));
        let back: CurvePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
