//! # Sender Role
//!
//! Two steps, separated by the receiver's acceptance:
//!
//! 1. [`seal`]: draw the commitment secret `v`, publish `V = v·G`, and mask
//!    the message as `C = v XOR pad32(m)`.
//! 2. [`respond`]: recover the receiver's blinding `b'` from `(Z1, Z2)`,
//!    check it opens to `B`, and publish `r = v - b'·c mod n`.
//!
//! `v` never leaves [`SenderSecret`] except through an explicit export.

use std::fmt;

use k256::ProjectivePoint;
use rand_core::{CryptoRng, RngCore};

use super::error::ProtocolError;
use super::message::{pad_message, Ciphertext};
use super::receiver::Acceptance;
use crate::crypto::{
    encode_hex, CryptoError, CurvePoint, CurveScalar, FixedUint, Modulus, PartyKeypair,
    ScalarSampler, SecretScalar,
};

/// The sender's private state between creation and finish.
#[derive(Clone)]
pub struct SenderSecret {
    commitment_secret: SecretScalar,
}

impl SenderSecret {
    /// Wraps a previously exported commitment secret.
    pub fn from_secret(commitment_secret: SecretScalar) -> Self {
        Self { commitment_secret }
    }

    /// Restores from [`to_hex`](Self::to_hex) output.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_secret(SecretScalar::from_hex(input)?))
    }

    /// The public commitment `V = v·G`.
    pub fn commitment(&self) -> CurvePoint {
        CurvePoint::mul_base(&self.commitment_secret)
    }

    /// Exports `v` so the sender can persist it until finish.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.commitment_secret.to_bytes())
    }
}

impl fmt::Debug for SenderSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderSecret(commitment={})", self.commitment().to_hex())
    }
}

/// What the sender publishes at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedMessage {
    /// `V = v·G`.
    pub commitment: CurvePoint,
    /// `C`, destined for the blob store.
    pub ciphertext: Ciphertext,
}

/// Commits to a fresh secret and masks `message` with it.
pub fn seal<R: RngCore + CryptoRng>(
    message: &[u8],
    sampler: &mut ScalarSampler<R>,
) -> Result<(SenderSecret, SealedMessage), ProtocolError> {
    let padded = pad_message(message)?;
    let commitment_secret = sampler.next_secret();
    let commitment = CurvePoint::mul_base(&commitment_secret);
    let body = commitment_secret.to_fixed().xor(&padded)?;
    let ciphertext = Ciphertext::new(body, message.len())?;
    Ok((
        SenderSecret { commitment_secret },
        SealedMessage {
            commitment,
            ciphertext,
        },
    ))
}

/// `b' = Z2 XOR x(a·Z1)`.
///
/// Equals the receiver's `b` exactly when `Z1` is the receiver's `s·G`.
pub fn recover_blinding(
    sender_key: &SecretScalar,
    z1: &CurvePoint,
    z2: &FixedUint,
) -> Result<FixedUint, ProtocolError> {
    let shared = z1.mul_secret(sender_key);
    Ok(z2.xor(&shared.x_coordinate())?)
}

/// Computes the response `r` for one receiver's acceptance.
///
/// Fails with [`ProtocolError::BlindingMismatch`] if the recovered
/// blinding does not satisfy `b'·G == B`. Such an acceptance could never
/// be opened by its receiver, so no response is produced for it.
pub fn respond(
    secret: &SenderSecret,
    sender: &PartyKeypair,
    acceptance: &Acceptance,
) -> Result<CurveScalar, ProtocolError> {
    let blinding = recover_blinding(sender.secret(), &acceptance.z1, &acceptance.z2)?;
    let b = CurveScalar::reduce(&blinding)?;
    let opened = ProjectivePoint::GENERATOR * b.as_scalar();
    if opened != acceptance.receiver_public.to_projective() {
        return Err(ProtocolError::BlindingMismatch);
    }
    let r = secret.commitment_secret.as_scalar()
        - *b.as_scalar() * *acceptance.challenge.as_scalar();
    Ok(CurveScalar::from_scalar(r))
}

/// `r = v - b·c mod n` over an arbitrary modulus.
pub fn response_mod(n: &Modulus, v: &FixedUint, b: &FixedUint, c: &FixedUint) -> FixedUint {
    n.sub(v, &n.mul(b, c))
}
