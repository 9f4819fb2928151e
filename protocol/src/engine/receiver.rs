//! # Receiver Role
//!
//! [`accept`] publishes the irreversible acceptance tuple
//! `(Z1, Z2, B, c)`; [`open`] later turns the sender's response back into
//! the message.
//!
//! The receiver's long-term secret `b` is the blinding value. It is masked
//! by `x(s·A)`, which only the sender can recompute.

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use super::message::{unpad_message, Ciphertext};
use crate::crypto::{
    CurvePoint, CurveScalar, FixedUint, Modulus, PartyKeypair, ScalarSampler, SecretScalar,
};

/// The acceptance tuple a receiver commits to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    /// `Z1 = s·G` for an ephemeral `s`.
    pub z1: CurvePoint,
    /// `Z2 = x(s·A) XOR b`.
    pub z2: FixedUint,
    /// `B = b·G`.
    pub receiver_public: CurvePoint,
    /// The challenge `c`.
    pub challenge: CurveScalar,
}

/// Builds the acceptance tuple for a delivery whose sender key is `A`.
pub fn accept<R: RngCore + CryptoRng>(
    sender_public: &CurvePoint,
    receiver: &PartyKeypair,
    sampler: &mut ScalarSampler<R>,
) -> Result<Acceptance, ProtocolError> {
    let ephemeral = sampler.next_secret();
    let shared = sender_public.mul_secret(&ephemeral);
    let z1 = CurvePoint::mul_base(&ephemeral);
    let z2 = shared.x_coordinate().xor(&receiver.secret().to_fixed())?;
    let challenge = sampler.next_public();
    Ok(Acceptance {
        z1,
        z2,
        receiver_public: *receiver.public(),
        challenge,
    })
}

/// `v' = r + b·c mod n`.
pub fn recover_commitment_secret(
    receiver_key: &SecretScalar,
    challenge: &CurveScalar,
    response: &CurveScalar,
) -> CurveScalar {
    CurveScalar::from_scalar(
        *response.as_scalar() + receiver_key.as_scalar() * *challenge.as_scalar(),
    )
}

/// Recovers the message from the sender's response.
///
/// A wrong `r` gives a wrong pad and therefore wrong plaintext. Nothing
/// here detects that in general: [`ProtocolError::PaddingMismatch`] is
/// returned only when the error reaches the zero bytes above a short
/// message. Check `r` with [`crate::engine::verify_response`] first.
pub fn open(
    receiver_key: &SecretScalar,
    challenge: &CurveScalar,
    response: &CurveScalar,
    ciphertext: &Ciphertext,
) -> Result<Vec<u8>, ProtocolError> {
    let pad = recover_commitment_secret(receiver_key, challenge, response);
    let padded = pad.to_fixed().xor(ciphertext.body())?;
    unpad_message(&padded, ciphertext.message_len())
}

/// `v' = r + b·c mod n` over an arbitrary modulus.
pub fn recover_mod(n: &Modulus, r: &FixedUint, b: &FixedUint, c: &FixedUint) -> FixedUint {
    n.add(r, &n.mul(b, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sender;

    #[test]
    fn test_acceptance_fields() {
        let mut sampler = ScalarSampler::new();
        let sender_kp = PartyKeypair::generate();
        let receiver_kp = PartyKeypair::generate();
        let acceptance = accept(sender_kp.public(), &receiver_kp, &mut sampler).unwrap();

        assert_eq!(acceptance.receiver_public, *receiver_kp.public());
        assert_eq!(acceptance.z2.width(), 32);
        assert!(!acceptance.challenge.is_zero());
        assert_eq!(sampler.issued(), 2);
    }

    #[test]
    fn test_wrong_z1_breaks_blinding() {
        let mut sampler = ScalarSampler::new();
        let sender_kp = PartyKeypair::generate();
        let receiver_kp = PartyKeypair::generate();
        let acceptance = accept(sender_kp.public(), &receiver_kp, &mut sampler).unwrap();

        let honest =
            sender::recover_blinding(sender_kp.secret(), &acceptance.z1, &acceptance.z2).unwrap();
        assert_eq!(honest, receiver_kp.secret().to_fixed());

        let outsider = CurvePoint::mul_base(&SecretScalar::random());
        let forged =
            sender::recover_blinding(sender_kp.secret(), &outsider, &acceptance.z2).unwrap();
        assert_ne!(forged, receiver_kp.secret().to_fixed());
    }

    fn garbled(result: Result<Vec<u8>, ProtocolError>, original: &[u8]) -> bool {
        match result {
            Ok(plaintext) => plaintext != original,
            Err(e) => e == ProtocolError::PaddingMismatch,
        }
    }

    #[test]
    fn test_open_with_random_response_is_garbled() {
        let mut sampler = ScalarSampler::new();
        let sender_kp = PartyKeypair::generate();
        let receiver_kp = PartyKeypair::generate();
        let (secret, sealed) = sender::seal(b"short", &mut sampler).unwrap();
        let acceptance = accept(sender_kp.public(), &receiver_kp, &mut sampler).unwrap();
        let r = sender::respond(&secret, &sender_kp, &acceptance).unwrap();
        assert_eq!(
            open(receiver_kp.secret(), &acceptance.challenge, &r, &sealed.ciphertext).unwrap(),
            b"short"
        );

        let forged = sampler.next_public();
        assert!(garbled(
            open(receiver_kp.secret(), &acceptance.challenge, &forged, &sealed.ciphertext),
            b"short"
        ));
    }

    #[test]
    fn test_open_with_near_miss_response_never_yields_message() {
        let mut sampler = ScalarSampler::new();
        let sender_kp = PartyKeypair::generate();
        let receiver_kp = PartyKeypair::generate();
        let (secret, sealed) = sender::seal(b"short", &mut sampler).unwrap();
        let acceptance = accept(sender_kp.public(), &receiver_kp, &mut sampler).unwrap();
        let r = sender::respond(&secret, &sender_kp, &acceptance).unwrap();

        for delta in [1u64, 2, 255, 256, 1 << 40] {
            let near = k256::Scalar::from(delta);
            for tampered in [*r.as_scalar() + near, *r.as_scalar() - near] {
                let tampered = CurveScalar::from_scalar(tampered);
                assert!(garbled(
                    open(receiver_kp.secret(), &acceptance.challenge, &tampered, &sealed.ciphertext),
                    b"short"
                ));
            }
        }
    }
}
