//! End-to-end tests for the exchange engine.
//!
//! These run the four role algorithms the way two real parties would, with
//! the ciphertext passing through a blob store in between, and check the
//! algebraic relations the exchange depends on.

use edelivery_protocol::crypto::{
    CurvePoint, CurveScalar, FixedUint, Modulus, PartyKeypair, ScalarSampler, SecretScalar,
};
use edelivery_protocol::engine::{
    self, accept, open, recover_blinding, recover_mod, respond, response_mod, seal, verify_response,
    Ciphertext, ProtocolError,
};
use edelivery_protocol::storage::{BlobStore, MemoryBlobStore, SledBlobStore};
use num_bigint::BigUint;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Runs a full exchange in memory and returns what the receiver decrypts.
fn exchange(message: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut sampler = ScalarSampler::new();
    let sender = PartyKeypair::generate();
    let receiver = PartyKeypair::generate();

    let (secret, sealed) = seal(message, &mut sampler)?;
    let acceptance = accept(sender.public(), &receiver, &mut sampler)?;
    let r = respond(&secret, &sender, &acceptance)?;
    open(receiver.secret(), &acceptance.challenge, &r, &sealed.ciphertext)
}

fn small(value: u8) -> FixedUint {
    FixedUint::from_be_bytes(&[value], 1).unwrap()
}

// ---------------------------------------------------------------------------
// Round-trip
// ---------------------------------------------------------------------------

#[test]
fn test_round_trip_various_lengths() {
    let messages: [&[u8]; 5] = [
        b"",
        b"a",
        b"registered delivery",
        &[0xffu8; 32],
        &[0x00u8, 0x00, 0x01],
    ];
    for message in messages {
        assert_eq!(exchange(message).unwrap(), message);
    }
}

#[tokio::test]
async fn test_round_trip_through_blob_store() {
    let store = MemoryBlobStore::new();
    let mut sampler = ScalarSampler::new();
    let sender = PartyKeypair::generate();
    let receiver = PartyKeypair::generate();

    let (secret, sealed) = seal(b"contract v2 signed", &mut sampler).unwrap();
    let payload_hash = store.put(&sealed.ciphertext.to_bytes().unwrap()).await.unwrap();

    let acceptance = accept(sender.public(), &receiver, &mut sampler).unwrap();
    let r = respond(&secret, &sender, &acceptance).unwrap();

    let fetched = Ciphertext::from_bytes(&store.get(&payload_hash).await.unwrap()).unwrap();
    let message = open(receiver.secret(), &acceptance.challenge, &r, &fetched).unwrap();
    assert_eq!(message, b"contract v2 signed");
}

#[tokio::test]
async fn test_round_trip_through_sled() {
    let store = SledBlobStore::open_temporary().unwrap();
    let mut sampler = ScalarSampler::new();
    let (_, sealed) = seal(b"persisted", &mut sampler).unwrap();
    let hash = store.put(&sealed.ciphertext.to_bytes().unwrap()).await.unwrap();
    let fetched = Ciphertext::from_bytes(&store.get(&hash).await.unwrap()).unwrap();
    assert_eq!(fetched, sealed.ciphertext);
}

#[test]
fn test_message_too_long_is_caller_error() {
    let err = exchange(&[1u8; 33]).unwrap_err();
    assert!(err.is_caller_error());
}

// ---------------------------------------------------------------------------
// Diffie-Hellman agreement and blinding
// ---------------------------------------------------------------------------

#[test]
fn test_shared_point_agreement_random_triples() {
    for _ in 0..16 {
        let a = SecretScalar::random();
        let b = SecretScalar::random();
        let s = SecretScalar::random();

        let big_a = CurvePoint::mul_base(&a);
        let z1 = CurvePoint::mul_base(&s);

        // Sender side a·(s·G), receiver side s·(a·G).
        assert_eq!(z1.mul_secret(&a), big_a.mul_secret(&s));

        // The blinding recovered by the sender is the receiver's b.
        let z2 = big_a.mul_secret(&s).x_coordinate().xor(&b.to_fixed()).unwrap();
        assert_eq!(recover_blinding(&a, &z1, &z2).unwrap(), b.to_fixed());
    }
}

#[test]
fn test_wrong_z1_gives_wrong_blinding() {
    let mut sampler = ScalarSampler::new();
    let sender = PartyKeypair::generate();
    let receiver = PartyKeypair::generate();
    let acceptance = accept(sender.public(), &receiver, &mut sampler).unwrap();

    let outsider_z1 = CurvePoint::mul_base(&SecretScalar::random());
    let b_prime = recover_blinding(sender.secret(), &outsider_z1, &acceptance.z2).unwrap();
    assert_ne!(b_prime, receiver.secret().to_fixed());

    let mut forged = acceptance.clone();
    forged.z1 = outsider_z1;
    let (secret, _) = seal(b"m", &mut sampler).unwrap();
    assert_eq!(
        respond(&secret, &sender, &forged).unwrap_err(),
        ProtocolError::BlindingMismatch
    );
}

#[test]
fn test_response_from_non_creator_does_not_verify() {
    let mut sampler = ScalarSampler::new();
    let sender = PartyKeypair::generate();
    let receiver = PartyKeypair::generate();

    let (_, sealed) = seal(b"original", &mut sampler).unwrap();
    let acceptance = accept(sender.public(), &receiver, &mut sampler).unwrap();

    // Someone holding the sender key but not v answers with a different v.
    let (impostor_secret, _) = seal(b"original", &mut sampler).unwrap();
    let r = respond(&impostor_secret, &sender, &acceptance).unwrap();

    assert!(!verify_response(
        &sealed.commitment,
        &acceptance.receiver_public,
        &acceptance.challenge,
        &r
    ));
}

// ---------------------------------------------------------------------------
// Worked scenario
// ---------------------------------------------------------------------------

#[test]
fn test_worked_scenario_modulus_23() {
    let n = Modulus::new(BigUint::from(23u8), 1).unwrap();
    let v = small(5);
    let m = small(5);
    let b = small(7);
    let c = small(3);

    let ciphertext = v.xor(&m).unwrap();
    assert_eq!(ciphertext, small(0));

    let r = response_mod(&n, &v, &b, &c);
    assert_eq!(r, small(7));

    let v_prime = recover_mod(&n, &r, &b, &c);
    assert_eq!(v_prime, small(5));

    let m_prime = v_prime.xor(&ciphertext).unwrap();
    assert_eq!(m_prime, small(5));
}

#[test]
fn test_generic_path_matches_curve_path() {
    let mut sampler = ScalarSampler::new();
    let sender = PartyKeypair::generate();
    let receiver = PartyKeypair::generate();
    let n = Modulus::secp256k1();

    let (secret, _) = seal(b"m", &mut sampler).unwrap();
    let v = FixedUint::from_hex(&secret.to_hex(), 32).unwrap();
    let acceptance = accept(sender.public(), &receiver, &mut sampler).unwrap();
    let r = respond(&secret, &sender, &acceptance).unwrap();

    let b = receiver.secret().to_fixed();
    let c = acceptance.challenge.to_fixed();
    assert_eq!(response_mod(&n, &v, &b, &c), r.to_fixed());

    let v_prime = engine::recover_commitment_secret(receiver.secret(), &acceptance.challenge, &r);
    assert_eq!(recover_mod(&n, &r.to_fixed(), &b, &c), v_prime.to_fixed());
    assert_eq!(v_prime, CurveScalar::from_hex(&secret.to_hex()).unwrap());
}
