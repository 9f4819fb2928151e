//! # Party Keys
//!
//! Long-term secp256k1 keypairs for senders and receivers.
//!
//! The sender's public key `A` is what a receiver aims its Diffie-Hellman
//! half at; the receiver's public key `B = b·G` doubles as the commitment
//! to its blinding secret `b`. In both cases the secret half never leaves
//! the owning party.
//!
//! ## Serialization
//!
//! `PartyKeypair` does not implement `Serialize`/`Deserialize`. Exporting a
//! private key goes through [`secret_hex`](PartyKeypair::secret_hex) on
//! purpose, so it never ends up in a JSON response by accident.

use std::fmt;

use super::curve::CurvePoint;
use super::error::CryptoError;
use super::scalar::{encode_hex, SecretScalar};
use crate::identity::Address;

/// A secp256k1 keypair: secret scalar plus its public point.
#[derive(Clone)]
pub struct PartyKeypair {
    secret: SecretScalar,
    public: CurvePoint,
}

impl PartyKeypair {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(SecretScalar::random())
    }

    /// Derives the public half from an existing secret.
    pub fn from_secret(secret: SecretScalar) -> Self {
        let public = CurvePoint::mul_base(&secret);
        Self { secret, public }
    }

    /// Loads a keypair from hex-encoded secret key bytes.
    ///
    /// Fine for devnet config files; keep real keys out of plaintext.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_secret(SecretScalar::from_hex(input)?))
    }

    /// The secret scalar.
    pub fn secret(&self) -> &SecretScalar {
        &self.secret
    }

    /// The public point.
    pub fn public(&self) -> &CurvePoint {
        &self.public
    }

    /// The ledger address of this keypair.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public)
    }

    /// Exports the secret key as `0x` + 64 hex digits. Handle with care.
    pub fn secret_hex(&self) -> String {
        encode_hex(&self.secret.to_bytes())
    }
}

impl fmt::Debug for PartyKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyKeypair(pub={})", self.public.to_hex())
    }
}

impl PartialEq for PartyKeypair {
    /// Keypairs compare by public key.
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for PartyKeypair {}
