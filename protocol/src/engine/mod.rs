//! # Exchange Engine
//!
//! The four role algorithms of a registered delivery. Each is a pure,
//! synchronous function of cryptographic inputs; persisting what they
//! produce is the caller's job.
//!
//! ```text
//!   ┌──────────┐                 LEDGER                 ┌──────────┐
//!   │  Sender  │                                        │ Receiver │
//!   └────┬─────┘                                        └────┬─────┘
//!        │ 1. seal: V = v·G, C = v XOR m                     │
//!        ├──── create(V, A, hash(C), receivers) ───►         │
//!        │                                                    │
//!        │          ◄─── accept(Z1, Z2, B, c) ───────────────┤ 2. accept
//!        │                                                    │  Z1 = s·G
//!        │ 3. respond: b' = Z2 XOR x(a·Z1)                    │  Z2 = x(s·A) XOR b
//!        │             r = v - b'·c                           │
//!        ├──── finish(receiver, r) ──────────►               │
//!        │                                                    │ 4. open
//!        │                                                    │  v' = r + b·c
//!        │                                                    │  m = v' XOR C
//! ```
//!
//! The receiver commits to `c` before anything about `v` is revealed, and
//! the sender's `r` is only useful to the holder of `b`. The ledger
//! records both, which is what makes receipt and delivery provable.

pub mod error;
pub mod message;
pub mod receiver;
pub mod sender;

use k256::ProjectivePoint;

pub use error::ProtocolError;
pub use message::{pad_message, unpad_message, Ciphertext};
pub use receiver::{accept, open, recover_commitment_secret, recover_mod, Acceptance};
pub use sender::{recover_blinding, respond, response_mod, seal, SealedMessage, SenderSecret};

use crate::crypto::{CurvePoint, CurveScalar};

/// Publicly checks a response: `r·G + c·B == V`.
///
/// Holds exactly when `r = v - b·c` for the `v` behind `V` and the `b`
/// behind `B`, so anyone can confirm the sender answered the receiver's
/// challenge with the committed secret, without learning either.
pub fn verify_response(
    commitment: &CurvePoint,
    receiver_public: &CurvePoint,
    challenge: &CurveScalar,
    response: &CurveScalar,
) -> bool {
    let lhs = ProjectivePoint::GENERATOR * response.as_scalar()
        + receiver_public.to_projective() * challenge.as_scalar();
    lhs == commitment.to_projective()
}
