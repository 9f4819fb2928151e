// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # E-Delivery Protocol — Core Library
//!
//! Confidential, non-repudiable registered delivery between two parties
//! with no trusted third party. A public append-only ledger supplies the
//! timestamps; this crate supplies the cryptography.
//!
//! A sender commits to a secret `v` and publishes a message masked with it.
//! A receiver publicly commits to a challenge before learning anything
//! about `v`. The sender answers with a Schnorr-style response that only
//! that receiver can turn back into `v`, and therefore into the message.
//! Once both steps are on the ledger neither party can deny them.
//!
//! ## Architecture
//!
//! - **config** — Curve parameters, widths, default terms, adapter timing.
//! - **crypto** — secp256k1 points, scalars, fixed-width XOR, keypairs.
//! - **engine** — The four role algorithms: seal, accept, respond, open.
//! - **identity** — Ledger addresses derived from public keys.
//! - **storage** — Content-addressed blob store (memory and sled).
//!
//! The delivery state machine and ledger adapter live in
//! `edelivery-contracts`; the devnet node and client in `edelivery-node`.
//!
//! ## Design Philosophy
//!
//! 1. Secrets are typed. A `SecretScalar` cannot be serialized or printed.
//! 2. Widths are explicit. Nothing is XORed until both sides agree on size.
//! 3. The engine is pure. I/O happens behind async traits at the edges.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod identity;
pub mod storage;
