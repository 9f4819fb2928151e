//! # Ledger Call and View Encoding
//!
//! The shapes values take when they cross the ledger boundary. Everything
//! numeric is a `0x`-prefixed, zero-padded, 64-digit big-endian hex
//! integer:
//!
//! | Value                   | Encoding                                   |
//! |-------------------------|--------------------------------------------|
//! | `V`, `B`                | coordinate pair `(x, y)`, 64 digits each   |
//! | `Z1`, `A`               | SEC1 hex, uncompressed on output           |
//! | `Z2`, `c`, `r`          | 64 digits                                  |
//! | payload hash            | 64 digits                                  |
//!
//! Decoding is strict: a coordinate pair off the curve, a scalar at or
//! above the group order, or a value wider than 32 bytes is a
//! [`CryptoError`], never silently coerced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edelivery_protocol::config::SCALAR_LENGTH;
use edelivery_protocol::crypto::{encode_hex, CryptoError, CurvePoint, CurveScalar, FixedUint};
use edelivery_protocol::engine::Acceptance;
use edelivery_protocol::identity::Address;
use edelivery_protocol::storage::ContentHash;

use crate::delivery::{
    Delivery, DeliveryError, DeliveryId, DeliveryStatus, NewDelivery, Settlement,
};

fn point_pair(point: &CurvePoint) -> (String, String) {
    let (x, y) = point.coordinates();
    (x.to_hex(), y.to_hex())
}

fn point_from_pair(x: &str, y: &str) -> Result<CurvePoint, CryptoError> {
    CurvePoint::from_coordinates(
        &FixedUint::from_hex(x, SCALAR_LENGTH)?,
        &FixedUint::from_hex(y, SCALAR_LENGTH)?,
    )
}

fn sec1_hex(point: &CurvePoint) -> String {
    encode_hex(&point.encode(false))
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Arguments of `create_delivery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeliveryCall {
    /// Receiver addresses, in order.
    pub receivers: Vec<Address>,
    /// X of the commitment `V`.
    pub vx: String,
    /// Y of the commitment `V`.
    pub vy: String,
    /// Content address of the ciphertext.
    pub payload_hash: ContentHash,
    /// The sender's public key `A`, SEC1 hex.
    pub sender_public: String,
    /// Acceptance window, seconds.
    pub term1: u64,
    /// Finish window, seconds.
    pub term2: u64,
}

impl CreateDeliveryCall {
    /// Encodes creation arguments.
    pub fn new(
        receivers: Vec<Address>,
        commitment: &CurvePoint,
        sender_public: &CurvePoint,
        payload_hash: ContentHash,
        term1: u64,
        term2: u64,
    ) -> Self {
        let (vx, vy) = point_pair(commitment);
        Self {
            receivers,
            vx,
            vy,
            payload_hash,
            sender_public: sec1_hex(sender_public),
            term1,
            term2,
        }
    }

    /// Decodes and validates the points.
    pub fn decode(&self) -> Result<NewDelivery, CryptoError> {
        Ok(NewDelivery {
            receivers: self.receivers.clone(),
            commitment: point_from_pair(&self.vx, &self.vy)?,
            sender_public: CurvePoint::from_hex(&self.sender_public)?,
            payload_hash: self.payload_hash,
            term1: self.term1,
            term2: self.term2,
        })
    }
}

/// Arguments of `accept`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptCall {
    /// `Z1`, SEC1 hex.
    pub z1: String,
    /// `Z2`.
    pub z2: String,
    /// X of the receiver's public key `B`.
    pub bx: String,
    /// Y of the receiver's public key `B`.
    pub by: String,
    /// The challenge `c`.
    pub challenge: String,
}

impl From<&Acceptance> for AcceptCall {
    fn from(acceptance: &Acceptance) -> Self {
        let (bx, by) = point_pair(&acceptance.receiver_public);
        Self {
            z1: sec1_hex(&acceptance.z1),
            z2: acceptance.z2.to_hex(),
            bx,
            by,
            challenge: acceptance.challenge.to_hex(),
        }
    }
}

impl AcceptCall {
    /// Decodes into an acceptance tuple.
    pub fn decode(&self) -> Result<Acceptance, CryptoError> {
        Ok(Acceptance {
            z1: CurvePoint::from_hex(&self.z1)?,
            z2: FixedUint::from_hex(&self.z2, SCALAR_LENGTH)?,
            receiver_public: point_from_pair(&self.bx, &self.by)?,
            challenge: CurveScalar::from_hex(&self.challenge)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// What `receivers_state` returns. Fields stay `None` until the
/// transition that sets them has happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverStateView {
    /// The receiver.
    pub receiver: Address,
    /// Current status.
    pub status: DeliveryStatus,
    /// `Z1`, SEC1 hex.
    pub z1: Option<String>,
    /// `Z2`.
    pub z2: Option<String>,
    /// X of `B`.
    pub bx: Option<String>,
    /// Y of `B`.
    pub by: Option<String>,
    /// Challenge.
    pub c: Option<String>,
    /// Response.
    pub r: Option<String>,
    /// Ledger time of acceptance.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Ledger time of finish.
    pub finished_at: Option<DateTime<Utc>>,
    /// Last instant `finish` is accepted, once the receiver has accepted.
    pub finish_deadline: Option<DateTime<Utc>>,
    /// The receiver's open window had closed when the view was taken.
    pub lapsed: bool,
}

impl ReceiverStateView {
    /// Renders `receiver`'s state in `delivery` as of ledger time `now`.
    pub fn new(
        delivery: &Delivery,
        receiver: Address,
        now: DateTime<Utc>,
    ) -> Result<Self, DeliveryError> {
        let state = delivery.receiver_state(&receiver)?;
        let acceptance = state.acceptance.as_ref();
        let b = acceptance.map(|a| point_pair(&a.receiver_public));
        Ok(Self {
            receiver,
            status: state.status,
            z1: acceptance.map(|a| sec1_hex(&a.z1)),
            z2: acceptance.map(|a| a.z2.to_hex()),
            bx: b.as_ref().map(|(x, _)| x.clone()),
            by: b.map(|(_, y)| y),
            c: acceptance.map(|a| a.challenge.to_hex()),
            r: state.response.map(|r| r.to_hex()),
            accepted_at: state.accepted_at,
            finished_at: state.finished_at,
            finish_deadline: delivery.finish_deadline(&receiver),
            lapsed: delivery.is_receiver_lapsed(&receiver, now),
        })
    }

    /// Decodes the acceptance tuple, if there is one.
    pub fn acceptance(&self) -> Result<Option<Acceptance>, CryptoError> {
        match (&self.z1, &self.z2, &self.bx, &self.by, &self.c) {
            (Some(z1), Some(z2), Some(bx), Some(by), Some(c)) => Ok(Some(
                AcceptCall {
                    z1: z1.clone(),
                    z2: z2.clone(),
                    bx: bx.clone(),
                    by: by.clone(),
                    challenge: c.clone(),
                }
                .decode()?,
            )),
            _ => Ok(None),
        }
    }

    /// Decodes the response, if there is one.
    pub fn response(&self) -> Result<Option<CurveScalar>, CryptoError> {
        self.r.as_deref().map(CurveScalar::from_hex).transpose()
    }
}

/// Overview of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryView {
    /// Id.
    pub id: DeliveryId,
    /// Creator.
    pub sender: Address,
    /// Receivers in creation order.
    pub receivers: Vec<Address>,
    /// X of `V`.
    pub vx: String,
    /// Y of `V`.
    pub vy: String,
    /// `A`, SEC1 hex.
    pub sender_public: String,
    /// Content address of the ciphertext.
    pub payload_hash: ContentHash,
    /// Acceptance window, seconds.
    pub term1: u64,
    /// Finish window, seconds.
    pub term2: u64,
    /// Ledger time of creation.
    pub start: DateTime<Utc>,
    /// Last instant `accept` is accepted.
    pub accept_deadline: DateTime<Utc>,
    /// Escrowed value.
    pub deposit: u64,
    /// Per-receiver states in receiver order.
    pub states: Vec<ReceiverStateView>,
    /// Payout, once settled.
    pub settlement: Option<Settlement>,
}

impl DeliveryView {
    /// Decodes the commitment `V`.
    pub fn commitment(&self) -> Result<CurvePoint, CryptoError> {
        point_from_pair(&self.vx, &self.vy)
    }

    /// Decodes the sender key `A`.
    pub fn sender_public(&self) -> Result<CurvePoint, CryptoError> {
        CurvePoint::from_hex(&self.sender_public)
    }

    /// The view of one receiver.
    pub fn state_of(&self, receiver: &Address) -> Option<&ReceiverStateView> {
        self.states.iter().find(|s| s.receiver == *receiver)
    }

    /// Renders `delivery` as of ledger time `now`.
    pub fn at(delivery: &Delivery, now: DateTime<Utc>) -> Self {
        let (vx, vy) = point_pair(&delivery.commitment);
        let states = delivery
            .receivers
            .iter()
            .filter_map(|r| ReceiverStateView::new(delivery, *r, now).ok())
            .collect();
        Self {
            id: delivery.id,
            sender: delivery.sender,
            receivers: delivery.receivers.clone(),
            vx,
            vy,
            sender_public: sec1_hex(&delivery.sender_public),
            payload_hash: delivery.payload_hash,
            term1: delivery.term1,
            term2: delivery.term2,
            start: delivery.start,
            accept_deadline: delivery.accept_deadline(),
            deposit: delivery.deposit,
            states,
            settlement: delivery.settlement().cloned(),
        }
    }
}
