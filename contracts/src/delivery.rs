//! # Delivery Contract
//!
//! The authoritative record of one registered delivery and the state
//! machine that guards it. Every receiver progresses on its own:
//!
//! ```text
//!            accept (receiver, before start + term1)
//!   Created ─────────────────────────────────────────► Accepted
//!                                                         │
//!            finish (sender, before accepted_at + term2)  │
//!   Finished ◄────────────────────────────────────────────┘
//! ```
//!
//! No other transition exists. Values set by a transition are written
//! once and never touched again. A receiver whose window closes stays in
//! its last state forever, and once every receiver is either finished or
//! lapsed the deposit can be settled exactly once.
//!
//! The methods here mutate in place and may leave a partially checked
//! `Delivery` behind on error; [`DeliveryRegistry`](crate::registry::DeliveryRegistry)
//! runs them on a copy so failed commands change nothing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use edelivery_protocol::config::{MAX_TERM_SECS, SCALAR_LENGTH};
use edelivery_protocol::crypto::{CryptoError, CurvePoint, CurveScalar};
use edelivery_protocol::engine::{verify_response, Acceptance};
use edelivery_protocol::identity::Address;
use edelivery_protocol::storage::ContentHash;

use crate::policy::{DeliveryPolicy, LapseOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while applying a delivery command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiver is not in the state this transition starts from.
    #[error("invalid state transition: receiver is {current}, expected {expected}")]
    InvalidState {
        /// The receiver's current status.
        current: DeliveryStatus,
        /// The status required for this operation.
        expected: DeliveryStatus,
    },

    /// The caller is not the party allowed to perform this action.
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized {
        /// Who tried.
        caller: Address,
        /// What they tried.
        action: String,
    },

    /// The window for this action has closed.
    #[error("deadline exceeded: window closed at {deadline}, now {now}")]
    DeadlineExceeded {
        /// When the window closed.
        deadline: DateTime<Utc>,
        /// Ledger time of the attempt.
        now: DateTime<Utc>,
    },

    /// The address is not one of this delivery's receivers.
    #[error("unknown receiver: {0}")]
    UnknownReceiver(Address),

    /// No delivery with this id exists.
    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryId),

    /// The escrowed value is below the policy minimum.
    #[error("insufficient deposit: required {required}, provided {provided}")]
    InsufficientDeposit {
        /// Policy minimum.
        required: u64,
        /// Value sent with creation.
        provided: u64,
    },

    /// Creation or acceptance arguments are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// `r·G + c·B != V`.
    #[error("response does not verify against the commitment")]
    InvalidResponse,

    /// Some receiver still has an open window.
    #[error("not settleable: {0}")]
    NotSettleable(String),

    /// The deposit was already paid out.
    #[error("delivery already settled")]
    AlreadySettled,

    /// A submitted value failed to decode.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque identifier of a delivery, assigned by the ledger at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeliveryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-receiver lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Waiting for the receiver to accept.
    Created,
    /// Receiver committed its acceptance; waiting for the sender's response.
    Accepted,
    /// Sender published the response.
    Finished,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Created => write!(f, "Created"),
            DeliveryStatus::Accepted => write!(f, "Accepted"),
            DeliveryStatus::Finished => write!(f, "Finished"),
        }
    }
}

/// What the ledger holds for one (delivery, receiver) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverState {
    /// Current status.
    pub status: DeliveryStatus,
    /// `(Z1, Z2, B, c)`, set at acceptance.
    pub acceptance: Option<Acceptance>,
    /// Ledger time of acceptance.
    pub accepted_at: Option<DateTime<Utc>>,
    /// The sender's `r`, set at finish.
    pub response: Option<CurveScalar>,
    /// Ledger time of finish.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReceiverState {
    fn new() -> Self {
        Self {
            status: DeliveryStatus::Created,
            acceptance: None,
            accepted_at: None,
            response: None,
            finished_at: None,
        }
    }
}

/// Arguments of a creation command, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDelivery {
    /// Ordered, duplicate-free receiver set.
    pub receivers: Vec<Address>,
    /// `V = v·G`.
    pub commitment: CurvePoint,
    /// `A = a·G`.
    pub sender_public: CurvePoint,
    /// Content address of the ciphertext.
    pub payload_hash: ContentHash,
    /// Acceptance window in seconds from creation.
    pub term1: u64,
    /// Finish window in seconds from each acceptance.
    pub term2: u64,
}

/// Why a share of the deposit went where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutReason {
    /// The receiver was finished; the sender gets its share back.
    Delivered(Address),
    /// The receiver never accepted in time.
    NeverAccepted(Address),
    /// The receiver accepted but the sender never finished in time.
    FinishLapsed(Address),
    /// Indivisible remainder of the split.
    Remainder,
}

/// One transfer out of the escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Beneficiary.
    pub to: Address,
    /// Value.
    pub amount: u64,
    /// Why.
    pub reason: PayoutReason,
}

/// The one-time payout of a delivery's deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Ledger time of settlement.
    pub settled_at: DateTime<Utc>,
    /// Who triggered it.
    pub settled_by: Address,
    /// Transfers, one per receiver share plus any remainder.
    pub payouts: Vec<Payout>,
}

impl Settlement {
    /// Sum of all payouts. Always equals the deposit.
    pub fn total(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Total paid to `address`.
    pub fn amount_to(&self, address: &Address) -> u64 {
        self.payouts
            .iter()
            .filter(|p| p.to == *address)
            .map(|p| p.amount)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// One registered delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Ledger-assigned id.
    pub id: DeliveryId,
    /// Creator.
    pub sender: Address,
    /// Receivers in creation order.
    pub receivers: Vec<Address>,
    /// `V = v·G`.
    pub commitment: CurvePoint,
    /// `A = a·G`.
    pub sender_public: CurvePoint,
    /// Content address of `C`.
    pub payload_hash: ContentHash,
    /// Acceptance window, seconds.
    pub term1: u64,
    /// Finish window, seconds.
    pub term2: u64,
    /// Ledger time of creation.
    pub start: DateTime<Utc>,
    /// Escrowed value.
    pub deposit: u64,
    states: BTreeMap<Address, ReceiverState>,
    settlement: Option<Settlement>,
}

impl Delivery {
    /// Validates a creation command and builds the record.
    pub fn create(
        id: DeliveryId,
        caller: Address,
        params: NewDelivery,
        deposit: u64,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Self, DeliveryError> {
        if deposit < policy.min_deposit {
            return Err(DeliveryError::InsufficientDeposit {
                required: policy.min_deposit,
                provided: deposit,
            });
        }
        if params.receivers.is_empty() {
            return Err(DeliveryError::InvalidParameters(
                "at least one receiver is required".into(),
            ));
        }
        if params.receivers.len() > policy.max_receivers {
            return Err(DeliveryError::InvalidParameters(format!(
                "{} receivers exceeds the limit of {}",
                params.receivers.len(),
                policy.max_receivers
            )));
        }
        for (name, term) in [("term1", params.term1), ("term2", params.term2)] {
            if term == 0 || term > MAX_TERM_SECS {
                return Err(DeliveryError::InvalidParameters(format!(
                    "{} must be between 1 and {} seconds",
                    name, MAX_TERM_SECS
                )));
            }
        }

        let mut states = BTreeMap::new();
        for receiver in &params.receivers {
            if states.insert(*receiver, ReceiverState::new()).is_some() {
                return Err(DeliveryError::InvalidParameters(format!(
                    "duplicate receiver {}",
                    receiver
                )));
            }
        }

        Ok(Self {
            id,
            sender: caller,
            receivers: params.receivers,
            commitment: params.commitment,
            sender_public: params.sender_public,
            payload_hash: params.payload_hash,
            term1: params.term1,
            term2: params.term2,
            start: now,
            deposit,
            states,
            settlement: None,
        })
    }

    /// Created → Accepted for the calling receiver.
    pub fn accept(
        &mut self,
        caller: Address,
        acceptance: Acceptance,
        now: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let deadline = self.accept_deadline();
        let state = self
            .states
            .get_mut(&caller)
            .ok_or_else(|| DeliveryError::Unauthorized {
                caller,
                action: "accept".into(),
            })?;

        if state.status != DeliveryStatus::Created {
            return Err(DeliveryError::InvalidState {
                current: state.status,
                expected: DeliveryStatus::Created,
            });
        }
        if now > deadline {
            return Err(DeliveryError::DeadlineExceeded { deadline, now });
        }
        if acceptance.z2.width() != SCALAR_LENGTH {
            return Err(CryptoError::EncodingError {
                expected: SCALAR_LENGTH,
                actual: acceptance.z2.width(),
            }
            .into());
        }
        if Address::from_public_key(&acceptance.receiver_public) != caller {
            return Err(DeliveryError::InvalidParameters(
                "receiver public key does not belong to the caller".into(),
            ));
        }

        state.status = DeliveryStatus::Accepted;
        state.acceptance = Some(acceptance);
        state.accepted_at = Some(now);
        Ok(())
    }

    /// Accepted → Finished for `receiver`, called by the sender.
    pub fn finish(
        &mut self,
        caller: Address,
        receiver: Address,
        response: CurveScalar,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<(), DeliveryError> {
        if caller != self.sender {
            return Err(DeliveryError::Unauthorized {
                caller,
                action: "finish".into(),
            });
        }
        let commitment = self.commitment;
        let term2 = self.term2;
        let state = self
            .states
            .get_mut(&receiver)
            .ok_or(DeliveryError::UnknownReceiver(receiver))?;

        if state.status != DeliveryStatus::Accepted {
            return Err(DeliveryError::InvalidState {
                current: state.status,
                expected: DeliveryStatus::Accepted,
            });
        }

        let verified = {
            let (acceptance, accepted_at) = match (&state.acceptance, state.accepted_at) {
                (Some(acceptance), Some(at)) => (acceptance, at),
                _ => {
                    return Err(DeliveryError::InvalidState {
                        current: state.status,
                        expected: DeliveryStatus::Accepted,
                    })
                }
            };
            let deadline = accepted_at + term_duration(term2);
            if now > deadline {
                return Err(DeliveryError::DeadlineExceeded { deadline, now });
            }
            !policy.verify_response
                || verify_response(
                    &commitment,
                    &acceptance.receiver_public,
                    &acceptance.challenge,
                    &response,
                )
        };
        if !verified {
            return Err(DeliveryError::InvalidResponse);
        }

        state.status = DeliveryStatus::Finished;
        state.response = Some(response);
        state.finished_at = Some(now);
        Ok(())
    }

    /// Pays out the deposit once every receiver is finished or lapsed.
    ///
    /// The deposit is split equally across receivers; the indivisible
    /// remainder returns to the sender. Zero-value shares are omitted.
    pub fn settle(
        &mut self,
        caller: Address,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Settlement, DeliveryError> {
        if self.settlement.is_some() {
            return Err(DeliveryError::AlreadySettled);
        }
        if caller != self.sender && !self.states.contains_key(&caller) {
            return Err(DeliveryError::Unauthorized {
                caller,
                action: "settle".into(),
            });
        }

        let count = self.receivers.len() as u64;
        let share = self.deposit / count;
        let remainder = self.deposit % count;
        let mut payouts = Vec::with_capacity(self.receivers.len() + 1);

        for receiver in &self.receivers {
            let state = self
                .states
                .get(receiver)
                .ok_or(DeliveryError::UnknownReceiver(*receiver))?;
            let (to, reason) = match state.status {
                DeliveryStatus::Finished => (self.sender, PayoutReason::Delivered(*receiver)),
                _ if !self.is_lapsed(state, now) => {
                    return Err(DeliveryError::NotSettleable(format!(
                        "receiver {} is {} and its window is still open",
                        receiver, state.status
                    )));
                }
                DeliveryStatus::Created => (self.sender, PayoutReason::NeverAccepted(*receiver)),
                DeliveryStatus::Accepted => {
                    let to = match policy.lapsed_finish {
                        LapseOutcome::ForfeitToReceiver => *receiver,
                        LapseOutcome::RefundSender => self.sender,
                    };
                    (to, PayoutReason::FinishLapsed(*receiver))
                }
            };
            if share > 0 {
                payouts.push(Payout {
                    to,
                    amount: share,
                    reason,
                });
            }
        }
        if remainder > 0 {
            payouts.push(Payout {
                to: self.sender,
                amount: remainder,
                reason: PayoutReason::Remainder,
            });
        }

        let settlement = Settlement {
            settled_at: now,
            settled_by: caller,
            payouts,
        };
        self.settlement = Some(settlement.clone());
        Ok(settlement)
    }

    /// Status of one receiver. `Created` until it accepts.
    pub fn status(&self, receiver: &Address) -> Result<DeliveryStatus, DeliveryError> {
        Ok(self.receiver_state(receiver)?.status)
    }

    /// Full state of one receiver.
    pub fn receiver_state(&self, receiver: &Address) -> Result<&ReceiverState, DeliveryError> {
        self.states
            .get(receiver)
            .ok_or(DeliveryError::UnknownReceiver(*receiver))
    }

    /// Last instant at which `accept` succeeds.
    pub fn accept_deadline(&self) -> DateTime<Utc> {
        self.start + term_duration(self.term1)
    }

    /// Last instant at which `finish` succeeds for `receiver`, once it has
    /// accepted.
    pub fn finish_deadline(&self, receiver: &Address) -> Option<DateTime<Utc>> {
        self.states
            .get(receiver)
            .and_then(|s| s.accepted_at)
            .map(|at| at + term_duration(self.term2))
    }

    /// True when `receiver`'s current window has closed without progress.
    pub fn is_receiver_lapsed(&self, receiver: &Address, now: DateTime<Utc>) -> bool {
        self.states
            .get(receiver)
            .map(|s| self.is_lapsed(s, now))
            .unwrap_or(false)
    }

    fn is_lapsed(&self, state: &ReceiverState, now: DateTime<Utc>) -> bool {
        match state.status {
            DeliveryStatus::Created => now > self.accept_deadline(),
            DeliveryStatus::Accepted => state
                .accepted_at
                .map(|at| now > at + term_duration(self.term2))
                .unwrap_or(false),
            DeliveryStatus::Finished => false,
        }
    }

    /// True if `address` is the sender or a receiver.
    pub fn involves(&self, address: &Address) -> bool {
        self.sender == *address || self.states.contains_key(address)
    }

    /// The settlement, once made.
    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }
}

fn term_duration(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TERM_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edelivery_protocol::crypto::{PartyKeypair, ScalarSampler};
    use edelivery_protocol::engine::{accept, respond, seal, SenderSecret};

    struct Fixture {
        sender: PartyKeypair,
        receiver: PartyKeypair,
        secret: SenderSecret,
        delivery: Delivery,
        sampler: ScalarSampler,
        start: DateTime<Utc>,
    }

    fn fixture(deposit: u64) -> Fixture {
        let mut sampler = ScalarSampler::new();
        let sender = PartyKeypair::generate();
        let receiver = PartyKeypair::generate();
        let (secret, sealed) = seal(b"hello", &mut sampler).unwrap();
        let start = Utc::now();
        let delivery = Delivery::create(
            DeliveryId::new(),
            sender.address(),
            NewDelivery {
                receivers: vec![receiver.address()],
                commitment: sealed.commitment,
                sender_public: *sender.public(),
                payload_hash: ContentHash::of(b"ciphertext"),
                term1: 60,
                term2: 120,
            },
            deposit,
            start,
            &DeliveryPolicy::default(),
        )
        .unwrap();
        Fixture {
            sender,
            receiver,
            secret,
            delivery,
            sampler,
            start,
        }
    }

    fn new_delivery(receivers: Vec<Address>, term1: u64, term2: u64) -> NewDelivery {
        let kp = PartyKeypair::generate();
        NewDelivery {
            receivers,
            commitment: *kp.public(),
            sender_public: *kp.public(),
            payload_hash: ContentHash::of(b"c"),
            term1,
            term2,
        }
    }

    #[test]
    fn create_starts_all_receivers_created() {
        let f = fixture(10);
        assert_eq!(
            f.delivery.status(&f.receiver.address()).unwrap(),
            DeliveryStatus::Created
        );
        assert_eq!(f.delivery.sender, f.sender.address());
        assert!(f.delivery.settlement().is_none());
    }

    #[test]
    fn create_rejects_bad_parameters() {
        let policy = DeliveryPolicy::default();
        let sender = PartyKeypair::generate().address();
        let r = PartyKeypair::generate().address();
        let now = Utc::now();

        let params = new_delivery(vec![r], 1, 1);
        let err = Delivery::create(DeliveryId::new(), sender, params, 0, now, &policy).unwrap_err();
        assert_eq!(
            err,
            DeliveryError::InsufficientDeposit {
                required: 1,
                provided: 0
            }
        );

        for params in [
            new_delivery(vec![], 1, 1),
            new_delivery(vec![r, r], 1, 1),
            new_delivery(vec![r], 0, 1),
            new_delivery(vec![r], 1, 0),
            new_delivery(vec![r], MAX_TERM_SECS + 1, 1),
        ] {
            assert!(matches!(
                Delivery::create(DeliveryId::new(), sender, params, 5, now, &policy),
                Err(DeliveryError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn accept_then_finish() {
        let mut f = fixture(10);
        let acceptance = accept(f.sender.public(), &f.receiver, &mut f.sampler).unwrap();
        let r = respond(&f.secret, &f.sender, &acceptance).unwrap();
        let policy = DeliveryPolicy::default();

        f.delivery
            .accept(f.receiver.address(), acceptance.clone(), f.start)
            .unwrap();
        let state = f.delivery.receiver_state(&f.receiver.address()).unwrap();
        assert_eq!(state.status, DeliveryStatus::Accepted);
        assert_eq!(state.acceptance.as_ref(), Some(&acceptance));
        assert_eq!(state.accepted_at, Some(f.start));

        let later = f.start + Duration::seconds(5);
        f.delivery
            .finish(f.sender.address(), f.receiver.address(), r, later, &policy)
            .unwrap();
        let state = f.delivery.receiver_state(&f.receiver.address()).unwrap();
        assert_eq!(state.status, DeliveryStatus::Finished);
        assert_eq!(state.response, Some(r));
        assert_eq!(state.finished_at, Some(later));
    }

    #[test]
    fn accept_rejects_key_of_someone_else() {
        let mut f = fixture(10);
        let other = PartyKeypair::generate();
        let acceptance = accept(f.sender.public(), &other, &mut f.sampler).unwrap();
        assert!(matches!(
            f.delivery.accept(f.receiver.address(), acceptance, f.start),
            Err(DeliveryError::InvalidParameters(_))
        ));
    }

    #[test]
    fn accept_at_exact_deadline_is_allowed() {
        let mut f = fixture(10);
        let acceptance = accept(f.sender.public(), &f.receiver, &mut f.sampler).unwrap();
        let deadline = f.delivery.accept_deadline();
        assert_eq!(deadline, f.start + Duration::seconds(60));
        f.delivery
            .accept(f.receiver.address(), acceptance, deadline)
            .unwrap();
    }

    #[test]
    fn finish_rejects_bogus_response_when_verifying() {
        let mut f = fixture(10);
        let acceptance = accept(f.sender.public(), &f.receiver, &mut f.sampler).unwrap();
        f.delivery
            .accept(f.receiver.address(), acceptance, f.start)
            .unwrap();

        let bogus = f.sampler.next_public();
        let strict = DeliveryPolicy::default();
        assert_eq!(
            f.delivery
                .finish(f.sender.address(), f.receiver.address(), bogus, f.start, &strict)
                .unwrap_err(),
            DeliveryError::InvalidResponse
        );

        let lax = DeliveryPolicy {
            verify_response: false,
            ..DeliveryPolicy::default()
        };
        f.delivery
            .finish(f.sender.address(), f.receiver.address(), bogus, f.start, &lax)
            .unwrap();
    }

    #[test]
    fn settle_forfeits_lapsed_finish_to_receiver() {
        let mut f = fixture(11);
        let acceptance = accept(f.sender.public(), &f.receiver, &mut f.sampler).unwrap();
        f.delivery
            .accept(f.receiver.address(), acceptance, f.start)
            .unwrap();
        let policy = DeliveryPolicy::default();

        let lapsed = f.start + Duration::seconds(121);
        let settlement = f
            .delivery
            .settle(f.receiver.address(), lapsed, &policy)
            .unwrap();
        assert_eq!(settlement.total(), 11);
        assert_eq!(settlement.amount_to(&f.receiver.address()), 11);
        assert_eq!(
            f.delivery.settle(f.sender.address(), lapsed, &policy),
            Err(DeliveryError::AlreadySettled)
        );
    }

    #[test]
    fn status_of_stranger_is_unknown_receiver() {
        let f = fixture(1);
        let stranger = PartyKeypair::generate().address();
        assert_eq!(
            f.delivery.status(&stranger),
            Err(DeliveryError::UnknownReceiver(stranger))
        );
        assert!(!f.delivery.involves(&stranger));
        assert!(f.delivery.involves(&f.sender.address()));
    }
}
