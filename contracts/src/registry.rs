//! # Delivery Registry
//!
//! Keyed store of every delivery, playing the role a contract factory
//! plays on a public chain: it assigns ids, remembers creation order and
//! routes each command to the right [`Delivery`].
//!
//! Commands are all-or-nothing. Each one runs against a clone of the
//! target delivery and the clone replaces the original only on success,
//! so a rejected command leaves committed state exactly as it was.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use edelivery_protocol::crypto::CurveScalar;
use edelivery_protocol::engine::Acceptance;
use edelivery_protocol::identity::Address;

use crate::delivery::{
    Delivery, DeliveryError, DeliveryId, DeliveryStatus, NewDelivery, Settlement,
};
use crate::policy::DeliveryPolicy;

/// All deliveries known to one ledger.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRegistry {
    deliveries: HashMap<DeliveryId, Delivery>,
    order: Vec<DeliveryId>,
    policy: DeliveryPolicy,
}

impl DeliveryRegistry {
    /// An empty registry enforcing `policy`.
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            deliveries: HashMap::new(),
            order: Vec::new(),
            policy,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Creates a delivery owned by `caller`.
    pub fn create(
        &mut self,
        caller: Address,
        params: NewDelivery,
        deposit: u64,
        now: DateTime<Utc>,
    ) -> Result<DeliveryId, DeliveryError> {
        let mut id = DeliveryId::new();
        while self.deliveries.contains_key(&id) {
            id = DeliveryId::new();
        }
        let delivery = Delivery::create(id, caller, params, deposit, now, &self.policy)?;
        self.deliveries.insert(id, delivery);
        self.order.push(id);
        Ok(id)
    }

    /// Records `caller`'s acceptance of delivery `id`.
    pub fn accept(
        &mut self,
        caller: Address,
        id: DeliveryId,
        acceptance: Acceptance,
        now: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        self.apply(id, |delivery, _| delivery.accept(caller, acceptance, now))
    }

    /// Records the sender's response for `receiver` on delivery `id`.
    pub fn finish(
        &mut self,
        caller: Address,
        id: DeliveryId,
        receiver: Address,
        response: CurveScalar,
        now: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        self.apply(id, |delivery, policy| {
            delivery.finish(caller, receiver, response, now, policy)
        })
    }

    /// Settles the deposit of delivery `id`.
    pub fn settle(
        &mut self,
        caller: Address,
        id: DeliveryId,
        now: DateTime<Utc>,
    ) -> Result<Settlement, DeliveryError> {
        self.apply(id, |delivery, policy| delivery.settle(caller, now, policy))
    }

    /// The delivery with this id.
    pub fn get(&self, id: &DeliveryId) -> Result<&Delivery, DeliveryError> {
        self.deliveries
            .get(id)
            .ok_or(DeliveryError::UnknownDelivery(*id))
    }

    /// Status of `receiver` on delivery `id`.
    pub fn status(
        &self,
        id: &DeliveryId,
        receiver: &Address,
    ) -> Result<DeliveryStatus, DeliveryError> {
        self.get(id)?.status(receiver)
    }

    /// Every delivery id in creation order.
    pub fn deliveries(&self) -> &[DeliveryId] {
        &self.order
    }

    /// Ids of deliveries where `address` is sender or receiver, in
    /// creation order.
    pub fn deliveries_of(&self, address: &Address) -> Vec<DeliveryId> {
        self.order
            .iter()
            .filter(|id| {
                self.deliveries
                    .get(id)
                    .map(|d| d.involves(address))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// Number of deliveries.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no delivery exists.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn apply<T>(
        &mut self,
        id: DeliveryId,
        command: impl FnOnce(&mut Delivery, &DeliveryPolicy) -> Result<T, DeliveryError>,
    ) -> Result<T, DeliveryError> {
        let mut next = self.get(&id)?.clone();
        let out = command(&mut next, &self.policy)?;
        self.deliveries.insert(id, next);
        Ok(out)
    }
}
