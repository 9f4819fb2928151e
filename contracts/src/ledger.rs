//! # Ledger Adapter
//!
//! The boundary between the parties' clients and whatever keeps the
//! authoritative delivery records. [`Ledger`] is the narrow interface the
//! clients program against; [`InMemoryLedger`] is the reference
//! implementation used by the devnet node and by tests.
//!
//! Every mutating call is atomic: it either commits fully or returns an
//! error and changes nothing. Caller identity is whatever the transport
//! authenticated; the ledger trusts it as given.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use edelivery_protocol::crypto::{CryptoError, CurveScalar};
use edelivery_protocol::identity::Address;

use crate::abi::{AcceptCall, CreateDeliveryCall, DeliveryView, ReceiverStateView};
use crate::clock::{Clock, SystemClock};
use crate::delivery::{DeliveryError, DeliveryId, DeliveryStatus, Settlement};
use crate::policy::DeliveryPolicy;
use crate::registry::DeliveryRegistry;

/// Errors surfaced by a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger evaluated the command and refused it.
    #[error("rejected: {0}")]
    Rejected(#[from] DeliveryError),

    /// The ledger could not be reached or did not answer.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Arguments did not decode.
    #[error("malformed arguments: {0}")]
    Malformed(#[from] CryptoError),
}

impl LedgerError {
    /// True when repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// Operations a delivery ledger exposes.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Registers a delivery owned by `caller`, escrowing `value`.
    async fn create_delivery(
        &self,
        caller: Address,
        call: CreateDeliveryCall,
        value: u64,
    ) -> Result<DeliveryId, LedgerError>;

    /// Records `caller`'s acceptance.
    async fn accept(
        &self,
        caller: Address,
        id: DeliveryId,
        call: AcceptCall,
    ) -> Result<(), LedgerError>;

    /// Records the sender's response for `receiver`.
    async fn finish(
        &self,
        caller: Address,
        id: DeliveryId,
        receiver: Address,
        response: String,
    ) -> Result<(), LedgerError>;

    /// Pays out the deposit once every window has closed.
    async fn settle(&self, caller: Address, id: DeliveryId) -> Result<Settlement, LedgerError>;

    /// Status of one receiver.
    async fn get_state(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<DeliveryStatus, LedgerError>;

    /// Recorded values of one receiver.
    async fn receivers_state(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<ReceiverStateView, LedgerError>;

    /// Full view of one delivery.
    async fn delivery(&self, id: DeliveryId) -> Result<DeliveryView, LedgerError>;

    /// Every delivery id, oldest first.
    async fn deliveries(&self) -> Result<Vec<DeliveryId>, LedgerError>;

    /// Deliveries `address` takes part in, oldest first.
    async fn deliveries_of(&self, address: Address) -> Result<Vec<DeliveryId>, LedgerError>;
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// Single-process ledger over a [`DeliveryRegistry`].
///
/// Timestamps come from the injected [`Clock`]. The `online` switch lets
/// tests and the devnet simulate an unreachable ledger.
pub struct InMemoryLedger {
    registry: Mutex<DeliveryRegistry>,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
}

impl InMemoryLedger {
    /// A ledger with the given policy and clock.
    pub fn new(policy: DeliveryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Mutex::new(DeliveryRegistry::new(policy)),
            clock,
            online: AtomicBool::new(true),
        }
    }

    /// Default policy on the system clock.
    pub fn with_defaults() -> Self {
        Self::new(DeliveryPolicy::default(), Arc::new(SystemClock))
    }

    /// Takes the ledger on- or offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of deliveries.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// True when no delivery exists.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("ledger is offline".into()))
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_delivery(
        &self,
        caller: Address,
        call: CreateDeliveryCall,
        value: u64,
    ) -> Result<DeliveryId, LedgerError> {
        self.ensure_online()?;
        let params = call.decode()?;
        let receivers = params.receivers.len();
        let id = self
            .registry
            .lock()
            .create(caller, params, value, self.clock.now())
            .map_err(|e| {
                warn!(sender = %caller, error = %e, "delivery creation rejected");
                e
            })?;
        info!(delivery = %id, sender = %caller, receivers, deposit = value, "delivery created");
        Ok(id)
    }

    async fn accept(
        &self,
        caller: Address,
        id: DeliveryId,
        call: AcceptCall,
    ) -> Result<(), LedgerError> {
        self.ensure_online()?;
        let acceptance = call.decode()?;
        self.registry
            .lock()
            .accept(caller, id, acceptance, self.clock.now())
            .map_err(|e| {
                warn!(delivery = %id, receiver = %caller, error = %e, "accept rejected");
                e
            })?;
        info!(delivery = %id, receiver = %caller, "delivery accepted");
        Ok(())
    }

    async fn finish(
        &self,
        caller: Address,
        id: DeliveryId,
        receiver: Address,
        response: String,
    ) -> Result<(), LedgerError> {
        self.ensure_online()?;
        let response = CurveScalar::from_hex(&response)?;
        self.registry
            .lock()
            .finish(caller, id, receiver, response, self.clock.now())
            .map_err(|e| {
                warn!(delivery = %id, %receiver, error = %e, "finish rejected");
                e
            })?;
        info!(delivery = %id, %receiver, "delivery finished");
        Ok(())
    }

    async fn settle(&self, caller: Address, id: DeliveryId) -> Result<Settlement, LedgerError> {
        self.ensure_online()?;
        let settlement = self
            .registry
            .lock()
            .settle(caller, id, self.clock.now())?;
        info!(
            delivery = %id,
            settled_by = %caller,
            payouts = settlement.payouts.len(),
            total = settlement.total(),
            "delivery settled"
        );
        Ok(settlement)
    }

    async fn get_state(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<DeliveryStatus, LedgerError> {
        self.ensure_online()?;
        let status = self.registry.lock().status(&id, &receiver)?;
        debug!(delivery = %id, %receiver, %status, "state read");
        Ok(status)
    }

    async fn receivers_state(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<ReceiverStateView, LedgerError> {
        self.ensure_online()?;
        let registry = self.registry.lock();
        let view = ReceiverStateView::new(registry.get(&id)?, receiver, self.clock.now())?;
        Ok(view)
    }

    async fn delivery(&self, id: DeliveryId) -> Result<DeliveryView, LedgerError> {
        self.ensure_online()?;
        let registry = self.registry.lock();
        Ok(DeliveryView::at(registry.get(&id)?, self.clock.now()))
    }

    async fn deliveries(&self) -> Result<Vec<DeliveryId>, LedgerError> {
        self.ensure_online()?;
        Ok(self.registry.lock().deliveries().to_vec())
    }

    async fn deliveries_of(&self, address: Address) -> Result<Vec<DeliveryId>, LedgerError> {
        self.ensure_online()?;
        Ok(self.registry.lock().deliveries_of(&address))
    }
}
