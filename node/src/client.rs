//! # Delivery Client
//!
//! Runs one party's side of the exchange against a [`Ledger`] and a
//! [`BlobStore`]. The client owns the party's key pair; it never holds the
//! other party's secrets. Each seal or accept draws from its own
//! [`ScalarSampler`], so nothing grows with the client's lifetime.
//!
//! ```text
//!   send    seal → put C → create_delivery
//!   accept  read A → accept → submit (Z1, Z2, B, c)
//!   finish  read (Z1, Z2, B, c) → respond → submit r
//!   open    read (c, r) → get C → open
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use edelivery_contracts::{
    AcceptCall, CreateDeliveryCall, DeliveryId, DeliveryStatus, DeliveryView, Ledger,
    LedgerError, ReceiverStateView, Settlement,
};
use edelivery_protocol::crypto::{CryptoError, CurveScalar, PartyKeypair, ScalarSampler};
use edelivery_protocol::engine::{
    accept, open, respond, seal, Ciphertext, ProtocolError, SenderSecret,
};
use edelivery_protocol::identity::Address;
use edelivery_protocol::storage::{BlobError, BlobStore, ContentHash};

use crate::retry::{CallKind, RetryPolicy};

/// Errors surfaced by [`DeliveryClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The ledger failed or refused the call.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The blob store failed.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// A role algorithm failed on the values read back.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A value read back did not decode.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An adapter call did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which adapter call.
        operation: &'static str,
        /// The per-attempt bound that elapsed.
        after: Duration,
    },

    /// The ledger does not hold what this step needs yet.
    #[error("not ready: {0}")]
    NotReady(String),
}

/// What the sender keeps after creating a delivery.
#[derive(Debug)]
pub struct SentDelivery {
    /// Ledger id.
    pub id: DeliveryId,
    /// `v`, needed for every finish.
    pub secret: SenderSecret,
    /// Content address of the ciphertext blob.
    pub payload_hash: ContentHash,
}

/// One party's view of the protocol.
pub struct DeliveryClient<L: ?Sized, B: ?Sized> {
    ledger: Arc<L>,
    blobs: Arc<B>,
    keypair: PartyKeypair,
    retry: RetryPolicy,
}

impl<L, B> DeliveryClient<L, B>
where
    L: Ledger + ?Sized,
    B: BlobStore + ?Sized,
{
    /// A client acting as `keypair`'s owner.
    pub fn new(ledger: Arc<L>, blobs: Arc<B>, keypair: PartyKeypair) -> Self {
        Self {
            ledger,
            blobs,
            keypair,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the adapter call policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// This party's ledger address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    // -- Sender ---------------------------------------------------------------

    /// Seals `message`, stores the ciphertext and registers the delivery.
    pub async fn send(
        &self,
        receivers: Vec<Address>,
        message: &[u8],
        term1: u64,
        term2: u64,
        deposit: u64,
    ) -> Result<SentDelivery, ClientError> {
        let (secret, sealed) = seal(message, &mut ScalarSampler::new())?;
        let blob = sealed.ciphertext.to_bytes()?;

        // Content-addressed puts are idempotent, so they retry like reads.
        let payload_hash = self
            .retry
            .run("blob_put", CallKind::Read, || self.blobs.put(&blob))
            .await?;

        let call = CreateDeliveryCall::new(
            receivers,
            &sealed.commitment,
            self.keypair.public(),
            payload_hash,
            term1,
            term2,
        );
        let caller = self.address();
        let id = self
            .retry
            .run("create_delivery", CallKind::Submit, || {
                self.ledger.create_delivery(caller, call.clone(), deposit)
            })
            .await?;

        info!(delivery = %id, payload = %payload_hash, "delivery sent");
        Ok(SentDelivery {
            id,
            secret,
            payload_hash,
        })
    }

    /// Answers `receiver`'s acceptance on delivery `id`.
    pub async fn finish(
        &self,
        id: DeliveryId,
        secret: &SenderSecret,
        receiver: Address,
    ) -> Result<CurveScalar, ClientError> {
        let view = self.receiver_state(id, receiver).await?;
        let acceptance = view.acceptance()?.ok_or_else(|| {
            ClientError::NotReady(format!("{} has not accepted {}", receiver, id))
        })?;
        let response = respond(secret, &self.keypair, &acceptance)?;

        let caller = self.address();
        let hex = response.to_hex();
        self.retry
            .run("finish", CallKind::Submit, || {
                self.ledger.finish(caller, id, receiver, hex.clone())
            })
            .await?;

        info!(delivery = %id, %receiver, "delivery finished");
        Ok(response)
    }

    /// Finishes every receiver currently waiting in `Accepted`. Returns
    /// the receivers that were finished.
    pub async fn finish_accepted(
        &self,
        id: DeliveryId,
        secret: &SenderSecret,
    ) -> Result<Vec<Address>, ClientError> {
        let view = self.delivery(id).await?;
        let pending: Vec<Address> = view
            .states
            .iter()
            .filter(|s| s.status == DeliveryStatus::Accepted)
            .map(|s| s.receiver)
            .collect();

        futures::future::try_join_all(
            pending
                .iter()
                .map(|receiver| self.finish(id, secret, *receiver)),
        )
        .await?;
        Ok(pending)
    }

    // -- Receiver -------------------------------------------------------------

    /// Accepts delivery `id` as this party.
    pub async fn accept(&self, id: DeliveryId) -> Result<(), ClientError> {
        let view = self.delivery(id).await?;
        let sender_public = view.sender_public()?;
        let acceptance = accept(&sender_public, &self.keypair, &mut ScalarSampler::new())?;

        let call = AcceptCall::from(&acceptance);
        let caller = self.address();
        self.retry
            .run("accept", CallKind::Submit, || {
                self.ledger.accept(caller, id, call.clone())
            })
            .await?;

        info!(delivery = %id, receiver = %caller, "delivery accepted");
        Ok(())
    }

    /// Recovers the message of a finished delivery addressed to this
    /// party.
    pub async fn open(&self, id: DeliveryId) -> Result<Vec<u8>, ClientError> {
        let me = self.address();
        let view = self.delivery(id).await?;
        let state = view
            .state_of(&me)
            .ok_or_else(|| ClientError::NotReady(format!("{} is not a receiver of {}", me, id)))?;
        let (acceptance, response) = match (state.acceptance()?, state.response()?) {
            (Some(a), Some(r)) => (a, r),
            _ => {
                return Err(ClientError::NotReady(format!(
                    "{} is {} for {}",
                    id, state.status, me
                )))
            }
        };

        let hash = view.payload_hash;
        let blob = self
            .retry
            .run("blob_get", CallKind::Read, || self.blobs.get(&hash))
            .await?;
        let ciphertext = Ciphertext::from_bytes(&blob)?;
        let message = open(
            self.keypair.secret(),
            &acceptance.challenge,
            &response,
            &ciphertext,
        )?;

        debug!(delivery = %id, len = message.len(), "delivery opened");
        Ok(message)
    }

    // -- Either party ---------------------------------------------------------

    /// Pays out the deposit of delivery `id`.
    pub async fn settle(&self, id: DeliveryId) -> Result<Settlement, ClientError> {
        let caller = self.address();
        self.retry
            .run("settle", CallKind::Submit, || self.ledger.settle(caller, id))
            .await
    }

    /// Full view of delivery `id`.
    pub async fn delivery(&self, id: DeliveryId) -> Result<DeliveryView, ClientError> {
        self.retry
            .run("delivery", CallKind::Read, || self.ledger.delivery(id))
            .await
    }

    /// Status of `receiver` on delivery `id`.
    pub async fn status(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<DeliveryStatus, ClientError> {
        self.retry
            .run("get_state", CallKind::Read, || {
                self.ledger.get_state(id, receiver)
            })
            .await
    }

    /// Recorded values of `receiver` on delivery `id`.
    pub async fn receiver_state(
        &self,
        id: DeliveryId,
        receiver: Address,
    ) -> Result<ReceiverStateView, ClientError> {
        self.retry
            .run("receivers_state", CallKind::Read, || {
                self.ledger.receivers_state(id, receiver)
            })
            .await
    }

    /// Deliveries this party takes part in, oldest first.
    pub async fn my_deliveries(&self) -> Result<Vec<DeliveryId>, ClientError> {
        let me = self.address();
        self.retry
            .run("deliveries_of", CallKind::Read, || {
                self.ledger.deliveries_of(me)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edelivery_contracts::{DeliveryError, InMemoryLedger};
    use edelivery_protocol::storage::MemoryBlobStore;

    struct Parties {
        ledger: Arc<InMemoryLedger>,
        blobs: Arc<MemoryBlobStore>,
        alice: DeliveryClient<InMemoryLedger, MemoryBlobStore>,
        bob: DeliveryClient<InMemoryLedger, MemoryBlobStore>,
    }

    fn parties() -> Parties {
        let ledger = Arc::new(InMemoryLedger::default());
        let blobs = Arc::new(MemoryBlobStore::new());
        let retry = RetryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
        };
        Parties {
            alice: DeliveryClient::new(ledger.clone(), blobs.clone(), PartyKeypair::generate())
                .with_retry(retry),
            bob: DeliveryClient::new(ledger.clone(), blobs.clone(), PartyKeypair::generate())
                .with_retry(retry),
            ledger,
            blobs,
        }
    }

    #[tokio::test]
    async fn full_exchange() {
        let p = parties();
        let sent = p
            .alice
            .send(vec![p.bob.address()], b"signed, sealed", 60, 60, 1)
            .await
            .unwrap();

        assert_eq!(p.bob.my_deliveries().await.unwrap(), vec![sent.id]);
        p.bob.accept(sent.id).await.unwrap();
        let finished = p.alice.finish_accepted(sent.id, &sent.secret).await.unwrap();
        assert_eq!(finished, vec![p.bob.address()]);

        assert_eq!(
            p.bob.status(sent.id, p.bob.address()).await.unwrap(),
            DeliveryStatus::Finished
        );
        assert_eq!(p.bob.open(sent.id).await.unwrap(), b"signed, sealed");
    }

    #[tokio::test]
    async fn repeated_sends_use_fresh_commitments() {
        let p = parties();
        let first = p
            .alice
            .send(vec![p.bob.address()], b"same", 60, 60, 1)
            .await
            .unwrap();
        let second = p
            .alice
            .send(vec![p.bob.address()], b"same", 60, 60, 1)
            .await
            .unwrap();

        assert_ne!(first.secret.commitment(), second.secret.commitment());
        assert_ne!(first.payload_hash, second.payload_hash);
        let view = p.alice.delivery(second.id).await.unwrap();
        assert_eq!(view.commitment().unwrap(), second.secret.commitment());

        for sent in [&first, &second] {
            p.bob.accept(sent.id).await.unwrap();
            p.alice.finish_accepted(sent.id, &sent.secret).await.unwrap();
            assert_eq!(p.bob.open(sent.id).await.unwrap(), b"same");
        }
    }

    #[tokio::test]
    async fn open_before_finish_is_not_ready() {
        let p = parties();
        let sent = p
            .alice
            .send(vec![p.bob.address()], b"m", 60, 60, 1)
            .await
            .unwrap();
        p.bob.accept(sent.id).await.unwrap();

        assert!(matches!(
            p.bob.open(sent.id).await,
            Err(ClientError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn finish_before_accept_is_not_ready() {
        let p = parties();
        let sent = p
            .alice
            .send(vec![p.bob.address()], b"m", 60, 60, 1)
            .await
            .unwrap();

        assert!(matches!(
            p.alice.finish(sent.id, &sent.secret, p.bob.address()).await,
            Err(ClientError::NotReady(_))
        ));
        assert!(p
            .alice
            .finish_accepted(sent.id, &sent.secret)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ledger_rejection_surfaces() {
        let p = parties();
        let sent = p
            .alice
            .send(vec![p.bob.address()], b"m", 60, 60, 1)
            .await
            .unwrap();
        p.bob.accept(sent.id).await.unwrap();

        assert!(matches!(
            p.bob.accept(sent.id).await,
            Err(ClientError::Ledger(LedgerError::Rejected(
                DeliveryError::InvalidState { .. }
            )))
        ));
    }

    #[tokio::test]
    async fn offline_blob_store_fails_send_before_registration() {
        let p = parties();
        p.blobs.set_online(false);

        let err = p
            .alice
            .send(vec![p.bob.address()], b"m", 60, 60, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Blob(BlobError::Unavailable(_))));
        assert!(p.ledger.is_empty());
    }

    #[tokio::test]
    async fn offline_ledger_fails_accept() {
        let p = parties();
        let sent = p
            .alice
            .send(vec![p.bob.address()], b"m", 60, 60, 1)
            .await
            .unwrap();
        p.ledger.set_online(false);

        assert!(matches!(
            p.bob.accept(sent.id).await,
            Err(ClientError::Ledger(LedgerError::Unavailable(_)))
        ));
    }
}
