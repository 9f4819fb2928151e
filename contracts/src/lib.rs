//! # Registered E-Delivery Contracts
//!
//! The ledger-side half of the protocol: the per-receiver delivery state
//! machine, the deposit it escrows, and a reference ledger that serves it.
//!
//! - **Delivery** enforces `Created → Accepted → Finished` for every
//!   receiver, with the acceptance and finish deadlines checked against
//!   ledger time.
//! - **Registry** keys deliveries by id and makes every command
//!   all-or-nothing.
//! - **Ledger** is the async boundary clients talk to, plus the in-memory
//!   implementation used by the devnet node.
//!
//! ## Design Principles
//!
//! 1. Statuses only move forward. A receiver's recorded values never
//!    change once written.
//! 2. Time is injected through [`Clock`], so deadlines are testable
//!    without sleeping.
//! 3. Values cross the ledger boundary as fixed-width hex words, decoded
//!    and validated before any state is touched.
//! 4. A settlement happens once and always pays out exactly the deposit.

pub mod abi;
pub mod clock;
pub mod delivery;
pub mod ledger;
pub mod policy;
pub mod registry;

pub use abi::{AcceptCall, CreateDeliveryCall, DeliveryView, ReceiverStateView};
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{
    Delivery, DeliveryError, DeliveryId, DeliveryStatus, NewDelivery, Payout, PayoutReason,
    ReceiverState, Settlement,
};
pub use ledger::{InMemoryLedger, Ledger, LedgerError};
pub use policy::{DeliveryPolicy, LapseOutcome};
pub use registry::DeliveryRegistry;
