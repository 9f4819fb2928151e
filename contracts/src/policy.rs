//! Runtime policy of the delivery state machine.

use serde::{Deserialize, Serialize};

use edelivery_protocol::config::{DEFAULT_MIN_DEPOSIT, MAX_RECEIVERS};

/// What happens to a receiver's share of the deposit when it accepted but
/// the sender never finished within term2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LapseOutcome {
    /// The share goes to the receiver, compensating it for a delivery the
    /// sender failed to complete.
    #[default]
    ForfeitToReceiver,
    /// The share goes back to the sender.
    RefundSender,
}

/// Tunable rules applied by the registry to every delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    /// Smallest deposit accepted at creation.
    pub min_deposit: u64,
    /// Largest receiver set accepted at creation.
    pub max_receivers: usize,
    /// Check `r·G + c·B == V` before accepting a finish.
    pub verify_response: bool,
    /// Settlement of shares whose finish window lapsed.
    pub lapsed_finish: LapseOutcome,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            min_deposit: DEFAULT_MIN_DEPOSIT,
            max_receivers: MAX_RECEIVERS,
            verify_response: true,
            lapsed_finish: LapseOutcome::default(),
        }
    }
}
