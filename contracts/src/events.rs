//! # Vault Events
//!
//! Everything observable a vault does is recorded as a [`VaultEvent`] in the
//! vault's own log and mirrored to `tracing`, so the same history is
//! available to callers (tests, the CLI) and to log aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crowdvault_ledger::{Address, AssetId};

use crate::shares::ShareClassId;
use crate::vault::VaultState;

/// A state change or value movement performed by a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    /// The vault accepted its terms.
    Initialized {
        /// Aggregate balance required to unlock.
        target_balance: u64,
        /// Earliest unlock instant (exclusive).
        unlock_time: DateTime<Utc>,
        /// Withdrawal fee in basis points.
        withdrawal_fee_bps: u16,
    },
    /// Native currency arrived through the deposit path.
    Deposited {
        /// Depositor.
        from: Address,
        /// Amount received.
        amount: u64,
    },
    /// The lifecycle state moved forward.
    StateChanged {
        /// Previous state.
        from: VaultState,
        /// New state.
        to: VaultState,
    },
    /// A redeemer was paid.
    Withdrawal {
        /// Asset paid out.
        asset: AssetId,
        /// Redeemer.
        recipient: Address,
        /// Net amount received.
        amount: u64,
    },
    /// The withdrawal fee was paid.
    FeePaid {
        /// Asset the fee was taken in.
        asset: AssetId,
        /// Fee recipient.
        recipient: Address,
        /// Fee amount.
        amount: u64,
    },
    /// A best-effort token transfer failed; the amount is still in the vault.
    TransferFailed {
        /// Asset that failed to move.
        asset: AssetId,
        /// Intended recipient.
        recipient: Address,
        /// Amount that stayed behind.
        amount: u64,
        /// Ledger-reported reason.
        reason: String,
    },
    /// Leftover balance went to the treasury.
    Swept {
        /// Asset swept.
        asset: AssetId,
        /// Treasury address.
        treasury: Address,
        /// Amount swept.
        amount: u64,
    },
}

/// Ordered event history of a single vault.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<VaultEvent>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and emits it as a structured log record.
    pub fn emit(&mut self, share_class: &ShareClassId, event: VaultEvent) {
        match &event {
            VaultEvent::TransferFailed {
                asset,
                recipient,
                amount,
                reason,
            } => warn!(
                share_class = %share_class,
                asset = %asset,
                recipient = %recipient,
                amount,
                reason = %reason,
                "token transfer failed, amount left in vault"
            ),
            VaultEvent::StateChanged { from, to } => info!(
                share_class = %share_class,
                from = %from,
                to = %to,
                "vault state changed"
            ),
            other => info!(share_class = %share_class, event = ?other, "vault event"),
        }
        self.events.push(event);
    }

    /// All events in emission order.
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_preserves_order() {
        let class: ShareClassId = "abc".into();
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.emit(
            &class,
            VaultEvent::Deposited {
                from: "alice".into(),
                amount: 5,
            },
        );
        log.emit(
            &class,
            VaultEvent::StateChanged {
                from: VaultState::Locked,
                to: VaultState::Unlocked,
            },
        );

        assert_eq!(log.len(), 2);
        assert!(matches!(log.events()[0], VaultEvent::Deposited { amount: 5, .. }));
        assert!(matches!(log.events()[1], VaultEvent::StateChanged { .. }));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(VaultEvent::FeePaid {
            asset: AssetId::Native,
            recipient: "fees".into(),
            amount: 3,
        })
        .unwrap();
        assert_eq!(json["event"], "fee_paid");
        assert_eq!(json["amount"], 3);
    }
}
