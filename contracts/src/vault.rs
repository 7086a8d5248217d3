//! # Escrow Vault
//!
//! One vault backs one share class. It accepts native currency and any
//! registered token until it matures, then pays shareholders out pro rata,
//! and finally hands whatever is left to the treasury.
//!
//! ## Lifecycle
//!
//! ```text
//!   Locked ──(aggregate >= target AND now > unlock_time)──▶ Unlocked
//!   Unlocked ──(payout of the last outstanding shares)──▶ Open
//!   Open: terminal, sweep to treasury allowed
//! ```
//!
//! State only ever moves forward. The Locked → Unlocked edge fires either
//! as a side effect of a native deposit or through an explicit
//! [`Vault::check_maturity`] call (token deposits have no hook).
//!
//! ## Balances
//!
//! A vault stores no balances. Every read goes to the ledger at the vault's
//! address, and the registry is asked for the current token list on every
//! evaluation.
//!
//! ## Payout failure policy
//!
//! Native currency moves first and atomically: if either the redeemer's
//! leg or the fee leg fails, the payout is rejected and nothing changes,
//! not even the transition to `Open`. Token transfers after that are
//! best effort: a failure is logged, recorded as an event and in the
//! report, and the loop continues with the next leg.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crowdvault_ledger::config::MAX_WITHDRAWAL_FEE_BPS;
use crowdvault_ledger::{Address, AssetId, Clock, Ledger, LedgerError};

use crate::asset::{resolve_assets, Asset, AssetRegistry, NativeAsset, TransferError};
use crate::events::{EventLog, VaultEvent};
use crate::math::{self, MathError, Split};
use crate::shares::ShareClassId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Coarse classification of failures, shared by vault and factory errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The target is in the wrong state for the operation.
    PreconditionFailed,
    /// The caller lacks the required role.
    Unauthorized,
    /// The caller holds nothing to redeem or cannot fund a deposit.
    InsufficientFunds,
    /// A native currency transfer failed and the operation was aborted.
    TransferFailed,
    /// An argument was out of range.
    InvalidArgument,
    /// The addressed object does not exist.
    NotFound,
}

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The vault has not been initialized yet.
    #[error("vault is not initialized")]
    NotInitialized,

    /// `initialize` was called a second time.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The caller is not allowed to perform this operation.
    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized {
        /// Who called.
        caller: Address,
        /// Role that was required.
        required: &'static str,
    },

    /// Maturity conditions are not met yet.
    #[error(
        "vault not matured: balance {balance}/{target}, now {now} must be after {unlock_time}"
    )]
    NotMatured {
        /// Current aggregate balance.
        balance: u128,
        /// Target balance.
        target: u64,
        /// Evaluation time.
        now: DateTime<Utc>,
        /// Unlock time.
        unlock_time: DateTime<Utc>,
    },

    /// The vault has already left `Locked`.
    #[error("vault already unlocked (state {0})")]
    AlreadyUnlocked(VaultState),

    /// Payouts require `Unlocked`.
    #[error("vault is not unlocked (state {0})")]
    VaultNotUnlocked(VaultState),

    /// Sweeping requires `Open`.
    #[error("vault is not open (state {0})")]
    NotOpen(VaultState),

    /// Deposits are no longer accepted once the vault is `Open`.
    #[error("vault is open and no longer accepts deposits")]
    DepositsClosed,

    /// A zero-amount deposit.
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,

    /// The withdrawal fee is above 10000 bps.
    #[error("invalid withdrawal fee: {0} bps exceeds 10000")]
    InvalidFee(u16),

    /// Redeemed shares are zero or exceed the outstanding supply.
    #[error("invalid share amount: {shares} of {total}")]
    InvalidShareAmount {
        /// Shares being redeemed.
        shares: u64,
        /// Outstanding supply before the burn.
        total: u64,
    },

    /// The depositor's transfer into the vault failed.
    #[error("deposit failed: {0}")]
    DepositFailed(LedgerError),

    /// A native currency transfer out of the vault failed.
    #[error("native transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Payout arithmetic failed.
    #[error("payout math error: {0}")]
    Math(#[from] MathError),
}

impl VaultError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotInitialized
            | VaultError::AlreadyInitialized
            | VaultError::NotMatured { .. }
            | VaultError::AlreadyUnlocked(_)
            | VaultError::VaultNotUnlocked(_)
            | VaultError::NotOpen(_)
            | VaultError::DepositsClosed => ErrorKind::PreconditionFailed,
            VaultError::Unauthorized { .. } => ErrorKind::Unauthorized,
            VaultError::DepositFailed(LedgerError::InsufficientBalance { .. }) => {
                ErrorKind::InsufficientFunds
            }
            VaultError::DepositFailed(_) | VaultError::TransferFailed(_) => {
                ErrorKind::TransferFailed
            }
            VaultError::ZeroAmount
            | VaultError::InvalidFee(_)
            | VaultError::InvalidShareAmount { .. }
            | VaultError::Math(_) => ErrorKind::InvalidArgument,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state. Ordered: `Locked < Unlocked < Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VaultState {
    /// Accepting deposits, waiting for maturity.
    Locked,
    /// Matured; shareholders may redeem.
    Unlocked,
    /// Fully redeemed; leftovers may be swept.
    Open,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultState::Locked => write!(f, "Locked"),
            VaultState::Unlocked => write!(f, "Unlocked"),
            VaultState::Open => write!(f, "Open"),
        }
    }
}

/// Descriptive attributes of a vault. Opaque to the accounting logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAttributes {
    /// Campaign name.
    pub name: String,
    /// Campaign description.
    #[serde(default)]
    pub description: String,
    /// Free-form metadata (image URI, external link, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Immutable economic terms fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTerms {
    /// Aggregate face-value balance required to unlock.
    pub target_balance: u64,
    /// The vault cannot unlock at or before this instant.
    pub unlock_time: DateTime<Utc>,
    /// Fee withheld from every payout, in basis points.
    pub withdrawal_fee_bps: u16,
}

/// Addresses a vault instance is bound to for its whole life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBindings {
    /// Share class this vault backs.
    pub share_class: ShareClassId,
    /// The vault's own ledger address.
    pub address: Address,
    /// The only caller allowed to initialize and request payouts.
    pub factory: Address,
    /// Destination of the terminal sweep.
    pub treasury: Address,
}

/// Shared collaborators: the ledger holding balances, the asset registry
/// and the clock.
#[derive(Clone)]
pub struct VaultEnv {
    /// Ledger holding every balance.
    pub ledger: Arc<Ledger>,
    /// Whitelist of registered tokens.
    pub registry: Arc<dyn AssetRegistry>,
    /// Time source for maturity checks.
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for VaultEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEnv")
            .field("ledger", &self.ledger)
            .field("assets", &self.registry.list_supported_assets())
            .field("now", &self.clock.now())
            .finish()
    }
}

/// Persisted form of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Addresses the vault is bound to.
    #[serde(flatten)]
    pub bindings: VaultBindings,
    /// Lifecycle state.
    pub state: VaultState,
    /// Economic terms.
    pub terms: VaultTerms,
    /// Descriptive attributes.
    pub attributes: VaultAttributes,
}

/// One asset's pro-rata split in a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPayout {
    /// Asset paid.
    pub asset: AssetId,
    /// Vault balance the split was computed from.
    pub balance: u64,
    /// Gross, fee and net amounts.
    pub split: Split,
    /// The net leg reached the redeemer (or was zero).
    pub net_delivered: bool,
    /// The fee leg reached the fee recipient (or was zero).
    pub fee_delivered: bool,
}

/// Outcome of a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReport {
    /// Share class paid from.
    pub share_class: ShareClassId,
    /// Vault state after the payout.
    pub state: VaultState,
    /// Every asset that had a non-zero balance, in processing order.
    pub paid: Vec<AssetPayout>,
    /// Token legs that did not go through.
    pub failures: Vec<TransferError>,
}

impl PayoutReport {
    /// Split computed for `asset`, if it had a balance.
    pub fn split_for(&self, asset: &AssetId) -> Option<Split> {
        self.paid.iter().find(|p| &p.asset == asset).map(|p| p.split)
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Share class swept.
    pub share_class: ShareClassId,
    /// Amounts that reached the treasury.
    pub swept: Vec<(AssetId, u64)>,
    /// Token transfers that did not go through.
    pub failures: Vec<TransferError>,
}

#[derive(Debug, Clone)]
enum Setup {
    Uninitialized,
    Initialized {
        terms: VaultTerms,
        attributes: VaultAttributes,
    },
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Escrow vault for a single share class.
#[derive(Debug)]
pub struct Vault {
    bindings: VaultBindings,
    env: VaultEnv,
    setup: Setup,
    state: VaultState,
    log: EventLog,
}

impl Vault {
    /// Creates a fresh, uninitialized vault bound to `bindings`.
    pub fn new(bindings: VaultBindings, env: VaultEnv) -> Self {
        Self {
            bindings,
            env,
            setup: Setup::Uninitialized,
            state: VaultState::Locked,
            log: EventLog::new(),
        }
    }

    /// Rebuilds an initialized vault from its persisted record. The event
    /// history is not part of the record and starts empty.
    pub fn restore(record: VaultRecord, env: VaultEnv) -> Result<Self, VaultError> {
        if record.terms.withdrawal_fee_bps > MAX_WITHDRAWAL_FEE_BPS {
            return Err(VaultError::InvalidFee(record.terms.withdrawal_fee_bps));
        }

        Ok(Self {
            bindings: record.bindings,
            env,
            setup: Setup::Initialized {
                terms: record.terms,
                attributes: record.attributes,
            },
            state: record.state,
            log: EventLog::new(),
        })
    }

    /// Fixes the vault's terms. Callable once, by the bound factory.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] for any caller but the factory,
    /// [`VaultError::AlreadyInitialized`] on repeat calls and
    /// [`VaultError::InvalidFee`] for a fee above 10000 bps.
    pub fn initialize(
        &mut self,
        caller: &str,
        attributes: VaultAttributes,
        terms: VaultTerms,
    ) -> Result<(), VaultError> {
        self.require_factory(caller)?;
        if matches!(self.setup, Setup::Initialized { .. }) {
            return Err(VaultError::AlreadyInitialized);
        }
        if terms.withdrawal_fee_bps > MAX_WITHDRAWAL_FEE_BPS {
            return Err(VaultError::InvalidFee(terms.withdrawal_fee_bps));
        }

        self.setup = Setup::Initialized { terms, attributes };
        self.log.emit(
            &self.bindings.share_class,
            VaultEvent::Initialized {
                target_balance: terms.target_balance,
                unlock_time: terms.unlock_time,
                withdrawal_fee_bps: terms.withdrawal_fee_bps,
            },
        );
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    /// Share class backed by this vault.
    pub fn share_class(&self) -> &ShareClassId {
        &self.bindings.share_class
    }

    /// The vault's ledger address. Token deposits are plain transfers here.
    pub fn address(&self) -> &str {
        &self.bindings.address
    }

    /// Addresses the vault is bound to.
    pub fn bindings(&self) -> &VaultBindings {
        &self.bindings
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Returns `true` once `initialize` has succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.setup, Setup::Initialized { .. })
    }

    /// The vault's terms.
    pub fn terms(&self) -> Result<&VaultTerms, VaultError> {
        match &self.setup {
            Setup::Initialized { terms, .. } => Ok(terms),
            Setup::Uninitialized => Err(VaultError::NotInitialized),
        }
    }

    /// The vault's descriptive attributes.
    pub fn attributes(&self) -> Result<&VaultAttributes, VaultError> {
        match &self.setup {
            Setup::Initialized { attributes, .. } => Ok(attributes),
            Setup::Uninitialized => Err(VaultError::NotInitialized),
        }
    }

    /// Event history, oldest first.
    pub fn events(&self) -> &[VaultEvent] {
        self.log.events()
    }

    /// Persisted form of the vault.
    pub fn record(&self) -> Result<VaultRecord, VaultError> {
        Ok(VaultRecord {
            bindings: self.bindings.clone(),
            state: self.state,
            terms: *self.terms()?,
            attributes: self.attributes()?.clone(),
        })
    }

    // -- balances & maturity ------------------------------------------------

    /// Native balance plus the balance of every currently registered token,
    /// summed at face value. Always computed fresh.
    pub fn aggregate_balance(&self) -> u128 {
        resolve_assets(&self.env.ledger, self.env.registry.as_ref())
            .iter()
            .map(|asset| asset.balance_of(&self.bindings.address) as u128)
            .sum()
    }

    /// Whether both maturity conditions hold right now.
    pub fn is_matured(&self) -> Result<bool, VaultError> {
        let terms = self.terms()?;
        Ok(self.aggregate_balance() >= terms.target_balance as u128
            && self.env.clock.now() > terms.unlock_time)
    }

    /// Receives a native deposit from `from`, then unlocks the vault if it
    /// has matured. Returns the state after the deposit.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ZeroAmount`], [`VaultError::NotInitialized`],
    /// [`VaultError::DepositsClosed`] once `Open`, or
    /// [`VaultError::DepositFailed`] if the depositor cannot pay.
    pub fn receive_native(&mut self, from: &str, amount: u64) -> Result<VaultState, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.terms()?;
        if self.state == VaultState::Open {
            return Err(VaultError::DepositsClosed);
        }

        self.env
            .ledger
            .transfer_native(from, &self.bindings.address, amount)
            .map_err(VaultError::DepositFailed)?;
        self.log.emit(
            &self.bindings.share_class,
            VaultEvent::Deposited {
                from: from.to_string(),
                amount,
            },
        );

        if self.state == VaultState::Locked && self.is_matured()? {
            self.transition(VaultState::Unlocked);
        }
        Ok(self.state)
    }

    /// Permissionless maturity check. Unlocks the vault if both conditions
    /// hold.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyUnlocked`] unless the vault is `Locked`,
    /// and [`VaultError::NotMatured`] if a condition is unmet.
    pub fn check_maturity(&mut self) -> Result<VaultState, VaultError> {
        let terms = *self.terms()?;
        if self.state != VaultState::Locked {
            return Err(VaultError::AlreadyUnlocked(self.state));
        }

        let balance = self.aggregate_balance();
        let now = self.env.clock.now();
        if balance < terms.target_balance as u128 || now <= terms.unlock_time {
            return Err(VaultError::NotMatured {
                balance,
                target: terms.target_balance,
                now,
                unlock_time: terms.unlock_time,
            });
        }

        self.transition(VaultState::Unlocked);
        Ok(self.state)
    }

    // -- payout & sweep -----------------------------------------------------

    /// Pays `recipient` their pro-rata part of every asset, net of the
    /// withdrawal fee, which goes to `fee_recipient`.
    ///
    /// `caller_shares` and `total_shares` are the factory's live values
    /// before it burns the caller's shares; the vault trusts them. When
    /// they are equal this is the last redemption and the vault becomes
    /// `Open`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] unless called by the factory,
    /// [`VaultError::VaultNotUnlocked`] outside `Unlocked`,
    /// [`VaultError::InvalidShareAmount`] for bad share figures, and
    /// [`VaultError::TransferFailed`] if the native transfer fails, in
    /// which case nothing changed.
    pub fn payout(
        &mut self,
        caller: &str,
        recipient: &str,
        fee_recipient: &str,
        caller_shares: u64,
        total_shares: u64,
    ) -> Result<PayoutReport, VaultError> {
        self.require_factory(caller)?;
        let fee_bps = self.terms()?.withdrawal_fee_bps;
        if self.state != VaultState::Unlocked {
            return Err(VaultError::VaultNotUnlocked(self.state));
        }
        if caller_shares == 0 || caller_shares > total_shares {
            return Err(VaultError::InvalidShareAmount {
                shares: caller_shares,
                total: total_shares,
            });
        }

        let env = self.env.clone();
        let mut report = PayoutReport {
            share_class: self.bindings.share_class.clone(),
            state: self.state,
            paid: Vec::new(),
            failures: Vec::new(),
        };
        let legs = |split: &Split| {
            vec![
                (recipient.to_string(), split.net),
                (fee_recipient.to_string(), split.fee),
            ]
        };

        // Native first: the only leg whose failure aborts the payout.
        let native = NativeAsset::new(&env.ledger);
        let native_split = self.compute_split(&native, caller_shares, total_shares, fee_bps)?;
        let native_outcomes = native_split
            .map(|(_, split)| native.transfer_many(&self.bindings.address, &legs(&split)));
        if let Some(outcomes) = &native_outcomes {
            if let Some(Err(e)) = outcomes.iter().find(|o| o.is_err()) {
                return Err(VaultError::TransferFailed(e.clone()));
            }
        }

        if caller_shares == total_shares {
            self.transition(VaultState::Open);
        }

        if let (Some((balance, split)), Some(outcomes)) = (native_split, native_outcomes) {
            self.settle(&native, balance, split, &legs(&split), outcomes, &mut report);
        }

        for token in resolve_assets(&env.ledger, env.registry.as_ref())
            .iter()
            .filter(|a| !a.failure_is_fatal())
        {
            let Some((balance, split)) =
                self.compute_split(&**token, caller_shares, total_shares, fee_bps)?
            else {
                continue;
            };
            let outcomes = token.transfer_many(&self.bindings.address, &legs(&split));
            self.settle(&**token, balance, split, &legs(&split), outcomes, &mut report);
        }

        report.state = self.state;
        info!(
            share_class = %self.bindings.share_class,
            recipient,
            shares = caller_shares,
            total_shares,
            state = %self.state,
            failures = report.failures.len(),
            "payout completed"
        );
        Ok(report)
    }

    /// Transfers every remaining balance to the treasury. Only allowed once
    /// the vault is `Open`, and only for the bound factory or treasury.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`], [`VaultError::NotOpen`], or
    /// [`VaultError::TransferFailed`] if the native sweep fails.
    pub fn sweep(&mut self, caller: &str) -> Result<SweepReport, VaultError> {
        if caller != self.bindings.factory && caller != self.bindings.treasury {
            return Err(VaultError::Unauthorized {
                caller: caller.to_string(),
                required: "factory or treasury",
            });
        }
        self.terms()?;
        if self.state != VaultState::Open {
            return Err(VaultError::NotOpen(self.state));
        }

        let env = self.env.clone();
        let treasury = self.bindings.treasury.clone();
        let mut report = SweepReport {
            share_class: self.bindings.share_class.clone(),
            swept: Vec::new(),
            failures: Vec::new(),
        };

        for asset in resolve_assets(&env.ledger, env.registry.as_ref()) {
            let amount = asset.balance_of(&self.bindings.address);
            if amount == 0 {
                continue;
            }

            match asset.transfer(&self.bindings.address, &treasury, amount) {
                Ok(()) => {
                    report.swept.push((asset.id(), amount));
                    self.log.emit(
                        &self.bindings.share_class,
                        VaultEvent::Swept {
                            asset: asset.id(),
                            treasury: treasury.clone(),
                            amount,
                        },
                    );
                }
                Err(e) if asset.failure_is_fatal() => return Err(VaultError::TransferFailed(e)),
                Err(e) => self.record_failure(e, &mut report.failures),
            }
        }

        Ok(report)
    }

    // -- internals ----------------------------------------------------------

    fn require_factory(&self, caller: &str) -> Result<(), VaultError> {
        if caller != self.bindings.factory {
            return Err(VaultError::Unauthorized {
                caller: caller.to_string(),
                required: "factory",
            });
        }
        Ok(())
    }

    /// Reads the asset's balance now and splits it. `None` when there is
    /// nothing to pay in this asset.
    fn compute_split(
        &self,
        asset: &dyn Asset,
        shares: u64,
        total: u64,
        fee_bps: u16,
    ) -> Result<Option<(u64, Split)>, VaultError> {
        let balance = asset.balance_of(&self.bindings.address);
        if balance == 0 {
            return Ok(None);
        }

        let split = math::payout_split(balance, shares, total, fee_bps)?;
        debug!(
            share_class = %self.bindings.share_class,
            asset = %asset.id(),
            balance,
            gross = split.gross,
            fee = split.fee,
            "computed pro-rata split"
        );
        Ok((split.gross > 0).then_some((balance, split)))
    }

    /// Records the outcome of one asset's legs: leg 0 is the redeemer, leg 1
    /// the fee recipient.
    fn settle(
        &mut self,
        asset: &dyn Asset,
        balance: u64,
        split: Split,
        legs: &[(Address, u64)],
        outcomes: Vec<Result<(), TransferError>>,
        report: &mut PayoutReport,
    ) {
        let mut delivered = [true; 2];
        for (index, ((to, amount), outcome)) in legs.iter().zip(outcomes).enumerate() {
            if *amount == 0 {
                continue;
            }
            match outcome {
                Ok(()) => {
                    let event = if index == 0 {
                        VaultEvent::Withdrawal {
                            asset: asset.id(),
                            recipient: to.clone(),
                            amount: *amount,
                        }
                    } else {
                        VaultEvent::FeePaid {
                            asset: asset.id(),
                            recipient: to.clone(),
                            amount: *amount,
                        }
                    };
                    self.log.emit(&self.bindings.share_class, event);
                }
                Err(e) => {
                    delivered[index] = false;
                    self.record_failure(e, &mut report.failures);
                }
            }
        }

        report.paid.push(AssetPayout {
            asset: asset.id(),
            balance,
            split,
            net_delivered: delivered[0],
            fee_delivered: delivered[1],
        });
    }

    fn record_failure(&mut self, error: TransferError, failures: &mut Vec<TransferError>) {
        self.log.emit(
            &self.bindings.share_class,
            VaultEvent::TransferFailed {
                asset: error.asset.clone(),
                recipient: error.recipient.clone(),
                amount: error.amount,
                reason: error.reason.clone(),
            },
        );
        failures.push(error);
    }

    fn transition(&mut self, to: VaultState) {
        debug_assert!(to > self.state, "vault state must only move forward");
        let from = self.state;
        self.state = to;
        self.log
            .emit(&self.bindings.share_class, VaultEvent::StateChanged { from, to });
    }
}
