//! # Vault Factory
//!
//! Issues share classes, creates the vault behind each one, and is the only
//! party allowed to ask a vault for a payout.
//!
//! ## Redemption
//!
//! [`VaultFactory::request_payout`] reads the caller's share balance and
//! the class supply, asks the vault to pay out against those figures, and
//! burns the caller's shares only after the vault call succeeded. The whole
//! sequence runs under the factory lock, so two redemptions can never see
//! the same pre-burn balance.
//!
//! ## Identifiers
//!
//! Share class ids are hex BLAKE3 digests of the factory address, the
//! creation nonce and the vault name, separated by `0x00`. The vault's
//! ledger address is derived from the same digest.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crowdvault_ledger::config::{VAULT_ADDRESS_HEX_LEN, VAULT_ADDRESS_PREFIX};
use crowdvault_ledger::Address;

use crate::events::VaultEvent;
use crate::shares::{ShareClassId, ShareError, ShareLedger};
use crate::vault::{
    ErrorKind, PayoutReport, SweepReport, Vault, VaultAttributes, VaultBindings, VaultEnv,
    VaultError, VaultRecord, VaultState, VaultTerms,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during factory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    /// The caller lacks the required role.
    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized {
        /// Who called.
        caller: Address,
        /// Role that was required.
        required: &'static str,
    },

    /// No vault backs this share class.
    #[error("unknown vault for share class {0}")]
    UnknownVault(ShareClassId),

    /// The caller holds no shares of the class.
    #[error("{holder} holds no shares of {share_class}")]
    NoShares {
        /// Would-be redeemer.
        holder: Address,
        /// Share class.
        share_class: ShareClassId,
    },

    /// Shares can only be minted while the vault is still `Locked`.
    #[error("cannot mint shares of {share_class}: vault is {state}")]
    MintClosed {
        /// Share class.
        share_class: ShareClassId,
        /// Current vault state.
        state: VaultState,
    },

    /// The initial share allocation is empty, has a zero entry or overflows.
    #[error("invalid share allocation: {0}")]
    InvalidAllocation(String),

    /// The vault rejected the operation.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The share ledger rejected the operation.
    #[error(transparent)]
    Shares(#[from] ShareError),
}

impl FactoryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FactoryError::Unauthorized { .. } => ErrorKind::Unauthorized,
            FactoryError::UnknownVault(_) => ErrorKind::NotFound,
            FactoryError::NoShares { .. } => ErrorKind::InsufficientFunds,
            FactoryError::MintClosed { .. } => ErrorKind::PreconditionFailed,
            FactoryError::InvalidAllocation(_) => ErrorKind::InvalidArgument,
            FactoryError::Vault(e) => e.kind(),
            FactoryError::Shares(ShareError::ClassNotFound(_)) => ErrorKind::NotFound,
            FactoryError::Shares(ShareError::InsufficientBalance { .. }) => {
                ErrorKind::InsufficientFunds
            }
            FactoryError::Shares(_) => ErrorKind::InvalidArgument,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Addresses the factory operates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// The factory's own address; vaults only accept payout calls from it.
    pub address: Address,
    /// The only caller allowed to create vaults and mint shares.
    pub minter: Address,
    /// Receives every withdrawal fee.
    pub fee_recipient: Address,
    /// Receives swept leftovers of open vaults.
    pub treasury: Address,
}

/// Initial shareholder position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAllocation {
    /// Holder address.
    pub holder: Address,
    /// Shares issued to the holder.
    pub shares: u64,
}

/// Parameters for [`VaultFactory::create_vault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVault {
    /// Descriptive attributes.
    pub attributes: VaultAttributes,
    /// Economic terms.
    pub terms: VaultTerms,
    /// Shares issued at creation.
    pub allocations: Vec<ShareAllocation>,
}

/// Serializable state of a factory: vault records plus the share ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorySnapshot {
    /// Factory addresses.
    pub config: FactoryConfig,
    /// Number of vaults created so far.
    pub nonce: u64,
    /// One record per vault.
    pub vaults: Vec<VaultRecord>,
    /// Share balances of every class.
    pub shares: ShareLedger,
}

#[derive(Debug, Default)]
struct FactoryState {
    nonce: u64,
    vaults: HashMap<ShareClassId, Vault>,
    shares: ShareLedger,
}

impl FactoryState {
    fn vault(&self, share_class: &str) -> Result<&Vault, FactoryError> {
        self.vaults
            .get(share_class)
            .ok_or_else(|| FactoryError::UnknownVault(share_class.to_string()))
    }

    fn vault_mut(&mut self, share_class: &str) -> Result<&mut Vault, FactoryError> {
        self.vaults
            .get_mut(share_class)
            .ok_or_else(|| FactoryError::UnknownVault(share_class.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Catalogue of vaults keyed by share class, plus the share ledger.
///
/// Every method takes `&self`; share it behind an `Arc`. All state sits
/// behind one mutex, so operations are serialized.
#[derive(Debug)]
pub struct VaultFactory {
    config: FactoryConfig,
    env: VaultEnv,
    state: Mutex<FactoryState>,
}

impl VaultFactory {
    /// Creates a factory with no vaults.
    pub fn new(config: FactoryConfig, env: VaultEnv) -> Self {
        Self {
            config,
            env,
            state: Mutex::new(FactoryState::default()),
        }
    }

    /// Rebuilds a factory from a snapshot.
    pub fn restore(snapshot: FactorySnapshot, env: VaultEnv) -> Result<Self, FactoryError> {
        let mut vaults = HashMap::new();
        for record in snapshot.vaults {
            if record.bindings.factory != snapshot.config.address {
                return Err(FactoryError::Unauthorized {
                    caller: record.bindings.factory.clone(),
                    required: "factory",
                });
            }
            let share_class = record.bindings.share_class.clone();
            vaults.insert(share_class, Vault::restore(record, env.clone())?);
        }

        info!(vaults = vaults.len(), nonce = snapshot.nonce, "factory restored");
        Ok(Self {
            config: snapshot.config,
            env,
            state: Mutex::new(FactoryState {
                nonce: snapshot.nonce,
                vaults,
                shares: snapshot.shares,
            }),
        })
    }

    /// Factory addresses.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Creates and initializes a vault, registers its share class and
    /// issues the initial allocations. Returns the new share class id.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Unauthorized`] unless `caller` is the minter,
    /// [`FactoryError::InvalidAllocation`] for a zero or overflowing
    /// allocation, and [`VaultError::InvalidFee`] (wrapped) for a fee above
    /// 10000 bps. Nothing is created on error.
    pub fn create_vault(&self, caller: &str, request: CreateVault) -> Result<ShareClassId, FactoryError> {
        self.require_minter(caller)?;
        validate_allocations(&request.allocations)?;

        let mut state = self.state.lock();
        let share_class = derive_share_class(&self.config.address, state.nonce, &request.attributes.name);
        let bindings = VaultBindings {
            share_class: share_class.clone(),
            address: vault_address(&share_class),
            factory: self.config.address.clone(),
            treasury: self.config.treasury.clone(),
        };

        let mut vault = Vault::new(bindings, self.env.clone());
        vault.initialize(&self.config.address, request.attributes.clone(), request.terms)?;

        state.shares.register_class(&share_class, &request.attributes.name)?;
        for allocation in &request.allocations {
            state
                .shares
                .mint(&share_class, &allocation.holder, allocation.shares)?;
        }

        info!(
            share_class = %share_class,
            address = %vault.address(),
            name = %request.attributes.name,
            target = request.terms.target_balance,
            fee_bps = request.terms.withdrawal_fee_bps,
            supply = state.shares.total_supply(&share_class),
            "vault created"
        );
        state.vaults.insert(share_class.clone(), vault);
        state.nonce += 1;
        Ok(share_class)
    }

    /// Issues more shares of a class. Minter only, and only while the vault
    /// is still `Locked`.
    pub fn mint_shares(
        &self,
        caller: &str,
        share_class: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), FactoryError> {
        self.require_minter(caller)?;
        let mut state = self.state.lock();
        let vault_state = state.vault(share_class)?.state();
        if vault_state != VaultState::Locked {
            return Err(FactoryError::MintClosed {
                share_class: share_class.to_string(),
                state: vault_state,
            });
        }

        state.shares.mint(share_class, to, amount)?;
        Ok(())
    }

    /// Moves shares between holders.
    pub fn transfer_shares(
        &self,
        share_class: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), FactoryError> {
        let mut state = self.state.lock();
        state.vault(share_class)?;
        state.shares.transfer(share_class, from, to, amount)?;
        Ok(())
    }

    /// Share balance of `holder`.
    pub fn balance_of(&self, share_class: &str, holder: &str) -> u64 {
        self.state.lock().shares.balance_of(share_class, holder)
    }

    /// Outstanding shares of a class.
    pub fn total_supply(&self, share_class: &str) -> u64 {
        self.state.lock().shares.total_supply(share_class)
    }

    /// Holders with a non-zero position.
    pub fn holders(&self, share_class: &str) -> Vec<(Address, u64)> {
        self.state.lock().shares.holders(share_class)
    }

    /// All share classes, sorted.
    pub fn share_classes(&self) -> Vec<ShareClassId> {
        let mut classes: Vec<_> = self.state.lock().vaults.keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Ledger address of the vault behind a class.
    pub fn vault_address(&self, share_class: &str) -> Result<Address, FactoryError> {
        Ok(self.state.lock().vault(share_class)?.address().to_string())
    }

    /// Current state of the vault behind a class.
    pub fn vault_state(&self, share_class: &str) -> Result<VaultState, FactoryError> {
        Ok(self.state.lock().vault(share_class)?.state())
    }

    /// Fresh aggregate balance of the vault behind a class.
    pub fn aggregate_balance(&self, share_class: &str) -> Result<u128, FactoryError> {
        Ok(self.state.lock().vault(share_class)?.aggregate_balance())
    }

    /// Event history of the vault behind a class.
    pub fn events(&self, share_class: &str) -> Result<Vec<VaultEvent>, FactoryError> {
        Ok(self.state.lock().vault(share_class)?.events().to_vec())
    }

    /// Persisted record of the vault behind a class.
    pub fn record(&self, share_class: &str) -> Result<VaultRecord, FactoryError> {
        Ok(self.state.lock().vault(share_class)?.record()?)
    }

    /// Deposits native currency from `from` into a vault.
    pub fn deposit_native(
        &self,
        share_class: &str,
        from: &str,
        amount: u64,
    ) -> Result<VaultState, FactoryError> {
        Ok(self
            .state
            .lock()
            .vault_mut(share_class)?
            .receive_native(from, amount)?)
    }

    /// Permissionless maturity check on a vault.
    pub fn check_maturity(&self, share_class: &str) -> Result<VaultState, FactoryError> {
        Ok(self.state.lock().vault_mut(share_class)?.check_maturity()?)
    }

    /// Redeems all of `caller`'s shares of a class.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::UnknownVault`], [`FactoryError::NoShares`]
    /// when the caller holds nothing, or the vault's error. Shares are only
    /// burned if the vault paid out.
    pub fn request_payout(&self, caller: &str, share_class: &str) -> Result<PayoutReport, FactoryError> {
        let mut state = self.state.lock();
        state.vault(share_class)?;

        let shares = state.shares.balance_of(share_class, caller);
        if shares == 0 {
            return Err(FactoryError::NoShares {
                holder: caller.to_string(),
                share_class: share_class.to_string(),
            });
        }
        let total = state.shares.total_supply(share_class);

        let report = state.vault_mut(share_class)?.payout(
            &self.config.address,
            caller,
            &self.config.fee_recipient,
            shares,
            total,
        )?;
        state.shares.burn(share_class, caller, shares)?;

        if !report.failures.is_empty() {
            warn!(
                share_class,
                holder = caller,
                failures = report.failures.len(),
                "payout completed with token transfer failures"
            );
        }
        Ok(report)
    }

    /// Sweeps an open vault's leftovers to the treasury. Anyone may trigger
    /// it; the transfer executes under the factory's authority.
    pub fn sweep(&self, share_class: &str) -> Result<SweepReport, FactoryError> {
        Ok(self
            .state
            .lock()
            .vault_mut(share_class)?
            .sweep(&self.config.address)?)
    }

    /// Serializable copy of the factory's state.
    pub fn snapshot(&self) -> Result<FactorySnapshot, FactoryError> {
        let state = self.state.lock();
        let mut vaults = state
            .vaults
            .values()
            .map(Vault::record)
            .collect::<Result<Vec<_>, _>>()?;
        vaults.sort_by(|a, b| a.bindings.share_class.cmp(&b.bindings.share_class));

        Ok(FactorySnapshot {
            config: self.config.clone(),
            nonce: state.nonce,
            vaults,
            shares: state.shares.clone(),
        })
    }

    fn require_minter(&self, caller: &str) -> Result<(), FactoryError> {
        if caller != self.config.minter {
            return Err(FactoryError::Unauthorized {
                caller: caller.to_string(),
                required: "minter",
            });
        }
        Ok(())
    }
}

fn validate_allocations(allocations: &[ShareAllocation]) -> Result<(), FactoryError> {
    if allocations.is_empty() {
        return Err(FactoryError::InvalidAllocation("no shareholders".into()));
    }
    if let Some(zero) = allocations.iter().find(|a| a.shares == 0) {
        return Err(FactoryError::InvalidAllocation(format!(
            "zero shares for {}",
            zero.holder
        )));
    }
    allocations
        .iter()
        .try_fold(0u64, |acc, a| acc.checked_add(a.shares))
        .ok_or_else(|| FactoryError::InvalidAllocation("total supply overflows u64".into()))?;
    Ok(())
}

/// Derives the share class id for the `nonce`-th vault of a factory.
pub fn derive_share_class(factory: &str, nonce: u64, name: &str) -> ShareClassId {
    let mut preimage = Vec::with_capacity(factory.len() + name.len() + 10);
    preimage.extend_from_slice(factory.as_bytes());
    preimage.push(0x00);
    preimage.extend_from_slice(&nonce.to_be_bytes());
    preimage.push(0x00);
    preimage.extend_from_slice(name.as_bytes());

    hex::encode(blake3::hash(&preimage).as_bytes())
}

/// Ledger address of the vault backing `share_class`.
pub fn vault_address(share_class: &str) -> Address {
    let digest = &share_class[..share_class.len().min(VAULT_ADDRESS_HEX_LEN)];
    format!("{}{}", VAULT_ADDRESS_PREFIX, digest)
}
