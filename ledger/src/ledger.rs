//! # Account Ledger
//!
//! Holds every balance in the system: `asset -> holder -> amount`. Vault
//! balances are nothing more than the ledger balances of the vault's own
//! address, which is why vaults always read them live instead of caching.
//!
//! ## Transfer conventions
//!
//! The ledger deliberately exposes two different failure conventions, the
//! same way real chains do:
//!
//! - **Native currency** fails loudly: [`Ledger::transfer_native`] returns
//!   `Err` when the sender is short, when the recipient refuses native
//!   currency, or on overflow.
//! - **Tokens** report failure through the return value:
//!   [`Ledger::transfer_token`] returns `Ok(false)` when the sender is short
//!   and only uses `Err` for a paused or unknown token.
//!
//! Callers that need a single failure signal normalize these themselves.
//!
//! ## Atomicity
//!
//! Every transfer is computed against a projection of the affected balances
//! and only written back once every leg has been validated. A failed
//! transfer (or batch) leaves the ledger untouched.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::asset::{Address, AssetId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The sender does not hold enough of the asset.
    #[error("insufficient {asset} balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Asset being moved.
        asset: AssetId,
        /// Account being debited.
        holder: Address,
        /// Its balance at the time of the transfer.
        available: u64,
        /// Amount that was requested.
        requested: u64,
    },

    /// Crediting the recipient would overflow `u64`.
    #[error("{asset} balance overflow for {holder}: current {current}, credit {credit}")]
    Overflow {
        /// Asset being credited.
        asset: AssetId,
        /// Account being credited.
        holder: Address,
        /// Balance before the failed credit.
        current: u64,
        /// Amount that caused the overflow.
        credit: u64,
    },

    /// The recipient does not accept native currency.
    #[error("recipient {0} rejects native currency")]
    RecipientRejected(Address),

    /// Transfers of this token are suspended.
    #[error("token {0} is paused")]
    TokenPaused(String),

    /// No token with this symbol has been registered.
    #[error("unknown token: {0}")]
    UnknownToken(String),
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<AssetId, HashMap<Address, u64>>,
    tokens: HashSet<String>,
    paused: HashSet<String>,
    rejects_native: HashSet<Address>,
}

/// Thread-safe in-memory ledger of native and token balances.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Creates an empty ledger with no registered tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token symbol so that it can hold balances. Registering
    /// the same symbol twice is a no-op.
    pub fn register_token(&self, symbol: &str) -> AssetId {
        let asset = AssetId::token(symbol);
        self.state.write().tokens.insert(asset.symbol().to_string());
        asset
    }

    /// Returns `true` if a token with this symbol exists.
    pub fn is_registered_token(&self, symbol: &str) -> bool {
        let asset = AssetId::token(symbol);
        self.state.read().tokens.contains(asset.symbol())
    }

    /// Returns the balance of `holder` in `asset`, or 0.
    pub fn balance_of(&self, asset: &AssetId, holder: &str) -> u64 {
        self.state
            .read()
            .balances
            .get(asset)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Creates `amount` units of `asset` out of thin air in `holder`'s
    /// account. This is the faucet used to seed accounts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownToken`] for an unregistered token and
    /// [`LedgerError::Overflow`] if the balance would exceed `u64::MAX`.
    pub fn mint(&self, asset: &AssetId, holder: &str, amount: u64) -> Result<u64, LedgerError> {
        let mut state = self.state.write();
        if let AssetId::Token(symbol) = asset {
            if !state.tokens.contains(symbol) {
                return Err(LedgerError::UnknownToken(symbol.clone()));
            }
        }

        let balance = state
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(holder.to_string())
            .or_insert(0);

        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow {
            asset: asset.clone(),
            holder: holder.to_string(),
            current: *balance,
            credit: amount,
        })?;

        debug!(asset = %asset, holder, amount, "minted");
        Ok(*balance)
    }

    /// Moves native currency from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Fails with [`LedgerError::InsufficientBalance`],
    /// [`LedgerError::RecipientRejected`] or [`LedgerError::Overflow`]. On
    /// failure no balance changes.
    pub fn transfer_native(&self, from: &str, to: &str, amount: u64) -> Result<(), LedgerError> {
        self.transfer_native_batch(from, &[(to.to_string(), amount)])
    }

    /// Moves native currency from `from` to several recipients at once.
    ///
    /// Either every leg is applied or none is. Zero-amount legs are skipped.
    pub fn transfer_native_batch(
        &self,
        from: &str,
        legs: &[(Address, u64)],
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write();

        if let Some((rejecting, _)) = legs
            .iter()
            .find(|(to, amount)| *amount > 0 && state.rejects_native.contains(to))
        {
            return Err(LedgerError::RecipientRejected(rejecting.clone()));
        }

        let holders = state.balances.entry(AssetId::Native).or_default();
        let projected = project(holders, &AssetId::Native, from, legs)?;
        holders.extend(projected);

        debug!(from, legs = legs.len(), "native transfer applied");
        Ok(())
    }

    /// Moves a token from `from` to `to`.
    ///
    /// Returns `Ok(false)` when the sender's balance is too small; that is
    /// the token's way of saying "transfer failed" and nothing was moved.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownToken`] or [`LedgerError::TokenPaused`]
    /// when the token cannot move at all, and [`LedgerError::Overflow`] if
    /// the recipient's balance would overflow.
    pub fn transfer_token(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<bool, LedgerError> {
        let asset = AssetId::token(symbol);
        let mut state = self.state.write();
        let symbol = asset.symbol().to_string();

        if !state.tokens.contains(&symbol) {
            return Err(LedgerError::UnknownToken(symbol));
        }
        if state.paused.contains(&symbol) {
            return Err(LedgerError::TokenPaused(symbol));
        }

        let holders = state.balances.entry(asset.clone()).or_default();
        match project(holders, &asset, from, &[(to.to_string(), amount)]) {
            Ok(projected) => {
                holders.extend(projected);
                debug!(asset = %asset, from, to, amount, "token transfer applied");
                Ok(true)
            }
            Err(LedgerError::InsufficientBalance { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Makes `address` refuse every incoming native transfer.
    pub fn reject_native(&self, address: &str) {
        self.state.write().rejects_native.insert(address.to_string());
    }

    /// Undoes [`reject_native`](Self::reject_native).
    pub fn accept_native(&self, address: &str) {
        self.state.write().rejects_native.remove(address);
    }

    /// Suspends all transfers of a token.
    pub fn pause_token(&self, symbol: &str) {
        let asset = AssetId::token(symbol);
        self.state.write().paused.insert(asset.symbol().to_string());
    }

    /// Resumes transfers of a paused token.
    pub fn unpause_token(&self, symbol: &str) {
        let asset = AssetId::token(symbol);
        self.state.write().paused.remove(asset.symbol());
    }

    /// Sum of all balances held in `asset`.
    pub fn total_held(&self, asset: &AssetId) -> u128 {
        self.state
            .read()
            .balances
            .get(asset)
            .map(|holders| holders.values().map(|v| *v as u128).sum())
            .unwrap_or(0)
    }
}

/// Computes the balances that a set of transfer legs would produce, without
/// touching the ledger. Only accounts touched by the legs appear in the
/// result.
fn project(
    holders: &HashMap<Address, u64>,
    asset: &AssetId,
    from: &str,
    legs: &[(Address, u64)],
) -> Result<HashMap<Address, u64>, LedgerError> {
    let mut projected: HashMap<Address, u64> = HashMap::new();
    let current = |projected: &HashMap<Address, u64>, who: &str| {
        projected
            .get(who)
            .or_else(|| holders.get(who))
            .copied()
            .unwrap_or(0)
    };

    for (to, amount) in legs.iter().filter(|(_, amount)| *amount > 0) {
        let available = current(&projected, from);
        if available < *amount {
            return Err(LedgerError::InsufficientBalance {
                asset: asset.clone(),
                holder: from.to_string(),
                available,
                requested: *amount,
            });
        }
        projected.insert(from.to_string(), available - amount);

        let before = current(&projected, to);
        let after = before.checked_add(*amount).ok_or(LedgerError::Overflow {
            asset: asset.clone(),
            holder: to.clone(),
            current: before,
            credit: *amount,
        })?;
        projected.insert(to.clone(), after);
    }

    Ok(projected)
}
