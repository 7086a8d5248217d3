//! # Share Ledger
//!
//! Tracks the fungible share classes the factory issues, one per vault.
//! A holder's balance in a class is their claim on that vault's assets.
//!
//! ## Invariants
//!
//! - For every class, the sum of holder balances equals `total_supply`.
//!   Mint, burn and transfer update both sides together, and every
//!   operation validates before it mutates.
//! - Holders whose balance reaches zero are removed, so [`ShareLedger::holders`]
//!   only lists live positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crowdvault_ledger::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during share ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    /// The referenced share class does not exist.
    #[error("share class not found: {0}")]
    ClassNotFound(ShareClassId),

    /// A share class with this identifier is already registered.
    #[error("duplicate share class: {0}")]
    DuplicateClass(ShareClassId),

    /// A supply overflow would occur.
    #[error("supply overflow: minting {amount} would exceed u64::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: u64,
    },

    /// The holder does not own enough shares.
    #[error("insufficient shares: {holder} has {balance}, needs {amount}")]
    InsufficientBalance {
        /// Holder being debited.
        holder: Address,
        /// Current balance of the holder.
        balance: u64,
        /// Amount requested.
        amount: u64,
    },

    /// Zero-share operations are rejected.
    #[error("share amount must be positive")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of a share class. Hex digest assigned by the factory.
pub type ShareClassId = String;

/// Metadata and supply of one share class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClassInfo {
    /// Class identifier.
    pub share_class: ShareClassId,
    /// Display name (the vault's name).
    pub name: String,
    /// Outstanding shares.
    pub total_supply: u64,
    /// When the class was registered.
    pub created_at: DateTime<Utc>,
}

/// Per-class, per-holder share balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    classes: HashMap<ShareClassId, ShareClassInfo>,
    balances: HashMap<ShareClassId, BTreeMap<Address, u64>>,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new class with zero supply.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::DuplicateClass`] if the id is taken.
    pub fn register_class(&mut self, share_class: &str, name: &str) -> Result<(), ShareError> {
        if self.classes.contains_key(share_class) {
            return Err(ShareError::DuplicateClass(share_class.to_string()));
        }

        self.classes.insert(
            share_class.to_string(),
            ShareClassInfo {
                share_class: share_class.to_string(),
                name: name.to_string(),
                total_supply: 0,
                created_at: Utc::now(),
            },
        );
        self.balances.insert(share_class.to_string(), BTreeMap::new());
        Ok(())
    }

    /// Issues `amount` new shares to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::ClassNotFound`], [`ShareError::ZeroAmount`] or
    /// [`ShareError::SupplyOverflow`]. Nothing changes on error.
    pub fn mint(&mut self, share_class: &str, to: &str, amount: u64) -> Result<(), ShareError> {
        if amount == 0 {
            return Err(ShareError::ZeroAmount);
        }

        let (info, holders) = self.class_mut(share_class)?;
        let new_supply = info
            .total_supply
            .checked_add(amount)
            .ok_or(ShareError::SupplyOverflow { amount })?;

        // Any holder balance is bounded by the supply, so this cannot fail
        // once the supply check passed.
        let balance = holders.entry(to.to_string()).or_insert(0);
        *balance += amount;
        info.total_supply = new_supply;

        Ok(())
    }

    /// Destroys `amount` of `from`'s shares.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::ClassNotFound`], [`ShareError::ZeroAmount`] or
    /// [`ShareError::InsufficientBalance`].
    pub fn burn(&mut self, share_class: &str, from: &str, amount: u64) -> Result<(), ShareError> {
        if amount == 0 {
            return Err(ShareError::ZeroAmount);
        }

        let (info, holders) = self.class_mut(share_class)?;
        debit(holders, from, amount)?;
        info.total_supply -= amount;

        Ok(())
    }

    /// Moves `amount` shares from `from` to `to`. Supply is unchanged.
    pub fn transfer(
        &mut self,
        share_class: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), ShareError> {
        if amount == 0 {
            return Err(ShareError::ZeroAmount);
        }

        let (_, holders) = self.class_mut(share_class)?;
        debit(holders, from, amount)?;
        *holders.entry(to.to_string()).or_insert(0) += amount;

        Ok(())
    }

    /// Returns metadata for a class, or `None` if it does not exist.
    pub fn class_info(&self, share_class: &str) -> Option<&ShareClassInfo> {
        self.classes.get(share_class)
    }

    /// Outstanding shares of a class, or 0 if it does not exist.
    pub fn total_supply(&self, share_class: &str) -> u64 {
        self.classes
            .get(share_class)
            .map(|c| c.total_supply)
            .unwrap_or(0)
    }

    /// Balance of `holder` in a class, or 0.
    pub fn balance_of(&self, share_class: &str, holder: &str) -> u64 {
        self.balances
            .get(share_class)
            .and_then(|b| b.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Holders with a non-zero balance, ordered by address.
    pub fn holders(&self, share_class: &str) -> Vec<(Address, u64)> {
        self.balances
            .get(share_class)
            .map(|b| b.iter().map(|(h, v)| (h.clone(), *v)).collect())
            .unwrap_or_default()
    }

    /// Number of registered classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    fn class_mut(
        &mut self,
        share_class: &str,
    ) -> Result<(&mut ShareClassInfo, &mut BTreeMap<Address, u64>), ShareError> {
        let info = self
            .classes
            .get_mut(share_class)
            .ok_or_else(|| ShareError::ClassNotFound(share_class.to_string()))?;
        let holders = self
            .balances
            .get_mut(share_class)
            .ok_or_else(|| ShareError::ClassNotFound(share_class.to_string()))?;
        Ok((info, holders))
    }
}

fn debit(holders: &mut BTreeMap<Address, u64>, from: &str, amount: u64) -> Result<(), ShareError> {
    let balance = holders.get(from).copied().unwrap_or(0);
    if balance < amount {
        return Err(ShareError::InsufficientBalance {
            holder: from.to_string(),
            balance,
            amount,
        });
    }

    if balance == amount {
        holders.remove(from);
    } else {
        holders.insert(from.to_string(), balance - amount);
    }
    Ok(())
}
