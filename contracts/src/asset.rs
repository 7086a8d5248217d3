//! # Assets & Asset Registry
//!
//! A vault holds native currency plus whatever tokens the asset registry
//! currently whitelists. The [`Asset`] trait gives the vault one way to read
//! and move any of them, hiding the fact that the ledger reports native
//! failures as errors and token failures as a `false` return value. Both
//! surface as a single [`TransferError`].
//!
//! The registry is an external collaborator and may change between calls,
//! so the vault asks it for the current list every time it needs one.

use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crowdvault_ledger::{Address, AssetId, Ledger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A transfer of one asset to one recipient did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("transfer of {amount} {asset} to {recipient} failed: {reason}")]
pub struct TransferError {
    /// Asset that failed to move.
    pub asset: AssetId,
    /// Intended recipient.
    pub recipient: Address,
    /// Amount that stayed behind.
    pub amount: u64,
    /// Why the transfer failed.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Asset capability
// ---------------------------------------------------------------------------

/// Uniform read/transfer capability over one asset kind.
pub trait Asset {
    /// Identifier of the asset.
    fn id(&self) -> AssetId;

    /// Live balance of `holder`.
    fn balance_of(&self, holder: &str) -> u64;

    /// Moves `amount` from `from` to `to`.
    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), TransferError>;

    /// Whether a failed transfer of this asset must abort the operation it
    /// is part of.
    fn failure_is_fatal(&self) -> bool;

    /// Performs several transfers out of `from`, returning one outcome per
    /// leg in order. Zero-amount legs succeed without touching the ledger.
    ///
    /// The default runs each leg independently.
    fn transfer_many(&self, from: &str, legs: &[(Address, u64)]) -> Vec<Result<(), TransferError>> {
        legs.iter()
            .map(|(to, amount)| match amount {
                0 => Ok(()),
                _ => self.transfer(from, to, *amount),
            })
            .collect()
    }
}

/// The chain's native currency.
#[derive(Debug, Clone, Copy)]
pub struct NativeAsset<'a> {
    ledger: &'a Ledger,
}

impl<'a> NativeAsset<'a> {
    /// Binds the native currency on `ledger`.
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }
}

impl Asset for NativeAsset<'_> {
    fn id(&self) -> AssetId {
        AssetId::Native
    }

    fn balance_of(&self, holder: &str) -> u64 {
        self.ledger.balance_of(&AssetId::Native, holder)
    }

    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), TransferError> {
        self.ledger
            .transfer_native(from, to, amount)
            .map_err(|e| TransferError {
                asset: AssetId::Native,
                recipient: to.to_string(),
                amount,
                reason: e.to_string(),
            })
    }

    fn failure_is_fatal(&self) -> bool {
        true
    }

    /// Native legs land together or not at all: if any leg fails, every
    /// non-zero leg is reported as failed and nothing moved.
    fn transfer_many(&self, from: &str, legs: &[(Address, u64)]) -> Vec<Result<(), TransferError>> {
        match self.ledger.transfer_native_batch(from, legs) {
            Ok(()) => legs.iter().map(|_| Ok(())).collect(),
            Err(e) => legs
                .iter()
                .map(|(to, amount)| match amount {
                    0 => Ok(()),
                    _ => Err(TransferError {
                        asset: AssetId::Native,
                        recipient: to.clone(),
                        amount: *amount,
                        reason: e.to_string(),
                    }),
                })
                .collect(),
        }
    }
}

/// A registered fungible token.
#[derive(Debug, Clone)]
pub struct TokenAsset<'a> {
    ledger: &'a Ledger,
    id: AssetId,
}

impl<'a> TokenAsset<'a> {
    /// Binds the token `symbol` on `ledger`.
    pub fn new(ledger: &'a Ledger, symbol: &str) -> Self {
        Self {
            ledger,
            id: AssetId::token(symbol),
        }
    }
}

impl Asset for TokenAsset<'_> {
    fn id(&self) -> AssetId {
        self.id.clone()
    }

    fn balance_of(&self, holder: &str) -> u64 {
        self.ledger.balance_of(&self.id, holder)
    }

    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), TransferError> {
        let failed = |reason: String| TransferError {
            asset: self.id.clone(),
            recipient: to.to_string(),
            amount,
            reason,
        };

        match self.ledger.transfer_token(self.id.symbol(), from, to, amount) {
            Ok(true) => Ok(()),
            Ok(false) => Err(failed("token transfer returned false".into())),
            Err(e) => Err(failed(e.to_string())),
        }
    }

    fn failure_is_fatal(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Source of the token symbols a vault may hold besides native currency.
pub trait AssetRegistry: Send + Sync {
    /// Current whitelist, in a stable order.
    fn list_supported_assets(&self) -> Vec<String>;
}

/// In-memory registry whose list can be edited at runtime.
#[derive(Debug, Default)]
pub struct StaticAssetRegistry {
    assets: RwLock<Vec<String>>,
}

impl StaticAssetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `symbols`.
    pub fn with_assets<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        for symbol in symbols {
            registry.add(symbol.as_ref());
        }
        registry
    }

    /// Whitelists a token. Returns `false` if it was already listed.
    pub fn add(&self, symbol: &str) -> bool {
        let symbol = AssetId::token(symbol).symbol().to_string();
        let mut assets = self.assets.write();
        if assets.contains(&symbol) {
            return false;
        }
        assets.push(symbol);
        true
    }

    /// Removes a token from the whitelist. Returns `false` if it was absent.
    pub fn remove(&self, symbol: &str) -> bool {
        let symbol = AssetId::token(symbol);
        let mut assets = self.assets.write();
        let before = assets.len();
        assets.retain(|s| s != symbol.symbol());
        assets.len() != before
    }
}

impl AssetRegistry for StaticAssetRegistry {
    fn list_supported_assets(&self) -> Vec<String> {
        self.assets.read().clone()
    }
}

/// Resolves the native asset followed by every currently registered token.
///
/// Symbols that normalize to an asset already in the list are dropped, so a
/// registry returning `["USDC", "usdc"]` yields USDC once.
pub fn resolve_assets<'a>(ledger: &'a Ledger, registry: &dyn AssetRegistry) -> Vec<Box<dyn Asset + 'a>> {
    let mut seen = HashSet::from([AssetId::Native]);
    let mut assets: Vec<Box<dyn Asset + 'a>> = vec![Box::new(NativeAsset::new(ledger))];
    for symbol in registry.list_supported_assets() {
        let token = TokenAsset::new(ledger, &symbol);
        if seen.insert(token.id()) {
            assets.push(Box::new(token));
        }
    }
    assets
}
