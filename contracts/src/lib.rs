//! # crowdvault Contracts
//!
//! Crowdfunding escrow: an issuer creates a campaign vault and a share class
//! for it, backers deposit native currency or whitelisted tokens, and once
//! the vault matures every shareholder redeems their pro-rata part of each
//! asset, net of a withdrawal fee, by burning their shares.
//!
//! - **Vault**: per-campaign escrow and its Locked → Unlocked → Open
//!   lifecycle, maturity evaluation, payouts and the terminal sweep.
//! - **Factory**: creates vaults, owns the share ledger, and is the only
//!   caller a vault accepts payout requests from.
//! - **Assets**: one capability trait over native currency and tokens, and
//!   the registry of whitelisted tokens.
//! - **Shares**: per-class share balances.
//!
//! ## Design Principles
//!
//! 1. Money arithmetic is checked or done in `u128`, and every division
//!    truncates in the vault's favour.
//! 2. State transitions are explicit enum variants and only move forward.
//! 3. Balances are never cached: the ledger is the single source of truth.
//! 4. Every public type is serializable (serde) for persistence and for the
//!    CLI's reports.

pub mod asset;
pub mod events;
pub mod factory;
pub mod math;
pub mod shares;
pub mod vault;

pub use asset::{Asset, AssetRegistry, NativeAsset, StaticAssetRegistry, TokenAsset, TransferError};
pub use events::VaultEvent;
pub use factory::{CreateVault, FactoryConfig, FactoryError, FactorySnapshot, ShareAllocation, VaultFactory};
pub use shares::{ShareClassId, ShareError, ShareLedger};
pub use vault::{
    ErrorKind, PayoutReport, SweepReport, Vault, VaultAttributes, VaultBindings, VaultEnv, VaultError,
    VaultRecord, VaultState, VaultTerms,
};
