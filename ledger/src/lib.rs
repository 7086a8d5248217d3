// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # crowdvault Ledger
//!
//! The substrate that escrow vaults sit on top of. A vault never stores its
//! own balances: it reads them live from this ledger every time it needs
//! them, and it moves value by asking the ledger to transfer.
//!
//! - **asset**: identifiers for native currency and registered tokens.
//! - **ledger**: the account ledger itself, with two transfer conventions:
//!   native transfers fail with an error, token transfers report `false`.
//! - **clock**: wall clock and a manually driven clock for deterministic runs.
//! - **config**: protocol constants.
//!
//! Every amount is a `u64` in the asset's smallest unit. There is no price
//! oracle anywhere in the system; balances of different assets are summed
//! at face value.

pub mod asset;
pub mod clock;
pub mod config;
pub mod ledger;

pub use asset::{Address, AssetId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{Ledger, LedgerError};
