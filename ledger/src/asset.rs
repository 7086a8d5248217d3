//! # Asset Identifiers
//!
//! An [`AssetId`] names one of the balances an account can hold: the native
//! currency, or a token registered under a symbol. Symbols are normalized to
//! upper case on construction so `"usdc"` and `"USDC"` are the same asset.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::NATIVE_SYMBOL;

/// Account address on the ledger. Opaque: the ledger never parses it.
pub type Address = String;

/// Identifies a balance kind on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetId {
    /// The chain's native currency.
    Native,
    /// A fungible token identified by its symbol.
    Token(String),
}

impl AssetId {
    /// Builds a token identifier, normalizing the symbol.
    pub fn token(symbol: &str) -> Self {
        AssetId::Token(symbol.trim().to_uppercase())
    }

    /// Returns `true` for the native currency.
    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }

    /// Human-readable symbol of the asset.
    pub fn symbol(&self) -> &str {
        match self {
            AssetId::Native => NATIVE_SYMBOL,
            AssetId::Token(symbol) => symbol,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "native"),
            AssetId::Token(symbol) => write!(f, "token:{}", symbol),
        }
    }
}
