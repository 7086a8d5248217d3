//! # Payout Arithmetic
//!
//! Pro-rata and fee math for redemptions. Every division truncates toward
//! zero, so rounding dust always stays in the vault and is picked up by the
//! last redeemer. Intermediate products are computed in `u128`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crowdvault_ledger::config::BPS_DENOMINATOR;

/// Errors from payout arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// The share supply was zero.
    #[error("division by zero: total share supply is 0")]
    DivisionByZero,

    /// The redeemed shares exceed the outstanding supply.
    #[error("shares {shares} exceed total supply {total}")]
    SharesExceedSupply {
        /// Shares being redeemed.
        shares: u64,
        /// Outstanding supply.
        total: u64,
    },

    /// The fee rate is above 100%.
    #[error("fee of {0} bps exceeds 10000")]
    FeeOutOfRange(u16),
}

/// One asset's payout broken into its parts. `net + fee == gross` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Split {
    /// Pro-rata share of the vault balance.
    pub gross: u64,
    /// Withdrawal fee taken out of `gross`.
    pub fee: u64,
    /// What the redeemer receives.
    pub net: u64,
}

/// `balance * shares / total`, truncated.
///
/// # Errors
///
/// Returns [`MathError::DivisionByZero`] when `total == 0` and
/// [`MathError::SharesExceedSupply`] when `shares > total`.
pub fn pro_rata(balance: u64, shares: u64, total: u64) -> Result<u64, MathError> {
    if total == 0 {
        return Err(MathError::DivisionByZero);
    }
    if shares > total {
        return Err(MathError::SharesExceedSupply { shares, total });
    }

    // shares <= total, so the quotient is <= balance and fits in u64.
    let gross = (balance as u128) * (shares as u128) / (total as u128);
    Ok(gross as u64)
}

/// Splits `gross` into fee and net at `fee_bps` basis points.
pub fn split_fee(gross: u64, fee_bps: u16) -> Result<Split, MathError> {
    if fee_bps as u64 > BPS_DENOMINATOR {
        return Err(MathError::FeeOutOfRange(fee_bps));
    }

    let fee = ((gross as u128) * (fee_bps as u128) / (BPS_DENOMINATOR as u128)) as u64;
    Ok(Split {
        gross,
        fee,
        net: gross - fee,
    })
}

/// Pro-rata payout of `balance` for `shares` out of `total`, net of fee.
pub fn payout_split(balance: u64, shares: u64, total: u64, fee_bps: u16) -> Result<Split, MathError> {
    split_fee(pro_rata(balance, shares, total)?, fee_bps)
}
