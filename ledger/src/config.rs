//! # Protocol Constants
//!
//! Fixed parameters shared by the ledger, the vaults and the factory. Fee
//! arithmetic is done in basis points everywhere, never in floating point.

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Denominator for basis-point arithmetic. 1 bp = 0.01%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Upper bound for a vault's withdrawal fee. A 100% fee is legal (all of a
/// payout goes to the fee recipient), anything above it is not.
pub const MAX_WITHDRAWAL_FEE_BPS: u16 = 10_000;

// ---------------------------------------------------------------------------
// Assets & Addresses
// ---------------------------------------------------------------------------

/// Display symbol of the native currency.
pub const NATIVE_SYMBOL: &str = "NATIVE";

/// Prefix for vault addresses derived by the factory.
pub const VAULT_ADDRESS_PREFIX: &str = "vault:";

/// Number of hex characters of the share class digest used in a vault address.
pub const VAULT_ADDRESS_HEX_LEN: usize = 40;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fee_fits_in_denominator() {
        assert_eq!(MAX_WITHDRAWAL_FEE_BPS as u64, BPS_DENOMINATOR);
    }
}
