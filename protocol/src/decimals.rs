//! # Decimal Normalization
//!
//! Converts asset-native integer amounts between precisions. The bank uses
//! this to bring every raw amount into the 6-decimal unit of account.
//!
//! ## Rounding policy
//!
//! Scaling down truncates toward zero. The fractional remainder is dropped
//! and never credited to anyone: a depositor sending
//! `999_999_999_999` wei (just under one ledger unit) gets a ledger credit of
//! zero. [`truncation_remainder`] exposes the dropped value so callers can
//! log it.
//!
//! Scaling up uses checked multiplication. With 256-bit amounts and the
//! 6-decimal target there is no practically representable asset amount that
//! overflows, but the check is there anyway.

use thiserror::Error;

use crate::config::{LEDGER_DECIMALS, MAX_SCALE_EXPONENT};
use crate::types::U256;

/// Errors from precision scaling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecimalsError {
    /// Scaling up would overflow 256 bits.
    #[error("overflow scaling {amount} from {from} to {to} decimals")]
    Overflow {
        /// The input amount.
        amount: U256,
        /// Source precision.
        from: u8,
        /// Target precision.
        to: u8,
    },

    /// The precision gap is wider than any power of ten a `U256` can hold.
    #[error("precision gap of {0} decimals is too large")]
    ExponentTooLarge(u32),
}

/// Returns `10^exp`, or an error when it would not fit in a `U256`.
pub fn pow10(exp: u32) -> Result<U256, DecimalsError> {
    if exp > MAX_SCALE_EXPONENT {
        return Err(DecimalsError::ExponentTooLarge(exp));
    }
    U256::from(10u8)
        .checked_pow(U256::from(exp))
        .ok_or(DecimalsError::ExponentTooLarge(exp))
}

/// Rescales `amount` from `from` fractional digits to `to` fractional digits.
///
/// - `from > to`: floor division by `10^(from - to)`.
/// - `from < to`: multiplication by `10^(to - from)`.
/// - `from == to`: identity.
pub fn normalize(amount: U256, from: u8, to: u8) -> Result<U256, DecimalsError> {
    match from.cmp(&to) {
        std::cmp::Ordering::Equal => Ok(amount),
        std::cmp::Ordering::Greater => {
            let divisor = pow10(u32::from(from - to))?;
            Ok(amount / divisor)
        }
        std::cmp::Ordering::Less => {
            let factor = pow10(u32::from(to - from))?;
            amount
                .checked_mul(factor)
                .ok_or(DecimalsError::Overflow { amount, from, to })
        }
    }
}

/// Rescales `amount` from `from` decimals into ledger units.
pub fn to_ledger_units(amount: U256, from: u8) -> Result<U256, DecimalsError> {
    normalize(amount, from, LEDGER_DECIMALS)
}

/// The part of `amount` (in its native precision) that [`normalize`]
/// discards when scaling down. Zero whenever no truncation happens.
pub fn truncation_remainder(amount: U256, from: u8, to: u8) -> Result<U256, DecimalsError> {
    if from <= to {
        return Ok(U256::zero());
    }
    let divisor = pow10(u32::from(from - to))?;
    Ok(amount % divisor)
}
