//! # Identifiers & Amounts
//!
//! Accounts and assets are both identified by 20-byte addresses, rendered as
//! `0x`-prefixed lowercase hex. The base asset (the network's native value
//! unit) lives at the all-zero address, the same convention token bridges
//! and custody contracts use for "not a token contract".
//!
//! Every amount in Vaultline is a [`U256`]. Raw amounts arrive in the asset's
//! native precision (18 decimals for the base asset, 6 for most stablecoins,
//! whatever the token says for everything else). Ledger amounts are always
//! denominated in the 6-decimal unit of account.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use primitive_types::U256;

/// Length of an account or asset address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors produced when parsing an address from its hex form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The string was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded byte string had the wrong length.
    #[error("invalid address length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length (always 20).
        expected: usize,
        /// Length actually decoded.
        actual: usize,
    },
}

fn parse_address(s: &str) -> Result<[u8; ADDRESS_LENGTH], AddressError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    if bytes.len() != ADDRESS_LENGTH {
        return Err(AddressError::InvalidLength {
            expected: ADDRESS_LENGTH,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; ADDRESS_LENGTH];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// Both identifier types share the same shape: a fixed byte array with hex
// Display/FromStr and string-based serde so JSON payloads stay readable.
macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; ADDRESS_LENGTH]);

        impl $name {
            /// Wraps raw address bytes.
            pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Returns the raw address bytes.
            pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
                &self.0
            }

            /// Returns the `0x`-prefixed hex form.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = AddressError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_address(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

address_type!(
    /// An account that holds balances in the bank.
    AccountId
);

address_type!(
    /// An asset the bank can custody. [`AssetId::BASE`] is the native asset;
    /// every other value names a fungible token.
    AssetId
);

impl AccountId {
    /// Convenience constructor for tests and fixtures: an address whose last
    /// byte is `n` and everything else zero.
    pub const fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 1] = n;
        Self(bytes)
    }
}

impl AssetId {
    /// The base asset: the network's native value unit.
    pub const BASE: AssetId = AssetId([0u8; ADDRESS_LENGTH]);

    /// Returns `true` for the base asset.
    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// Same as [`AccountId::from_low_u8`], for token fixtures.
    pub const fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 1] = n;
        Self(bytes)
    }
}

/// Renders `amount` as a fixed-point decimal string with `decimals`
/// fractional digits, e.g. `(200000000000, 8)` becomes `"2000.00000000"`.
/// The inverse of [`parse_units`].
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let width = decimals as usize;
    match crate::decimals::pow10(decimals as u32) {
        Ok(scale) => format!(
            "{}.{:0>width$}",
            amount / scale,
            (amount % scale).to_string(),
        ),
        // 10^decimals exceeds U256, so every amount is below one whole unit.
        Err(_) => format!("0.{:0>width$}", amount.to_string()),
    }
}

/// Renders a ledger amount (6 fractional digits), e.g. `4000000000` becomes
/// `"4000.000000"`. Used for log lines and human-facing output only.
pub fn format_ledger_amount(amount: U256) -> String {
    format_units(amount, crate::config::LEDGER_DECIMALS)
}

/// Errors produced when parsing a decimal amount string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    /// Empty input, or a lone `.`.
    #[error("empty amount")]
    Empty,

    /// A character other than a digit or a single `.`.
    #[error("invalid amount {0:?}")]
    Invalid(String),

    /// More fractional digits than the target precision holds.
    #[error("amount {input:?} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The rejected input.
        input: String,
        /// Precision of the target unit.
        decimals: u8,
    },

    /// The scaled value does not fit in 256 bits.
    #[error("amount {0:?} overflows")]
    Overflow(String),
}

/// Parses a human-readable decimal (`"2.25"`, `"4000"`) into an integer
/// amount with `decimals` fractional digits. Excess precision is an error,
/// never silently truncated.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Empty);
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Invalid(input.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            input: input.to_string(),
            decimals,
        });
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| AmountError::Overflow(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_asset_is_zero_address() {
        assert!(AssetId::BASE.is_base());
        assert_eq!(
            AssetId::BASE.to_hex(),
            "0x0000000000000000000000000000000000000000"
        );
        assert!(!AssetId::from_low_u8(1).is_base());
    }

    #[test]
    fn address_hex_parse_accepts_optional_prefix() {
        let with_prefix: AccountId = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let without: AccountId = "00000000000000000000000000000000000000aa".parse().unwrap();
        assert_eq!(with_prefix, without);
        assert_eq!(with_prefix, AccountId::from_low_u8(0xaa));
    }

    #[test]
    fn address_parse_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<AssetId>().unwrap_err();
        assert_eq!(
            err,
            AddressError::InvalidLength {
                expected: 20,
                actual: 4
            }
        );
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert!(matches!(
            "0xzz".parse::<AccountId>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn address_serde_uses_hex_string() {
        let asset = AssetId::from_low_u8(7);
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, "\"0x0000000000000000000000000000000000000007\"");
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
    }

    #[test]
    fn ledger_amount_formatting() {
        assert_eq!(format_ledger_amount(U256::from(4_000_000_000u64)), "4000.000000");
        assert_eq!(format_ledger_amount(U256::from(1u64)), "0.000001");
        assert_eq!(format_ledger_amount(U256::zero()), "0.000000");
    }

    #[test]
    fn unit_formatting_at_any_precision() {
        assert_eq!(format_units(U256::from(200_000_000_000u64), 8), "2000.00000000");
        assert_eq!(format_units(U256::from(5u8), 2), "0.05");
        assert_eq!(format_units(U256::from(7u8), 0), "7");
        assert_eq!(format_units(U256::from(12u8), 80), format!("0.{}12", "0".repeat(78)));
        assert_eq!(
            format_units(parse_units("1999.95", 8).unwrap(), 8),
            "1999.95000000"
        );
    }

    #[test]
    fn parse_units_scales_to_precision() {
        assert_eq!(parse_units("4000", 6).unwrap(), U256::from(4_000_000_000u64));
        assert_eq!(parse_units("2.25", 18).unwrap(), U256::from(2_250_000_000_000_000_000u128));
        assert_eq!(parse_units("0.000001", 6).unwrap(), U256::one());
        assert_eq!(parse_units(".5", 1).unwrap(), U256::from(5u8));
        assert_eq!(parse_units("0", 18).unwrap(), U256::zero());
    }

    #[test]
    fn parse_units_rejects_bad_input() {
        assert_eq!(parse_units("", 6).unwrap_err(), AmountError::Empty);
        assert_eq!(parse_units(".", 6).unwrap_err(), AmountError::Empty);
        assert!(matches!(parse_units("1.2.3", 6), Err(AmountError::Invalid(_))));
        assert!(matches!(parse_units("-1", 6), Err(AmountError::Invalid(_))));
        assert!(matches!(
            parse_units("0.0000001", 6),
            Err(AmountError::TooPrecise { decimals: 6, .. })
        ));
        let huge = "9".repeat(80);
        assert!(matches!(parse_units(&huge, 0), Err(AmountError::Overflow(_))));
    }
}
