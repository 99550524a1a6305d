//! # Bank Configuration & Constants
//!
//! Every magic number in Vaultline lives here. If you're hardcoding a
//! decimals value or a heartbeat somewhere else, move it here.
//!
//! The values in [`BankParams`] are fixed when a bank is constructed and
//! never change for its lifetime. There is deliberately no setter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::U256;

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Fractional digits of the ledger's unit of account. All balances, pool
/// totals, the capacity, and the withdrawal limit use this precision.
pub const LEDGER_DECIMALS: u8 = 6;

/// Native precision of the base asset. Fixed, never queried.
pub const BASE_ASSET_DECIMALS: u8 = 18;

/// Largest power of ten that fits in a `U256` (10^77 < 2^256 < 10^78).
/// Scaling exponents above this are rejected outright.
pub const MAX_SCALE_EXPONENT: u32 = 77;

// ---------------------------------------------------------------------------
// Value Feed
// ---------------------------------------------------------------------------

/// Default maximum age of a price reading. One hour matches the heartbeat
/// of the common USD reference feeds.
pub const DEFAULT_FEED_HEARTBEAT: Duration = Duration::from_secs(3600);

/// Default feed answer precision (USD feeds report 8 decimals).
pub const DEFAULT_FEED_DECIMALS: u8 = 8;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Default global capacity: 10,000.000000 units of account.
pub const DEFAULT_CAPACITY: u128 = 10_000 * 1_000_000;

/// Default per-operation withdrawal limit: 1,000.000000 units of account.
pub const DEFAULT_WITHDRAWAL_LIMIT: u128 = 1_000 * 1_000_000;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Default REST API port for the operator node.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Crate version, baked in at compile time.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// BankParams
// ---------------------------------------------------------------------------

/// Construction-time parameters of a bank. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankParams {
    /// Global ceiling on the value held across all assets, in ledger units.
    pub capacity: U256,
    /// Ceiling on the converted value of a single withdrawal, in ledger units.
    pub withdrawal_limit: U256,
    /// Maximum age of a value-feed reading before it is considered stale.
    #[serde(with = "duration_secs")]
    pub feed_heartbeat: Duration,
}

impl BankParams {
    /// Builds parameters with the default feed heartbeat.
    pub fn new(capacity: impl Into<U256>, withdrawal_limit: impl Into<U256>) -> Self {
        Self {
            capacity: capacity.into(),
            withdrawal_limit: withdrawal_limit.into(),
            feed_heartbeat: DEFAULT_FEED_HEARTBEAT,
        }
    }

    /// Overrides the feed heartbeat.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.feed_heartbeat = heartbeat;
        self
    }
}

impl Default for BankParams {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WITHDRAWAL_LIMIT)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_precision_is_below_base_precision() {
        // The base asset is always scaled down, never up.
        assert!(LEDGER_DECIMALS < BASE_ASSET_DECIMALS);
    }

    #[test]
    fn max_scale_exponent_fits_u256() {
        let ten = U256::from(10u8);
        assert!(ten.checked_pow(U256::from(MAX_SCALE_EXPONENT)).is_some());
        assert!(ten.checked_pow(U256::from(MAX_SCALE_EXPONENT + 1)).is_none());
    }

    #[test]
    fn default_params_sanity() {
        let params = BankParams::default();
        assert!(params.withdrawal_limit < params.capacity);
        assert_eq!(params.feed_heartbeat, Duration::from_secs(3600));
    }

    #[test]
    fn params_serialize_heartbeat_as_seconds() {
        let params = BankParams::new(5u64, 1u64).with_heartbeat(Duration::from_secs(90));
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["feed_heartbeat"], 90);
        let back: BankParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
