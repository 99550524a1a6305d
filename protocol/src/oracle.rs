//! # Value Feed Adapter
//!
//! Vaultline does not price anything itself. It reads the latest round from
//! an external feed and decides whether to trust it. A reading is accepted
//! only when all of these hold, checked in this order:
//!
//! 1. the answer is strictly positive,
//! 2. the reading is no older than the configured heartbeat,
//! 3. the round it was confirmed in is not earlier than the round it claims
//!    to belong to.
//!
//! Any failure aborts the calling operation. The adapter is read-only, so a
//! rejected reading can never leave partial state behind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LEDGER_DECIMALS;
use crate::decimals::{normalize, DecimalsError};
use crate::types::U256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by the feed itself (not by validation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("feed query failed: {0}")]
pub struct FeedError(pub String);

/// Why a reading was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleReason {
    /// The reading is older than the heartbeat.
    Heartbeat {
        /// Age of the reading in seconds.
        age_secs: u64,
        /// Heartbeat in seconds.
        heartbeat_secs: u64,
    },
    /// The reading was confirmed in a round earlier than its own.
    Round {
        /// Round the reading belongs to.
        round_id: u128,
        /// Round in which the reading was confirmed.
        answered_in_round: u128,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Heartbeat {
                age_secs,
                heartbeat_secs,
            } => write!(f, "reading is {}s old, heartbeat is {}s", age_secs, heartbeat_secs),
            StaleReason::Round {
                round_id,
                answered_in_round,
            } => write!(
                f,
                "round {} answered in earlier round {}",
                round_id, answered_in_round
            ),
        }
    }
}

/// Errors from [`PriceOracle::current_price`] and the conversion helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// The feed answered with zero or a negative price.
    #[error("oracle returned invalid price {answer}")]
    Invalid {
        /// The raw signed answer.
        answer: i128,
    },

    /// The reading is too old or inconsistent.
    #[error("stale price: {0}")]
    Stale(StaleReason),

    /// The feed could not be queried at all.
    #[error("oracle unavailable: {0}")]
    Unavailable(#[from] FeedError),

    /// Price conversion overflowed or used an impossible precision.
    #[error("price conversion failed: {0}")]
    Conversion(#[from] DecimalsError),
}

// ---------------------------------------------------------------------------
// Feed & Clock
// ---------------------------------------------------------------------------

/// One reading from a feed, as the feed reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    /// The round this reading belongs to.
    pub round_id: u128,
    /// Signed price, `decimals()` fractional digits.
    pub answer: i128,
    /// Unix timestamp at which the round started.
    pub started_at: u64,
    /// Unix timestamp of the last update.
    pub updated_at: u64,
    /// Round in which the answer was last confirmed.
    pub answered_in_round: u128,
}

/// An external price source.
pub trait ValueFeed: Send + Sync {
    /// The latest reading.
    fn latest_round_data(&self) -> Result<RoundData, FeedError>;

    /// Fractional digits of `answer`.
    fn decimals(&self) -> u8;

    /// A human-readable name, reported in `FeedUpdated` events.
    fn description(&self) -> String;
}

/// Source of "now" for staleness checks. Injected so tests can move time.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: parking_lot::Mutex<u64>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: u64) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward, stopping at `u64::MAX`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by.as_secs());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A validated, strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price per whole base-asset unit, `decimals` fractional digits.
    pub value: U256,
    /// Fractional digits of `value`.
    pub decimals: u8,
}

impl Price {
    /// The price expressed in ledger units (6 decimals), floored.
    pub fn in_ledger_units(&self) -> Result<U256, DecimalsError> {
        normalize(self.value, self.decimals, LEDGER_DECIMALS)
    }
}

/// Values `raw` units of an asset with `raw_decimals` precision at `price`,
/// in ledger units: `floor(raw * price / 10^(raw_decimals + price.decimals - 6))`.
///
/// Multiplying first and dividing once keeps the full precision of both
/// factors until the final truncation.
pub fn value_in_ledger_units(
    raw: U256,
    raw_decimals: u8,
    price: Price,
) -> Result<U256, OracleError> {
    let product = raw.checked_mul(price.value).ok_or(DecimalsError::Overflow {
        amount: raw,
        from: raw_decimals,
        to: LEDGER_DECIMALS,
    })?;
    let combined = raw_decimals.checked_add(price.decimals).ok_or(
        DecimalsError::ExponentTooLarge(u32::from(raw_decimals) + u32::from(price.decimals)),
    )?;
    Ok(normalize(product, combined, LEDGER_DECIMALS)?)
}

// ---------------------------------------------------------------------------
// PriceOracle
// ---------------------------------------------------------------------------

/// Wraps one [`ValueFeed`] and validates everything it says.
#[derive(Clone)]
pub struct PriceOracle {
    feed: Arc<dyn ValueFeed>,
    clock: Arc<dyn Clock>,
    heartbeat: Duration,
}

impl fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceOracle")
            .field("feed", &self.feed.description())
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

impl PriceOracle {
    /// Creates an adapter around `feed`.
    pub fn new(feed: Arc<dyn ValueFeed>, clock: Arc<dyn Clock>, heartbeat: Duration) -> Self {
        Self {
            feed,
            clock,
            heartbeat,
        }
    }

    /// Returns a copy of this adapter reading from a different feed.
    pub fn with_feed(&self, feed: Arc<dyn ValueFeed>) -> Self {
        Self {
            feed,
            clock: Arc::clone(&self.clock),
            heartbeat: self.heartbeat,
        }
    }

    /// Name of the wrapped feed.
    pub fn feed_description(&self) -> String {
        self.feed.description()
    }

    /// The configured heartbeat.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Reads and validates the latest price.
    pub fn current_price(&self) -> Result<Price, OracleError> {
        let round = self.feed.latest_round_data()?;
        let price = validate_round(&round, self.clock.now(), self.heartbeat)?;
        Ok(Price {
            value: price,
            decimals: self.feed.decimals(),
        })
    }
}

/// The three validation rules, in order. Returns the answer as a `U256`.
pub fn validate_round(round: &RoundData, now: u64, heartbeat: Duration) -> Result<U256, OracleError> {
    if round.answer <= 0 {
        tracing::warn!(answer = round.answer, round_id = round.round_id, "non-positive oracle answer");
        return Err(OracleError::Invalid {
            answer: round.answer,
        });
    }

    // A timestamp ahead of our clock counts as fresh.
    let age = now.saturating_sub(round.updated_at);
    if age > heartbeat.as_secs() {
        tracing::warn!(age, heartbeat = heartbeat.as_secs(), "oracle reading past heartbeat");
        return Err(OracleError::Stale(StaleReason::Heartbeat {
            age_secs: age,
            heartbeat_secs: heartbeat.as_secs(),
        }));
    }

    if round.answered_in_round < round.round_id {
        tracing::warn!(
            round_id = round.round_id,
            answered_in_round = round.answered_in_round,
            "oracle round answered in an earlier round"
        );
        return Err(OracleError::Stale(StaleReason::Round {
            round_id: round.round_id,
            answered_in_round: round.answered_in_round,
        }));
    }

    // answer > 0 was checked above, so the cast is lossless.
    Ok(U256::from(round.answer as u128))
}
