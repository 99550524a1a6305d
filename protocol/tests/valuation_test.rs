//! Integration tests for the valuation pipeline: a feed reading goes through
//! the oracle's validation and comes out as a ledger-unit value.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vaultline_protocol::config::{BASE_ASSET_DECIMALS, DEFAULT_FEED_HEARTBEAT};
use vaultline_protocol::oracle::value_in_ledger_units;
use vaultline_protocol::{
    normalize, to_ledger_units, Clock, FeedError, ManualClock, OracleError, PriceOracle, RoundData,
    StaleReason, ValueFeed, U256,
};

const T0: u64 = 1_700_000_000;

struct ScriptedFeed {
    round: Mutex<RoundData>,
    decimals: u8,
}

impl ScriptedFeed {
    fn new(answer: i128, decimals: u8) -> Self {
        Self {
            round: Mutex::new(RoundData {
                round_id: 10,
                answer,
                started_at: T0,
                updated_at: T0,
                answered_in_round: 10,
            }),
            decimals,
        }
    }
}

impl ValueFeed for ScriptedFeed {
    fn latest_round_data(&self) -> Result<RoundData, FeedError> {
        Ok(*self.round.lock())
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn description(&self) -> String {
        "scripted".into()
    }
}

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

fn oracle(feed: Arc<ScriptedFeed>, clock: Arc<ManualClock>) -> PriceOracle {
    PriceOracle::new(feed, clock, DEFAULT_FEED_HEARTBEAT)
}

#[test]
fn two_base_units_at_two_thousand_dollars() {
    let feed = Arc::new(ScriptedFeed::new(200_000_000_000, 8));
    let clock = Arc::new(ManualClock::new(T0 + 60));
    let price = oracle(feed, clock).current_price().unwrap();

    let value = value_in_ledger_units(ether(2), BASE_ASSET_DECIMALS, price).unwrap();
    assert_eq!(value, U256::from(4_000_000_000u64));
}

#[test]
fn feed_precision_does_not_change_the_value() {
    let clock = Arc::new(ManualClock::new(T0));
    let eight = oracle(Arc::new(ScriptedFeed::new(200_000_000_000, 8)), clock.clone())
        .current_price()
        .unwrap();
    let eighteen = oracle(
        Arc::new(ScriptedFeed::new(2_000 * 10i128.pow(18), 18)),
        clock,
    )
    .current_price()
    .unwrap();

    let raw = ether(3) / 7;
    assert_eq!(
        value_in_ledger_units(raw, BASE_ASSET_DECIMALS, eight).unwrap(),
        value_in_ledger_units(raw, BASE_ASSET_DECIMALS, eighteen).unwrap()
    );
}

#[test]
fn staleness_follows_the_clock() {
    let feed = Arc::new(ScriptedFeed::new(200_000_000_000, 8));
    let clock = Arc::new(ManualClock::new(T0));
    let oracle = oracle(feed.clone(), clock.clone());

    clock.advance(DEFAULT_FEED_HEARTBEAT);
    assert!(oracle.current_price().is_ok());

    clock.advance(Duration::from_secs(1));
    assert!(matches!(
        oracle.current_price(),
        Err(OracleError::Stale(StaleReason::Heartbeat { age_secs: 3_601, .. }))
    ));

    // A fresh update makes it usable again.
    feed.round.lock().updated_at = clock.now();
    assert!(oracle.current_price().is_ok());
}

#[test]
fn token_normalization_matches_ledger_units() {
    let raw = U256::from(1_999_999_999_999u64);
    assert_eq!(to_ledger_units(raw, 18).unwrap(), normalize(raw, 18, 6).unwrap());
    assert_eq!(to_ledger_units(raw, 18).unwrap(), U256::one());
    assert_eq!(to_ledger_units(U256::from(42u8), 6).unwrap(), U256::from(42u8));
    assert_eq!(to_ledger_units(U256::from(42u8), 2).unwrap(), U256::from(420_000u64));
}
