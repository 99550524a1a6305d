//! Shared test doubles for the bank integration tests.
//!
//! Each integration test file pulls this in with `mod common;`, so not every
//! helper is used by every file.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use vaultline_contracts::{
    AdminSet, AssetMetadata, Bank, Collaborators, MetadataError, TransferBoundary, TransferError,
};
use vaultline_protocol::{
    AccountId, AssetId, BankParams, FeedError, ManualClock, RoundData, ValueFeed, U256,
};

pub const ADMIN: AccountId = AccountId::from_low_u8(0xad);
pub const ALICE: AccountId = AccountId::from_low_u8(0xa1);
pub const BOB: AccountId = AccountId::from_low_u8(0xb0);

/// 6-decimal stablecoin.
pub const USDC: AssetId = AssetId::from_low_u8(0xc0);
/// 18-decimal stablecoin.
pub const DAI: AssetId = AssetId::from_low_u8(0xda);
/// 8-decimal token.
pub const WBTC: AssetId = AssetId::from_low_u8(0xb7);

pub const BASE: AssetId = AssetId::BASE;

/// Starting clock value for every harness.
pub const GENESIS: u64 = 1_700_000_000;

/// One whole unit of an 18-decimal asset.
pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

/// `n` whole ledger units.
pub fn usd(n: u64) -> U256 {
    U256::from(n) * U256::exp10(6)
}

/// `n` whole units at 8 feed decimals.
pub fn feed_price(n: i128) -> i128 {
    n * 100_000_000
}

// ---------------------------------------------------------------------------
// Value feed
// ---------------------------------------------------------------------------

/// A feed whose reading is set by the test.
pub struct TestFeed {
    name: String,
    reading: Mutex<Result<RoundData, FeedError>>,
}

impl TestFeed {
    pub fn new(name: &str, answer: i128, updated_at: u64) -> Self {
        Self {
            name: name.to_string(),
            reading: Mutex::new(Ok(RoundData {
                round_id: 1,
                answer,
                started_at: updated_at,
                updated_at,
                answered_in_round: 1,
            })),
        }
    }

    /// Publishes a new answer in a new round.
    pub fn publish(&self, answer: i128, updated_at: u64) {
        let mut reading = self.reading.lock();
        let next = match &*reading {
            Ok(round) => round.round_id + 1,
            Err(_) => 1,
        };
        *reading = Ok(RoundData {
            round_id: next,
            answer,
            started_at: updated_at,
            updated_at,
            answered_in_round: next,
        });
    }

    pub fn set_round(&self, round: RoundData) {
        *self.reading.lock() = Ok(round);
    }

    pub fn go_down(&self, reason: &str) {
        *self.reading.lock() = Err(FeedError(reason.to_string()));
    }
}

impl ValueFeed for TestFeed {
    fn latest_round_data(&self) -> Result<RoundData, FeedError> {
        self.reading.lock().clone()
    }

    fn decimals(&self) -> u8 {
        8
    }

    fn description(&self) -> String {
        self.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Custody
// ---------------------------------------------------------------------------

/// An in-memory stand-in for the value-movement subsystem: user wallets on
/// one side, the bank's custody on the other.
#[derive(Default)]
pub struct Custody {
    wallets: Mutex<HashMap<(AccountId, AssetId), U256>>,
    vault: Mutex<HashMap<AssetId, U256>>,
    reject_pulls: AtomicBool,
    reject_pushes: AtomicBool,
    pub pulls: AtomicUsize,
    pub pushes: AtomicUsize,
}

impl Custody {
    pub fn fund(&self, account: AccountId, asset: AssetId, amount: U256) {
        let mut wallets = self.wallets.lock();
        let slot = wallets.entry((account, asset)).or_default();
        *slot += amount;
    }

    pub fn wallet(&self, account: AccountId, asset: AssetId) -> U256 {
        self.wallets
            .lock()
            .get(&(account, asset))
            .copied()
            .unwrap_or_default()
    }

    pub fn held(&self, asset: AssetId) -> U256 {
        self.vault.lock().get(&asset).copied().unwrap_or_default()
    }

    pub fn reject_pulls(&self, on: bool) {
        self.reject_pulls.store(on, Ordering::SeqCst);
    }

    pub fn reject_pushes(&self, on: bool) {
        self.reject_pushes.store(on, Ordering::SeqCst);
    }
}

impl TransferBoundary for Custody {
    fn pull_in(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.reject_pulls.load(Ordering::SeqCst) {
            return Err(TransferError::Rejected("transferFrom returned false".into()));
        }
        let mut wallets = self.wallets.lock();
        let held = wallets.get(&(*account, *asset)).copied().unwrap_or_default();
        if held < raw {
            return Err(TransferError::InsufficientFunds { needed: raw, held });
        }
        wallets.insert((*account, *asset), held - raw);
        *self.vault.lock().entry(*asset).or_default() += raw;
        Ok(())
    }

    fn push_out(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Err(TransferError::Rejected("recipient reverted".into()));
        }
        let mut vault = self.vault.lock();
        let held = vault.get(asset).copied().unwrap_or_default();
        if held < raw {
            return Err(TransferError::InsufficientFunds { needed: raw, held });
        }
        vault.insert(*asset, held - raw);
        *self.wallets.lock().entry((*account, *asset)).or_default() += raw;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Fixed decimals table. Unknown assets fail the query.
pub struct Decimals {
    table: Mutex<HashMap<AssetId, u8>>,
    pub queries: AtomicUsize,
}

impl Decimals {
    pub fn standard() -> Self {
        let table = HashMap::from([(USDC, 6), (DAI, 18), (WBTC, 8)]);
        Self {
            table: Mutex::new(table),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, asset: AssetId, decimals: u8) {
        self.table.lock().insert(asset, decimals);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl AssetMetadata for Decimals {
    fn decimals(&self, asset: &AssetId) -> Result<u8, MetadataError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.table
            .lock()
            .get(asset)
            .copied()
            .ok_or_else(|| MetadataError("decimals() reverted".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A bank wired to test doubles it still has handles on.
pub struct Harness {
    pub bank: Arc<Bank>,
    pub feed: Arc<TestFeed>,
    pub clock: Arc<ManualClock>,
    pub custody: Arc<Custody>,
    pub metadata: Arc<Decimals>,
    pub admins: Arc<AdminSet>,
}

impl Harness {
    /// Capacity $10,000, withdrawal limit $1,000, base at $2,000.
    pub fn new() -> Self {
        Self::with_params(BankParams::new(usd(10_000), usd(1_000)))
    }

    pub fn with_params(params: BankParams) -> Self {
        Self::with_custody(params, Arc::new(Custody::default()))
    }

    pub fn with_custody(params: BankParams, custody: Arc<Custody>) -> Self {
        let feed = Arc::new(TestFeed::new("BASE / USD", feed_price(2_000), GENESIS));
        let clock = Arc::new(ManualClock::new(GENESIS));
        let metadata = Arc::new(Decimals::standard());
        let admins = Arc::new(AdminSet::new([ADMIN]));

        let bank = Bank::new(
            params,
            Collaborators {
                feed: feed.clone(),
                clock: clock.clone(),
                transfers: custody.clone(),
                metadata: metadata.clone(),
                access: admins.clone(),
            },
        );

        Self {
            bank: Arc::new(bank),
            feed,
            clock,
            custody,
            metadata,
            admins,
        }
    }

    /// Registers `asset` as admin.
    pub fn register(&self, asset: AssetId) {
        self.bank.register_asset(&ADMIN, asset).unwrap();
    }

    /// Funds `account` with `raw` and deposits it.
    pub fn fund_and_deposit(&self, account: AccountId, asset: AssetId, raw: U256) {
        self.custody.fund(account, asset, raw);
        self.bank.deposit(account, asset, raw).unwrap();
    }
}
