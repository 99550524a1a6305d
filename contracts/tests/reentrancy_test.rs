//! Reentrancy tests.
//!
//! A hostile counter-party sits behind the transfer boundary and calls back
//! into the bank while its own deposit or withdrawal is settling.

mod common;

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use common::*;
use vaultline_contracts::{
    AdminSet, Bank, BankError, BankEvent, Collaborators, TransferBoundary, TransferError,
};
use vaultline_protocol::{AccountId, AssetId, BankParams, ManualClock, U256};

/// What the attacker saw while the bank was settling.
#[derive(Debug, Default)]
struct Observed {
    reentry: Vec<Result<(), BankError>>,
    balance_during_settlement: Option<U256>,
    busy_during_settlement: bool,
}

/// Custody that calls back into the bank on every movement.
struct Hostile {
    inner: Custody,
    bank: Mutex<Weak<Bank>>,
    observed: Mutex<Observed>,
}

impl Hostile {
    fn new() -> Self {
        Self {
            inner: Custody::default(),
            bank: Mutex::new(Weak::new()),
            observed: Mutex::new(Observed::default()),
        }
    }

    fn attack(&self, account: &AccountId, asset: &AssetId) {
        let Some(bank) = self.bank.lock().upgrade() else {
            return;
        };
        let mut observed = self.observed.lock();
        observed.busy_during_settlement = bank.is_busy();
        observed.balance_during_settlement = Some(bank.balance(account, asset));
        observed
            .reentry
            .push(bank.withdraw(*account, *asset, U256::one()).map(|_| ()));
        observed
            .reentry
            .push(bank.deposit(*account, *asset, U256::one()).map(|_| ()));
        observed
            .reentry
            .push(bank.register_asset(&ADMIN, DAI).map(|_| ()));
    }
}

impl TransferBoundary for Hostile {
    fn pull_in(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        self.attack(account, asset);
        self.inner.pull_in(account, asset, raw)
    }

    fn push_out(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        self.attack(account, asset);
        self.inner.push_out(account, asset, raw)
    }
}

fn hostile_bank() -> (Arc<Bank>, Arc<Hostile>) {
    let hostile = Arc::new(Hostile::new());
    let bank = Arc::new(Bank::new(
        BankParams::new(usd(10_000), usd(1_000)),
        Collaborators {
            feed: Arc::new(TestFeed::new("BASE / USD", feed_price(2_000), GENESIS)),
            clock: Arc::new(ManualClock::new(GENESIS)),
            transfers: hostile.clone(),
            metadata: Arc::new(Decimals::standard()),
            access: Arc::new(AdminSet::new([ADMIN])),
        },
    ));
    *hostile.bank.lock() = Arc::downgrade(&bank);
    (bank, hostile)
}

#[test]
fn callback_during_withdrawal_is_rejected() {
    let (bank, hostile) = hostile_bank();
    hostile.inner.fund(ALICE, BASE, ether(1));
    bank.deposit(ALICE, BASE, ether(1)).unwrap();
    *hostile.observed.lock() = Observed::default();

    // 0.25 base = 500.
    let receipt = bank.withdraw(ALICE, BASE, ether(1) / 4).unwrap();
    assert_eq!(receipt.ledger_amount, usd(500));

    let observed = hostile.observed.lock();
    assert!(observed.busy_during_settlement);
    assert_eq!(observed.reentry.len(), 3);
    for attempt in &observed.reentry {
        assert_eq!(attempt, &Err(BankError::ReentrancyRejected));
    }
    // The debit was already on the books when value left.
    assert_eq!(observed.balance_during_settlement, Some(usd(1_500)));

    assert_eq!(bank.balance(&ALICE, &BASE), usd(1_500));
    assert_eq!(bank.counters().withdrawals, 1);
    assert!(!bank.is_busy());
    bank.check_invariants().unwrap();
}

#[test]
fn callback_during_deposit_sees_the_credit() {
    let (bank, hostile) = hostile_bank();
    hostile.inner.fund(ALICE, BASE, ether(1));

    bank.deposit(ALICE, BASE, ether(1)).unwrap();

    let observed = hostile.observed.lock();
    assert_eq!(observed.balance_during_settlement, Some(usd(2_000)));
    assert!(observed
        .reentry
        .iter()
        .all(|r| r == &Err(BankError::ReentrancyRejected)));
    assert_eq!(bank.counters().deposits, 1);
    assert!(!bank.is_eligible(&DAI));
}

#[test]
fn latch_is_released_after_failed_settlement() {
    let (bank, hostile) = hostile_bank();
    hostile.inner.reject_pulls(true);
    hostile.inner.fund(ALICE, BASE, ether(1));

    assert!(matches!(
        bank.deposit(ALICE, BASE, ether(1)).unwrap_err(),
        BankError::TransferFailed { .. }
    ));
    assert!(!bank.is_busy());

    hostile.inner.reject_pulls(false);
    bank.deposit(ALICE, BASE, ether(1)).unwrap();
    assert_eq!(bank.balance(&ALICE, &BASE), usd(2_000));
}

/// Custody that takes its time moving value in.
struct Slow {
    inner: Custody,
    delay: Duration,
}

impl TransferBoundary for Slow {
    fn pull_in(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        thread::sleep(self.delay);
        self.inner.pull_in(account, asset, raw)
    }

    fn push_out(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        self.inner.push_out(account, asset, raw)
    }
}

#[test]
fn independent_caller_waits_for_settlement_instead_of_failing() {
    let slow = Arc::new(Slow {
        inner: Custody::default(),
        delay: Duration::from_millis(200),
    });
    slow.inner.fund(ALICE, BASE, ether(1));
    slow.inner.fund(BOB, BASE, ether(1));
    let bank = Arc::new(Bank::new(
        BankParams::new(usd(10_000), usd(1_000)),
        Collaborators {
            feed: Arc::new(TestFeed::new("BASE / USD", feed_price(2_000), GENESIS)),
            clock: Arc::new(ManualClock::new(GENESIS)),
            transfers: slow.clone(),
            metadata: Arc::new(Decimals::standard()),
            access: Arc::new(AdminSet::new([ADMIN])),
        },
    ));

    let alice = {
        let bank = Arc::clone(&bank);
        thread::spawn(move || bank.deposit(ALICE, BASE, ether(1)))
    };
    // Alice is mid-settlement by now.
    thread::sleep(Duration::from_millis(50));
    let bob = bank.deposit(BOB, BASE, ether(1));

    assert_eq!(alice.join().unwrap().unwrap().ledger_amount, usd(2_000));
    assert_eq!(bob.unwrap().ledger_amount, usd(2_000));

    let order: Vec<AccountId> = bank
        .events()
        .into_iter()
        .filter_map(|record| match record.event {
            BankEvent::Deposit { account, .. } => Some(account),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![ALICE, BOB]);
    assert_eq!(bank.counters().deposits, 2);
    bank.check_invariants().unwrap();
}

#[test]
fn concurrent_callers_all_settle() {
    let h = Harness::new();
    h.register(USDC);
    let accounts: Vec<AccountId> = (1..=8).map(AccountId::from_low_u8).collect();
    for account in &accounts {
        h.custody.fund(*account, USDC, usd(100));
    }

    let handles: Vec<_> = accounts
        .iter()
        .map(|account| {
            let bank = Arc::clone(&h.bank);
            let account = *account;
            thread::spawn(move || {
                (0..50)
                    .map(|_| bank.deposit(account, USDC, usd(1)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for result in handle.join().unwrap() {
            assert!(result.is_ok(), "deposit failed: {result:?}");
        }
    }

    assert_eq!(h.bank.counters().deposits, 400);
    assert_eq!(h.bank.pool_total(&USDC), usd(400));
    assert_eq!(h.custody.held(USDC), usd(400));
    for account in &accounts {
        assert_eq!(h.bank.balance(account, &USDC), usd(50));
        assert_eq!(h.custody.wallet(*account, USDC), usd(50));
    }
    h.bank.check_invariants().unwrap();
}
