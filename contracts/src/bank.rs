//! # Bank Ledger
//!
//! The balance-accounting core. Holds per-account balances and per-asset
//! pool totals in the 6-decimal unit of account, enforces the global
//! capacity and the per-operation withdrawal limit, and drives each
//! deposit or withdrawal through a fixed sequence:
//!
//! ```text
//! Requested --checks--> Validated --effects--> Committed --interaction--> Settled
//!     |                     |                      |
//!     +------ abort --------+                      +-- settlement failed: rollback
//! ```
//!
//! ## Safety discipline
//!
//! - The reentrancy latch is taken on entry and released on every exit.
//!   Callers on other threads queue for it; nested calls are refused.
//! - All checks run before any state is touched.
//! - State is committed before value moves (the transfer boundary is the
//!   only place control leaves the bank). A counter-party that calls back
//!   in during settlement hits the latch, and if it only reads it sees the
//!   already-updated balances.
//! - If settlement fails, the commit is undone from a snapshot of the rows
//!   it touched. The latch guarantees nothing else changed in between.
//! - The state lock is never held across an external call.
//!
//! ## Valuation
//!
//! Tokens are valued 1:1 against the unit of account after precision
//! normalization. The base asset is valued through the price oracle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vaultline_protocol::config::BASE_ASSET_DECIMALS;
use vaultline_protocol::decimals::{normalize, truncation_remainder};
use vaultline_protocol::oracle::value_in_ledger_units;
use vaultline_protocol::types::format_ledger_amount;
use vaultline_protocol::{
    config::LEDGER_DECIMALS, AccountId, AssetId, BankParams, Clock, Price, PriceOracle, ValueFeed,
    U256,
};

use crate::access::{require_admin, AccessControl};
use crate::error::{BankError, BankResult};
use crate::events::{BankEvent, EventRecord};
use crate::guard::ReentrancyGuard;
use crate::registry::{AssetMetadata, AssetRegistry, ResolvedPrecision};
use crate::transfer::TransferBoundary;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The external collaborators a bank talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Price source for the base asset.
    pub feed: Arc<dyn ValueFeed>,
    /// Time source for staleness checks.
    pub clock: Arc<dyn Clock>,
    /// Value-movement subsystem.
    pub transfers: Arc<dyn TransferBoundary>,
    /// Token precision lookup.
    pub metadata: Arc<dyn AssetMetadata>,
    /// Admin capability check.
    pub access: Arc<dyn AccessControl>,
}

/// Completed-operation counters. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Settled deposits.
    pub deposits: u64,
    /// Settled withdrawals.
    pub withdrawals: u64,
}

/// Direction of a balance-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Value moved into custody.
    Deposit,
    /// Value moved out of custody.
    Withdrawal,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Deposit => write!(f, "deposit"),
            OperationKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Returned by a settled deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique id of this operation.
    pub operation_id: Uuid,
    /// Deposit or withdrawal.
    pub kind: OperationKind,
    /// The account.
    pub account: AccountId,
    /// The asset.
    pub asset: AssetId,
    /// Native amount moved.
    pub raw_amount: U256,
    /// Ledger amount credited or debited.
    pub ledger_amount: U256,
    /// Account balance in this asset after the operation.
    pub balance_after: U256,
}

/// One non-zero `(account, asset)` row in a [`BankSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    /// The account.
    pub account: AccountId,
    /// The asset.
    pub asset: AssetId,
    /// Balance in ledger units.
    pub amount: U256,
}

/// Point-in-time copy of all accounting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSnapshot {
    /// Construction parameters.
    pub params: BankParams,
    /// Every balance row, ordered by account then asset.
    pub balances: Vec<BalanceRow>,
    /// Pool total per asset.
    pub pools: BTreeMap<AssetId, U256>,
    /// Sum of all pool totals.
    pub total_pool_value: U256,
    /// Eligible assets.
    pub eligible_assets: Vec<AssetId>,
    /// Operation counters.
    pub counters: Counters,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<(AccountId, AssetId), U256>,
    pools: BTreeMap<AssetId, U256>,
    registry: AssetRegistry,
    counters: Counters,
    events: Vec<EventRecord>,
}

/// What a commit overwrote, so it can be put back.
#[derive(Debug)]
struct Undo {
    account: AccountId,
    asset: AssetId,
    prev_balance: Option<U256>,
    prev_pool: Option<U256>,
    kind: OperationKind,
    cached_precision: bool,
}

/// A raw amount converted to ledger units.
#[derive(Debug, Clone, Copy)]
struct Conversion {
    ledger_amount: U256,
    /// Native precision, if it was just queried and still needs caching.
    fresh_precision: Option<u8>,
}

impl LedgerState {
    fn balance(&self, account: &AccountId, asset: &AssetId) -> U256 {
        self.balances
            .get(&(*account, *asset))
            .copied()
            .unwrap_or_default()
    }

    fn pool(&self, asset: &AssetId) -> U256 {
        self.pools.get(asset).copied().unwrap_or_default()
    }

    /// Recomputed from the registry on every call rather than kept as a
    /// running total, so a deregistered asset's frozen pool is still counted.
    fn total_pool_value(&self) -> U256 {
        self.registry
            .known_assets()
            .fold(U256::zero(), |acc, asset| acc.saturating_add(self.pool(asset)))
    }

    fn apply(
        &mut self,
        kind: OperationKind,
        account: AccountId,
        asset: AssetId,
        conversion: Conversion,
    ) -> BankResult<Undo> {
        let key = (account, asset);
        let prev_balance = self.balances.get(&key).copied();
        let prev_pool = self.pools.get(&asset).copied();
        let amount = conversion.ledger_amount;
        let balance = prev_balance.unwrap_or_default();
        let pool = prev_pool.unwrap_or_default();

        let (new_balance, new_pool) = match kind {
            OperationKind::Deposit => (
                balance.checked_add(amount),
                pool.checked_add(amount),
            ),
            OperationKind::Withdrawal => (
                balance.checked_sub(amount),
                pool.checked_sub(amount),
            ),
        };
        let (new_balance, new_pool) = match (new_balance, new_pool) {
            (Some(b), Some(p)) => (b, p),
            _ => {
                return Err(BankError::InvariantViolation(format!(
                    "{} of {} would take balance {} / pool {} out of range",
                    kind, amount, balance, pool
                )))
            }
        };

        self.balances.insert(key, new_balance);
        self.pools.insert(asset, new_pool);
        match kind {
            OperationKind::Deposit => self.counters.deposits += 1,
            OperationKind::Withdrawal => self.counters.withdrawals += 1,
        }
        if let Some(decimals) = conversion.fresh_precision {
            self.registry.cache_precision(asset, decimals);
        }

        Ok(Undo {
            account,
            asset,
            prev_balance,
            prev_pool,
            kind,
            cached_precision: conversion.fresh_precision.is_some(),
        })
    }

    fn revert(&mut self, undo: Undo) {
        let key = (undo.account, undo.asset);
        match undo.prev_balance {
            Some(b) => self.balances.insert(key, b),
            None => self.balances.remove(&key),
        };
        match undo.prev_pool {
            Some(p) => self.pools.insert(undo.asset, p),
            None => self.pools.remove(&undo.asset),
        };
        match undo.kind {
            OperationKind::Deposit => self.counters.deposits -= 1,
            OperationKind::Withdrawal => self.counters.withdrawals -= 1,
        }
        if undo.cached_precision {
            self.registry.forget_precision(&undo.asset);
        }
    }

    fn record(&mut self, event: BankEvent) {
        info!(event = event.name(), sequence = self.events.len(), "bank event");
        let record = EventRecord {
            sequence: self.events.len() as u64,
            recorded_at: chrono::Utc::now(),
            event,
        };
        self.events.push(record);
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// The multi-asset custodial ledger.
///
/// All methods take `&self`; share a bank across callers with `Arc<Bank>`.
/// Mutating operations are mutually exclusive through the reentrancy latch.
/// One started from another thread waits until the current operation has
/// settled; one started from inside it (a settlement callback) fails with
/// [`BankError::ReentrancyRejected`].
pub struct Bank {
    params: BankParams,
    latch: ReentrancyGuard,
    state: Mutex<LedgerState>,
    oracle: RwLock<PriceOracle>,
    transfers: Arc<dyn TransferBoundary>,
    metadata: Arc<dyn AssetMetadata>,
    access: Arc<dyn AccessControl>,
}

impl fmt::Debug for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bank")
            .field("params", &self.params)
            .field("oracle", &*self.oracle.read())
            .field("in_flight", &self.latch.is_entered())
            .finish_non_exhaustive()
    }
}

impl Bank {
    /// Creates an empty bank. Only the base asset is eligible.
    pub fn new(params: BankParams, collaborators: Collaborators) -> Self {
        let oracle = PriceOracle::new(
            collaborators.feed,
            collaborators.clock,
            params.feed_heartbeat,
        );
        info!(
            capacity = %format_ledger_amount(params.capacity),
            withdrawal_limit = %format_ledger_amount(params.withdrawal_limit),
            heartbeat_secs = params.feed_heartbeat.as_secs(),
            feed = %oracle.feed_description(),
            "bank created"
        );
        Self {
            params,
            latch: ReentrancyGuard::new(),
            state: Mutex::new(LedgerState::default()),
            oracle: RwLock::new(oracle),
            transfers: collaborators.transfers,
            metadata: collaborators.metadata,
            access: collaborators.access,
        }
    }

    // -- Balance-changing operations -----------------------------------------

    /// Deposits `raw` native units of `asset` for `account`.
    ///
    /// # Errors
    ///
    /// - [`BankError::ReentrancyRejected`] if another operation is in flight.
    /// - [`BankError::ZeroAmount`] if `raw` is zero.
    /// - [`BankError::AssetNotEligible`] if the asset is not accepted.
    /// - Oracle errors (base asset) or [`BankError::InvalidAsset`] (tokens)
    ///   from conversion.
    /// - [`BankError::CapacityExceeded`] if the deposit would push total
    ///   holdings strictly above capacity.
    /// - [`BankError::TransferFailed`] if the pull fails; the commit is
    ///   rolled back.
    pub fn deposit(&self, account: AccountId, asset: AssetId, raw: U256) -> BankResult<Receipt> {
        let _latch = self.latch.enter()?;
        debug!(account = %account, asset = %asset, raw = %raw, "deposit requested");

        if raw.is_zero() {
            return Err(BankError::ZeroAmount);
        }
        if !self.state.lock().registry.is_eligible(&asset) {
            warn!(asset = %asset, "deposit of ineligible asset rejected");
            return Err(BankError::AssetNotEligible(asset));
        }

        let conversion = self.convert(&asset, raw)?;
        let amount = conversion.ledger_amount;

        let (undo, balance_after) = {
            let mut state = self.state.lock();
            let total = state.total_pool_value();
            let prospective = total
                .checked_add(amount)
                .ok_or_else(|| BankError::Arithmetic("pool total overflow".into()))?;
            if prospective > self.params.capacity {
                let available = self.params.capacity.saturating_sub(total);
                warn!(attempted = %amount, available = %available, "deposit exceeds capacity");
                return Err(BankError::CapacityExceeded {
                    attempted: amount,
                    available,
                });
            }
            let undo = state.apply(OperationKind::Deposit, account, asset, conversion)?;
            (undo, state.balance(&account, &asset))
        };

        if let Err(e) = self.transfers.pull_in(&account, &asset, raw) {
            warn!(account = %account, asset = %asset, error = %e, "deposit settlement failed, rolling back");
            self.state.lock().revert(undo);
            return Err(BankError::TransferFailed {
                asset,
                reason: e.to_string(),
            });
        }

        self.state.lock().record(BankEvent::Deposit {
            account,
            asset,
            raw_amount: raw,
            ledger_amount: amount,
        });
        info!(
            account = %account,
            asset = %asset,
            ledger_amount = %format_ledger_amount(amount),
            "deposit settled"
        );

        Ok(Receipt {
            operation_id: Uuid::new_v4(),
            kind: OperationKind::Deposit,
            account,
            asset,
            raw_amount: raw,
            ledger_amount: amount,
            balance_after,
        })
    }

    /// Withdraws `raw` native units of `asset` to `account`.
    ///
    /// Eligibility is not required: balances of a deregistered asset remain
    /// withdrawable.
    ///
    /// # Errors
    ///
    /// - [`BankError::ReentrancyRejected`] if another operation is in flight.
    /// - [`BankError::ZeroAmount`] if `raw` is zero or is worth less than one
    ///   ledger unit.
    /// - Conversion errors as for [`deposit`](Self::deposit).
    /// - [`BankError::WithdrawalLimitExceeded`] if the converted amount is
    ///   strictly above the per-operation limit.
    /// - [`BankError::InsufficientBalance`] if it is strictly above the
    ///   account's balance.
    /// - [`BankError::TransferFailed`] if the push fails; the commit is
    ///   rolled back.
    pub fn withdraw(&self, account: AccountId, asset: AssetId, raw: U256) -> BankResult<Receipt> {
        let _latch = self.latch.enter()?;
        debug!(account = %account, asset = %asset, raw = %raw, "withdrawal requested");

        if raw.is_zero() {
            return Err(BankError::ZeroAmount);
        }

        let conversion = self.convert(&asset, raw)?;
        let amount = conversion.ledger_amount;

        // Pushing out value while debiting nothing would let sub-unit
        // withdrawals drain custody for free.
        if amount.is_zero() {
            warn!(asset = %asset, raw = %raw, "withdrawal worth less than one ledger unit rejected");
            return Err(BankError::ZeroAmount);
        }
        if amount > self.params.withdrawal_limit {
            warn!(attempted = %amount, limit = %self.params.withdrawal_limit, "withdrawal over limit");
            return Err(BankError::WithdrawalLimitExceeded {
                attempted: amount,
                limit: self.params.withdrawal_limit,
            });
        }

        let (undo, balance_after) = {
            let mut state = self.state.lock();
            let available = state.balance(&account, &asset);
            if amount > available {
                warn!(requested = %amount, available = %available, "insufficient balance");
                return Err(BankError::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
            let undo = state.apply(OperationKind::Withdrawal, account, asset, conversion)?;
            (undo, state.balance(&account, &asset))
        };

        if let Err(e) = self.transfers.push_out(&account, &asset, raw) {
            warn!(account = %account, asset = %asset, error = %e, "withdrawal settlement failed, rolling back");
            self.state.lock().revert(undo);
            return Err(BankError::TransferFailed {
                asset,
                reason: e.to_string(),
            });
        }

        self.state.lock().record(BankEvent::Withdrawal {
            account,
            asset,
            raw_amount: raw,
            ledger_amount: amount,
        });
        info!(
            account = %account,
            asset = %asset,
            ledger_amount = %format_ledger_amount(amount),
            "withdrawal settled"
        );

        Ok(Receipt {
            operation_id: Uuid::new_v4(),
            kind: OperationKind::Withdrawal,
            account,
            asset,
            raw_amount: raw,
            ledger_amount: amount,
            balance_after,
        })
    }

    /// Converts a raw amount into ledger units. Reads the oracle for the
    /// base asset and the registry (and possibly asset metadata) for tokens.
    /// Touches no state.
    fn convert(&self, asset: &AssetId, raw: U256) -> BankResult<Conversion> {
        if asset.is_base() {
            let price = self.oracle.read().current_price()?;
            let ledger_amount = value_in_ledger_units(raw, BASE_ASSET_DECIMALS, price)?;
            debug!(
                raw = %raw,
                price = %price.value,
                price_decimals = price.decimals,
                ledger_amount = %ledger_amount,
                "valued base asset"
            );
            return Ok(Conversion {
                ledger_amount,
                fresh_precision: None,
            });
        }

        let cached = self.state.lock().registry.cached_precision(asset);
        let ResolvedPrecision { decimals, fresh } =
            AssetRegistry::resolve_precision(cached, asset, self.metadata.as_ref())?;

        let ledger_amount = normalize(raw, decimals, LEDGER_DECIMALS)?;
        let dropped = truncation_remainder(raw, decimals, LEDGER_DECIMALS)?;
        if !dropped.is_zero() {
            debug!(asset = %asset, raw = %raw, dropped = %dropped, "sub-unit remainder truncated");
        }

        Ok(Conversion {
            ledger_amount,
            fresh_precision: fresh.then_some(decimals),
        })
    }

    // -- Administrative operations -------------------------------------------

    /// Makes `asset` eligible for deposit. Admin only.
    pub fn register_asset(&self, caller: &AccountId, asset: AssetId) -> BankResult<()> {
        let _latch = self.latch.enter()?;
        require_admin(self.access.as_ref(), caller)?;

        let mut state = self.state.lock();
        state.registry.register(asset)?;
        state.record(BankEvent::AssetRegistered { asset });
        Ok(())
    }

    /// Stops accepting deposits of `asset`. Existing balances are kept and
    /// remain withdrawable. Admin only.
    pub fn deregister_asset(&self, caller: &AccountId, asset: AssetId) -> BankResult<()> {
        let _latch = self.latch.enter()?;
        require_admin(self.access.as_ref(), caller)?;

        let mut state = self.state.lock();
        state.registry.deregister(asset)?;
        state.record(BankEvent::AssetDeregistered { asset });
        Ok(())
    }

    /// Points the oracle at a different feed. Admin only.
    pub fn set_value_feed(&self, caller: &AccountId, feed: Arc<dyn ValueFeed>) -> BankResult<()> {
        let _latch = self.latch.enter()?;
        require_admin(self.access.as_ref(), caller)?;

        let description = feed.description();
        {
            let mut oracle = self.oracle.write();
            let replaced = oracle.with_feed(feed);
            *oracle = replaced;
        }
        self.state.lock().record(BankEvent::FeedUpdated { feed: description });
        Ok(())
    }

    /// Replaces the cached native precision of a token. Admin only, and only
    /// while the token's pool is empty: with balances outstanding, changing
    /// the precision would silently re-denominate them.
    pub fn set_precision_override(
        &self,
        caller: &AccountId,
        asset: AssetId,
        decimals: u8,
    ) -> BankResult<()> {
        let _latch = self.latch.enter()?;
        require_admin(self.access.as_ref(), caller)?;
        if asset.is_base() {
            return Err(BankError::BaseAssetLocked);
        }

        let mut state = self.state.lock();
        let pool_total = state.pool(&asset);
        if !pool_total.is_zero() {
            return Err(BankError::PrecisionLocked { asset, pool_total });
        }
        state.registry.override_precision(asset, decimals)?;
        state.record(BankEvent::PrecisionOverridden { asset, decimals });
        Ok(())
    }

    // -- Queries -------------------------------------------------------------

    /// Construction parameters.
    pub fn params(&self) -> &BankParams {
        &self.params
    }

    /// Balance of `account` in `asset`, ledger units.
    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> U256 {
        self.state.lock().balance(account, asset)
    }

    /// Pool total of `asset`, ledger units.
    pub fn pool_total(&self, asset: &AssetId) -> U256 {
        self.state.lock().pool(asset)
    }

    /// Sum of every known asset's pool total, ledger units.
    pub fn total_pool_value(&self) -> U256 {
        self.state.lock().total_pool_value()
    }

    /// Capacity minus total pool value.
    pub fn available_capacity(&self) -> U256 {
        self.params
            .capacity
            .saturating_sub(self.total_pool_value())
    }

    /// Validated price of the base asset.
    pub fn current_base_price(&self) -> BankResult<Price> {
        Ok(self.oracle.read().current_price()?)
    }

    /// Description of the feed the oracle currently reads.
    pub fn feed_description(&self) -> String {
        self.oracle.read().feed_description()
    }

    /// Operation counters.
    pub fn counters(&self) -> Counters {
        self.state.lock().counters
    }

    /// Whether `asset` is accepted for deposit.
    pub fn is_eligible(&self, asset: &AssetId) -> bool {
        self.state.lock().registry.is_eligible(asset)
    }

    /// Eligible assets, base asset first.
    pub fn list_eligible_assets(&self) -> Vec<AssetId> {
        self.state.lock().registry.list_eligible()
    }

    /// Cached native precision of `asset`, if resolved.
    pub fn cached_precision(&self, asset: &AssetId) -> Option<u8> {
        self.state.lock().registry.cached_precision(asset)
    }

    /// `true` while an operation holds the latch.
    pub fn is_busy(&self) -> bool {
        self.latch.is_entered()
    }

    /// The full event log.
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().events.clone()
    }

    /// Events with `sequence >= from`.
    pub fn events_since(&self, from: u64) -> Vec<EventRecord> {
        let state = self.state.lock();
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(state.events.len());
        state.events[start..].to_vec()
    }

    /// Copies all accounting state.
    pub fn snapshot(&self) -> BankSnapshot {
        let state = self.state.lock();
        BankSnapshot {
            params: self.params,
            balances: state
                .balances
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|((account, asset), amount)| BalanceRow {
                    account: *account,
                    asset: *asset,
                    amount: *amount,
                })
                .collect(),
            pools: state.pools.clone(),
            total_pool_value: state.total_pool_value(),
            eligible_assets: state.registry.list_eligible(),
            counters: state.counters,
        }
    }

    /// Verifies the accounting invariants:
    ///
    /// - for every asset, the sum of account balances equals the pool total;
    /// - the sum of pool totals does not exceed capacity.
    pub fn check_invariants(&self) -> BankResult<()> {
        let state = self.state.lock();

        let mut sums: BTreeMap<AssetId, U256> = BTreeMap::new();
        for ((_, asset), amount) in &state.balances {
            let sum = sums.entry(*asset).or_default();
            *sum = sum.saturating_add(*amount);
        }
        for asset in state.pools.keys().chain(sums.keys()) {
            let sum = sums.get(asset).copied().unwrap_or_default();
            let pool = state.pool(asset);
            if sum != pool {
                return Err(BankError::InvariantViolation(format!(
                    "asset {}: balances sum to {}, pool is {}",
                    asset, sum, pool
                )));
            }
        }

        let total = state.total_pool_value();
        if total > self.params.capacity {
            return Err(BankError::InvariantViolation(format!(
                "total pool value {} exceeds capacity {}",
                total, self.params.capacity
            )));
        }
        Ok(())
    }
}
