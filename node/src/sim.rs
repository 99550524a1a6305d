//! # Simulated Collaborators
//!
//! The node runs a bank without a chain behind it. Everything the bank
//! would normally reach through external contracts is simulated in memory:
//!
//! - [`ManualFeed`] — a price feed whose answer is pushed by an operator
//!   (`POST /admin/price`, or a `set_price` scenario step).
//! - [`SimulatedCustody`] — user wallets and the bank's custody account,
//!   standing in for the value-movement subsystem.
//! - [`StaticMetadata`] — token precisions declared on the command line.
//!
//! [`SimulatedBank`] wires them into a [`Bank`] and keeps handles on each
//! so the API and the scenario runner can drive them.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use vaultline_contracts::{
    AccessControl, AdminSet, AssetMetadata, Bank, BankError, Collaborators, MetadataError,
    TransferBoundary, TransferError,
};
use vaultline_protocol::config::{BASE_ASSET_DECIMALS, DEFAULT_FEED_DECIMALS};
use vaultline_protocol::{
    parse_units, AccountId, AddressError, AssetId, BankParams, Clock, FeedError, RoundData,
    ValueFeed, U256,
};

// ---------------------------------------------------------------------------
// Price feed
// ---------------------------------------------------------------------------

/// A feed with operator-pushed answers. Each push opens a new round.
pub struct ManualFeed {
    description: String,
    clock: Arc<dyn Clock>,
    latest: Mutex<Option<RoundData>>,
}

impl ManualFeed {
    /// Creates a feed with no answer yet. Reads fail until the first push.
    pub fn new(description: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            description: description.into(),
            clock,
            latest: Mutex::new(None),
        }
    }

    /// Publishes `answer` (at [`DEFAULT_FEED_DECIMALS`]) timestamped now.
    /// Returns the new round id.
    pub fn push(&self, answer: i128) -> u128 {
        let now = self.clock.now();
        let mut latest = self.latest.lock();
        let round_id = latest.map_or(1, |r| r.round_id + 1);
        *latest = Some(RoundData {
            round_id,
            answer,
            started_at: now,
            updated_at: now,
            answered_in_round: round_id,
        });
        tracing::info!(round_id, answer, "manual feed updated");
        round_id
    }

    /// The last pushed round, if any.
    pub fn latest(&self) -> Option<RoundData> {
        *self.latest.lock()
    }
}

impl ValueFeed for ManualFeed {
    fn latest_round_data(&self) -> Result<RoundData, FeedError> {
        self.latest
            .lock()
            .ok_or_else(|| FeedError("no price has been published".into()))
    }

    fn decimals(&self) -> u8 {
        DEFAULT_FEED_DECIMALS
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

// ---------------------------------------------------------------------------
// Custody
// ---------------------------------------------------------------------------

/// In-memory wallets plus the bank's custody account.
#[derive(Debug, Default)]
pub struct SimulatedCustody {
    wallets: Mutex<HashMap<(AccountId, AssetId), U256>>,
    custody: Mutex<HashMap<AssetId, U256>>,
}

impl SimulatedCustody {
    /// Mints `amount` native units into a user wallet.
    pub fn fund(&self, account: AccountId, asset: AssetId, amount: U256) {
        let mut wallets = self.wallets.lock();
        let slot = wallets.entry((account, asset)).or_default();
        *slot = slot.saturating_add(amount);
    }

    /// A user wallet's native balance.
    pub fn wallet(&self, account: &AccountId, asset: &AssetId) -> U256 {
        self.wallets
            .lock()
            .get(&(*account, *asset))
            .copied()
            .unwrap_or_default()
    }

    /// Native units the bank holds of `asset`.
    pub fn held(&self, asset: &AssetId) -> U256 {
        self.custody.lock().get(asset).copied().unwrap_or_default()
    }
}

impl TransferBoundary for SimulatedCustody {
    fn pull_in(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        let mut wallets = self.wallets.lock();
        let held = wallets.get(&(*account, *asset)).copied().unwrap_or_default();
        if held < raw {
            return Err(TransferError::InsufficientFunds { needed: raw, held });
        }
        wallets.insert((*account, *asset), held - raw);
        let mut custody = self.custody.lock();
        let pool = custody.entry(*asset).or_default();
        *pool = pool.saturating_add(raw);
        Ok(())
    }

    fn push_out(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError> {
        // Same lock order as pull_in: wallets, then custody.
        let mut wallets = self.wallets.lock();
        let mut custody = self.custody.lock();
        let held = custody.get(asset).copied().unwrap_or_default();
        if held < raw {
            return Err(TransferError::InsufficientFunds { needed: raw, held });
        }
        custody.insert(*asset, held - raw);
        let wallet = wallets.entry((*account, *asset)).or_default();
        *wallet = wallet.saturating_add(raw);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Token precisions declared up front.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    decimals: RwLock<HashMap<AssetId, u8>>,
}

impl StaticMetadata {
    /// Declares (or redeclares) a token's precision.
    pub fn declare(&self, asset: AssetId, decimals: u8) {
        self.decimals.write().insert(asset, decimals);
    }

    /// The declared precision, if any.
    pub fn get(&self, asset: &AssetId) -> Option<u8> {
        self.decimals.read().get(asset).copied()
    }
}

impl AssetMetadata for StaticMetadata {
    fn decimals(&self, asset: &AssetId) -> Result<u8, MetadataError> {
        self.get(asset)
            .ok_or_else(|| MetadataError(format!("no metadata declared for {asset}")))
    }
}

/// An `ADDR:DECIMALS` pair from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetSpec {
    /// Token address.
    pub asset: AssetId,
    /// Native precision.
    pub decimals: u8,
}

/// Errors parsing an [`AssetSpec`].
#[derive(Debug, Error)]
pub enum AssetSpecError {
    /// No `:` separator.
    #[error("expected ADDR:DECIMALS, got {0:?}")]
    Format(String),
    /// Bad address half.
    #[error(transparent)]
    Address(#[from] AddressError),
    /// Bad decimals half.
    #[error("invalid decimals: {0}")]
    Decimals(#[from] std::num::ParseIntError),
}

impl FromStr for AssetSpec {
    type Err = AssetSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, decimals) = s
            .rsplit_once(':')
            .ok_or_else(|| AssetSpecError::Format(s.to_string()))?;
        Ok(Self {
            asset: addr.parse()?,
            decimals: decimals.parse()?,
        })
    }
}

/// Errors registering a token through the node.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The bank refused the registration.
    #[error(transparent)]
    Bank(#[from] BankError),
    /// The bank already resolved a different precision for this token.
    #[error("{asset} already has precision {cached}; cannot redeclare it as {declared}")]
    PrecisionConflict {
        /// The token.
        asset: AssetId,
        /// Precision the bank has cached.
        cached: u8,
        /// Precision the request declared.
        declared: u8,
    },
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// A bank plus handles on every simulated collaborator behind it.
#[derive(Clone)]
pub struct SimulatedBank {
    /// The bank.
    pub bank: Arc<Bank>,
    /// Its price feed.
    pub feed: Arc<ManualFeed>,
    /// Its custody.
    pub custody: Arc<SimulatedCustody>,
    /// Its token metadata.
    pub metadata: Arc<StaticMetadata>,
    /// Its admin set.
    pub admins: Arc<AdminSet>,
}

impl SimulatedBank {
    /// Builds a bank over fresh simulated collaborators. The declared
    /// assets get metadata but are not registered.
    pub fn new(
        params: BankParams,
        clock: Arc<dyn Clock>,
        admins: impl IntoIterator<Item = AccountId>,
        assets: &[AssetSpec],
    ) -> Self {
        let feed = Arc::new(ManualFeed::new("BASE / USD (manual)", Arc::clone(&clock)));
        let custody = Arc::new(SimulatedCustody::default());
        let metadata = Arc::new(StaticMetadata::default());
        for spec in assets {
            metadata.declare(spec.asset, spec.decimals);
        }
        let admins = Arc::new(AdminSet::new(admins));

        let bank = Bank::new(
            params,
            Collaborators {
                feed: feed.clone(),
                clock,
                transfers: custody.clone(),
                metadata: metadata.clone(),
                access: admins.clone(),
            },
        );

        Self {
            bank: Arc::new(bank),
            feed,
            custody,
            metadata,
            admins,
        }
    }

    /// Whether `caller` holds the admin role on this bank.
    pub fn is_admin(&self, caller: &AccountId) -> bool {
        self.admins.is_admin(caller)
    }

    /// Registers `asset`, declaring its precision first-time only.
    ///
    /// The declaration is written after the bank accepts the registration,
    /// and never replaces a precision the bank has already cached.
    pub fn register_token(
        &self,
        caller: &AccountId,
        asset: AssetId,
        decimals: Option<u8>,
    ) -> Result<(), RegisterError> {
        if let (Some(declared), Some(cached)) = (decimals, self.bank.cached_precision(&asset)) {
            if declared != cached && self.is_admin(caller) {
                return Err(RegisterError::PrecisionConflict {
                    asset,
                    cached,
                    declared,
                });
            }
        }
        self.bank.register_asset(caller, asset)?;
        if let Some(declared) = decimals {
            if self.bank.cached_precision(&asset).is_none() {
                self.metadata.declare(asset, declared);
            }
        }
        Ok(())
    }

    /// Scales a human-readable amount of `asset` (`"2.25"`) to native
    /// units. The bank's cached precision wins over declared metadata, so
    /// both sides agree on what an amount means.
    pub fn native_amount(&self, asset: &AssetId, amount: &str) -> Result<U256, String> {
        let decimals = if asset.is_base() {
            BASE_ASSET_DECIMALS
        } else {
            self.bank
                .cached_precision(asset)
                .or_else(|| self.metadata.get(asset))
                .ok_or_else(|| format!("no decimals declared for {asset}"))?
        };
        parse_units(amount, decimals).map_err(|e| e.to_string())
    }
}

/// Parses a dollar price (`"2000"`, `"1999.95"`) into a feed answer at the
/// feed's precision.
pub fn parse_price(price: &str) -> Result<i128, String> {
    let scaled = parse_units(price, DEFAULT_FEED_DECIMALS).map_err(|e| e.to_string())?;
    if scaled.bits() > 127 {
        return Err(format!("price {price:?} is out of range"));
    }
    Ok(scaled.as_u128() as i128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultline_protocol::ManualClock;

    #[test]
    fn feed_fails_until_first_push() {
        let clock = Arc::new(ManualClock::new(100));
        let feed = ManualFeed::new("test", clock.clone());
        assert!(feed.latest_round_data().is_err());

        assert_eq!(feed.push(42), 1);
        clock.set(200);
        assert_eq!(feed.push(43), 2);

        let round = feed.latest_round_data().unwrap();
        assert_eq!(round.answer, 43);
        assert_eq!(round.updated_at, 200);
        assert_eq!(round.answered_in_round, round.round_id);
    }

    #[test]
    fn failed_registration_keeps_declared_decimals() {
        let admin = AccountId::from_low_u8(0xad);
        let usdc = AssetId::from_low_u8(0xc0);
        let sim = SimulatedBank::new(
            BankParams::new(10_000_000_000u64, 1_000_000_000u64),
            Arc::new(ManualClock::new(100)),
            [admin],
            &[],
        );

        sim.register_token(&admin, usdc, Some(6)).unwrap();
        let err = sim.register_token(&admin, usdc, Some(18)).unwrap_err();
        assert!(matches!(err, RegisterError::Bank(BankError::AlreadyRegistered(a)) if a == usdc));
        assert_eq!(sim.metadata.get(&usdc), Some(6));
        assert_eq!(sim.native_amount(&usdc, "10").unwrap(), U256::from(10_000_000u64));

        let stranger = AccountId::from_low_u8(1);
        let err = sim.register_token(&stranger, usdc, Some(18)).unwrap_err();
        assert!(matches!(err, RegisterError::Bank(BankError::Unauthorized(_))));
        assert_eq!(sim.metadata.get(&usdc), Some(6));
    }

    #[test]
    fn custody_moves_value_both_ways() {
        let custody = SimulatedCustody::default();
        let alice = AccountId::from_low_u8(1);
        let asset = AssetId::from_low_u8(9);
        custody.fund(alice, asset, U256::from(100u64));

        custody.pull_in(&alice, &asset, U256::from(60u64)).unwrap();
        assert_eq!(custody.wallet(&alice, &asset), U256::from(40u64));
        assert_eq!(custody.held(&asset), U256::from(60u64));

        assert_eq!(
            custody.push_out(&alice, &asset, U256::from(61u64)).unwrap_err(),
            TransferError::InsufficientFunds {
                needed: U256::from(61u64),
                held: U256::from(60u64),
            }
        );
        custody.push_out(&alice, &asset, U256::from(10u64)).unwrap();
        assert_eq!(custody.wallet(&alice, &asset), U256::from(50u64));
    }

    #[test]
    fn asset_spec_parses() {
        let spec: AssetSpec = "0x00000000000000000000000000000000000000c0:6".parse().unwrap();
        assert_eq!(spec.asset, AssetId::from_low_u8(0xc0));
        assert_eq!(spec.decimals, 6);
        assert!("0xc0".parse::<AssetSpec>().is_err());
        assert!("0x00000000000000000000000000000000000000c0:x".parse::<AssetSpec>().is_err());
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("2000").unwrap(), 200_000_000_000);
        assert_eq!(parse_price("0.5").unwrap(), 50_000_000);
        assert!(parse_price("abc").is_err());
        assert!(parse_price("0.000000001").is_err());
    }

    #[test]
    fn native_amounts_use_declared_precision() {
        let usdc = AssetSpec {
            asset: AssetId::from_low_u8(0xc0),
            decimals: 6,
        };
        let sim = SimulatedBank::new(
            BankParams::default(),
            Arc::new(ManualClock::new(0)),
            [],
            &[usdc],
        );
        assert_eq!(
            sim.native_amount(&AssetId::BASE, "1.5").unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(sim.native_amount(&usdc.asset, "2.5").unwrap(), U256::from(2_500_000u64));
        assert!(sim.native_amount(&AssetId::from_low_u8(1), "1").is_err());
    }

    #[test]
    fn metadata_reports_undeclared_assets() {
        let metadata = StaticMetadata::default();
        metadata.declare(AssetId::from_low_u8(1), 8);
        assert_eq!(metadata.decimals(&AssetId::from_low_u8(1)).unwrap(), 8);
        assert!(metadata.decimals(&AssetId::from_low_u8(2)).is_err());
    }
}
