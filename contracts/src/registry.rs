//! # Asset Registry
//!
//! Tracks which assets the bank accepts and what their native precision is.
//!
//! ## Lifecycle
//!
//! ```text
//!   (unknown) --register--> Eligible --deregister--> Ineligible
//!                              ^                          |
//!                              +--------register----------+
//! ```
//!
//! Deregistration is a soft removal. Existing balances stay valid and stay
//! withdrawable; only new deposits are refused.
//!
//! ## Precision
//!
//! The base asset's precision is fixed. Every other asset's precision is
//! queried from its metadata the first time it is needed and cached from
//! then on. The cache is written by the bank's commit step, so an operation
//! that aborts leaves no trace in it. A cached precision is treated as
//! immutable; the only way to change it is an admin override while the
//! asset's pool is empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vaultline_protocol::config::BASE_ASSET_DECIMALS;
use vaultline_protocol::AssetId;

use crate::error::{BankError, BankResult};

/// Failure querying an asset's metadata.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("metadata query failed: {0}")]
pub struct MetadataError(pub String);

/// Source of asset metadata (native precision).
pub trait AssetMetadata: Send + Sync {
    /// Native fractional digits of `asset`.
    fn decimals(&self, asset: &AssetId) -> Result<u8, MetadataError>;
}

/// One registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Whether new deposits are accepted.
    pub eligible: bool,
    /// Cached native precision, if resolved.
    pub precision: Option<u8>,
}

/// Outcome of [`AssetRegistry::resolve_precision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrecision {
    /// The native precision.
    pub decimals: u8,
    /// `true` if this came from a metadata query and is not cached yet.
    pub fresh: bool,
}

/// The set of known assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRegistry {
    entries: BTreeMap<AssetId, AssetEntry>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetRegistry {
    /// Creates a registry containing only the base asset.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            AssetId::BASE,
            AssetEntry {
                eligible: true,
                precision: Some(BASE_ASSET_DECIMALS),
            },
        );
        Self { entries }
    }

    /// Whether `asset` is currently accepted for deposit.
    pub fn is_eligible(&self, asset: &AssetId) -> bool {
        self.entries.get(asset).map_or(false, |e| e.eligible)
    }

    /// The registry row for `asset`, if any.
    pub fn entry(&self, asset: &AssetId) -> Option<&AssetEntry> {
        self.entries.get(asset)
    }

    /// Cached precision, without querying anything.
    pub fn cached_precision(&self, asset: &AssetId) -> Option<u8> {
        self.entries.get(asset).and_then(|e| e.precision)
    }

    /// Returns `cached` if present, otherwise queries `metadata`.
    ///
    /// Takes the cached value rather than `&self` so the caller can read it
    /// under its lock, release the lock, and only then run the (external)
    /// query. Nothing is written here: a fresh result must be stored with
    /// [`cache_precision`](Self::cache_precision) once the operation that
    /// needed it commits.
    ///
    /// # Errors
    ///
    /// [`BankError::InvalidAsset`] if the metadata query fails.
    pub fn resolve_precision(
        cached: Option<u8>,
        asset: &AssetId,
        metadata: &dyn AssetMetadata,
    ) -> BankResult<ResolvedPrecision> {
        if let Some(decimals) = cached {
            return Ok(ResolvedPrecision {
                decimals,
                fresh: false,
            });
        }

        let decimals = metadata.decimals(asset).map_err(|e| {
            tracing::warn!(asset = %asset, error = %e, "precision lookup failed");
            BankError::InvalidAsset {
                asset: *asset,
                reason: e.0,
            }
        })?;
        tracing::debug!(asset = %asset, decimals, "resolved asset precision");
        Ok(ResolvedPrecision {
            decimals,
            fresh: true,
        })
    }

    /// Caches a resolved precision. Already-cached values are left alone.
    pub fn cache_precision(&mut self, asset: AssetId, decimals: u8) {
        let entry = self.entries.entry(asset).or_insert(AssetEntry {
            eligible: false,
            precision: None,
        });
        if entry.precision.is_none() {
            entry.precision = Some(decimals);
        }
    }

    /// Drops a cached precision. Used to undo a commit.
    pub(crate) fn forget_precision(&mut self, asset: &AssetId) {
        if asset.is_base() {
            return;
        }
        if let Some(entry) = self.entries.get_mut(asset) {
            entry.precision = None;
        }
    }

    /// Marks `asset` eligible.
    ///
    /// # Errors
    ///
    /// [`BankError::AlreadyRegistered`] if it already is.
    pub fn register(&mut self, asset: AssetId) -> BankResult<()> {
        let entry = self.entries.entry(asset).or_insert(AssetEntry {
            eligible: false,
            precision: None,
        });
        if entry.eligible {
            return Err(BankError::AlreadyRegistered(asset));
        }
        entry.eligible = true;
        Ok(())
    }

    /// Marks `asset` ineligible. Balances are untouched.
    ///
    /// # Errors
    ///
    /// [`BankError::BaseAssetLocked`] for the base asset,
    /// [`BankError::NotRegistered`] if it is not eligible.
    pub fn deregister(&mut self, asset: AssetId) -> BankResult<()> {
        if asset.is_base() {
            return Err(BankError::BaseAssetLocked);
        }
        match self.entries.get_mut(&asset) {
            Some(entry) if entry.eligible => {
                entry.eligible = false;
                Ok(())
            }
            _ => Err(BankError::NotRegistered(asset)),
        }
    }

    /// Replaces the cached precision of a known, non-base asset.
    ///
    /// Pool-emptiness is checked by the bank before calling this.
    pub fn override_precision(&mut self, asset: AssetId, decimals: u8) -> BankResult<()> {
        if asset.is_base() {
            return Err(BankError::BaseAssetLocked);
        }
        let entry = self
            .entries
            .get_mut(&asset)
            .ok_or(BankError::NotRegistered(asset))?;
        entry.precision = Some(decimals);
        Ok(())
    }

    /// Eligible assets, base asset first.
    pub fn list_eligible(&self) -> Vec<AssetId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.eligible)
            .map(|(a, _)| *a)
            .collect()
    }

    /// Every asset the registry has ever seen, eligible or not.
    pub fn known_assets(&self) -> impl Iterator<Item = &AssetId> {
        self.entries.keys()
    }
}
