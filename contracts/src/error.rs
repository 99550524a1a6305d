//! # Bank Errors
//!
//! One enum for everything a bank operation can fail with. Every variant is
//! operation-aborting: when a call returns `Err`, the bank's state is exactly
//! what it was before the call. Nothing is retried internally.
//!
//! [`BankError::kind`] groups variants into the coarse classes callers
//! usually branch on (input, policy, oracle, integration, reentrancy,
//! authorization).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vaultline_protocol::{AccountId, AssetId, DecimalsError, OracleError, StaleReason, U256};

/// Result alias for bank operations.
pub type BankResult<T> = Result<T, BankError>;

/// Coarse classification of a [`BankError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is malformed (zero amount).
    Input,
    /// The request is well-formed but the bank's rules forbid it.
    Policy,
    /// The value feed is unusable.
    Oracle,
    /// An external collaborator (metadata, transfer) failed.
    Integration,
    /// The bank is already inside an operation.
    Reentrancy,
    /// The caller lacks the admin role.
    Authorization,
    /// An internal consistency check failed. Should never happen.
    Invariant,
}

/// Errors that can occur during bank operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BankError {
    /// Deposits and withdrawals of zero are rejected.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The asset is not currently accepted for deposit.
    #[error("asset {0} is not eligible for deposit")]
    AssetNotEligible(AssetId),

    /// Accepting the deposit would push total holdings over capacity.
    #[error("capacity exceeded: attempted {attempted}, available {available}")]
    CapacityExceeded {
        /// Converted value of the deposit, in ledger units.
        attempted: U256,
        /// Remaining capacity, in ledger units.
        available: U256,
    },

    /// The withdrawal is larger than the per-operation limit.
    #[error("withdrawal limit exceeded: attempted {attempted}, limit {limit}")]
    WithdrawalLimitExceeded {
        /// Converted value of the withdrawal, in ledger units.
        attempted: U256,
        /// The per-operation limit, in ledger units.
        limit: U256,
    },

    /// The account does not hold enough of the asset.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Converted value of the withdrawal, in ledger units.
        requested: U256,
        /// Current balance, in ledger units.
        available: U256,
    },

    /// `register` on an asset that is already eligible.
    #[error("asset {0} is already registered")]
    AlreadyRegistered(AssetId),

    /// `deregister` on an asset that is not eligible.
    #[error("asset {0} is not registered")]
    NotRegistered(AssetId),

    /// The base asset cannot be deregistered or have its precision changed.
    #[error("the base asset cannot be modified")]
    BaseAssetLocked,

    /// Precision override on an asset that still has balances.
    #[error("precision of {asset} is locked while its pool holds {pool_total}")]
    PrecisionLocked {
        /// The asset.
        asset: AssetId,
        /// Its current pool total, in ledger units.
        pool_total: U256,
    },

    /// The value feed returned a non-positive price.
    #[error("oracle returned invalid price {answer}")]
    OracleInvalid {
        /// The raw answer.
        answer: i128,
    },

    /// The value feed reading is stale.
    #[error("stale price: {0}")]
    PriceStale(StaleReason),

    /// The value feed could not be queried.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The asset's native precision could not be resolved.
    #[error("invalid asset {asset}: {reason}")]
    InvalidAsset {
        /// The asset.
        asset: AssetId,
        /// What the metadata source reported.
        reason: String,
    },

    /// Settlement failed; the operation was rolled back.
    #[error("transfer of {asset} failed: {reason}")]
    TransferFailed {
        /// The asset being moved.
        asset: AssetId,
        /// What the transfer subsystem reported.
        reason: String,
    },

    /// Amount conversion overflowed.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A nested operation was attempted while another is in flight.
    #[error("reentrant call rejected")]
    ReentrancyRejected,

    /// The caller is not an admin.
    #[error("unauthorized: {0} is not an admin")]
    Unauthorized(AccountId),

    /// Internal accounting check failed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl BankError {
    /// The coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BankError::ZeroAmount => ErrorKind::Input,
            BankError::AssetNotEligible(_)
            | BankError::CapacityExceeded { .. }
            | BankError::WithdrawalLimitExceeded { .. }
            | BankError::InsufficientBalance { .. }
            | BankError::AlreadyRegistered(_)
            | BankError::NotRegistered(_)
            | BankError::BaseAssetLocked
            | BankError::PrecisionLocked { .. } => ErrorKind::Policy,
            BankError::OracleInvalid { .. }
            | BankError::PriceStale(_)
            | BankError::OracleUnavailable(_) => ErrorKind::Oracle,
            BankError::InvalidAsset { .. }
            | BankError::TransferFailed { .. }
            | BankError::Arithmetic(_) => ErrorKind::Integration,
            BankError::ReentrancyRejected => ErrorKind::Reentrancy,
            BankError::Unauthorized(_) => ErrorKind::Authorization,
            BankError::InvariantViolation(_) => ErrorKind::Invariant,
        }
    }
}

impl From<OracleError> for BankError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Invalid { answer } => BankError::OracleInvalid { answer },
            OracleError::Stale(reason) => BankError::PriceStale(reason),
            OracleError::Unavailable(e) => BankError::OracleUnavailable(e.0),
            OracleError::Conversion(e) => BankError::Arithmetic(e.to_string()),
        }
    }
}

impl From<DecimalsError> for BankError {
    fn from(err: DecimalsError) -> Self {
        BankError::Arithmetic(err.to_string())
    }
}
