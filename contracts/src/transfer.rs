//! # Transfer Boundary
//!
//! The bank keeps books; it does not move value. Moving value (pulling a
//! deposit into custody, pushing a withdrawal out) is delegated to an
//! external subsystem behind [`TransferBoundary`]. For the base asset that
//! subsystem moves native value; for tokens it calls the token's own
//! transfer mechanism.
//!
//! The bank calls the boundary only after its own state is committed, and
//! treats the call as a point where control may come back in (a hostile
//! token or recipient calling `deposit`/`withdraw` again). Any failure,
//! including a non-standard token misbehaving, surfaces as
//! [`TransferError`] and rolls the operation back.

use thiserror::Error;

use vaultline_protocol::{AccountId, AssetId, U256};

/// Failure reported by the value-movement subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The counter-party does not have the funds (or allowance).
    #[error("insufficient funds: needed {needed}, held {held}")]
    InsufficientFunds {
        /// Amount requested, native units.
        needed: U256,
        /// Amount actually available, native units.
        held: U256,
    },

    /// The asset's transfer call reported failure or behaved unexpectedly.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Moves native amounts in and out of custody.
pub trait TransferBoundary: Send + Sync {
    /// Moves `raw` of `asset` from `account` into the bank's custody.
    fn pull_in(&self, account: &AccountId, asset: &AssetId, raw: U256) -> Result<(), TransferError>;

    /// Moves `raw` of `asset` from custody to `account`.
    fn push_out(&self, account: &AccountId, asset: &AssetId, raw: U256)
        -> Result<(), TransferError>;
}
