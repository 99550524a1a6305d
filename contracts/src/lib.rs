//! # Vaultline Bank Contract
//!
//! The stateful half of Vaultline. A [`Bank`] accepts deposits of the base
//! asset and of registered tokens, values everything in one 6-decimal unit
//! of account, and pays withdrawals back out through an external transfer
//! subsystem.
//!
//! - **bank** — the ledger itself and its operation pipeline.
//! - **registry** — which assets are eligible, and their native precision.
//! - **guard** — the single-entry latch around every mutating call.
//! - **transfer** — the seam where value actually moves.
//! - **access** — the admin capability check.
//! - **events** — the append-only record of settled operations.
//! - **error** — [`BankError`] and its coarse [`ErrorKind`].
//!
//! ## Design Principles
//!
//! 1. Checks, then effects, then interactions. Value leaves the bank only
//!    after its books already say it has.
//! 2. A failed operation leaves no trace: no balance change, no event, no
//!    cached precision.
//! 3. All arithmetic on amounts is checked or saturating; never wrapping.
//! 4. Every collaborator is a trait object, so the same bank runs against
//!    simulated feeds and custody in the node and in tests.

pub mod access;
pub mod bank;
pub mod error;
pub mod events;
pub mod guard;
pub mod registry;
pub mod transfer;

pub use access::{AccessControl, AdminSet};
pub use bank::{Bank, BankSnapshot, BalanceRow, Collaborators, Counters, OperationKind, Receipt};
pub use error::{BankError, BankResult, ErrorKind};
pub use events::{BankEvent, EventRecord};
pub use guard::{LatchGuard, ReentrancyGuard};
pub use registry::{AssetEntry, AssetMetadata, AssetRegistry, MetadataError};
pub use transfer::{TransferBoundary, TransferError};
