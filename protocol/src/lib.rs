// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vaultline Protocol — Core Primitives
//!
//! The leaf layer of Vaultline, a multi-asset custodial ledger that keeps
//! every balance in one 6-decimal unit of account. Nothing in here holds
//! state; it is the vocabulary the bank contract is written in.
//!
//! ## Modules
//!
//! - **types** — account and asset identifiers, the `U256` amount type.
//! - **decimals** — precision normalization between native and ledger units.
//! - **oracle** — the value-feed adapter: freshness and round-consistency
//!   validation of an external price source.
//! - **config** — constants and the immutable [`config::BankParams`].
//!
//! ## Design Philosophy
//!
//! 1. Integers only. Every amount is a `U256`, every division floors.
//! 2. Checked arithmetic wherever a multiplication could overflow.
//! 3. External sources are traits. The bank never knows whether it is
//!    talking to a real feed or a test double.

pub mod config;
pub mod decimals;
pub mod oracle;
pub mod types;

pub use config::BankParams;
pub use decimals::{normalize, to_ledger_units, DecimalsError};
pub use oracle::{
    Clock, FeedError, ManualClock, OracleError, Price, PriceOracle, RoundData, StaleReason,
    SystemClock, ValueFeed,
};
pub use types::{format_ledger_amount, format_units, parse_units, AccountId, AddressError, AmountError, AssetId, U256};
