//! # CLI Interface
//!
//! Defines the command-line argument structure for `vaultline-node` using
//! `clap` derive. Supports three subcommands: `run`, `simulate`, and
//! `version`.
//!
//! Every bank parameter can also be set through a `VAULTLINE_*` environment
//! variable; an explicit flag wins over the environment.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use vaultline_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_CAPACITY, DEFAULT_FEED_HEARTBEAT, DEFAULT_METRICS_PORT,
    DEFAULT_WITHDRAWAL_LIMIT,
};
use vaultline_protocol::{AccountId, BankParams};

use crate::logging::LogFormat;
use crate::sim::AssetSpec;

/// Vaultline bank node.
///
/// Runs a multi-asset custodial ledger against simulated collaborators
/// (manual price feed, in-memory custody) and serves it over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "vaultline-node",
    about = "Vaultline multi-asset bank node",
    version,
    propagate_version = true
)]
pub struct VaultlineCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "VAULTLINE_LOG_FORMAT",
        value_enum,
        ignore_case = true,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the bank over HTTP until interrupted.
    Run(RunArgs),
    /// Replay a JSON scenario against a fresh bank and print the result.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Bank construction parameters, shared by `run` and `simulate`.
#[derive(Args, Debug, Clone)]
pub struct BankArgs {
    /// Global capacity, in ledger units (6 decimals; 10000000000 = $10,000).
    #[arg(long, env = "VAULTLINE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: u128,

    /// Per-withdrawal limit, in ledger units.
    #[arg(long, env = "VAULTLINE_WITHDRAWAL_LIMIT", default_value_t = DEFAULT_WITHDRAWAL_LIMIT)]
    pub withdrawal_limit: u128,

    /// Maximum age of a price reading, in seconds.
    #[arg(long, env = "VAULTLINE_FEED_HEARTBEAT", default_value_t = DEFAULT_FEED_HEARTBEAT.as_secs())]
    pub feed_heartbeat: u64,

    /// Admin account. Repeatable.
    #[arg(long = "admin", env = "VAULTLINE_ADMINS", value_delimiter = ',')]
    pub admins: Vec<AccountId>,

    /// Token metadata as ADDR:DECIMALS. Repeatable. Declared tokens still
    /// need to be registered before they accept deposits.
    #[arg(long = "asset", env = "VAULTLINE_ASSETS", value_delimiter = ',')]
    pub assets: Vec<AssetSpec>,
}

impl BankArgs {
    /// Bank parameters from the flags.
    pub fn params(&self) -> BankParams {
        BankParams::new(self.capacity, self.withdrawal_limit)
            .with_heartbeat(Duration::from_secs(self.feed_heartbeat))
    }
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Bank parameters.
    #[command(flatten)]
    pub bank: BankArgs,

    /// Address to bind both listeners on.
    #[arg(long, env = "VAULTLINE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST API.
    #[arg(long, env = "VAULTLINE_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VAULTLINE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Initial base-asset price in dollars (e.g. "2000" or "1999.95").
    /// Without it, base-asset operations fail until a price is pushed.
    #[arg(long, env = "VAULTLINE_BASE_PRICE")]
    pub base_price: Option<String>,
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Bank parameters. Values in the scenario file take precedence.
    #[command(flatten)]
    pub bank: BankArgs,

    /// Scenario file (JSON).
    pub scenario: PathBuf,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pub pretty: bool,
}
