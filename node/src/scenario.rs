//! # Scenario Runner
//!
//! Replays a scripted sequence of operations against a fresh bank with a
//! manual clock, and reports the outcome of every step plus the final
//! state. Used by `vaultline-node simulate`.
//!
//! Amounts in a scenario are human-readable decimals in the asset's own
//! unit (`"2.25"` base, `"6000.5"` of a 6-decimal token) and are scaled to
//! native units before reaching the bank. Prices are dollars.
//!
//! A failing step does not stop the run; its error is recorded and the next
//! step executes against the unchanged bank.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use vaultline_contracts::BankSnapshot;
use vaultline_protocol::config::LEDGER_DECIMALS;
use vaultline_protocol::{parse_units, AccountId, AssetId, BankParams, ManualClock, U256};

use crate::api::{ErrorBody, ReceiptView};
use crate::sim::{parse_price, AssetSpec, SimulatedBank};

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Capacity in dollars. Overrides the command line.
    #[serde(default)]
    pub capacity: Option<String>,
    /// Per-withdrawal limit in dollars. Overrides the command line.
    #[serde(default)]
    pub withdrawal_limit: Option<String>,
    /// Feed heartbeat in seconds. Overrides the command line.
    #[serde(default)]
    pub feed_heartbeat: Option<u64>,
    /// Initial clock value (Unix seconds). Defaults to now.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Account that runs register/deregister steps.
    #[serde(default)]
    pub admin: Option<AccountId>,
    /// Token metadata, in addition to any `--asset` flags.
    #[serde(default)]
    pub assets: Vec<ScenarioAsset>,
    /// The steps, in order.
    pub steps: Vec<Step>,
}

/// Token metadata entry in a scenario.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScenarioAsset {
    /// Token address.
    pub asset: AssetId,
    /// Native precision.
    pub decimals: u8,
}

/// One scripted operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Publish a new base-asset price, in dollars.
    SetPrice {
        /// e.g. `"2000"`.
        price: String,
    },
    /// Mint native value into a user wallet.
    Fund {
        /// Wallet owner.
        account: AccountId,
        /// Asset to mint.
        asset: AssetId,
        /// Amount in whole units of the asset.
        amount: String,
    },
    /// Make a token eligible.
    Register {
        /// Token address.
        asset: AssetId,
        /// Declares metadata for the token once the registration is accepted.
        #[serde(default)]
        decimals: Option<u8>,
    },
    /// Stop accepting a token.
    Deregister {
        /// Token address.
        asset: AssetId,
    },
    /// Deposit into the bank.
    Deposit {
        /// Depositor.
        account: AccountId,
        /// Asset deposited.
        asset: AssetId,
        /// Amount in whole units of the asset.
        amount: String,
    },
    /// Withdraw from the bank.
    Withdraw {
        /// Recipient.
        account: AccountId,
        /// Asset withdrawn.
        asset: AssetId,
        /// Amount in whole units of the asset.
        amount: String,
    },
    /// Move the clock forward.
    AdvanceTime {
        /// Seconds to advance.
        secs: u64,
    },
}

impl Step {
    /// The `op` tag of this step.
    pub fn name(&self) -> &'static str {
        match self {
            Step::SetPrice { .. } => "set_price",
            Step::Fund { .. } => "fund",
            Step::Register { .. } => "register",
            Step::Deregister { .. } => "deregister",
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::AdvanceTime { .. } => "advance_time",
        }
    }
}

/// What happened at one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Zero-based step index.
    pub index: usize,
    /// The step's `op`.
    pub op: &'static str,
    /// Whether it succeeded.
    pub ok: bool,
    /// Receipt of a settled deposit or withdrawal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptView>,
    /// The failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// One entry per step.
    pub steps: Vec<StepOutcome>,
    /// Steps that failed.
    pub failures: usize,
    /// Final bank state.
    pub snapshot: BankSnapshot,
    /// Final total pool value, formatted.
    pub total_pool_value: String,
}

impl Scenario {
    /// Parses a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid scenario file")
    }

    /// Applies the scenario's parameter overrides on top of `base`.
    pub fn params(&self, base: BankParams) -> Result<BankParams> {
        let mut params = base;
        if let Some(capacity) = &self.capacity {
            params.capacity = parse_units(capacity, LEDGER_DECIMALS)
                .with_context(|| format!("invalid capacity {capacity:?}"))?;
        }
        if let Some(limit) = &self.withdrawal_limit {
            params.withdrawal_limit = parse_units(limit, LEDGER_DECIMALS)
                .with_context(|| format!("invalid withdrawal limit {limit:?}"))?;
        }
        if let Some(secs) = self.feed_heartbeat {
            params.feed_heartbeat = Duration::from_secs(secs);
        }
        Ok(params)
    }
}

/// Drives one scenario against a fresh simulated bank.
pub struct ScenarioRunner {
    sim: SimulatedBank,
    clock: Arc<ManualClock>,
    admin: Option<AccountId>,
}

impl ScenarioRunner {
    /// Builds the bank for `scenario`. `admins` and `assets` come from the
    /// command line; the scenario's own admin and assets are added to them.
    pub fn new(
        scenario: &Scenario,
        base: BankParams,
        admins: &[AccountId],
        assets: &[AssetSpec],
    ) -> Result<Self> {
        let params = scenario.params(base)?;
        let start = scenario
            .start_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);
        let clock = Arc::new(ManualClock::new(start));

        let admin = scenario.admin.or_else(|| admins.first().copied());
        let all_admins: Vec<AccountId> = admins.iter().copied().chain(scenario.admin).collect();
        let all_assets: Vec<AssetSpec> = assets
            .iter()
            .copied()
            .chain(scenario.assets.iter().map(|a| AssetSpec {
                asset: a.asset,
                decimals: a.decimals,
            }))
            .collect();

        let sim = SimulatedBank::new(params, clock.clone(), all_admins, &all_assets);
        Ok(Self { sim, clock, admin })
    }

    /// The bank under simulation.
    pub fn sim(&self) -> &SimulatedBank {
        &self.sim
    }

    /// Executes every step and collects the report.
    pub fn run(&self, steps: &[Step]) -> ScenarioReport {
        let outcomes: Vec<StepOutcome> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let result = self.apply(step);
                match &result {
                    Ok(_) => tracing::debug!(index, op = step.name(), "step ok"),
                    Err(e) => tracing::info!(index, op = step.name(), error = %e.error, "step failed"),
                }
                match result {
                    Ok(receipt) => StepOutcome {
                        index,
                        op: step.name(),
                        ok: true,
                        receipt,
                        error: None,
                    },
                    Err(error) => StepOutcome {
                        index,
                        op: step.name(),
                        ok: false,
                        receipt: None,
                        error: Some(error),
                    },
                }
            })
            .collect();

        let snapshot = self.sim.bank.snapshot();
        ScenarioReport {
            failures: outcomes.iter().filter(|o| !o.ok).count(),
            steps: outcomes,
            total_pool_value: vaultline_protocol::format_ledger_amount(snapshot.total_pool_value),
            snapshot,
        }
    }

    fn apply(&self, step: &Step) -> Result<Option<ReceiptView>, ErrorBody> {
        let bank = &self.sim.bank;
        match step {
            Step::SetPrice { price } => {
                let answer = parse_price(price).map_err(ErrorBody::input)?;
                self.sim.feed.push(answer);
                Ok(None)
            }
            Step::Fund {
                account,
                asset,
                amount,
            } => {
                let raw = self.native_amount(asset, amount)?;
                self.sim.custody.fund(*account, *asset, raw);
                Ok(None)
            }
            Step::Register { asset, decimals } => {
                self.sim.register_token(&self.admin()?, *asset, *decimals)?;
                Ok(None)
            }
            Step::Deregister { asset } => {
                bank.deregister_asset(&self.admin()?, *asset)?;
                Ok(None)
            }
            Step::Deposit {
                account,
                asset,
                amount,
            } => {
                let raw = self.native_amount(asset, amount)?;
                Ok(Some(bank.deposit(*account, *asset, raw)?.into()))
            }
            Step::Withdraw {
                account,
                asset,
                amount,
            } => {
                let raw = self.native_amount(asset, amount)?;
                Ok(Some(bank.withdraw(*account, *asset, raw)?.into()))
            }
            Step::AdvanceTime { secs } => {
                self.clock.advance(Duration::from_secs(*secs));
                Ok(None)
            }
        }
    }

    fn admin(&self) -> Result<AccountId, ErrorBody> {
        self.admin.ok_or_else(|| {
            ErrorBody::input("scenario has no admin; set \"admin\" or pass --admin")
        })
    }

    fn native_amount(&self, asset: &AssetId, amount: &str) -> Result<U256, ErrorBody> {
        self.sim.native_amount(asset, amount).map_err(ErrorBody::input)
    }
}
