// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vaultline Node
//!
//! Entry point for the `vaultline-node` binary. Parses CLI arguments,
//! initializes logging and metrics, builds a bank over simulated
//! collaborators, and either serves it over HTTP or replays a scenario.
//!
//! The binary supports three subcommands:
//!
//! - `run`      — serve the REST API and `/metrics` until interrupted
//! - `simulate` — replay a JSON scenario and print a JSON report
//! - `version`  — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod scenario;
mod sim;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use vaultline_protocol::{format_ledger_amount, SystemClock};

use cli::{Commands, VaultlineCli};
use metrics::BankMetrics;
use scenario::{Scenario, ScenarioRunner};
use sim::SimulatedBank;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VaultlineCli::parse();
    let log_format = cli.log_format;

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(logging::SERVE_FILTER, log_format)?;
            run_node(args).await
        }
        Commands::Simulate(args) => {
            logging::init_logging(logging::REPLAY_FILTER, log_format)?;
            simulate(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Serves the bank: REST API on one port, Prometheus metrics on another.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let params = args.bank.params();
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        capacity = %format_ledger_amount(params.capacity),
        withdrawal_limit = %format_ledger_amount(params.withdrawal_limit),
        admins = args.bank.admins.len(),
        assets = args.bank.assets.len(),
        "starting vaultline-node"
    );
    if args.bank.admins.is_empty() {
        tracing::warn!("no --admin configured; admin routes will reject every caller");
    }

    // --- Bank ---
    let sim = SimulatedBank::new(
        params,
        Arc::new(SystemClock),
        args.bank.admins.iter().copied(),
        &args.bank.assets,
    );
    if let Some(price) = &args.base_price {
        let answer = sim::parse_price(price)
            .map_err(|e| anyhow::anyhow!("invalid --base-price {price:?}: {e}"))?;
        sim.feed.push(answer);
    }

    // --- Metrics ---
    let bank_metrics = Arc::new(BankMetrics::new().context("failed to create metrics registry")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            vaultline_protocol::config::PROTOCOL_VERSION,
        ),
        sim,
        metrics: Arc::clone(&bank_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&bank_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("vaultline-node stopped");
    Ok(())
}

/// Replays a scenario file and prints the JSON report to stdout.
fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&text)?;

    let runner = ScenarioRunner::new(
        &scenario,
        args.bank.params(),
        &args.bank.admins,
        &args.bank.assets,
    )?;
    let report = runner.run(&scenario.steps);
    runner
        .sim()
        .bank
        .check_invariants()
        .context("bank invariants violated after scenario")?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);
    tracing::info!(
        steps = report.steps.len(),
        failures = report.failures,
        "scenario finished"
    );
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vaultline-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", vaultline_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never completes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
