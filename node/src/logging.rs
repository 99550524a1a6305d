//! # Structured Logging
//!
//! One `tracing` subscriber for the whole process, writing to stderr so
//! that stdout carries nothing but the JSON report printed by `simulate`.
//!
//! `RUST_LOG` always wins. Without it, each subcommand gets its own default
//! verbosity: a serving node logs every settled operation, a scenario
//! replay only logs problems.
//!
//! ```text
//! RUST_LOG=vaultline_contracts=debug,vaultline_protocol=debug vaultline-node run
//! ```

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines, colored when stderr is a terminal.
    Pretty,
    /// One JSON object per event, fields flattened to the top level.
    Json,
}

/// Default filter directives for the long-running node.
///
/// Bank events and rejections at `info`/`warn`; per-conversion detail
/// (`debug`) stays off unless asked for.
pub const SERVE_FILTER: &str =
    "vaultline_node=info,vaultline_contracts=info,vaultline_protocol=info,tower_http=info";

/// Default filter directives for `simulate`. Rejected steps are part of
/// the report already, so the library stays quiet.
pub const REPLAY_FILTER: &str = "vaultline_node=warn,vaultline_contracts=error,vaultline_protocol=error";

/// Installs the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset (or unparsable).
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
