//! # Prometheus Metrics
//!
//! Operational metrics for the bank node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `vaultline` prefix so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use vaultline_contracts::ErrorKind;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct BankMetrics {
    registry: Registry,
    /// Settled deposits.
    pub deposits_total: IntCounter,
    /// Settled withdrawals.
    pub withdrawals_total: IntCounter,
    /// Operations that returned an error, labelled by error kind.
    pub rejected_operations_total: IntCounterVec,
    /// Sum of all pool totals, in ledger units (6 decimals).
    pub total_pool_value_usd6: IntGauge,
    /// Wall time of deposit and withdrawal calls.
    pub operation_latency_seconds: Histogram,
}

impl BankMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vaultline".into()), None)?;

        let deposits_total = IntCounter::new("deposits_total", "Total number of settled deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of settled withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Total number of bank operations that returned an error",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let total_pool_value_usd6 = IntGauge::new(
            "total_pool_value_usd6",
            "Sum of all pool totals in 6-decimal ledger units",
        )?;
        registry.register(Box::new(total_pool_value_usd6.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Deposit and withdrawal latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            rejected_operations_total,
            total_pool_value_usd6,
            operation_latency_seconds,
        })
    }

    /// Counts a failed operation under its error kind.
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejected_operations_total
            .with_label_values(&[kind_label(kind)])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Input => "input",
        ErrorKind::Policy => "policy",
        ErrorKind::Oracle => "oracle",
        ErrorKind::Integration => "integration",
        ErrorKind::Reentrancy => "reentrancy",
        ErrorKind::Authorization => "authorization",
        ErrorKind::Invariant => "invariant",
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<BankMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
