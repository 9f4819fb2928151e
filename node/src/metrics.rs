//! # Prometheus Metrics
//!
//! Operational counters for the devnet node, scraped at `/metrics` on the
//! metrics port. All metrics live in a dedicated [`prometheus::Registry`]
//! under the `edelivery` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by the API handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Deliveries registered.
    pub deliveries_created_total: IntCounter,
    /// Acceptances recorded.
    pub deliveries_accepted_total: IntCounter,
    /// Responses recorded.
    pub deliveries_finished_total: IntCounter,
    /// Deposits paid out.
    pub deliveries_settled_total: IntCounter,
    /// Commands the ledger refused or could not decode.
    pub commands_rejected_total: IntCounter,
    /// Ciphertext blobs stored.
    pub blobs_stored_total: IntCounter,
    /// Time spent executing ledger commands.
    pub command_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("edelivery".into()), None)?;

        let deliveries_created_total =
            counter(&registry, "deliveries_created_total", "Deliveries registered")?;
        let deliveries_accepted_total =
            counter(&registry, "deliveries_accepted_total", "Acceptances recorded")?;
        let deliveries_finished_total =
            counter(&registry, "deliveries_finished_total", "Responses recorded")?;
        let deliveries_settled_total =
            counter(&registry, "deliveries_settled_total", "Deposits paid out")?;
        let commands_rejected_total = counter(
            &registry,
            "commands_rejected_total",
            "Ledger commands refused or malformed",
        )?;
        let blobs_stored_total =
            counter(&registry, "blobs_stored_total", "Ciphertext blobs stored")?;

        let command_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "command_latency_seconds",
                "Ledger command execution latency in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(command_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            deliveries_created_total,
            deliveries_accepted_total,
            deliveries_finished_total,
            deliveries_settled_total,
            commands_rejected_total,
            blobs_stored_total,
            command_latency_seconds,
        })
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics`.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_namespaced() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.deliveries_created_total.inc();
        metrics.command_latency_seconds.observe(0.002);

        let text = metrics.encode().unwrap();
        assert!(text.contains("edelivery_deliveries_created_total 1"));
        assert!(text.contains("edelivery_command_latency_seconds_count 1"));
    }
}
