//! # Prometheus Metrics
//!
//! Operational metrics for the tokenization gateway, scraped at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the gateway.
///
/// Clone-friendly (prometheus handles are internally reference-counted)
/// so it can be shared across request handlers and the settlement worker.
#[derive(Clone)]
pub struct GatewayMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total validation requests processed.
    pub validations_total: IntCounter,
    /// Validation requests the gateway rejected.
    pub validations_rejected_total: IntCounter,
    /// Flow sessions created (accepted validations).
    pub sessions_created_total: IntCounter,
    /// Unpaid sessions expired by the TTL sweep.
    pub sessions_expired_total: IntCounter,
    /// Purchases settled successfully (units minted).
    pub mints_settled_total: IntCounter,
    /// Settlements that ended in failure.
    pub settlements_failed_total: IntCounter,
    /// Sessions currently live (created, not yet terminal or expired).
    pub active_sessions: IntGauge,
    /// Histogram of execution-to-settlement latency in seconds.
    pub settlement_latency_seconds: Histogram,
}

impl GatewayMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("parcel".into()), None)
            .expect("failed to create prometheus registry");

        let validations_total = IntCounter::new(
            "validations_total",
            "Total validation requests processed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(validations_total.clone()))
            .expect("metric registration");

        let validations_rejected_total = IntCounter::new(
            "validations_rejected_total",
            "Validation requests the gateway rejected",
        )
        .expect("metric creation");
        registry
            .register(Box::new(validations_rejected_total.clone()))
            .expect("metric registration");

        let sessions_created_total = IntCounter::new(
            "sessions_created_total",
            "Flow sessions created from accepted validations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sessions_created_total.clone()))
            .expect("metric registration");

        let sessions_expired_total = IntCounter::new(
            "sessions_expired_total",
            "Unpaid sessions expired by the TTL sweep",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sessions_expired_total.clone()))
            .expect("metric registration");

        let mints_settled_total = IntCounter::new(
            "mints_settled_total",
            "Purchases settled successfully with units minted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(mints_settled_total.clone()))
            .expect("metric registration");

        let settlements_failed_total = IntCounter::new(
            "settlements_failed_total",
            "Settlements that ended in terminal failure",
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlements_failed_total.clone()))
            .expect("metric registration");

        let active_sessions = IntGauge::new(
            "active_sessions",
            "Sessions currently live (not terminal, not expired)",
        )
        .expect("metric creation");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("metric registration");

        let settlement_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_latency_seconds",
                "Execution-to-settlement latency in seconds",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlement_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            validations_total,
            validations_rejected_total,
            sessions_created_total,
            sessions_expired_total,
            mints_settled_total,
            settlements_failed_total,
            active_sessions,
            settlement_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text
    /// exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via `State`.
pub type SharedMetrics = Arc<GatewayMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
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
    fn metrics_encode_includes_namespace() {
        let metrics = GatewayMetrics::new();
        metrics.validations_total.inc();
        metrics.active_sessions.set(3);

        let text = metrics.encode().expect("encode");
        assert!(text.contains("parcel_validations_total 1"));
        assert!(text.contains("parcel_active_sessions 3"));
    }
}
