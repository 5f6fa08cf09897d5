//! # Prometheus Metrics
//!
//! Operational metrics for the payment backend, scraped from the
//! `/metrics` endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do
//! not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the server.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct GatewayMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Payment initiations, labeled by provider.
    pub payments_initiated_total: IntCounterVec,
    /// Callbacks/IPNs that passed signature verification, by provider.
    pub callbacks_verified_total: IntCounterVec,
    /// Callbacks/IPNs rejected (bad signature, amount mismatch,
    /// unknown order), by provider.
    pub callbacks_rejected_total: IntCounterVec,
    /// Applied state transitions, labeled by target status.
    pub transitions_applied_total: IntCounterVec,
    /// Notification events emitted for terminal transitions.
    pub notifications_emitted_total: IntCounter,
    /// Orders currently in a non-terminal status.
    pub orders_open: IntGauge,
}

impl GatewayMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("paygate".into()), None)
            .expect("failed to create prometheus registry");

        let payments_initiated_total = IntCounterVec::new(
            Opts::new(
                "payments_initiated_total",
                "Total payment initiations, by provider",
            ),
            &["provider"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(payments_initiated_total.clone()))
            .expect("metric registration");

        let callbacks_verified_total = IntCounterVec::new(
            Opts::new(
                "callbacks_verified_total",
                "Callbacks and IPNs that passed signature verification, by provider",
            ),
            &["provider"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(callbacks_verified_total.clone()))
            .expect("metric registration");

        let callbacks_rejected_total = IntCounterVec::new(
            Opts::new(
                "callbacks_rejected_total",
                "Callbacks and IPNs rejected during verification, by provider",
            ),
            &["provider"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(callbacks_rejected_total.clone()))
            .expect("metric registration");

        let transitions_applied_total = IntCounterVec::new(
            Opts::new(
                "transitions_applied_total",
                "Applied order status transitions, by target status",
            ),
            &["status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(transitions_applied_total.clone()))
            .expect("metric registration");

        let notifications_emitted_total = IntCounter::new(
            "notifications_emitted_total",
            "Notification events emitted for terminal transitions",
        )
        .expect("metric creation");
        registry
            .register(Box::new(notifications_emitted_total.clone()))
            .expect("metric registration");

        let orders_open = IntGauge::new(
            "orders_open",
            "Orders currently in pending or processing status",
        )
        .expect("metric creation");
        registry
            .register(Box::new(orders_open.clone()))
            .expect("metric registration");

        Self {
            registry,
            payments_initiated_total,
            callbacks_verified_total,
            callbacks_rejected_total,
            transitions_applied_total,
            notifications_emitted_total,
            orders_open,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
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

/// Shared metrics state passed to axum handlers.
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
    fn metrics_register_and_encode() {
        let metrics = GatewayMetrics::new();
        metrics
            .payments_initiated_total
            .with_label_values(&["vnpay"])
            .inc();
        metrics
            .transitions_applied_total
            .with_label_values(&["completed"])
            .inc();
        metrics.orders_open.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("paygate_payments_initiated_total"));
        assert!(text.contains("provider=\"vnpay\""));
        assert!(text.contains("paygate_orders_open 3"));
    }
}
