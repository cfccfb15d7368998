//! Prometheus metrics for the risk engine.
//!
//! Counters cover validations, rejections, reservation conflicts, mode
//! transitions, and config swaps; one histogram tracks validation latency.
//!
//! # Example
//!
//! ```ignore
//! use risk_engine::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default()).expect("metrics exporter");
//! ```

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for validation latency (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".parse().expect("valid default address"),
            // Validation latency from 10us to 250ms; the upper buckets only
            // fill when coordination epochs are contended.
            latency_buckets: vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a configuration with a custom listener address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure the metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install the metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP server exposing metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g. port in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

// ============================================================================
// Recorders
// ============================================================================

/// Record one validation decision and its latency.
pub fn record_validation(approved: bool, latency_seconds: f64) {
    counter!(
        "risk_validations_total",
        "outcome" => if approved { "approved" } else { "rejected" }
    )
    .increment(1);
    histogram!("risk_validation_duration_seconds").record(latency_seconds);
}

/// Record a rejection by its machine-readable code.
pub fn record_rejection(code: &'static str) {
    counter!("risk_rejections_total", "code" => code).increment(1);
}

/// Record a reservation attempt that hit a capacity conflict.
pub fn record_reservation_conflict() {
    counter!("risk_reservation_conflicts_total").increment(1);
}

/// Record a reservation released by TTL expiry.
pub fn record_reservation_expiry() {
    counter!("risk_reservation_expiries_total").increment(1);
}

/// Record an operational-mode transition.
pub fn record_mode_transition(new_mode: &str) {
    counter!("risk_mode_transitions_total", "mode" => new_mode.to_string()).increment(1);
}

/// Record a successful limit-set swap.
pub fn record_config_swap() {
    counter!("risk_config_swaps_total").increment(1);
}
