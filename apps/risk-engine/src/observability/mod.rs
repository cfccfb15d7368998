//! Observability module for metrics, tracing, and logging.
//!
//! The engine itself performs no I/O; the metrics exporter and tracing
//! subscriber here are initialized by the host binary that links it.

mod metrics;
mod tracing;

pub use metrics::{
    init_metrics, record_config_swap, record_mode_transition, record_rejection,
    record_reservation_conflict, record_reservation_expiry, record_validation, MetricsConfig,
    MetricsError,
};
pub use tracing::init_tracing;
