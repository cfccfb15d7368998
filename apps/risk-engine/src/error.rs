//! Error taxonomy for the risk engine.
//!
//! Every rejection is terminal for the order that produced it: the caller
//! resubmits, the engine never retries on its behalf. The one exception is
//! [`RiskError::InsufficientReservationCapacity`], which the validator
//! retries once at a reduced size before surfacing it.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{OperationalMode, RejectionCode};

/// Engine error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// A hard limit would be violated even at minimum viable size.
    ///
    /// Logged at warning severity; no side effects.
    #[error("hard limit {code} violated: observed {observed}, limit {limit}")]
    HardLimitViolation {
        /// Which limit was violated.
        code: RejectionCode,
        /// The observed value that breached the limit.
        observed: Decimal,
        /// The limit in force at decision time.
        limit: Decimal,
    },

    /// The reservation would overcommit a shared capacity pool.
    ///
    /// Transient: the validator may retry once at `available` before
    /// rejecting.
    #[error("insufficient reservation capacity: requested {requested}, available {available}")]
    InsufficientReservationCapacity {
        /// Notional requested.
        requested: Decimal,
        /// Notional still admissible under the binding limit.
        available: Decimal,
    },

    /// Not enough history to compute a required risk metric.
    ///
    /// Callers must treat this as "cannot assess risk", never as zero risk.
    #[error("insufficient metrics data: required {required} samples, have {actual}")]
    InsufficientMetricsData {
        /// Minimum sample count configured.
        required: usize,
        /// Samples actually available.
        actual: usize,
    },

    /// The operational mode forbids new orders for this strategy or account.
    #[error("operational mode {mode} forbids this order")]
    InvalidModeForOrder {
        /// Mode in force when the order was gated.
        mode: OperationalMode,
    },

    /// A limit-set reload failed validation; the prior set remains active.
    #[error("config validation failed: {0}")]
    ConfigValidationFailure(String),

    /// The reservation handle is unknown (already committed, released, or
    /// expired past its TTL).
    #[error("unknown reservation {0}")]
    UnknownReservation(uuid::Uuid),
}

impl RiskError {
    /// Whether the validator may retry the operation at a reduced size.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::InsufficientReservationCapacity { .. })
    }
}
