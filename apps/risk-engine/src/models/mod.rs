//! Core data model for the risk engine.
//!
//! All types here are plain immutable values: orders are never mutated after
//! submission, limit sets are swapped whole, and snapshots are published as
//! frozen bundles.

pub mod limits;
pub mod mode;
pub mod order;
pub mod position;
pub mod snapshot;
pub mod validation;

pub use limits::{HardLimits, LearningPhase, LimitSet, PriceBounds, SoftLimits, SoftThreshold};
pub use mode::OperationalMode;
pub use order::{Order, OrderSide, OrderType};
pub use position::{Fill, Position};
pub use snapshot::{CorrelationMatrix, RiskSnapshot};
pub use validation::{DecisionInputs, RejectionCode, ValidationResult, WarningCode};
