// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::field_reassign_with_default,
        clippy::or_fun_call
    )
)]

//! Risk Limit Enforcement & Aggregation Engine
//!
//! Pre-trade risk validation for a multi-strategy trading account: hard
//! limits that reject, soft limits that shrink, dynamic multipliers from
//! strategy performance and market regime, cross-strategy coordination over
//! contended symbols, and an account-wide operational state machine.
//!
//! # Components
//!
//! - [`registry::LimitRegistry`]: versioned, atomically swapped limit sets
//! - [`metrics::MetricsEngine`]: pure risk-metric computation over supplied
//!   series (volatility, Sharpe, drawdown, portfolio vol, VaR)
//! - [`adjustment::AdjustmentCalculator`]: performance tiers, volatility
//!   regimes, trend-biased exposure bands
//! - [`portfolio::PortfolioAggregator`]: the single owner of positions and
//!   reservations, serialized per resource key
//! - [`coordinator::CrossStrategyCoordinator`]: per-symbol decision epochs
//! - [`validator::PreTradeValidator`]: the order-admission pipeline
//! - [`state_machine::OperationalStateMachine`]: monotonic-downward modes
//! - [`engine::RiskEngine`]: the facade external collaborators link against
//!
//! The engine performs no network or disk I/O; collaborators feed prices,
//! returns, fills, and equity in, and consume decisions and audit events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod adjustment;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod portfolio;
pub mod registry;
pub mod state_machine;
pub mod validator;

pub use config::{load_config, parse_config, EngineConfig};
pub use engine::RiskEngine;
pub use error::RiskError;
pub use models::{
    LimitSet, OperationalMode, Order, RejectionCode, RiskSnapshot, ValidationResult, WarningCode,
};
