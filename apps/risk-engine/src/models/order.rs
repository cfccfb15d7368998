//! Proposed order submitted by a strategy for pre-trade validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy (adds long exposure or reduces short exposure).
    Buy,
    /// Sell (adds short exposure or reduces long exposure).
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at the prevailing market price.
    Market,
    /// Execute at the given limit price or better.
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// A proposed order from a strategy.
///
/// Orders are immutable once submitted: a rejected or size-adjusted order is
/// expressed as a new [`super::ValidationResult`], never as a mutation of the
/// original request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Caller-assigned order identifier.
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Originating strategy identifier.
    pub strategy_id: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested quantity (always positive; direction comes from `side`).
    pub quantity: Decimal,
    /// Limit price, required for [`OrderType::Limit`] orders.
    pub limit_price: Option<Decimal>,
    /// Submission timestamp, used for epoch tie-breaks.
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    /// Signed quantity: positive for buys, negative for sells.
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.quantity,
            OrderSide::Sell => -self.quantity,
        }
    }

    /// Whether this order reduces an existing signed position quantity.
    ///
    /// A buy reduces a short position; a sell reduces a long position.
    #[must_use]
    pub fn reduces_position(&self, position_quantity: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => position_quantity < Decimal::ZERO,
            OrderSide::Sell => position_quantity > Decimal::ZERO,
        }
    }
}
