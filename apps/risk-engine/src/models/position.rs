//! Open positions and execution fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position, owned exclusively by the portfolio aggregator.
///
/// Positions are mutated only on confirmed fills via
/// [`crate::portfolio::PortfolioAggregator::commit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub symbol: String,
    /// Owning strategy identifier.
    pub strategy_id: String,
    /// Signed quantity (positive long, negative short).
    pub quantity: Decimal,
    /// Volume-weighted average entry price.
    pub avg_entry_price: Decimal,
    /// Last known market price.
    pub market_price: Decimal,
    /// Entry timestamp of the oldest open lot.
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Absolute market value of the position.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.quantity.abs() * self.market_price
    }

    /// Signed market value (negative for shorts).
    #[must_use]
    pub fn signed_value(&self) -> Decimal {
        self.quantity * self.market_price
    }

    /// Capital consumed at entry prices.
    #[must_use]
    pub fn entry_value(&self) -> Decimal {
        self.quantity.abs() * self.avg_entry_price
    }

    /// Unrealized profit and loss.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        self.quantity * (self.market_price - self.avg_entry_price)
    }
}

/// An execution confirmation reported by the broker collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// Order that produced this fill.
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Executing strategy identifier.
    pub strategy_id: String,
    /// Signed filled quantity.
    pub quantity: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Execution timestamp.
    pub filled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_position(quantity: Decimal) -> Position {
        Position {
            symbol: "AAPL".to_string(),
            strategy_id: "momentum".to_string(),
            quantity,
            avg_entry_price: dec!(100),
            market_price: dec!(110),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_long_values() {
        let pos = make_position(dec!(10));
        assert_eq!(pos.market_value(), dec!(1100));
        assert_eq!(pos.signed_value(), dec!(1100));
        assert_eq!(pos.entry_value(), dec!(1000));
        assert_eq!(pos.unrealized_pnl(), dec!(100));
    }

    #[test]
    fn test_short_values() {
        let pos = make_position(dec!(-10));
        assert_eq!(pos.market_value(), dec!(1100));
        assert_eq!(pos.signed_value(), dec!(-1100));
        assert_eq!(pos.entry_value(), dec!(1000));
        // Short loses when price rises above entry.
        assert_eq!(pos.unrealized_pnl(), dec!(-100));
    }
}
