//! Point-in-time risk snapshot consumed by the validator and coordinator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pairwise correlation matrix over a fixed symbol ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Symbol ordering for rows/columns.
    pub symbols: Vec<String>,
    /// Row-major correlation coefficients in `[-1, 1]`.
    pub values: Vec<Vec<Decimal>>,
}

impl CorrelationMatrix {
    /// Identity matrix (no cross-correlation) over the given symbols.
    #[must_use]
    pub fn identity(symbols: Vec<String>) -> Self {
        let n = symbols.len();
        let values = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { Decimal::ONE } else { Decimal::ZERO })
                    .collect()
            })
            .collect();
        Self { symbols, values }
    }

    /// Correlation between two symbols, if both are present.
    #[must_use]
    pub fn correlation(&self, a: &str, b: &str) -> Option<Decimal> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.values.get(i)?.get(j).copied()
    }
}

/// Immutable point-in-time bundle of portfolio risk figures.
///
/// Recomputed on a periodic cadence, never per order; readers always see the
/// latest published snapshot without blocking on recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Annualized portfolio volatility (fraction, e.g. 0.25 = 25%).
    pub portfolio_volatility: Decimal,
    /// Drawdown from peak equity (fraction).
    pub drawdown: Decimal,
    /// Gross exposure in dollars.
    pub gross_exposure: Decimal,
    /// Net exposure in dollars (long positive).
    pub net_exposure: Decimal,
    /// Exposure by sector in dollars.
    pub sector_exposure: HashMap<String, Decimal>,
    /// Pairwise correlations backing the portfolio volatility figure.
    pub correlation: CorrelationMatrix,
    /// Parametric 95% one-day value at risk in dollars.
    pub var_95: Decimal,
    /// Account equity at computation time.
    pub equity: Decimal,
    /// Computation timestamp.
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_identity_matrix() {
        let m = CorrelationMatrix::identity(vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(m.correlation("AAPL", "AAPL"), Some(dec!(1)));
        assert_eq!(m.correlation("AAPL", "MSFT"), Some(dec!(0)));
        assert_eq!(m.correlation("AAPL", "TSLA"), None);
    }
}
