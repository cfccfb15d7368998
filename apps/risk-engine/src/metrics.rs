//! Risk metrics engine: pure computation over externally supplied series.
//!
//! Nothing here performs I/O or holds shared mutable state; every function is
//! deterministic over its inputs so historical decisions can be replayed.
//!
//! Insufficient history is always an explicit
//! [`MetricsError::InsufficientData`], never a zero or default value, since
//! "no data" must read as "cannot assess risk", not "no risk".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math;
use crate::models::CorrelationMatrix;

/// Rolling window length for volatility and Sharpe, in trading days.
pub const ROLLING_WINDOW_DAYS: usize = 30;

/// One-sided 95% z-score for parametric VaR.
const Z_95: Decimal = Decimal::from_parts(1645, 0, 0, false, 3); // 1.645

/// Errors from metric computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// Fewer observations than the configured minimum.
    #[error("insufficient data: required {required} samples, have {actual}")]
    InsufficientData {
        /// Minimum sample count required.
        required: usize,
        /// Samples actually supplied.
        actual: usize,
    },

    /// Correlation matrix does not cover a requested symbol.
    #[error("correlation matrix is missing a requested symbol")]
    MissingCorrelation,
}

/// Per-strategy derived metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// Annualized rolling Sharpe ratio.
    pub sharpe: Decimal,
    /// Annualized realized volatility of strategy returns.
    pub realized_volatility: Decimal,
    /// Drawdown from the strategy's peak equity (fraction).
    pub drawdown: Decimal,
}

/// Computes derived risk quantities from supplied time series.
#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine {
    /// Minimum observations before any metric is reported.
    pub min_samples: usize,
    /// Daily risk-free rate used in Sharpe.
    pub risk_free_daily: Decimal,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self {
            min_samples: 20,
            risk_free_daily: Decimal::new(2, 4), // 0.0002 ~ 5% annual
        }
    }
}

impl MetricsEngine {
    /// Create an engine with an explicit minimum sample count.
    #[must_use]
    pub const fn new(min_samples: usize, risk_free_daily: Decimal) -> Self {
        Self {
            min_samples,
            risk_free_daily,
        }
    }

    fn window<'a>(&self, daily_returns: &'a [Decimal]) -> Result<&'a [Decimal], MetricsError> {
        if daily_returns.len() < self.min_samples {
            return Err(MetricsError::InsufficientData {
                required: self.min_samples,
                actual: daily_returns.len(),
            });
        }
        let start = daily_returns.len().saturating_sub(ROLLING_WINDOW_DAYS);
        Ok(&daily_returns[start..])
    }

    /// Annualized volatility: 30-day rolling stddev of daily returns x sqrt(252).
    pub fn annualized_volatility(
        &self,
        daily_returns: &[Decimal],
    ) -> Result<Decimal, MetricsError> {
        let window = self.window(daily_returns)?;
        let std = math::std_dev(window).ok_or(MetricsError::InsufficientData {
            required: self.min_samples.max(2),
            actual: window.len().min(1),
        })?;
        Ok(std * math::sqrt_252())
    }

    /// Annualized rolling Sharpe: `(mean - rf) / stddev * sqrt(252)`.
    pub fn sharpe_ratio(&self, daily_returns: &[Decimal]) -> Result<Decimal, MetricsError> {
        let window = self.window(daily_returns)?;
        let avg = math::mean(window).ok_or(MetricsError::InsufficientData {
            required: self.min_samples,
            actual: 0,
        })?;
        let std = math::std_dev(window).ok_or(MetricsError::InsufficientData {
            required: self.min_samples.max(2),
            actual: window.len().min(1),
        })?;
        if std == Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        Ok((avg - self.risk_free_daily) / std * math::sqrt_252())
    }

    /// Portfolio volatility via standard variance-covariance aggregation.
    ///
    /// `weights` are position weights (fractions of equity, summing to gross
    /// leverage) aligned with annualized `volatilities`, both keyed by the
    /// correlation matrix's symbol ordering.
    pub fn portfolio_volatility(
        &self,
        weights: &[(String, Decimal)],
        volatilities: &[(String, Decimal)],
        correlation: &CorrelationMatrix,
    ) -> Result<Decimal, MetricsError> {
        let mut variance = Decimal::ZERO;
        for (sym_i, w_i) in weights {
            let vol_i = lookup(volatilities, sym_i)?;
            for (sym_j, w_j) in weights {
                let vol_j = lookup(volatilities, sym_j)?;
                let rho = correlation
                    .correlation(sym_i, sym_j)
                    .ok_or(MetricsError::MissingCorrelation)?;
                variance += *w_i * *w_j * vol_i * vol_j * rho;
            }
        }
        Ok(math::sqrt_decimal(variance.abs()).unwrap_or(Decimal::ZERO))
    }

    /// Parametric 95% one-day VaR from annualized portfolio volatility.
    #[must_use]
    pub fn var_95(&self, portfolio_volatility: Decimal, equity: Decimal) -> Decimal {
        let daily_vol = portfolio_volatility / math::sqrt_252();
        Z_95 * daily_vol * equity
    }

    /// Full per-strategy metrics bundle.
    pub fn strategy_metrics(
        &self,
        daily_returns: &[Decimal],
        equity: &EquityTracker,
    ) -> Result<StrategyMetrics, MetricsError> {
        Ok(StrategyMetrics {
            sharpe: self.sharpe_ratio(daily_returns)?,
            realized_volatility: self.annualized_volatility(daily_returns)?,
            drawdown: equity.drawdown(),
        })
    }
}

fn lookup(pairs: &[(String, Decimal)], symbol: &str) -> Result<Decimal, MetricsError> {
    pairs
        .iter()
        .find(|(s, _)| s == symbol)
        .map(|(_, v)| *v)
        .ok_or(MetricsError::MissingCorrelation)
}

/// Continuous drawdown tracker; the peak only ever moves up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityTracker {
    /// Highest equity ever recorded.
    peak: Decimal,
    /// Most recent equity.
    current: Decimal,
    /// Timestamp of the last update.
    updated_at: DateTime<Utc>,
}

impl EquityTracker {
    /// Start tracking from an initial equity value.
    #[must_use]
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            peak: initial_equity,
            current: initial_equity,
            updated_at: Utc::now(),
        }
    }

    /// Record a new equity observation. The peak updates only upward.
    pub fn update(&mut self, equity: Decimal) {
        self.current = equity;
        if equity > self.peak {
            self.peak = equity;
        }
        self.updated_at = Utc::now();
    }

    /// Drawdown from peak: `(peak - current) / peak`, zero for a fresh peak.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        if self.peak <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak - self.current) / self.peak).max(Decimal::ZERO)
    }

    /// Highest recorded equity.
    #[must_use]
    pub const fn peak(&self) -> Decimal {
        self.peak
    }

    /// Most recent equity.
    #[must_use]
    pub const fn current(&self) -> Decimal {
        self.current
    }
}
