//! Dynamic adjustment calculator: performance tiers, volatility regimes, and
//! trend-biased exposure bands.
//!
//! The calculator is stateless: identical inputs always produce identical
//! multipliers, which is what makes historical decisions replayable.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::math;
use crate::metrics::StrategyMetrics;

/// Lower clamp on the combined multiplier of an active strategy.
const MULTIPLIER_FLOOR: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1
/// Upper clamp on the combined multiplier.
const MULTIPLIER_CEILING: Decimal = Decimal::from_parts(15, 0, 0, false, 1); // 1.5

/// Performance tier a strategy is classified into, recomputed daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceTier {
    /// Sharpe >= 1.5 and drawdown < 10%: full size.
    Full,
    /// Sharpe >= 0.8 and drawdown < 15%: 0.8x.
    Reduced,
    /// Sharpe >= 0.3 and drawdown < 20%: 0.5x.
    Probation,
    /// Everything else: paused, no new orders.
    Paused,
}

impl PerformanceTier {
    /// Classify from rolling Sharpe and drawdown.
    #[must_use]
    pub fn classify(sharpe: Decimal, drawdown: Decimal) -> Self {
        if sharpe >= Decimal::new(15, 1) && drawdown < Decimal::new(10, 2) {
            Self::Full
        } else if sharpe >= Decimal::new(8, 1) && drawdown < Decimal::new(15, 2) {
            Self::Reduced
        } else if sharpe >= Decimal::new(3, 1) && drawdown < Decimal::new(20, 2) {
            Self::Probation
        } else {
            Self::Paused
        }
    }

    /// Size multiplier for the tier.
    #[must_use]
    pub const fn multiplier(&self) -> Decimal {
        match self {
            Self::Full => Decimal::ONE,
            Self::Reduced => Decimal::from_parts(8, 0, 0, false, 1), // 0.8
            Self::Probation => Decimal::from_parts(5, 0, 0, false, 1), // 0.5
            Self::Paused => Decimal::ZERO,
        }
    }
}

/// Market-wide volatility regime, banded from a volatility index level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRegime {
    /// Index below 15.
    Low,
    /// Index in [15, 25).
    Normal,
    /// Index in [25, 35).
    High,
    /// Index at or above 35.
    Extreme,
}

impl VolatilityRegime {
    /// Band a volatility index level into a regime.
    #[must_use]
    pub fn from_index(index: Decimal) -> Self {
        if index < Decimal::from(15_u64) {
            Self::Low
        } else if index < Decimal::from(25_u64) {
            Self::Normal
        } else if index < Decimal::from(35_u64) {
            Self::High
        } else {
            Self::Extreme
        }
    }

    /// Size multiplier for the regime.
    #[must_use]
    pub const fn multiplier(&self) -> Decimal {
        match self {
            Self::Low => Decimal::from_parts(12, 0, 0, false, 1), // 1.2
            Self::Normal => Decimal::ONE,
            Self::High => Decimal::from_parts(7, 0, 0, false, 1), // 0.7
            Self::Extreme => Decimal::from_parts(4, 0, 0, false, 1), // 0.4
        }
    }
}

/// Market trend classification supplied by the market-data collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketTrend {
    /// Strong uptrend: long bias.
    StrongUp,
    /// Mild uptrend.
    Up,
    /// No directional bias.
    Sideways,
    /// Mild downtrend.
    Down,
    /// Strong downtrend: short bias.
    StrongDown,
}

impl Default for MarketTrend {
    fn default() -> Self {
        Self::Sideways
    }
}

/// Allowed net exposure band as fractions of equity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetExposureBand {
    /// Lower bound (most short allowed), e.g. -0.40.
    pub min: Decimal,
    /// Upper bound (most long allowed), e.g. +0.40.
    pub max: Decimal,
}

impl MarketTrend {
    /// Trend bias adjusts the allowed net-exposure band, not size directly.
    #[must_use]
    pub const fn exposure_band(&self) -> NetExposureBand {
        const fn pct(units: u32, negative: bool) -> Decimal {
            Decimal::from_parts(units, 0, 0, negative, 2)
        }
        match self {
            Self::StrongUp => NetExposureBand {
                min: Decimal::ZERO,
                max: pct(40, false),
            },
            Self::Up => NetExposureBand {
                min: pct(10, true),
                max: pct(30, false),
            },
            Self::Sideways => NetExposureBand {
                min: pct(20, true),
                max: pct(20, false),
            },
            Self::Down => NetExposureBand {
                min: pct(30, true),
                max: pct(10, false),
            },
            Self::StrongDown => NetExposureBand {
                min: pct(40, true),
                max: Decimal::ZERO,
            },
        }
    }
}

/// The multipliers that drove a sizing decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Adjustment {
    /// Classified performance tier.
    pub tier: PerformanceTier,
    /// Classified volatility regime.
    pub regime: VolatilityRegime,
    /// Combined multiplier, clamped to `[0.1, 1.5]` for active strategies.
    pub combined_multiplier: Decimal,
    /// Allowed net exposure band from the trend bias.
    pub exposure_band: NetExposureBand,
    /// Whether the strategy is paused outright (tier 0.0x).
    pub paused: bool,
}

/// Stateless calculator combining tier, regime, and trend inputs.
#[derive(Debug, Clone, Copy)]
pub struct AdjustmentCalculator {
    /// Target annualized volatility for inverse scaling.
    pub target_volatility: Decimal,
}

impl Default for AdjustmentCalculator {
    fn default() -> Self {
        Self {
            target_volatility: Decimal::new(40, 2), // 40%
        }
    }
}

impl AdjustmentCalculator {
    /// Create a calculator with an explicit volatility target.
    #[must_use]
    pub const fn new(target_volatility: Decimal) -> Self {
        Self { target_volatility }
    }

    /// Compute the adjustment for one strategy under current market inputs.
    #[must_use]
    pub fn compute(
        &self,
        strategy: &StrategyMetrics,
        volatility_index: Decimal,
        trend: MarketTrend,
    ) -> Adjustment {
        let tier = PerformanceTier::classify(strategy.sharpe, strategy.drawdown);
        let regime = VolatilityRegime::from_index(volatility_index);
        let exposure_band = trend.exposure_band();

        if tier == PerformanceTier::Paused {
            return Adjustment {
                tier,
                regime,
                combined_multiplier: Decimal::ZERO,
                exposure_band,
                paused: true,
            };
        }

        let raw = tier.multiplier() * regime.multiplier();
        let combined_multiplier = raw.clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEILING);

        Adjustment {
            tier,
            regime,
            combined_multiplier,
            exposure_band,
            paused: false,
        }
    }

    /// Volatility-inverse scaling: `sqrt(target / realized)`, capped at 1.0
    /// so sub-target realized volatility never scales size up.
    #[must_use]
    pub fn volatility_scaling(&self, realized_volatility: Decimal) -> Decimal {
        if realized_volatility <= Decimal::ZERO {
            return Decimal::ONE;
        }
        let ratio = self.target_volatility / realized_volatility;
        math::sqrt_decimal(ratio)
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(dec!(1.6), dec!(0.08), PerformanceTier::Full; "full tier")]
    #[test_case(dec!(1.5), dec!(0.099), PerformanceTier::Full; "full tier boundary")]
    #[test_case(dec!(1.6), dec!(0.12), PerformanceTier::Reduced; "high sharpe but drawdown demotes")]
    #[test_case(dec!(0.9), dec!(0.10), PerformanceTier::Reduced; "reduced tier")]
    #[test_case(dec!(0.5), dec!(0.18), PerformanceTier::Probation; "probation tier")]
    #[test_case(dec!(0.2), dec!(0.05), PerformanceTier::Paused; "low sharpe pauses")]
    #[test_case(dec!(2.0), dec!(0.25), PerformanceTier::Paused; "deep drawdown pauses")]
    fn test_tier_classification(sharpe: Decimal, drawdown: Decimal, expected: PerformanceTier) {
        assert_eq!(PerformanceTier::classify(sharpe, drawdown), expected);
    }

    #[test_case(dec!(12), VolatilityRegime::Low; "low band")]
    #[test_case(dec!(15), VolatilityRegime::Normal; "normal band lower edge")]
    #[test_case(dec!(28), VolatilityRegime::High; "high band")]
    #[test_case(dec!(35), VolatilityRegime::Extreme; "extreme band lower edge")]
    fn test_regime_banding(index: Decimal, expected: VolatilityRegime) {
        assert_eq!(VolatilityRegime::from_index(index), expected);
    }

    #[test]
    fn test_strong_sharpe_moderate_drawdown_full_tier() {
        // 30-day Sharpe 1.6 with 8% drawdown receives multiplier 1.0x.
        let tier = PerformanceTier::classify(dec!(1.6), dec!(0.08));
        assert_eq!(tier.multiplier(), dec!(1));
    }

    #[test]
    fn test_volatility_scaling_above_target() {
        // Realized 50% against a 40% target: sqrt(0.4/0.5) = 0.894...
        let calc = AdjustmentCalculator::new(dec!(0.40));
        let factor = calc.volatility_scaling(dec!(0.50));
        assert!((factor - dec!(0.894427)).abs() < dec!(0.0001), "factor = {factor}");
    }

    #[test]
    fn test_volatility_scaling_capped_at_one() {
        let calc = AdjustmentCalculator::new(dec!(0.40));
        // Realized below target must not scale size up.
        assert_eq!(calc.volatility_scaling(dec!(0.20)), dec!(1));
        assert_eq!(calc.volatility_scaling(Decimal::ZERO), dec!(1));
    }

    #[test]
    fn test_combined_multiplier_clamped() {
        let calc = AdjustmentCalculator::default();
        let strong = StrategyMetrics {
            sharpe: dec!(2.0),
            realized_volatility: dec!(0.2),
            drawdown: dec!(0.02),
        };
        // Full tier (1.0) x low-vol regime (1.2) = 1.2, inside the clamp.
        let adj = calc.compute(&strong, dec!(10), MarketTrend::Sideways);
        assert_eq!(adj.combined_multiplier, dec!(1.2));
        assert!(!adj.paused);

        // Probation (0.5) x extreme (0.4) = 0.2, still above the floor.
        let weak = StrategyMetrics {
            sharpe: dec!(0.4),
            realized_volatility: dec!(0.6),
            drawdown: dec!(0.18),
        };
        let adj = calc.compute(&weak, dec!(40), MarketTrend::Sideways);
        assert_eq!(adj.combined_multiplier, dec!(0.2));
    }

    #[test]
    fn test_paused_tier_short_circuits() {
        let calc = AdjustmentCalculator::default();
        let paused = StrategyMetrics {
            sharpe: dec!(0.1),
            realized_volatility: dec!(0.3),
            drawdown: dec!(0.05),
        };
        let adj = calc.compute(&paused, dec!(10), MarketTrend::StrongUp);
        assert!(adj.paused);
        // The clamp must not resurrect a paused strategy at 0.1x.
        assert_eq!(adj.combined_multiplier, Decimal::ZERO);
    }

    #[test]
    fn test_trend_bands() {
        let band = MarketTrend::StrongUp.exposure_band();
        assert_eq!(band.min, dec!(0));
        assert_eq!(band.max, dec!(0.40));

        let band = MarketTrend::StrongDown.exposure_band();
        assert_eq!(band.min, dec!(-0.40));
        assert_eq!(band.max, dec!(0));

        let band = MarketTrend::Sideways.exposure_band();
        assert_eq!(band.min, dec!(-0.20));
        assert_eq!(band.max, dec!(0.20));
    }

    #[test]
    fn test_determinism() {
        let calc = AdjustmentCalculator::default();
        let metrics = StrategyMetrics {
            sharpe: dec!(1.1),
            realized_volatility: dec!(0.45),
            drawdown: dec!(0.09),
        };
        let a = calc.compute(&metrics, dec!(22), MarketTrend::Up);
        let b = calc.compute(&metrics, dec!(22), MarketTrend::Up);
        assert_eq!(a.combined_multiplier, b.combined_multiplier);
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.regime, b.regime);
    }
}
