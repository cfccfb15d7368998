//! Hard and soft limit thresholds.
//!
//! A [`LimitSet`] is an immutable value: a config reload produces a whole new
//! set that is atomically swapped into the [`crate::registry::LimitRegistry`],
//! never a partial in-place update.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Monotonic `(warning, reduction, halt)` threshold triple for a soft limit.
///
/// Crossing `warning` emits a warning code, crossing `reduction` shrinks order
/// size, and crossing `halt` drives the operational state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftThreshold {
    /// Level at which a warning code is attached to decisions.
    pub warning: Decimal,
    /// Level at which order sizes start being reduced.
    pub reduction: Decimal,
    /// Level at which the metric forces a halt transition.
    pub halt: Decimal,
}

impl SoftThreshold {
    /// Validate `warning <= reduction <= halt` and positivity.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.warning <= Decimal::ZERO {
            return Err(format!("{name}: warning threshold must be positive"));
        }
        if self.warning > self.reduction {
            return Err(format!("{name}: warning threshold exceeds reduction"));
        }
        if self.reduction > self.halt {
            return Err(format!("{name}: reduction threshold exceeds halt"));
        }
        Ok(())
    }

    /// Sizing factor for an observed metric value.
    ///
    /// Below `reduction` the factor is 1.0. Between `reduction` and `halt`
    /// the factor scales linearly down to 0.0 at `halt` and beyond.
    #[must_use]
    pub fn sizing_factor(&self, observed: Decimal) -> Decimal {
        if observed < self.reduction {
            return Decimal::ONE;
        }
        if observed >= self.halt {
            return Decimal::ZERO;
        }
        let span = self.halt - self.reduction;
        if span == Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.halt - observed) / span
    }

    /// Whether the observed value is at or past the warning threshold.
    #[must_use]
    pub fn warns(&self, observed: Decimal) -> bool {
        observed >= self.warning
    }
}

/// Per-symbol admissible price band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
    /// Minimum admissible price.
    pub min: Decimal,
    /// Maximum admissible price.
    pub max: Decimal,
}

/// Hard limits: violation unconditionally rejects an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardLimits {
    /// Maximum single-position value as a fraction of account equity.
    pub max_position_pct: Decimal,
    /// Maximum single-position notional in dollars.
    pub max_position_notional: Decimal,
    /// Per-symbol admissible price bands.
    #[serde(default)]
    pub price_bounds: HashMap<String, PriceBounds>,
    /// Maximum orders per strategy per minute.
    pub max_orders_per_minute: u32,
    /// Maximum capital allocation per strategy as a fraction of equity.
    pub max_strategy_allocation_pct: Decimal,
    /// Maximum number of open positions account-wide.
    pub max_open_positions: usize,
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            max_position_pct: Decimal::new(10, 2),           // 10% of equity
            max_position_notional: Decimal::new(50_000, 0),  // $50k
            price_bounds: HashMap::new(),
            max_orders_per_minute: 30,
            max_strategy_allocation_pct: Decimal::new(40, 2), // 40% of equity
            max_open_positions: 20,
        }
    }
}

/// Soft limits: violation reduces size or emits warnings, never rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftLimits {
    /// Single-symbol exposure as a fraction of account equity.
    pub concentration: SoftThreshold,
    /// Portfolio annualized volatility.
    pub volatility: SoftThreshold,
    /// Account drawdown from peak equity.
    pub drawdown: SoftThreshold,
    /// Order notional as a fraction of the symbol's average daily volume.
    pub liquidity: SoftThreshold,
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self {
            concentration: SoftThreshold {
                warning: Decimal::new(15, 2),
                reduction: Decimal::new(20, 2),
                halt: Decimal::new(30, 2),
            },
            volatility: SoftThreshold {
                warning: Decimal::new(25, 2),
                reduction: Decimal::new(35, 2),
                halt: Decimal::new(50, 2),
            },
            drawdown: SoftThreshold {
                warning: Decimal::new(10, 2),
                reduction: Decimal::new(15, 2),
                halt: Decimal::new(20, 2),
            },
            liquidity: SoftThreshold {
                warning: Decimal::new(5, 2),
                reduction: Decimal::new(10, 2),
                halt: Decimal::new(20, 2),
            },
        }
    }
}

/// Learning phase the account is operating in.
///
/// Earlier phases scale all hard dollar and percentage limits down so a new
/// deployment trades smaller until it has earned a track record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningPhase {
    /// Initial phase, limits scaled to 0.5x.
    #[serde(rename = "PHASE_1")]
    Phase1,
    /// Standard phase, limits at 1.0x.
    #[serde(rename = "PHASE_2")]
    Phase2,
    /// Expanded phase, limits scaled to 1.5x.
    #[serde(rename = "PHASE_3")]
    Phase3,
}

impl LearningPhase {
    /// Multiplier applied to all hard dollar/percentage limits.
    #[must_use]
    pub const fn multiplier(&self) -> Decimal {
        match self {
            Self::Phase1 => Decimal::from_parts(5, 0, 0, false, 1), // 0.5
            Self::Phase2 => Decimal::ONE,
            Self::Phase3 => Decimal::from_parts(15, 0, 0, false, 1), // 1.5
        }
    }
}

/// A complete, immutable set of limit thresholds plus phase parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSet {
    /// Hard limits (unconditional rejection).
    #[serde(default)]
    pub hard: HardLimits,
    /// Soft limits (size reduction / warnings).
    #[serde(default)]
    pub soft: SoftLimits,
    /// Current learning phase.
    #[serde(default = "default_phase")]
    pub phase: LearningPhase,
}

const fn default_phase() -> LearningPhase {
    LearningPhase::Phase2
}

impl Default for LimitSet {
    fn default() -> Self {
        Self {
            hard: HardLimits::default(),
            soft: SoftLimits::default(),
            phase: default_phase(),
        }
    }
}

impl LimitSet {
    /// Validate the whole set.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint. A failed
    /// validation must leave the previously active set untouched.
    pub fn validate(&self) -> Result<(), String> {
        if self.hard.max_position_pct <= Decimal::ZERO {
            return Err("hard.max_position_pct must be positive".to_string());
        }
        if self.hard.max_position_notional <= Decimal::ZERO {
            return Err("hard.max_position_notional must be positive".to_string());
        }
        if self.hard.max_strategy_allocation_pct <= Decimal::ZERO {
            return Err("hard.max_strategy_allocation_pct must be positive".to_string());
        }
        if self.hard.max_orders_per_minute == 0 {
            return Err("hard.max_orders_per_minute must be positive".to_string());
        }
        if self.hard.max_open_positions == 0 {
            return Err("hard.max_open_positions must be positive".to_string());
        }
        for (symbol, bounds) in &self.hard.price_bounds {
            if bounds.min <= Decimal::ZERO || bounds.max < bounds.min {
                return Err(format!("hard.price_bounds[{symbol}]: invalid band"));
            }
        }
        self.soft.concentration.validate("soft.concentration")?;
        self.soft.volatility.validate("soft.volatility")?;
        self.soft.drawdown.validate("soft.drawdown")?;
        self.soft.liquidity.validate("soft.liquidity")?;
        Ok(())
    }

    /// Effective per-position notional limit after phase scaling.
    #[must_use]
    pub fn effective_position_notional(&self) -> Decimal {
        self.hard.max_position_notional * self.phase.multiplier()
    }

    /// Effective per-position equity fraction after phase scaling.
    #[must_use]
    pub fn effective_position_pct(&self) -> Decimal {
        self.hard.max_position_pct * self.phase.multiplier()
    }

    /// Effective per-strategy allocation fraction after phase scaling.
    #[must_use]
    pub fn effective_strategy_allocation_pct(&self) -> Decimal {
        self.hard.max_strategy_allocation_pct * self.phase.multiplier()
    }

    /// Effective symbol limit in dollars given current account equity.
    ///
    /// The binding constraint is the smaller of the notional cap and the
    /// percentage-of-equity cap.
    #[must_use]
    pub fn effective_symbol_limit(&self, equity: Decimal) -> Decimal {
        let pct_cap = self.effective_position_pct() * equity;
        self.effective_position_notional().min(pct_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_set_is_valid() {
        assert!(LimitSet::default().validate().is_ok());
    }

    #[test]
    fn test_non_monotonic_triple_rejected() {
        let mut set = LimitSet::default();
        set.soft.drawdown = SoftThreshold {
            warning: dec!(0.20),
            reduction: dec!(0.15),
            halt: dec!(0.25),
        };
        let err = set.validate().unwrap_err();
        assert!(err.contains("soft.drawdown"));
    }

    #[test]
    fn test_sizing_factor_bands() {
        let triple = SoftThreshold {
            warning: dec!(0.10),
            reduction: dec!(0.20),
            halt: dec!(0.40),
        };
        assert_eq!(triple.sizing_factor(dec!(0.05)), Decimal::ONE);
        assert_eq!(triple.sizing_factor(dec!(0.19)), Decimal::ONE);
        // Halfway between reduction and halt.
        assert_eq!(triple.sizing_factor(dec!(0.30)), dec!(0.5));
        assert_eq!(triple.sizing_factor(dec!(0.40)), Decimal::ZERO);
        assert_eq!(triple.sizing_factor(dec!(0.90)), Decimal::ZERO);
    }

    #[test]
    fn test_warns() {
        let triple = SoftThreshold {
            warning: dec!(0.10),
            reduction: dec!(0.20),
            halt: dec!(0.40),
        };
        assert!(!triple.warns(dec!(0.09)));
        assert!(triple.warns(dec!(0.10)));
    }

    #[test]
    fn test_phase_wire_form() {
        assert_eq!(
            serde_json::to_string(&LearningPhase::Phase1).unwrap(),
            "\"PHASE_1\""
        );
        let back: LearningPhase = serde_json::from_str("\"PHASE_3\"").unwrap();
        assert_eq!(back, LearningPhase::Phase3);
    }

    #[test]
    fn test_phase_multipliers() {
        assert_eq!(LearningPhase::Phase1.multiplier(), dec!(0.5));
        assert_eq!(LearningPhase::Phase2.multiplier(), dec!(1));
        assert_eq!(LearningPhase::Phase3.multiplier(), dec!(1.5));
    }

    #[test]
    fn test_effective_symbol_limit_takes_minimum() {
        let set = LimitSet::default();
        // 10% of $100k = $10k, below the $50k notional cap.
        assert_eq!(set.effective_symbol_limit(dec!(100000)), dec!(10000));
        // 10% of $1m = $100k, above the $50k notional cap.
        assert_eq!(set.effective_symbol_limit(dec!(1000000)), dec!(50000));
    }

    #[test]
    fn test_phase_scales_limits() {
        let mut set = LimitSet::default();
        set.phase = LearningPhase::Phase1;
        assert_eq!(set.effective_position_notional(), dec!(25000));
        assert_eq!(set.effective_position_pct(), dec!(0.05));
    }

    #[test]
    fn test_invalid_price_bounds_rejected() {
        let mut set = LimitSet::default();
        set.hard.price_bounds.insert(
            "AAPL".to_string(),
            PriceBounds {
                min: dec!(100),
                max: dec!(50),
            },
        );
        assert!(set.validate().is_err());
    }
}
