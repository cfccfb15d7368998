//! Operational mode gating order admission.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account-wide operational mode.
///
/// Automatic transitions only ever move toward a more restrictive mode;
/// moving back toward [`OperationalMode::Normal`] requires an explicit
/// control action on the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalMode {
    /// All strategies may trade at full size.
    Normal,
    /// A soft-limit warning threshold has been breached.
    SoftWarning,
    /// A soft-limit reduction threshold has been breached.
    SoftReduced,
    /// One strategy is halted; its open positions remain, new orders from it
    /// are rejected.
    StrategyHalted {
        /// The halted strategy.
        strategy_id: String,
    },
    /// All new orders are rejected account-wide. Never auto-liquidates.
    AccountEmergency,
}

impl OperationalMode {
    /// Restrictiveness rank; automatic transitions may only increase this.
    #[must_use]
    pub const fn restrictiveness(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::SoftWarning => 1,
            Self::SoftReduced => 2,
            Self::StrategyHalted { .. } => 3,
            Self::AccountEmergency => 4,
        }
    }

    /// Whether this mode rejects every new order account-wide.
    #[must_use]
    pub const fn blocks_all_orders(&self) -> bool {
        matches!(self, Self::AccountEmergency)
    }
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::SoftWarning => write!(f, "SOFT_WARNING"),
            Self::SoftReduced => write!(f, "SOFT_REDUCED"),
            Self::StrategyHalted { strategy_id } => {
                write!(f, "STRATEGY_HALTED({strategy_id})")
            }
            Self::AccountEmergency => write!(f, "ACCOUNT_EMERGENCY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrictiveness_ordering() {
        let halted = OperationalMode::StrategyHalted {
            strategy_id: "s1".to_string(),
        };
        assert!(OperationalMode::Normal.restrictiveness() < OperationalMode::SoftWarning.restrictiveness());
        assert!(OperationalMode::SoftWarning.restrictiveness() < OperationalMode::SoftReduced.restrictiveness());
        assert!(OperationalMode::SoftReduced.restrictiveness() < halted.restrictiveness());
        assert!(halted.restrictiveness() < OperationalMode::AccountEmergency.restrictiveness());
    }

    #[test]
    fn test_blocks_all_orders() {
        assert!(OperationalMode::AccountEmergency.blocks_all_orders());
        assert!(!OperationalMode::SoftReduced.blocks_all_orders());
    }

    #[test]
    fn test_display() {
        let halted = OperationalMode::StrategyHalted {
            strategy_id: "momentum".to_string(),
        };
        assert_eq!(halted.to_string(), "STRATEGY_HALTED(momentum)");
        assert_eq!(OperationalMode::Normal.to_string(), "NORMAL");
    }
}
