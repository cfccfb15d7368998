//! Validation outcomes with machine-readable codes and audit inputs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// The operational mode forbids new orders for this strategy or account.
    ModeForbidsOrder,
    /// The operational mode changed mid-validation; reservation was rolled back.
    ModeChangedMidFlight,
    /// Price is outside the symbol's admissible band.
    PriceOutOfBounds,
    /// A limit order was submitted without a limit price.
    MissingLimitPrice,
    /// Strategy exceeded its per-minute order budget.
    OrderFrequencyExceeded,
    /// Account-wide open position count is at its maximum.
    MaxPositionsReached,
    /// Even the minimum viable size would breach the symbol position limit.
    PositionLimitExceeded,
    /// Even the minimum viable size would breach the strategy allocation cap.
    StrategyAllocationExceeded,
    /// The strategy's performance tier is paused (0.0x multiplier).
    StrategyTierPaused,
    /// The trend-biased net exposure band leaves no room in this direction.
    NetExposureBandExceeded,
    /// Adjusted size fell below the minimum viable position size.
    BelowMinimumViableSize,
    /// Reservation failed even after the one retry at reduced size.
    InsufficientReservationCapacity,
    /// No market price is known for the symbol.
    NoMarketData,
    /// Order parameters are malformed (non-positive quantity or price).
    InvalidOrderParams,
}

impl RejectionCode {
    /// Stable string form used in logs and emitted events.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ModeForbidsOrder => "MODE_FORBIDS_ORDER",
            Self::ModeChangedMidFlight => "MODE_CHANGED_MID_FLIGHT",
            Self::PriceOutOfBounds => "PRICE_OUT_OF_BOUNDS",
            Self::MissingLimitPrice => "MISSING_LIMIT_PRICE",
            Self::OrderFrequencyExceeded => "ORDER_FREQUENCY_EXCEEDED",
            Self::MaxPositionsReached => "MAX_POSITIONS_REACHED",
            Self::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            Self::StrategyAllocationExceeded => "STRATEGY_ALLOCATION_EXCEEDED",
            Self::StrategyTierPaused => "STRATEGY_TIER_PAUSED",
            Self::NetExposureBandExceeded => "NET_EXPOSURE_BAND_EXCEEDED",
            Self::BelowMinimumViableSize => "BELOW_MINIMUM_VIABLE_SIZE",
            Self::InsufficientReservationCapacity => "INSUFFICIENT_RESERVATION_CAPACITY",
            Self::NoMarketData => "NO_MARKET_DATA",
            Self::InvalidOrderParams => "INVALID_ORDER_PARAMS",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Machine-readable warning codes attached to approved-but-adjusted decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Concentration soft limit warning threshold crossed.
    ConcentrationWarning,
    /// Portfolio volatility soft limit warning threshold crossed.
    VolatilityWarning,
    /// Drawdown soft limit warning threshold crossed.
    DrawdownWarning,
    /// Liquidity soft limit warning threshold crossed.
    LiquidityWarning,
    /// Size reduced by a soft-limit factor.
    SizeReducedBySoftLimit,
    /// Size reduced by the dynamic adjustment multiplier.
    SizeReducedByMultiplier,
    /// Size capped by the trend-biased net exposure band.
    SizeCappedByExposureBand,
    /// Size capped by cross-strategy coordination for a contended symbol.
    SizeCappedByCoordinator,
    /// Reservation retried once at a reduced size.
    ReservationRetried,
    /// Risk metrics were unavailable; conservative fallback factor applied.
    MetricsUnavailable,
}

impl WarningCode {
    /// Stable string form used in logs and emitted events.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ConcentrationWarning => "CONCENTRATION_WARNING",
            Self::VolatilityWarning => "VOLATILITY_WARNING",
            Self::DrawdownWarning => "DRAWDOWN_WARNING",
            Self::LiquidityWarning => "LIQUIDITY_WARNING",
            Self::SizeReducedBySoftLimit => "SIZE_REDUCED_BY_SOFT_LIMIT",
            Self::SizeReducedByMultiplier => "SIZE_REDUCED_BY_MULTIPLIER",
            Self::SizeCappedByExposureBand => "SIZE_CAPPED_BY_EXPOSURE_BAND",
            Self::SizeCappedByCoordinator => "SIZE_CAPPED_BY_COORDINATOR",
            Self::ReservationRetried => "RESERVATION_RETRIED",
            Self::MetricsUnavailable => "METRICS_UNAVAILABLE",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// The numeric inputs that drove a decision, retained for audit replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionInputs {
    /// Market price used for sizing.
    pub price: Option<Decimal>,
    /// Account equity at decision time.
    pub equity: Option<Decimal>,
    /// Symbol exposure (committed + reserved) before this order.
    pub symbol_exposure: Option<Decimal>,
    /// Effective symbol limit after phase scaling.
    pub effective_symbol_limit: Option<Decimal>,
    /// Minimum soft-limit sizing factor applied.
    pub soft_limit_factor: Option<Decimal>,
    /// Combined dynamic adjustment multiplier applied.
    pub dynamic_multiplier: Option<Decimal>,
    /// Volatility-inverse scaling factor applied.
    pub volatility_scaling: Option<Decimal>,
    /// Portfolio volatility from the consumed snapshot.
    pub portfolio_volatility: Option<Decimal>,
    /// Account drawdown from the consumed snapshot.
    pub drawdown: Option<Decimal>,
    /// Strategy rolling Sharpe used for tiering and coordination.
    pub strategy_sharpe: Option<Decimal>,
    /// Notional allocated by the coordinator, when contention occurred.
    pub coordinated_notional: Option<Decimal>,
}

/// Outcome of pre-trade validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Order this decision is for.
    pub order_id: String,
    /// Whether the order may proceed (possibly at a reduced size).
    pub approved: bool,
    /// Quantity originally requested.
    pub requested_quantity: Decimal,
    /// Quantity approved; zero when rejected.
    pub approved_quantity: Decimal,
    /// Warning codes attached to the decision.
    pub warnings: Vec<WarningCode>,
    /// Rejection codes; non-empty exactly when `approved` is false.
    pub rejections: Vec<RejectionCode>,
    /// The metric values that drove the decision.
    pub inputs: DecisionInputs,
    /// Reservation backing the approval, to be committed or released.
    pub reservation_id: Option<Uuid>,
}

impl ValidationResult {
    /// A rejection carrying a single code.
    #[must_use]
    pub fn rejected(order_id: &str, requested: Decimal, code: RejectionCode) -> Self {
        Self {
            order_id: order_id.to_string(),
            approved: false,
            requested_quantity: requested,
            approved_quantity: Decimal::ZERO,
            warnings: Vec::new(),
            rejections: vec![code],
            inputs: DecisionInputs::default(),
            reservation_id: None,
        }
    }

    /// Whether the approved size was reduced from the request.
    #[must_use]
    pub fn was_adjusted(&self) -> bool {
        self.approved && self.approved_quantity < self.requested_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejected_constructor() {
        let result =
            ValidationResult::rejected("ord-1", dec!(100), RejectionCode::PositionLimitExceeded);
        assert!(!result.approved);
        assert_eq!(result.approved_quantity, Decimal::ZERO);
        assert_eq!(result.rejections, vec![RejectionCode::PositionLimitExceeded]);
        assert!(!result.was_adjusted());
    }

    #[test]
    fn test_was_adjusted() {
        let mut result =
            ValidationResult::rejected("ord-1", dec!(100), RejectionCode::NoMarketData);
        result.approved = true;
        result.rejections.clear();
        result.approved_quantity = dec!(60);
        assert!(result.was_adjusted());
    }

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&RejectionCode::ModeForbidsOrder).unwrap();
        assert_eq!(json, "\"MODE_FORBIDS_ORDER\"");
        let json = serde_json::to_string(&WarningCode::SizeCappedByCoordinator).unwrap();
        assert_eq!(json, "\"SIZE_CAPPED_BY_COORDINATOR\"");
    }
}
