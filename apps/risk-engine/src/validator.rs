//! Pre-trade validator: the sole order-admission entry point.
//!
//! Sequence per order: mode gate, hard limits at minimum viable size, the
//! most restrictive soft-limit factor, the dynamic adjustment multiplier,
//! cross-strategy coordination, and finally the atomic reservation (with one
//! retry at the largest feasible size). Every rejection and adjustment
//! carries machine-readable codes plus the numeric inputs that produced
//! them, so any decision can be replayed from its audit record.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::adjustment::{AdjustmentCalculator, MarketTrend, NetExposureBand};
use crate::coordinator::{CoordinationRequest, CrossStrategyCoordinator};
use crate::error::RiskError;
use crate::events::{EventBus, RiskEvent};
use crate::metrics::StrategyMetrics;
use crate::models::{
    DecisionInputs, LimitSet, Order, OrderType, RejectionCode, RiskSnapshot, SoftThreshold,
    ValidationResult, WarningCode,
};
use crate::portfolio::PortfolioAggregator;
use crate::registry::LimitRegistry;
use crate::state_machine::OperationalStateMachine;

const FREQUENCY_WINDOW: Duration = Duration::from_secs(60);

/// Read-only market inputs assembled by the caller for one validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Current market price for the order's symbol.
    pub price: Option<Decimal>,
    /// Average daily traded notional for the symbol, for the liquidity limit.
    pub average_daily_volume: Option<Decimal>,
    /// Account equity at decision time.
    pub equity: Decimal,
    /// Latest published risk snapshot, if one has been computed.
    pub snapshot: Option<Arc<RiskSnapshot>>,
    /// Rolling metrics for the order's strategy, when history suffices.
    pub strategy_metrics: Option<StrategyMetrics>,
    /// Market-wide volatility index level.
    pub volatility_index: Decimal,
    /// Market trend classification.
    pub trend: MarketTrend,
}

/// Tunables the validator reads from engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorSettings {
    /// Smallest quantity worth submitting after adjustment.
    pub min_viable_quantity: Decimal,
    /// Soft factor substituted when risk metrics are unavailable.
    pub fallback_soft_factor: Decimal,
}

/// Validates proposed orders against the full limit stack.
pub struct PreTradeValidator {
    registry: Arc<LimitRegistry>,
    aggregator: Arc<PortfolioAggregator>,
    state_machine: Arc<OperationalStateMachine>,
    coordinator: Arc<CrossStrategyCoordinator>,
    calculator: AdjustmentCalculator,
    events: EventBus,
    settings: ValidatorSettings,
    order_times: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl PreTradeValidator {
    /// Wire a validator over its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<LimitRegistry>,
        aggregator: Arc<PortfolioAggregator>,
        state_machine: Arc<OperationalStateMachine>,
        coordinator: Arc<CrossStrategyCoordinator>,
        calculator: AdjustmentCalculator,
        events: EventBus,
        settings: ValidatorSettings,
    ) -> Self {
        Self {
            registry,
            aggregator,
            state_machine,
            coordinator,
            calculator,
            events,
            settings,
            order_times: Mutex::new(HashMap::new()),
        }
    }

    /// Validate one proposed order.
    ///
    /// Approval may come at a reduced size; the result then carries the
    /// reservation backing it, to be committed on fill or released on cancel.
    pub async fn validate(&self, order: &Order, ctx: &ValidationContext) -> ValidationResult {
        let started = Instant::now();
        let result = self.run(order, ctx).await;
        crate::observability::record_validation(result.approved, started.elapsed().as_secs_f64());
        for code in &result.rejections {
            crate::observability::record_rejection(code.reason());
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    async fn run(&self, order: &Order, ctx: &ValidationContext) -> ValidationResult {
        let mut inputs = DecisionInputs {
            equity: Some(ctx.equity),
            ..DecisionInputs::default()
        };
        let mut warnings = Vec::new();

        // (a) Mode gate.
        if let Some(code) = self.state_machine.gate(&order.strategy_id) {
            return self.reject(order, code, inputs);
        }

        if order.quantity <= Decimal::ZERO {
            return self.reject(order, RejectionCode::InvalidOrderParams, inputs);
        }
        if order.order_type == OrderType::Limit && order.limit_price.is_none() {
            return self.reject(order, RejectionCode::MissingLimitPrice, inputs);
        }
        let Some(price) = ctx.price else {
            return self.reject(order, RejectionCode::NoMarketData, inputs);
        };
        if price <= Decimal::ZERO {
            return self.reject(order, RejectionCode::NoMarketData, inputs);
        }
        inputs.price = Some(price);

        // (b) Hard limits, checked at minimum viable size.
        let limits = self.registry.current();

        let checked_price = order.limit_price.unwrap_or(price);
        if let Some(bounds) = limits.hard.price_bounds.get(&order.symbol) {
            if checked_price < bounds.min || checked_price > bounds.max {
                self.emit_hard_rejection(order, RejectionCode::PriceOutOfBounds, checked_price, bounds.max);
                return self.reject(order, RejectionCode::PriceOutOfBounds, inputs);
            }
        }

        if !self.admit_frequency(&order.strategy_id, limits.hard.max_orders_per_minute) {
            self.emit_hard_rejection(
                order,
                RejectionCode::OrderFrequencyExceeded,
                Decimal::from(limits.hard.max_orders_per_minute + 1),
                Decimal::from(limits.hard.max_orders_per_minute),
            );
            return self.reject(order, RejectionCode::OrderFrequencyExceeded, inputs);
        }

        let position_quantity = self
            .aggregator
            .position_quantity(&order.symbol, &order.strategy_id)
            .unwrap_or(Decimal::ZERO);
        let reduces = order.reduces_position(position_quantity);
        // The reducing exemption extends only to the quantity actually held;
        // anything beyond it flips the position and opens fresh exposure in
        // the opposite direction.
        let closing_quantity = if reduces {
            order.quantity.min(position_quantity.abs())
        } else {
            Decimal::ZERO
        };
        let opening_quantity = order.quantity - closing_quantity;

        let effective_limit = limits.effective_symbol_limit(ctx.equity);
        let usage = self.aggregator.symbol_usage(&order.symbol);
        let used = usage.committed + usage.reserved;
        inputs.symbol_exposure = Some(used);
        inputs.effective_symbol_limit = Some(effective_limit);

        if opening_quantity.is_zero() {
            // A pure reducer lowers every exposure it touches; it skips
            // sizing, reserves no capacity, and must pass even when the
            // symbol is already over a tightened limit. It still books a
            // handle so the fill path is uniform.
            return self
                .finish(order, ctx, closing_quantity, Decimal::ZERO, effective_limit, warnings, inputs)
                .await;
        }

        let min_viable_notional = self.settings.min_viable_quantity * price;
        if used + min_viable_notional > effective_limit {
            self.emit_hard_rejection(
                order,
                RejectionCode::PositionLimitExceeded,
                used + min_viable_notional,
                effective_limit,
            );
            return self.reject(order, RejectionCode::PositionLimitExceeded, inputs);
        }

        let allocation_cap = limits.effective_strategy_allocation_pct() * ctx.equity;
        let strategy_used = self.aggregator.strategy_usage(&order.strategy_id);
        if strategy_used + min_viable_notional > allocation_cap {
            self.emit_hard_rejection(
                order,
                RejectionCode::StrategyAllocationExceeded,
                strategy_used + min_viable_notional,
                allocation_cap,
            );
            return self.reject(order, RejectionCode::StrategyAllocationExceeded, inputs);
        }

        if position_quantity.is_zero()
            && self.aggregator.open_position_count() >= limits.hard.max_open_positions
        {
            self.emit_hard_rejection(
                order,
                RejectionCode::MaxPositionsReached,
                Decimal::from(self.aggregator.open_position_count()),
                Decimal::from(limits.hard.max_open_positions),
            );
            return self.reject(order, RejectionCode::MaxPositionsReached, inputs);
        }

        let mut notional = opening_quantity * price;

        // (c) Most restrictive soft-limit factor.
        let soft_factor = self.soft_factor(order, ctx, &limits, used, notional, &mut warnings, &mut inputs);
        if soft_factor < Decimal::ONE {
            warnings.push(WarningCode::SizeReducedBySoftLimit);
        }
        notional *= soft_factor;

        // (d) Dynamic adjustment multiplier and volatility-inverse scaling.
        let band = match ctx.strategy_metrics {
            Some(metrics) => {
                inputs.strategy_sharpe = Some(metrics.sharpe);
                let adjustment = self.calculator.compute(&metrics, ctx.volatility_index, ctx.trend);
                if adjustment.paused {
                    return self.reject(order, RejectionCode::StrategyTierPaused, inputs);
                }
                let scaling = self.calculator.volatility_scaling(metrics.realized_volatility);
                inputs.dynamic_multiplier = Some(adjustment.combined_multiplier);
                inputs.volatility_scaling = Some(scaling);
                let factor = adjustment.combined_multiplier * scaling;
                if factor < Decimal::ONE {
                    warnings.push(WarningCode::SizeReducedByMultiplier);
                }
                notional *= factor;
                adjustment.exposure_band
            }
            None => ctx.trend.exposure_band(),
        };

        // Trend bias constrains the net exposure band, not size directly;
        // the cap is whatever room is left in the order's direction.
        match self.cap_to_band(order, ctx, band, price, notional) {
            BandOutcome::Unchanged => {}
            BandOutcome::Capped(capped) => {
                warnings.push(WarningCode::SizeCappedByExposureBand);
                notional = capped;
            }
            BandOutcome::Exhausted => {
                return self.reject(order, RejectionCode::NetExposureBandExceeded, inputs);
            }
        }

        // (e) Cross-strategy coordination for contended symbols.
        let available = (effective_limit - used).max(Decimal::ZERO);
        let granted = self
            .coordinator
            .allocate(
                &order.symbol,
                available,
                CoordinationRequest {
                    strategy_id: order.strategy_id.clone(),
                    desired_notional: notional,
                    reduces_exposure: false,
                    sharpe: ctx.strategy_metrics.map(|m| m.sharpe),
                    submitted_at: order.submitted_at,
                },
            )
            .await;
        if granted < notional {
            warnings.push(WarningCode::SizeCappedByCoordinator);
            inputs.coordinated_notional = Some(granted);
            notional = granted;
        }

        let mut opening_granted = (notional / price).floor();
        if opening_granted < self.settings.min_viable_quantity {
            if closing_quantity.is_zero() {
                return self.reject_with(order, RejectionCode::BelowMinimumViableSize, inputs, warnings);
            }
            // The opening excess of a flip was sized away; the closing
            // portion still goes through.
            opening_granted = Decimal::ZERO;
        }

        self.finish(order, ctx, closing_quantity, opening_granted, effective_limit, warnings, inputs)
            .await
    }

    /// (f) Reserve the opening notional, retrying once at the largest
    /// feasible size, then re-check the mode before keeping the reservation.
    ///
    /// `closing_quantity` rides along for free: it reserves no capacity and
    /// survives a retry that shrinks the opening portion.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        order: &Order,
        ctx: &ValidationContext,
        closing_quantity: Decimal,
        opening_quantity: Decimal,
        effective_limit: Decimal,
        mut warnings: Vec<WarningCode>,
        inputs: DecisionInputs,
    ) -> ValidationResult {
        let price = ctx.price.unwrap_or(Decimal::ONE);
        let mut opening = opening_quantity;
        let handle = match self.aggregator.reserve(order, opening * price, effective_limit) {
            Ok(handle) => handle,
            Err(RiskError::InsufficientReservationCapacity { available, .. }) => {
                crate::observability::record_reservation_conflict();
                let retry_quantity = (available / price).floor();
                if retry_quantity < self.settings.min_viable_quantity && closing_quantity.is_zero()
                {
                    return self.reject_with(
                        order,
                        RejectionCode::InsufficientReservationCapacity,
                        inputs,
                        warnings,
                    );
                }
                opening = if retry_quantity < self.settings.min_viable_quantity {
                    Decimal::ZERO
                } else {
                    retry_quantity
                };
                match self.aggregator.reserve(order, opening * price, effective_limit) {
                    Ok(handle) => {
                        warnings.push(WarningCode::ReservationRetried);
                        handle
                    }
                    Err(_) => {
                        return self.reject_with(
                            order,
                            RejectionCode::InsufficientReservationCapacity,
                            inputs,
                            warnings,
                        );
                    }
                }
            }
            Err(_) => {
                return self.reject_with(
                    order,
                    RejectionCode::InsufficientReservationCapacity,
                    inputs,
                    warnings,
                );
            }
        };

        let quantity = closing_quantity + opening;

        // Mode transitions outrank in-flight validations: an emergency set
        // while this order was being sized must win.
        if let Some(_code) = self.state_machine.gate(&order.strategy_id) {
            if let Err(error) = self.aggregator.release(&handle) {
                tracing::warn!(%error, "rollback release failed");
            }
            return self.reject_with(order, RejectionCode::ModeChangedMidFlight, inputs, warnings);
        }

        tracing::debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            strategy = %order.strategy_id,
            requested = %order.quantity,
            approved = %quantity,
            "order approved"
        );
        ValidationResult {
            order_id: order.order_id.clone(),
            approved: true,
            requested_quantity: order.quantity,
            approved_quantity: quantity,
            warnings,
            rejections: Vec::new(),
            inputs,
            reservation_id: Some(handle.id),
        }
    }

    /// Minimum sizing factor across concentration, volatility, drawdown, and
    /// liquidity. Missing metrics substitute the conservative fallback
    /// factor rather than skipping the check.
    #[allow(clippy::too_many_arguments)]
    fn soft_factor(
        &self,
        order: &Order,
        ctx: &ValidationContext,
        limits: &LimitSet,
        symbol_used: Decimal,
        desired_notional: Decimal,
        warnings: &mut Vec<WarningCode>,
        inputs: &mut DecisionInputs,
    ) -> Decimal {
        let Some(snapshot) = ctx.snapshot.as_deref() else {
            tracing::warn!(
                order_id = %order.order_id,
                "no risk snapshot; applying fallback soft factor"
            );
            warnings.push(WarningCode::MetricsUnavailable);
            return self.settings.fallback_soft_factor;
        };
        inputs.portfolio_volatility = Some(snapshot.portfolio_volatility);
        inputs.drawdown = Some(snapshot.drawdown);

        let mut any_warning = false;
        let mut any_reduction = false;
        let mut apply = |threshold: &SoftThreshold, observed: Decimal, warning: WarningCode| {
            if threshold.warns(observed) {
                warnings.push(warning);
                any_warning = true;
            }
            let factor = threshold.sizing_factor(observed);
            if factor < Decimal::ONE {
                any_reduction = true;
            }
            factor
        };

        // Concentration against equity, not gross exposure: an empty book
        // must not make the first position read as 100% concentrated.
        let concentration = if ctx.equity > Decimal::ZERO {
            (symbol_used + desired_notional) / ctx.equity
        } else {
            Decimal::ZERO
        };
        let mut factor = apply(
            &limits.soft.concentration,
            concentration,
            WarningCode::ConcentrationWarning,
        );
        factor = factor.min(apply(
            &limits.soft.volatility,
            snapshot.portfolio_volatility,
            WarningCode::VolatilityWarning,
        ));
        factor = factor.min(apply(
            &limits.soft.drawdown,
            snapshot.drawdown,
            WarningCode::DrawdownWarning,
        ));
        if let Some(adv) = ctx.average_daily_volume {
            if adv > Decimal::ZERO {
                factor = factor.min(apply(
                    &limits.soft.liquidity,
                    desired_notional / adv,
                    WarningCode::LiquidityWarning,
                ));
            }
        }

        self.state_machine.observe_soft_limits(any_warning, any_reduction);
        inputs.soft_limit_factor = Some(factor);
        factor
    }

    fn cap_to_band(
        &self,
        order: &Order,
        ctx: &ValidationContext,
        band: NetExposureBand,
        price: Decimal,
        notional: Decimal,
    ) -> BandOutcome {
        if ctx.equity <= Decimal::ZERO {
            return BandOutcome::Unchanged;
        }
        let net = self.aggregator.exposure().net;
        let signed = order.signed_quantity() * price;
        let room = if signed > Decimal::ZERO {
            band.max * ctx.equity - net
        } else {
            net - band.min * ctx.equity
        };
        if room <= Decimal::ZERO {
            return BandOutcome::Exhausted;
        }
        if notional > room {
            let capped = (room / price).floor() * price;
            if capped < self.settings.min_viable_quantity * price {
                return BandOutcome::Exhausted;
            }
            return BandOutcome::Capped(capped);
        }
        BandOutcome::Unchanged
    }

    /// Per-strategy sliding-window order budget. The attempt is recorded
    /// whether or not it is admitted.
    fn admit_frequency(&self, strategy_id: &str, max_per_minute: u32) -> bool {
        let now = Instant::now();
        let mut windows = match self.order_times.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows.entry(strategy_id.to_string()).or_default();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= FREQUENCY_WINDOW)
        {
            window.pop_front();
        }
        window.push_back(now);
        window.len() <= max_per_minute as usize
    }

    fn emit_hard_rejection(
        &self,
        order: &Order,
        code: RejectionCode,
        observed: Decimal,
        limit: Decimal,
    ) {
        self.events.publish(RiskEvent::HardLimitRejected {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            code,
            observed,
            limit,
            timestamp: Utc::now(),
        });
    }

    fn reject(&self, order: &Order, code: RejectionCode, inputs: DecisionInputs) -> ValidationResult {
        self.reject_with(order, code, inputs, Vec::new())
    }

    fn reject_with(
        &self,
        order: &Order,
        code: RejectionCode,
        inputs: DecisionInputs,
        warnings: Vec<WarningCode>,
    ) -> ValidationResult {
        tracing::warn!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            strategy = %order.strategy_id,
            code = %code,
            "order rejected"
        );
        let mut result = ValidationResult::rejected(&order.order_id, order.quantity, code);
        result.inputs = inputs;
        result.warnings = warnings;
        result
    }
}

enum BandOutcome {
    Unchanged,
    Capped(Decimal),
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SplitPolicy;
    use crate::models::{Fill, OrderSide, PriceBounds, RiskSnapshot};
    use rust_decimal_macros::dec;

    fn validator() -> PreTradeValidator {
        validator_with(LimitSet::default(), dec!(1000000))
    }

    fn validator_with(limits: LimitSet, capital: Decimal) -> PreTradeValidator {
        let events = EventBus::default();
        PreTradeValidator::new(
            Arc::new(LimitRegistry::new(limits)),
            Arc::new(PortfolioAggregator::new(
                capital,
                Duration::from_secs(60),
                events.clone(),
            )),
            Arc::new(OperationalStateMachine::new(events.clone())),
            Arc::new(CrossStrategyCoordinator::new(
                Duration::from_millis(10),
                SplitPolicy::Proportional,
                dec!(0.1),
            )),
            AdjustmentCalculator::default(),
            events,
            ValidatorSettings {
                min_viable_quantity: Decimal::ONE,
                fallback_soft_factor: dec!(0.5),
            },
        )
    }

    fn order(symbol: &str, strategy: &str, quantity: Decimal) -> Order {
        Order {
            order_id: format!("ord-{symbol}-{quantity}"),
            symbol: symbol.to_string(),
            strategy_id: strategy.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            submitted_at: Utc::now(),
        }
    }

    fn healthy_snapshot(equity: Decimal) -> Arc<RiskSnapshot> {
        Arc::new(RiskSnapshot {
            portfolio_volatility: dec!(0.10),
            drawdown: dec!(0.02),
            gross_exposure: dec!(100000),
            net_exposure: dec!(0),
            sector_exposure: HashMap::new(),
            correlation: crate::models::CorrelationMatrix::identity(Vec::new()),
            var_95: dec!(1000),
            equity,
            computed_at: Utc::now(),
        })
    }

    fn ctx(price: Decimal, equity: Decimal) -> ValidationContext {
        ValidationContext {
            price: Some(price),
            average_daily_volume: Some(dec!(10000000)),
            equity,
            snapshot: Some(healthy_snapshot(equity)),
            strategy_metrics: Some(StrategyMetrics {
                sharpe: dec!(1.6),
                realized_volatility: dec!(0.30),
                drawdown: dec!(0.05),
            }),
            volatility_index: dec!(18),
            trend: MarketTrend::Sideways,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_order_approved_in_full() {
        let v = validator();
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &ctx(dec!(100), dec!(1000000))).await;
        assert!(result.approved, "rejections: {:?}", result.rejections);
        assert_eq!(result.approved_quantity, dec!(10));
        assert!(result.reservation_id.is_some());
        assert_eq!(result.inputs.price, Some(dec!(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_price_rejects() {
        let v = validator();
        let mut context = ctx(dec!(100), dec!(1000000));
        context.price = None;
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &context).await;
        assert_eq!(result.rejections, vec![RejectionCode::NoMarketData]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_order_requires_limit_price() {
        let v = validator();
        let mut o = order("AAPL", "s1", dec!(10));
        o.order_type = OrderType::Limit;
        let result = v.validate(&o, &ctx(dec!(100), dec!(1000000))).await;
        assert_eq!(result.rejections, vec![RejectionCode::MissingLimitPrice]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_bounds_hard_limit() {
        let mut limits = LimitSet::default();
        limits.hard.price_bounds.insert(
            "AAPL".to_string(),
            PriceBounds {
                min: dec!(50),
                max: dec!(150),
            },
        );
        let v = validator_with(limits, dec!(1000000));
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &ctx(dec!(200), dec!(1000000))).await;
        assert_eq!(result.rejections, vec![RejectionCode::PriceOutOfBounds]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_frequency_budget() {
        let mut limits = LimitSet::default();
        limits.hard.max_orders_per_minute = 2;
        let v = validator_with(limits, dec!(1000000));
        let context = ctx(dec!(100), dec!(1000000));

        for _ in 0..2 {
            let result = v.validate(&order("AAPL", "s1", dec!(1)), &context).await;
            assert!(result.approved);
        }
        let result = v.validate(&order("AAPL", "s1", dec!(1)), &context).await;
        assert_eq!(result.rejections, vec![RejectionCode::OrderFrequencyExceeded]);

        // A different strategy has its own budget.
        let result = v.validate(&order("AAPL", "s2", dec!(1)), &context).await;
        assert!(result.approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_limit_never_approved_unadjusted() {
        // Equity $100k, 10% cap -> effective limit $10,000 at phase 2.
        let v = validator();
        let context = ctx(dec!(400), dec!(100000));
        let result = v.validate(&order("AAPL", "s1", dec!(100)), &context).await;

        // $40,000 requested against a $10,000 limit: approval must come
        // reduced to fit, never in full.
        if result.approved {
            assert!(result.approved_quantity * dec!(400) <= dec!(10000));
            assert!(result.was_adjusted());
        } else {
            assert!(!result.rejections.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_tier_rejects() {
        let v = validator();
        let mut context = ctx(dec!(100), dec!(1000000));
        context.strategy_metrics = Some(StrategyMetrics {
            sharpe: dec!(0.1),
            realized_volatility: dec!(0.30),
            drawdown: dec!(0.05),
        });
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &context).await;
        assert_eq!(result.rejections, vec![RejectionCode::StrategyTierPaused]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_snapshot_applies_fallback_factor() {
        let v = validator();
        let mut context = ctx(dec!(100), dec!(1000000));
        context.snapshot = None;
        context.strategy_metrics = None;
        let result = v.validate(&order("AAPL", "s1", dec!(100)), &context).await;

        assert!(result.approved);
        // Fallback factor 0.5 halves the size instead of skipping the check.
        assert_eq!(result.approved_quantity, dec!(50));
        assert!(result.warnings.contains(&WarningCode::MetricsUnavailable));
        assert!(result.warnings.contains(&WarningCode::SizeReducedBySoftLimit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_drawdown_reduces_size() {
        let v = validator();
        let mut context = ctx(dec!(100), dec!(1000000));
        // Drawdown 17.5% sits halfway between reduction (15%) and halt (20%).
        let mut snapshot = healthy_snapshot(dec!(1000000));
        Arc::get_mut(&mut snapshot).unwrap().drawdown = dec!(0.175);
        context.snapshot = Some(snapshot);

        let result = v.validate(&order("AAPL", "s1", dec!(100)), &context).await;
        assert!(result.approved);
        assert_eq!(result.approved_quantity, dec!(50));
        assert!(result.warnings.contains(&WarningCode::DrawdownWarning));
        assert_eq!(result.inputs.soft_limit_factor, Some(dec!(0.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flip_excess_reserves_like_a_new_position() {
        let events = EventBus::default();
        let aggregator = Arc::new(PortfolioAggregator::new(
            dec!(1000000),
            Duration::from_secs(60),
            events.clone(),
        ));
        let v = PreTradeValidator::new(
            Arc::new(LimitRegistry::default()),
            Arc::clone(&aggregator),
            Arc::new(OperationalStateMachine::new(events.clone())),
            Arc::new(CrossStrategyCoordinator::new(
                Duration::from_millis(10),
                SplitPolicy::Proportional,
                dec!(0.1),
            )),
            AdjustmentCalculator::default(),
            events,
            ValidatorSettings {
                min_viable_quantity: Decimal::ONE,
                fallback_soft_factor: dec!(0.5),
            },
        );

        // Hold 5 shares long at $100.
        let open = order("AAPL", "s1", dec!(5));
        let handle = aggregator.reserve(&open, dec!(500), dec!(50000)).unwrap();
        aggregator
            .commit(
                &handle,
                &Fill {
                    order_id: open.order_id.clone(),
                    symbol: "AAPL".to_string(),
                    strategy_id: "s1".to_string(),
                    quantity: dec!(5),
                    price: dec!(100),
                    filled_at: Utc::now(),
                },
            )
            .unwrap();

        // Selling 50 closes the 5 held for free; the other 45 open a short
        // and must reserve capacity like any new position.
        let mut flip = order("AAPL", "s1", dec!(50));
        flip.side = OrderSide::Sell;
        let result = v.validate(&flip, &ctx(dec!(100), dec!(1000000))).await;

        assert!(result.approved, "rejections: {:?}", result.rejections);
        assert_eq!(result.approved_quantity, dec!(50));
        assert_eq!(aggregator.symbol_usage("AAPL").reserved, dec!(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_gate_rejects_before_anything_else() {
        let events = EventBus::default();
        let sm = Arc::new(OperationalStateMachine::new(events.clone()));
        sm.trigger_emergency("operator", "kill switch");
        let v = PreTradeValidator::new(
            Arc::new(LimitRegistry::default()),
            Arc::new(PortfolioAggregator::new(
                dec!(1000000),
                Duration::from_secs(60),
                events.clone(),
            )),
            sm,
            Arc::new(CrossStrategyCoordinator::new(
                Duration::from_millis(10),
                SplitPolicy::Proportional,
                dec!(0.1),
            )),
            AdjustmentCalculator::default(),
            events,
            ValidatorSettings {
                min_viable_quantity: Decimal::ONE,
                fallback_soft_factor: dec!(0.5),
            },
        );
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &ctx(dec!(100), dec!(1000000))).await;
        assert_eq!(result.rejections, vec![RejectionCode::ModeForbidsOrder]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exposure_band_caps_long_bias() {
        let v = validator();
        let mut context = ctx(dec!(100), dec!(100000));
        context.trend = MarketTrend::StrongDown; // long room is zero
        let result = v.validate(&order("AAPL", "s1", dec!(10)), &context).await;
        assert_eq!(result.rejections, vec![RejectionCode::NetExposureBandExceeded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_rejection_emits_event() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut limits = LimitSet::default();
        limits.hard.price_bounds.insert(
            "AAPL".to_string(),
            PriceBounds {
                min: dec!(50),
                max: dec!(150),
            },
        );
        let v = PreTradeValidator::new(
            Arc::new(LimitRegistry::new(limits)),
            Arc::new(PortfolioAggregator::new(
                dec!(1000000),
                Duration::from_secs(60),
                events.clone(),
            )),
            Arc::new(OperationalStateMachine::new(events.clone())),
            Arc::new(CrossStrategyCoordinator::new(
                Duration::from_millis(10),
                SplitPolicy::Proportional,
                dec!(0.1),
            )),
            AdjustmentCalculator::default(),
            events,
            ValidatorSettings {
                min_viable_quantity: Decimal::ONE,
                fallback_soft_factor: dec!(0.5),
            },
        );

        let _ = v.validate(&order("AAPL", "s1", dec!(10)), &ctx(dec!(200), dec!(1000000))).await;
        match rx.try_recv().unwrap() {
            RiskEvent::HardLimitRejected { code, .. } => {
                assert_eq!(code, RejectionCode::PriceOutOfBounds);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
