//! The engine facade: wires every component behind the external interface.
//!
//! Collaborators feed market data, returns, equity, and fills in; strategies
//! submit orders through [`RiskEngine::validate_order`]; the CLI and
//! dashboard are thin clients over the read-only getters and the control
//! actions. The engine itself performs no network or disk I/O.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::adjustment::{AdjustmentCalculator, MarketTrend};
use crate::config::EngineConfig;
use crate::coordinator::CrossStrategyCoordinator;
use crate::error::RiskError;
use crate::events::{EventBus, RiskEvent};
use crate::metrics::{EquityTracker, MetricsEngine, MetricsError, StrategyMetrics};
use crate::models::{
    CorrelationMatrix, Fill, LimitSet, OperationalMode, Order, RiskSnapshot, ValidationResult,
};
use crate::portfolio::{ExposureReport, PortfolioAggregator, ReservationHandle};
use crate::registry::LimitRegistry;
use crate::state_machine::OperationalStateMachine;
use crate::validator::{PreTradeValidator, ValidationContext, ValidatorSettings};

/// Market inputs supplied by external collaborators.
#[derive(Debug)]
struct MarketData {
    prices: HashMap<String, Decimal>,
    average_daily_volumes: HashMap<String, Decimal>,
    volatility_index: Decimal,
    trend: MarketTrend,
    correlation: CorrelationMatrix,
}

impl Default for MarketData {
    fn default() -> Self {
        Self {
            prices: HashMap::new(),
            average_daily_volumes: HashMap::new(),
            volatility_index: Decimal::from(20_u64),
            trend: MarketTrend::Sideways,
            correlation: CorrelationMatrix::identity(Vec::new()),
        }
    }
}

/// Risk limit enforcement and aggregation engine.
pub struct RiskEngine {
    config: EngineConfig,
    registry: Arc<LimitRegistry>,
    aggregator: Arc<PortfolioAggregator>,
    state_machine: Arc<OperationalStateMachine>,
    validator: PreTradeValidator,
    metrics_engine: MetricsEngine,
    calculator: AdjustmentCalculator,
    events: EventBus,
    market: RwLock<MarketData>,
    strategy_returns: RwLock<HashMap<String, Vec<Decimal>>>,
    symbol_returns: RwLock<HashMap<String, Vec<Decimal>>>,
    strategy_equity: RwLock<HashMap<String, EquityTracker>>,
    equity: RwLock<EquityTracker>,
    snapshot: RwLock<Option<Arc<RiskSnapshot>>>,
}

impl RiskEngine {
    /// Build an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`RiskError::ConfigValidationFailure`] when the configuration is
    /// rejected.
    pub fn new(config: EngineConfig) -> Result<Self, RiskError> {
        config
            .validate()
            .map_err(|e| RiskError::ConfigValidationFailure(e.to_string()))?;

        let events = EventBus::new(config.event_capacity);
        let registry = Arc::new(LimitRegistry::new(config.limits.clone()));
        let aggregator = Arc::new(PortfolioAggregator::new(
            config.initial_equity,
            Duration::from_secs(config.reservation_ttl_secs),
            events.clone(),
        ));
        let state_machine = Arc::new(OperationalStateMachine::new(events.clone()));
        let coordinator = Arc::new(CrossStrategyCoordinator::new(
            Duration::from_millis(config.epoch_window_ms),
            config.split_policy,
            config.sharpe_floor_weight,
        ));
        let calculator = AdjustmentCalculator::new(config.target_volatility);
        let validator = PreTradeValidator::new(
            Arc::clone(&registry),
            Arc::clone(&aggregator),
            Arc::clone(&state_machine),
            coordinator,
            calculator,
            events.clone(),
            ValidatorSettings {
                min_viable_quantity: config.min_viable_quantity,
                fallback_soft_factor: config.fallback_soft_factor,
            },
        );
        let metrics_engine = MetricsEngine::new(config.min_metric_samples, config.risk_free_daily);
        let equity = EquityTracker::new(config.initial_equity);

        Ok(Self {
            config,
            registry,
            aggregator,
            state_machine,
            validator,
            metrics_engine,
            calculator,
            events,
            market: RwLock::new(MarketData::default()),
            strategy_returns: RwLock::new(HashMap::new()),
            symbol_returns: RwLock::new(HashMap::new()),
            strategy_equity: RwLock::new(HashMap::new()),
            equity: RwLock::new(equity),
            snapshot: RwLock::new(None),
        })
    }

    // ========================================================================
    // Order admission
    // ========================================================================

    /// Validate one proposed order: the sole order-admission entry point.
    pub async fn validate_order(&self, order: &Order) -> ValidationResult {
        let ctx = self.build_context(order);
        self.validator.validate(order, &ctx).await
    }

    fn build_context(&self, order: &Order) -> ValidationContext {
        let market = read(&self.market);
        ValidationContext {
            price: market.prices.get(&order.symbol).copied(),
            average_daily_volume: market.average_daily_volumes.get(&order.symbol).copied(),
            equity: read(&self.equity).current(),
            snapshot: read(&self.snapshot).clone(),
            strategy_metrics: self.try_strategy_metrics(&order.strategy_id),
            volatility_index: market.volatility_index,
            trend: market.trend,
        }
    }

    /// Convert an approved order's reservation into a position on fill.
    ///
    /// # Errors
    ///
    /// [`RiskError::UnknownReservation`] if the reservation was already
    /// committed, released, or expired.
    pub fn record_fill(&self, reservation_id: Uuid, fill: &Fill) -> Result<(), RiskError> {
        let handle = ReservationHandle {
            id: reservation_id,
            symbol: fill.symbol.clone(),
            strategy_id: fill.strategy_id.clone(),
        };
        self.aggregator.commit(&handle, fill)
    }

    /// Release an approved order's reservation without a fill.
    ///
    /// # Errors
    ///
    /// [`RiskError::UnknownReservation`] if the reservation was already
    /// committed, released, or expired.
    pub fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        symbol: &str,
        strategy_id: &str,
    ) -> Result<(), RiskError> {
        let handle = ReservationHandle {
            id: reservation_id,
            symbol: symbol.to_string(),
            strategy_id: strategy_id.to_string(),
        };
        self.aggregator.release(&handle)
    }

    /// Release every reservation past its TTL. Hosts call this periodically;
    /// the aggregator also sweeps lazily on each reserve.
    pub fn sweep_reservations(&self) {
        self.aggregator.sweep_expired();
    }

    // ========================================================================
    // Read-only surface
    // ========================================================================

    /// Latest published risk snapshot, computing one if none exists yet.
    ///
    /// Idempotent between fills and recomputes: repeated calls return the
    /// same published value.
    pub fn get_portfolio_metrics(&self) -> Arc<RiskSnapshot> {
        if let Some(snapshot) = read(&self.snapshot).clone() {
            return snapshot;
        }
        self.recompute_snapshot()
    }

    /// Rolling metrics for one strategy.
    ///
    /// # Errors
    ///
    /// [`RiskError::InsufficientMetricsData`] when the strategy lacks the
    /// configured minimum of return observations.
    pub fn get_strategy_metrics(&self, strategy_id: &str) -> Result<StrategyMetrics, RiskError> {
        let returns = read(&self.strategy_returns);
        let series = returns.get(strategy_id).map_or(&[][..], Vec::as_slice);
        let tracker = read(&self.strategy_equity)
            .get(strategy_id)
            .cloned()
            .unwrap_or_else(|| EquityTracker::new(Decimal::ONE));
        self.metrics_engine
            .strategy_metrics(series, &tracker)
            .map_err(|e| match e {
                MetricsError::InsufficientData { required, actual } => {
                    RiskError::InsufficientMetricsData { required, actual }
                }
                MetricsError::MissingCorrelation => RiskError::InsufficientMetricsData {
                    required: self.metrics_engine.min_samples,
                    actual: 0,
                },
            })
    }

    /// Current operational mode.
    pub fn get_current_mode(&self) -> OperationalMode {
        self.state_machine.current_mode()
    }

    /// Combined dynamic multiplier currently applied to a strategy.
    ///
    /// # Errors
    ///
    /// [`RiskError::InsufficientMetricsData`] when the strategy cannot be
    /// tiered yet.
    pub fn get_risk_multiplier(&self, strategy_id: &str) -> Result<Decimal, RiskError> {
        let metrics = self.get_strategy_metrics(strategy_id)?;
        let market = read(&self.market);
        let adjustment = self
            .calculator
            .compute(&metrics, market.volatility_index, market.trend);
        Ok(adjustment.combined_multiplier)
    }

    /// Current exposure breakdown.
    pub fn get_exposure(&self) -> ExposureReport {
        self.aggregator.exposure()
    }

    /// The active limit set.
    pub fn get_config(&self) -> Arc<LimitSet> {
        self.registry.current()
    }

    /// Subscribe to audit and risk events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RiskEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Control surface
    // ========================================================================

    /// Pause new orders from a strategy.
    pub fn pause_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        self.state_machine.pause_strategy(strategy_id, actor, reason);
    }

    /// Step a strategy one level back toward active.
    pub fn resume_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        self.state_machine.resume_strategy(strategy_id, actor, reason);
    }

    /// Halt a strategy; its open positions remain, new orders are rejected.
    pub fn halt_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        self.state_machine.halt_strategy(strategy_id, actor, reason);
    }

    /// Reject all new orders account-wide. Never liquidates.
    pub fn trigger_emergency(&self, actor: &str, reason: &str) {
        self.state_machine.trigger_emergency(actor, reason);
    }

    /// Leave emergency; every strategy is left paused.
    pub fn resume_from_emergency(&self, actor: &str, reason: &str) {
        self.state_machine.resume_from_emergency(actor, reason);
    }

    /// Step the account mode back up from a soft restriction.
    pub fn ease_restriction(&self, actor: &str, reason: &str) {
        self.state_machine.ease_restriction(actor, reason);
    }

    /// Validate and atomically install a new limit set.
    ///
    /// # Errors
    ///
    /// [`RiskError::ConfigValidationFailure`] when the candidate is rejected;
    /// the prior set stays active, never partially applied.
    pub fn update_config(&self, candidate: LimitSet) -> Result<(), RiskError> {
        candidate
            .validate()
            .map_err(RiskError::ConfigValidationFailure)?;
        self.registry.swap(candidate);
        self.events.publish(RiskEvent::ConfigSwapped {
            version: self.registry.version(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // ========================================================================
    // Market-data and accounting inputs
    // ========================================================================

    /// Update the market price for a symbol.
    pub fn update_price(&self, symbol: &str, price: Decimal) {
        write(&self.market).prices.insert(symbol.to_string(), price);
        self.aggregator.set_market_price(symbol, price);
    }

    /// Record a symbol's average daily traded notional.
    pub fn set_average_daily_volume(&self, symbol: &str, notional: Decimal) {
        write(&self.market)
            .average_daily_volumes
            .insert(symbol.to_string(), notional);
    }

    /// Record a symbol's sector classification.
    pub fn set_sector(&self, symbol: &str, sector: &str) {
        self.aggregator.set_sector(symbol, sector);
    }

    /// Update the market-wide volatility index level.
    pub fn set_volatility_index(&self, index: Decimal) {
        write(&self.market).volatility_index = index;
    }

    /// Update the market trend classification.
    pub fn set_market_trend(&self, trend: MarketTrend) {
        write(&self.market).trend = trend;
    }

    /// Install a new correlation matrix for snapshot computation.
    pub fn set_correlation_matrix(&self, correlation: CorrelationMatrix) {
        write(&self.market).correlation = correlation;
    }

    /// Record a new account equity observation. Feeds the drawdown tracker,
    /// the account capital pool, and the emergency trigger.
    pub fn update_equity(&self, equity: Decimal) {
        let drawdown = {
            let mut tracker = write(&self.equity);
            tracker.update(equity);
            tracker.drawdown()
        };
        self.aggregator.set_account_capital(equity);
        self.state_machine
            .observe_account_drawdown(drawdown, self.config.account_emergency_drawdown);
    }

    /// Append a daily return observation for a strategy.
    pub fn record_strategy_return(&self, strategy_id: &str, daily_return: Decimal) {
        write(&self.strategy_returns)
            .entry(strategy_id.to_string())
            .or_default()
            .push(daily_return);
    }

    /// Append a daily return observation for a symbol.
    pub fn record_symbol_return(&self, symbol: &str, daily_return: Decimal) {
        write(&self.symbol_returns)
            .entry(symbol.to_string())
            .or_default()
            .push(daily_return);
    }

    /// Record a strategy's equity observation. Feeds the per-strategy
    /// drawdown tracker and the automatic strategy-halt trigger.
    pub fn update_strategy_equity(&self, strategy_id: &str, equity: Decimal) {
        let drawdown = {
            let mut trackers = write(&self.strategy_equity);
            let tracker = trackers
                .entry(strategy_id.to_string())
                .or_insert_with(|| EquityTracker::new(equity));
            tracker.update(equity);
            tracker.drawdown()
        };
        self.state_machine.observe_strategy_drawdown(
            strategy_id,
            drawdown,
            self.config.strategy_halt_drawdown,
        );
    }

    // ========================================================================
    // Snapshot recomputation
    // ========================================================================

    /// Recompute and publish a fresh immutable risk snapshot.
    ///
    /// Runs on a periodic cadence (or on demand), never per-order; readers
    /// always consume the latest published value without blocking on this.
    pub fn recompute_snapshot(&self) -> Arc<RiskSnapshot> {
        let exposure = self.aggregator.exposure();
        let (equity, drawdown) = {
            let tracker = read(&self.equity);
            (tracker.current(), tracker.drawdown())
        };
        let portfolio_volatility = self.compute_portfolio_volatility(equity);
        let var_95 = self.metrics_engine.var_95(portfolio_volatility, equity);
        let correlation = read(&self.market).correlation.clone();

        let snapshot = Arc::new(RiskSnapshot {
            portfolio_volatility,
            drawdown,
            gross_exposure: exposure.gross,
            net_exposure: exposure.net,
            sector_exposure: exposure.by_sector,
            correlation,
            var_95,
            equity,
            computed_at: Utc::now(),
        });
        *write(&self.snapshot) = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Variance-covariance portfolio volatility over open positions. When a
    /// symbol lacks history or correlation coverage, the previous published
    /// value is carried rather than silently reading as zero risk.
    fn compute_portfolio_volatility(&self, equity: Decimal) -> Decimal {
        let positions = self.aggregator.positions();
        if positions.is_empty() || equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let symbol_returns = read(&self.symbol_returns);
        let mut weights = Vec::new();
        let mut volatilities = Vec::new();
        for position in &positions {
            let series = symbol_returns
                .get(&position.symbol)
                .map_or(&[][..], Vec::as_slice);
            match self.metrics_engine.annualized_volatility(series) {
                Ok(vol) => {
                    weights.push((position.symbol.clone(), position.signed_value() / equity));
                    volatilities.push((position.symbol.clone(), vol));
                }
                Err(error) => {
                    tracing::warn!(symbol = %position.symbol, %error, "volatility unavailable; carrying previous snapshot value");
                    return self.previous_volatility();
                }
            }
        }

        let correlation = read(&self.market).correlation.clone();
        match self
            .metrics_engine
            .portfolio_volatility(&weights, &volatilities, &correlation)
        {
            Ok(vol) => vol,
            Err(error) => {
                tracing::warn!(%error, "portfolio volatility unavailable; carrying previous snapshot value");
                self.previous_volatility()
            }
        }
    }

    fn previous_volatility(&self) -> Decimal {
        read(&self.snapshot)
            .as_ref()
            .map_or(Decimal::ZERO, |s| s.portfolio_volatility)
    }

    fn try_strategy_metrics(&self, strategy_id: &str) -> Option<StrategyMetrics> {
        self.get_strategy_metrics(strategy_id).ok()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderType};
    use rust_decimal_macros::dec;

    fn engine() -> RiskEngine {
        let mut config = EngineConfig::default();
        config.epoch_window_ms = 10;
        RiskEngine::new(config).unwrap()
    }

    fn order(symbol: &str, strategy: &str, quantity: Decimal) -> Order {
        Order {
            order_id: format!("ord-{symbol}"),
            symbol: symbol.to_string(),
            strategy_id: strategy.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            submitted_at: Utc::now(),
        }
    }

    fn fill_for(order: &Order, quantity: Decimal, price: Decimal) -> Fill {
        Fill {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            strategy_id: order.strategy_id.clone(),
            quantity,
            price,
            filled_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_reserve_commit_flow() {
        let engine = engine();
        engine.update_price("AAPL", dec!(100));

        let o = order("AAPL", "s1", dec!(10));
        let result = engine.validate_order(&o).await;
        assert!(result.approved, "rejections: {:?}", result.rejections);
        let reservation = result.reservation_id.unwrap();

        engine
            .record_fill(reservation, &fill_for(&o, result.approved_quantity, dec!(100)))
            .unwrap();
        let exposure = engine.get_exposure();
        assert_eq!(exposure.gross, result.approved_quantity * dec!(100));
        assert_eq!(exposure.reserved, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_config_reload_keeps_prior_set() {
        let engine = engine();
        let before = engine.get_config();

        let mut bad = LimitSet::default();
        bad.soft.drawdown.reduction = dec!(0.05);
        bad.soft.drawdown.warning = dec!(0.10); // warning above reduction
        let err = engine.update_config(bad).unwrap_err();
        assert!(matches!(err, RiskError::ConfigValidationFailure(_)));
        assert_eq!(engine.get_config().hard, before.hard);
        assert_eq!(engine.get_config().soft, before.soft);
    }

    #[tokio::test(start_paused = true)]
    async fn test_portfolio_metrics_idempotent_between_fills() {
        let engine = engine();
        engine.update_price("AAPL", dec!(100));
        engine.recompute_snapshot();

        let a = engine.get_portfolio_metrics();
        let b = engine.get_portfolio_metrics();
        assert_eq!(a.computed_at, b.computed_at);
        assert_eq!(a.gross_exposure, b.gross_exposure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equity_drawdown_triggers_emergency() {
        let engine = engine();
        engine.update_equity(dec!(102340.56));
        engine.update_equity(dec!(102340.56) * dec!(0.7501));
        assert_eq!(engine.get_current_mode(), OperationalMode::Normal);

        engine.update_equity(dec!(102340.56) * dec!(0.75));
        assert_eq!(engine.get_current_mode(), OperationalMode::AccountEmergency);

        // And the gate now rejects everything.
        engine.update_price("AAPL", dec!(100));
        let result = engine.validate_order(&order("AAPL", "s1", dec!(1))).await;
        assert!(!result.approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_metrics_insufficient_data() {
        let engine = engine();
        for _ in 0..5 {
            engine.record_strategy_return("s1", dec!(0.01));
        }
        let err = engine.get_strategy_metrics("s1").unwrap_err();
        assert_eq!(
            err,
            RiskError::InsufficientMetricsData {
                required: 20,
                actual: 5
            }
        );
        assert!(engine.get_risk_multiplier("s1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_risk_multiplier_reflects_tier() {
        let engine = engine();
        // Alternating positive-heavy returns: positive Sharpe, low drawdown.
        for i in 0..30 {
            let r = if i % 2 == 0 { dec!(0.02) } else { dec!(-0.001) };
            engine.record_strategy_return("s1", r);
        }
        engine.update_strategy_equity("s1", dec!(50000));
        let multiplier = engine.get_risk_multiplier("s1").unwrap();
        assert!(multiplier > Decimal::ZERO);
        assert!(multiplier <= dec!(1.5));
    }
}
