//! Operational state machine.
//!
//! Tracks the account-wide [`OperationalMode`] plus a per-strategy status.
//! Automatic transitions (driven by drawdown and soft-limit observations)
//! only ever move toward a more restrictive mode. Moving back up requires an
//! explicit control action, one step at a time, and resuming from an account
//! emergency leaves every strategy individually paused.
//!
//! Every transition emits an audit event, whether or not anyone listens.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{AuditEvent, EventBus, RiskEvent};
use crate::models::{OperationalMode, RejectionCode};

/// Per-strategy operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyStatus {
    /// Orders flow normally.
    Active,
    /// New orders rejected; one resume step away from active.
    Paused,
    /// New orders rejected; existing positions stay open.
    Halted,
}

#[derive(Debug)]
struct MachineState {
    mode: OperationalMode,
    strategies: HashMap<String, StrategyStatus>,
    // Status assumed for strategies the machine has never tracked. Flips to
    // Paused on an emergency resume so untracked strategies cannot slip
    // straight back into trading.
    default_status: StrategyStatus,
}

impl MachineState {
    fn status_of(&self, strategy_id: &str) -> StrategyStatus {
        self.strategies
            .get(strategy_id)
            .copied()
            .unwrap_or(self.default_status)
    }
}

/// The single authority the validator consults before admitting an order.
#[derive(Debug)]
pub struct OperationalStateMachine {
    state: RwLock<MachineState>,
    events: EventBus,
}

impl OperationalStateMachine {
    /// Create a machine in [`OperationalMode::Normal`].
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            state: RwLock::new(MachineState {
                mode: OperationalMode::Normal,
                strategies: HashMap::new(),
                default_status: StrategyStatus::Active,
            }),
            events,
        }
    }

    /// Current account-wide mode.
    #[must_use]
    pub fn current_mode(&self) -> OperationalMode {
        self.read().mode.clone()
    }

    /// Status of one strategy. Untracked strategies take the current default
    /// status: active, or paused after an emergency resume.
    #[must_use]
    pub fn strategy_status(&self, strategy_id: &str) -> StrategyStatus {
        self.read().status_of(strategy_id)
    }

    /// Whether a new order from this strategy may proceed.
    ///
    /// Returns the rejection code that applies, or `None` when admitted.
    #[must_use]
    pub fn gate(&self, strategy_id: &str) -> Option<RejectionCode> {
        let state = self.read();
        if state.mode.blocks_all_orders() {
            return Some(RejectionCode::ModeForbidsOrder);
        }
        match state.status_of(strategy_id) {
            StrategyStatus::Halted | StrategyStatus::Paused => {
                Some(RejectionCode::ModeForbidsOrder)
            }
            StrategyStatus::Active => None,
        }
    }

    // ========================================================================
    // Automatic transitions (downward only)
    // ========================================================================

    /// Apply soft-limit observations. Warning breaches push `Normal` to
    /// `SoftWarning`; reduction breaches push further to `SoftReduced`.
    pub fn observe_soft_limits(&self, any_warning: bool, any_reduction: bool) {
        let target = if any_reduction {
            OperationalMode::SoftReduced
        } else if any_warning {
            OperationalMode::SoftWarning
        } else {
            return;
        };
        self.escalate("system", "SOFT_LIMIT_BREACH", target, "soft limit threshold breached");
    }

    /// Halt a strategy whose drawdown reached the halt threshold.
    pub fn observe_strategy_drawdown(
        &self,
        strategy_id: &str,
        drawdown: Decimal,
        halt_threshold: Decimal,
    ) {
        if drawdown < halt_threshold {
            return;
        }
        let mut guard = self.write();
        let state = &mut *guard;
        if state.status_of(strategy_id) == StrategyStatus::Halted {
            return;
        }
        state
            .strategies
            .insert(strategy_id.to_string(), StrategyStatus::Halted);
        let target = OperationalMode::StrategyHalted {
            strategy_id: strategy_id.to_string(),
        };
        let reason = format!("strategy drawdown {drawdown} reached halt threshold {halt_threshold}");
        Self::escalate_locked(state, &self.events, "system", "STRATEGY_DRAWDOWN_HALT", target, &reason);
    }

    /// Enter account emergency when account drawdown reaches the threshold.
    pub fn observe_account_drawdown(&self, drawdown: Decimal, emergency_threshold: Decimal) {
        if drawdown < emergency_threshold {
            return;
        }
        let reason =
            format!("account drawdown {drawdown} reached emergency threshold {emergency_threshold}");
        self.escalate(
            "system",
            "ACCOUNT_DRAWDOWN_EMERGENCY",
            OperationalMode::AccountEmergency,
            &reason,
        );
    }

    // ========================================================================
    // Manual control surface
    // ========================================================================

    /// Pause new orders from a strategy.
    pub fn pause_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        let mut state = self.write();
        if state.status_of(strategy_id) != StrategyStatus::Active {
            return;
        }
        state
            .strategies
            .insert(strategy_id.to_string(), StrategyStatus::Paused);
        let mode = state.mode.clone();
        self.emit(actor, &format!("PAUSE_STRATEGY:{strategy_id}"), mode.clone(), mode, reason);
    }

    /// Step a strategy one level back up: halted becomes paused, paused
    /// becomes active. Also steps the account mode up one level when it was
    /// halted on this strategy's account.
    pub fn resume_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        let mut state = self.write();
        let next = match state.status_of(strategy_id) {
            StrategyStatus::Halted => StrategyStatus::Paused,
            StrategyStatus::Paused => StrategyStatus::Active,
            StrategyStatus::Active => return,
        };
        state.strategies.insert(strategy_id.to_string(), next);

        let previous = state.mode.clone();
        let halted_on_this = matches!(
            &state.mode,
            OperationalMode::StrategyHalted { strategy_id: id } if id.as_str() == strategy_id
        );
        if halted_on_this && next == StrategyStatus::Paused {
            state.mode = OperationalMode::SoftReduced;
        }
        let new = state.mode.clone();
        self.emit(actor, &format!("RESUME_STRATEGY:{strategy_id}"), previous, new, reason);
    }

    /// Halt a strategy by operator action.
    pub fn halt_strategy(&self, strategy_id: &str, actor: &str, reason: &str) {
        let mut state = self.write();
        state
            .strategies
            .insert(strategy_id.to_string(), StrategyStatus::Halted);
        let target = OperationalMode::StrategyHalted {
            strategy_id: strategy_id.to_string(),
        };
        Self::escalate_locked(
            &mut state,
            &self.events,
            actor,
            &format!("HALT_STRATEGY:{strategy_id}"),
            target,
            reason,
        );
    }

    /// Enter account emergency by operator action. Rejects all new orders
    /// account-wide; never liquidates.
    pub fn trigger_emergency(&self, actor: &str, reason: &str) {
        self.escalate(actor, "TRIGGER_EMERGENCY", OperationalMode::AccountEmergency, reason);
    }

    /// Leave account emergency. The account returns to `Normal` but every
    /// strategy is left paused, including ones the machine has never
    /// tracked, and must be resumed individually.
    pub fn resume_from_emergency(&self, actor: &str, reason: &str) {
        let mut state = self.write();
        if state.mode != OperationalMode::AccountEmergency {
            tracing::warn!(mode = %state.mode, "resume_from_emergency outside emergency ignored");
            return;
        }
        let previous = state.mode.clone();
        state.mode = OperationalMode::Normal;
        for status in state.strategies.values_mut() {
            if *status != StrategyStatus::Halted {
                *status = StrategyStatus::Paused;
            }
        }
        // Strategies seen for the first time after the resume read this
        // default and come back paused as well.
        state.default_status = StrategyStatus::Paused;
        self.emit(actor, "RESUME_FROM_EMERGENCY", previous, OperationalMode::Normal, reason);
    }

    /// Step the account mode one level back up from a soft restriction.
    /// Has no effect on halted or emergency modes, which have their own
    /// resume actions.
    pub fn ease_restriction(&self, actor: &str, reason: &str) {
        let mut state = self.write();
        let next = match state.mode {
            OperationalMode::SoftReduced => OperationalMode::SoftWarning,
            OperationalMode::SoftWarning => OperationalMode::Normal,
            _ => return,
        };
        let previous = state.mode.clone();
        state.mode = next.clone();
        self.emit(actor, "EASE_RESTRICTION", previous, next, reason);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Move to `target` only when it is more restrictive than the current
    /// mode.
    fn escalate(&self, actor: &str, action: &str, target: OperationalMode, reason: &str) {
        let mut state = self.write();
        Self::escalate_locked(&mut state, &self.events, actor, action, target, reason);
    }

    fn escalate_locked(
        state: &mut MachineState,
        events: &EventBus,
        actor: &str,
        action: &str,
        target: OperationalMode,
        reason: &str,
    ) {
        if target.restrictiveness() <= state.mode.restrictiveness() {
            return;
        }
        let previous = state.mode.clone();
        state.mode = target.clone();
        if target == OperationalMode::AccountEmergency {
            tracing::error!(previous = %previous, reason, "account emergency engaged");
        }
        events.publish(RiskEvent::ModeChanged(AuditEvent::transition(
            actor, action, previous, target, reason,
        )));
    }

    fn emit(
        &self,
        actor: &str,
        action: &str,
        previous: OperationalMode,
        new: OperationalMode,
        reason: &str,
    ) {
        self.events.publish(RiskEvent::ModeChanged(AuditEvent::transition(
            actor, action, previous, new, reason,
        )));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MachineState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MachineState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
