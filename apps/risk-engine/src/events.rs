//! Audit and risk event bus.
//!
//! Emergency transitions and hard-limit violations are never silently
//! swallowed: every one is published here even when no external listener is
//! subscribed (the send simply has no receivers, and is also logged).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{OperationalMode, RejectionCode};

/// Audit record for an operational-mode transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Who triggered it ("system" for automatic transitions).
    pub actor: String,
    /// The control action or automatic trigger name.
    pub action: String,
    /// Mode before the transition.
    pub previous_mode: OperationalMode,
    /// Mode after the transition.
    pub new_mode: OperationalMode,
    /// Human-readable reason.
    pub reason: String,
}

impl AuditEvent {
    /// Build a transition record stamped now.
    #[must_use]
    pub fn transition(
        actor: &str,
        action: &str,
        previous_mode: OperationalMode,
        new_mode: OperationalMode,
        reason: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            previous_mode,
            new_mode,
            reason: reason.to_string(),
        }
    }
}

/// Events emitted by the engine for external consumers (alerting, audit log).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEvent {
    /// Operational mode changed (automatic or manual).
    ModeChanged(AuditEvent),
    /// An order was rejected by a hard limit.
    HardLimitRejected {
        /// Rejected order id.
        order_id: String,
        /// Symbol of the rejected order.
        symbol: String,
        /// Which limit rejected it.
        code: RejectionCode,
        /// The observed value that breached the limit.
        observed: Decimal,
        /// The limit in force at decision time.
        limit: Decimal,
        /// Rejection timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A new limit set was swapped in.
    ConfigSwapped {
        /// New registry version.
        version: u64,
        /// Swap timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A reservation expired past its TTL and was released.
    ReservationExpired {
        /// The expired reservation.
        reservation_id: Uuid,
        /// Symbol whose capacity was freed.
        symbol: String,
        /// Notional freed.
        notional: Decimal,
        /// Expiry timestamp.
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`RiskEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RiskEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RiskEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Emission is mandatory; having no subscribers is not
    /// an error.
    pub fn publish(&self, event: RiskEvent) {
        match &event {
            RiskEvent::ModeChanged(audit) => {
                crate::observability::record_mode_transition(&audit.new_mode.to_string());
                tracing::info!(
                    actor = %audit.actor,
                    action = %audit.action,
                    previous = %audit.previous_mode,
                    new = %audit.new_mode,
                    reason = %audit.reason,
                    "operational mode changed"
                );
            }
            RiskEvent::HardLimitRejected {
                order_id,
                symbol,
                code,
                observed,
                limit,
                ..
            } => tracing::warn!(
                order_id = %order_id,
                symbol = %symbol,
                code = %code,
                observed = %observed,
                limit = %limit,
                "hard limit rejection"
            ),
            RiskEvent::ConfigSwapped { version, .. } => {
                crate::observability::record_config_swap();
                tracing::info!(version, "limit set swapped");
            }
            RiskEvent::ReservationExpired {
                reservation_id,
                symbol,
                notional,
                ..
            } => {
                crate::observability::record_reservation_expiry();
                tracing::warn!(
                    reservation_id = %reservation_id,
                    symbol = %symbol,
                    notional = %notional,
                    "reservation expired"
                );
            }
        }
        // A send error only means no subscriber is connected right now.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(RiskEvent::ConfigSwapped {
            version: 2,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let audit = AuditEvent::transition(
            "operator",
            "TRIGGER_EMERGENCY",
            OperationalMode::Normal,
            OperationalMode::AccountEmergency,
            "manual kill",
        );
        bus.publish(RiskEvent::ModeChanged(audit));

        let received = rx.try_recv().unwrap();
        match received {
            RiskEvent::ModeChanged(event) => {
                assert_eq!(event.actor, "operator");
                assert_eq!(event.new_mode, OperationalMode::AccountEmergency);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_hard_limit_event_round_trip() {
        let event = RiskEvent::HardLimitRejected {
            order_id: "ord-1".to_string(),
            symbol: "AAPL".to_string(),
            code: RejectionCode::PositionLimitExceeded,
            observed: dec!(60000),
            limit: dec!(50000),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("HARD_LIMIT_REJECTED"));
        assert!(json.contains("POSITION_LIMIT_EXCEEDED"));
    }
}
