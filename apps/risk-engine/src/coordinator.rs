//! Cross-strategy coordinator.
//!
//! When several strategies target the same symbol inside one decision epoch,
//! their requests are resolved together against the symbol's remaining
//! capacity. Requests arriving after resolution begins open a fresh epoch and
//! are never interleaved mid-resolution.
//!
//! Resolution order: exposure-reducing requests are granted in full without
//! consuming capacity; the remaining capacity is split across the adding
//! requests by the configured [`SplitPolicy`]; leftover fractional capacity
//! goes to the earliest submission.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How contested symbol capacity is split across competing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitPolicy {
    /// Scale every desired size by `available / total_desired`.
    Proportional,
    /// Share capacity by each strategy's Sharpe relative to the group.
    PerformanceWeighted,
}

/// One strategy's claim on a symbol within an epoch.
#[derive(Debug, Clone)]
pub struct CoordinationRequest {
    /// Requesting strategy.
    pub strategy_id: String,
    /// Notional the strategy wants to deploy.
    pub desired_notional: Decimal,
    /// Whether the order reduces existing exposure.
    pub reduces_exposure: bool,
    /// Rolling Sharpe, when metrics are available.
    pub sharpe: Option<Decimal>,
    /// Original order submission time, used for tie-breaks.
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Epoch {
    id: u64,
    deadline: Instant,
    available: Decimal,
    entries: Vec<(CoordinationRequest, oneshot::Sender<Decimal>)>,
}

enum Role {
    /// First entrant of the epoch; resolves it at the deadline.
    Resolver { deadline: Instant, epoch_id: u64 },
    Waiter,
}

/// Batches same-symbol requests into bounded decision epochs.
#[derive(Debug)]
pub struct CrossStrategyCoordinator {
    window: Duration,
    policy: SplitPolicy,
    floor_weight: Decimal,
    next_epoch: std::sync::atomic::AtomicU64,
    epochs: Mutex<HashMap<String, Epoch>>,
}

impl CrossStrategyCoordinator {
    /// Create a coordinator with the given epoch window and split policy.
    #[must_use]
    pub fn new(window: Duration, policy: SplitPolicy, floor_weight: Decimal) -> Self {
        Self {
            window,
            policy,
            floor_weight,
            next_epoch: std::sync::atomic::AtomicU64::new(0),
            epochs: Mutex::new(HashMap::new()),
        }
    }

    /// Claim capacity for one request and wait for the epoch to resolve.
    ///
    /// `available` is the symbol capacity the caller observed; the epoch
    /// keeps the most conservative figure seen. Returns the granted notional,
    /// which is at most `desired_notional`.
    pub async fn allocate(&self, symbol: &str, available: Decimal, request: CoordinationRequest) -> Decimal {
        use std::sync::atomic::Ordering;

        let (tx, rx) = oneshot::channel();
        let mut stale = None;
        let role = {
            let mut epochs = lock(&self.epochs);
            let now = Instant::now();
            let open = epochs
                .get(symbol)
                .is_some_and(|epoch| now < epoch.deadline);
            if !open {
                // Any epoch still in the slot is past its deadline; its
                // resolver has not run yet, so dispatch it on the way out.
                stale = epochs.remove(symbol);
                let id = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                epochs.insert(
                    symbol.to_string(),
                    Epoch {
                        id,
                        deadline: now + self.window,
                        available,
                        entries: Vec::new(),
                    },
                );
            }
            match epochs.get_mut(symbol) {
                Some(epoch) => {
                    epoch.available = epoch.available.min(available);
                    epoch.entries.push((request, tx));
                    if epoch.entries.len() == 1 {
                        Role::Resolver {
                            deadline: epoch.deadline,
                            epoch_id: epoch.id,
                        }
                    } else {
                        Role::Waiter
                    }
                }
                None => Role::Waiter,
            }
        };
        if let Some(epoch) = stale {
            self.dispatch(epoch);
        }

        if let Role::Resolver { deadline, epoch_id } = role {
            tokio::time::sleep_until(deadline).await;
            let epoch = {
                let mut epochs = lock(&self.epochs);
                // Only remove the epoch this task opened; a late arrival may
                // already have replaced and dispatched it.
                if epochs.get(symbol).is_some_and(|e| e.id == epoch_id) {
                    epochs.remove(symbol)
                } else {
                    None
                }
            };
            if let Some(epoch) = epoch {
                self.dispatch(epoch);
            }
        }

        // A dropped sender can only mean the resolving epoch disappeared;
        // grant nothing rather than guess.
        rx.await.unwrap_or(Decimal::ZERO)
    }

    fn dispatch(&self, epoch: Epoch) {
        let requests: Vec<CoordinationRequest> =
            epoch.entries.iter().map(|(r, _)| r.clone()).collect();
        let grants = resolve(&requests, epoch.available, self.policy, self.floor_weight);
        for ((_, sender), grant) in epoch.entries.into_iter().zip(grants) {
            let _ = sender.send(grant);
        }
    }
}

/// Split `available` capacity across the epoch's requests.
///
/// Pure: identical inputs always produce identical grants.
#[must_use]
pub fn resolve(
    requests: &[CoordinationRequest],
    available: Decimal,
    policy: SplitPolicy,
    floor_weight: Decimal,
) -> Vec<Decimal> {
    let mut grants = vec![Decimal::ZERO; requests.len()];

    let adders: Vec<usize> = (0..requests.len())
        .filter(|&i| {
            if requests[i].reduces_exposure {
                // Reducers always pass in full and consume no capacity.
                grants[i] = requests[i].desired_notional;
                false
            } else {
                true
            }
        })
        .collect();
    if adders.is_empty() {
        return grants;
    }

    let total_desired: Decimal = adders.iter().map(|&i| requests[i].desired_notional).sum();
    if total_desired <= available {
        for &i in &adders {
            grants[i] = requests[i].desired_notional;
        }
        return grants;
    }

    match policy {
        SplitPolicy::Proportional => {
            let factor = available / total_desired;
            for &i in &adders {
                grants[i] = requests[i].desired_notional * factor;
            }
        }
        SplitPolicy::PerformanceWeighted => {
            let weight = |request: &CoordinationRequest| -> Decimal {
                match request.sharpe {
                    Some(sharpe) if sharpe > Decimal::ZERO => sharpe,
                    _ => floor_weight,
                }
            };
            let total_weight: Decimal = adders.iter().map(|&i| weight(&requests[i])).sum();
            for &i in &adders {
                let share = available * weight(&requests[i]) / total_weight;
                grants[i] = share.min(requests[i].desired_notional);
            }
        }
    }

    // Earliest submission wins any remaining fractional capacity.
    let mut leftover = available - adders.iter().map(|&i| grants[i]).sum::<Decimal>();
    if leftover > Decimal::ZERO {
        let mut order: Vec<usize> = adders.clone();
        order.sort_by_key(|&i| requests[i].submitted_at);
        for i in order {
            if leftover <= Decimal::ZERO {
                break;
            }
            let headroom = requests[i].desired_notional - grants[i];
            let top_up = headroom.min(leftover);
            if top_up > Decimal::ZERO {
                grants[i] += top_up;
                leftover -= top_up;
            }
        }
    }

    grants
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn request(strategy: &str, desired: Decimal, secs: i64) -> CoordinationRequest {
        CoordinationRequest {
            strategy_id: strategy.to_string(),
            desired_notional: desired,
            reduces_exposure: false,
            sharpe: None,
            submitted_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_proportional_split_matches_reduction_factor() {
        // 30 and 25 shares at $400 against a $15,000 limit.
        let requests = vec![request("a", dec!(12000), 0), request("b", dec!(10000), 1)];
        let grants = resolve(&requests, dec!(15000), SplitPolicy::Proportional, dec!(0.1));

        // Reduction factor 15000/22000 = 0.6818...; flooring to whole shares
        // at $400 gives 20 and 17.
        assert_eq!((grants[0] / dec!(400)).floor(), dec!(20));
        assert_eq!((grants[1] / dec!(400)).floor(), dec!(17));
        assert!(grants[0] + grants[1] <= dec!(15000));
    }

    #[test]
    fn test_no_contention_grants_in_full() {
        let requests = vec![request("a", dec!(4000), 0), request("b", dec!(5000), 1)];
        let grants = resolve(&requests, dec!(15000), SplitPolicy::Proportional, dec!(0.1));
        assert_eq!(grants, vec![dec!(4000), dec!(5000)]);
    }

    #[test]
    fn test_reducers_granted_fully_without_consuming_capacity() {
        let mut closer = request("closer", dec!(8000), 0);
        closer.reduces_exposure = true;
        let requests = vec![closer, request("a", dec!(6000), 1), request("b", dec!(6000), 2)];
        let grants = resolve(&requests, dec!(6000), SplitPolicy::Proportional, dec!(0.1));

        assert_eq!(grants[0], dec!(8000));
        assert_eq!(grants[1] + grants[2], dec!(6000));
    }

    #[test]
    fn test_performance_weighted_split() {
        let mut a = request("a", dec!(10000), 0);
        a.sharpe = Some(dec!(2.0));
        let mut b = request("b", dec!(10000), 1);
        b.sharpe = Some(dec!(1.0));
        let grants = resolve(&[a, b], dec!(9000), SplitPolicy::PerformanceWeighted, dec!(0.1));

        assert_eq!(grants[0], dec!(6000));
        assert_eq!(grants[1], dec!(3000));
    }

    #[test]
    fn test_negative_sharpe_gets_floor_weight_not_zero() {
        let mut a = request("a", dec!(10000), 0);
        a.sharpe = Some(dec!(1.9));
        let mut b = request("b", dec!(10000), 1);
        b.sharpe = Some(dec!(-0.5));
        let grants = resolve(&[a, b], dec!(10000), SplitPolicy::PerformanceWeighted, dec!(0.1));

        // 1.9 vs floor 0.1: the recovering strategy still gets 5%.
        assert_eq!(grants[0], dec!(9500));
        assert_eq!(grants[1], dec!(500));
    }

    #[test]
    fn test_leftover_goes_to_earliest_submission() {
        let mut a = request("a", dec!(3000), 5);
        a.sharpe = Some(dec!(3.0));
        let mut b = request("b", dec!(10000), 0);
        b.sharpe = Some(dec!(1.0));
        // a's weighted share (7500) is capped at its desired 3000; the
        // leftover flows to b, the earlier submission.
        let grants = resolve(&[a, b], dec!(10000), SplitPolicy::PerformanceWeighted, dec!(0.1));
        assert_eq!(grants[0], dec!(3000));
        assert_eq!(grants[1], dec!(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_epoch_batches_concurrent_requests() {
        let coordinator = std::sync::Arc::new(CrossStrategyCoordinator::new(
            Duration::from_millis(50),
            SplitPolicy::Proportional,
            dec!(0.1),
        ));

        let c1 = std::sync::Arc::clone(&coordinator);
        let first = tokio::spawn(async move {
            c1.allocate("AAPL", dec!(15000), request("a", dec!(12000), 0))
                .await
        });
        let c2 = std::sync::Arc::clone(&coordinator);
        let second = tokio::spawn(async move {
            c2.allocate("AAPL", dec!(15000), request("b", dec!(10000), 1))
                .await
        });

        let (a, b) = (first.await.unwrap(), second.await.unwrap());
        assert!(a + b <= dec!(15000));
        assert_eq!((a / dec!(400)).floor(), dec!(20));
        assert_eq!((b / dec!(400)).floor(), dec!(17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_request_granted_after_window() {
        let coordinator = CrossStrategyCoordinator::new(
            Duration::from_millis(50),
            SplitPolicy::Proportional,
            dec!(0.1),
        );
        let grant = coordinator
            .allocate("MSFT", dec!(50000), request("solo", dec!(8000), 0))
            .await;
        assert_eq!(grant, dec!(8000));
    }
}
