//! Portfolio aggregator: the single owner of positions and reservations.
//!
//! No other component mutates positions. All mutation flows through
//! [`PortfolioAggregator::reserve`] / [`PortfolioAggregator::commit`] /
//! [`PortfolioAggregator::release`], serialized per resource key: one mutex
//! per symbol book plus one mutex for the account capital pool, always
//! acquired in symbol-then-account order. Two concurrent reservations can
//! therefore never jointly overcommit a shared limit, which is the engine's
//! core correctness property.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::RiskError;
use crate::events::{EventBus, RiskEvent};
use crate::models::{Fill, Order, Position};

/// Handle to a live reservation, used to commit or release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationHandle {
    /// Reservation id.
    pub id: Uuid,
    /// Symbol whose capacity is held.
    pub symbol: String,
    /// Strategy the hold belongs to.
    pub strategy_id: String,
}

#[derive(Debug, Clone)]
struct Reservation {
    id: Uuid,
    strategy_id: String,
    notional: Decimal,
    created_at: Instant,
    ttl: Duration,
}

impl Reservation {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Per-symbol book: positions keyed by strategy, plus live reservations.
#[derive(Debug, Default)]
struct SymbolBook {
    positions: HashMap<String, Position>,
    reservations: HashMap<Uuid, Reservation>,
}

impl SymbolBook {
    fn committed_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    fn reserved_notional(&self) -> Decimal {
        self.reservations.values().map(|r| r.notional).sum()
    }
}

#[derive(Debug, Default)]
struct AccountTotals {
    /// Live reservation notional across all symbols.
    reserved: Decimal,
    /// Capital consumed by open positions at entry prices.
    committed: Decimal,
}

/// Exposure breakdown across all strategies.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExposureReport {
    /// Sum of absolute position values.
    pub gross: Decimal,
    /// Sum of signed position values (long positive).
    pub net: Decimal,
    /// Absolute exposure by sector ("UNCLASSIFIED" when unknown).
    pub by_sector: HashMap<String, Decimal>,
    /// Committed plus reserved notional by strategy.
    pub by_strategy: HashMap<String, Decimal>,
    /// Total live reservation notional.
    pub reserved: Decimal,
}

/// Usage figures for one symbol, read under its book lock.
#[derive(Debug, Clone, Copy)]
pub struct SymbolUsage {
    /// Market value of open positions.
    pub committed: Decimal,
    /// Live reservation notional.
    pub reserved: Decimal,
    /// Net signed quantity across strategies.
    pub net_quantity: Decimal,
}

/// The canonical holder of positions and reservations.
#[derive(Debug)]
pub struct PortfolioAggregator {
    ttl: Duration,
    account_capital: RwLock<Decimal>,
    books: RwLock<HashMap<String, Arc<Mutex<SymbolBook>>>>,
    sectors: RwLock<HashMap<String, String>>,
    account: Mutex<AccountTotals>,
    events: EventBus,
}

impl PortfolioAggregator {
    /// Create an aggregator over the given account capital pool.
    #[must_use]
    pub fn new(account_capital: Decimal, reservation_ttl: Duration, events: EventBus) -> Self {
        Self {
            ttl: reservation_ttl,
            account_capital: RwLock::new(account_capital),
            books: RwLock::new(HashMap::new()),
            sectors: RwLock::new(HashMap::new()),
            account: Mutex::new(AccountTotals::default()),
            events,
        }
    }

    fn book(&self, symbol: &str) -> Arc<Mutex<SymbolBook>> {
        if let Some(book) = lock_read(&self.books).get(symbol) {
            return Arc::clone(book);
        }
        let mut books = lock_write(&self.books);
        Arc::clone(
            books
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SymbolBook::default()))),
        )
    }

    /// Update the account capital pool (fed by the equity tracker).
    pub fn set_account_capital(&self, capital: Decimal) {
        *lock_write(&self.account_capital) = capital;
    }

    /// Record the sector classification for a symbol.
    pub fn set_sector(&self, symbol: &str, sector: &str) {
        lock_write(&self.sectors).insert(symbol.to_string(), sector.to_string());
    }

    /// Update the market price on all open positions for a symbol.
    pub fn set_market_price(&self, symbol: &str, price: Decimal) {
        let book = self.book(symbol);
        let mut book = lock_mutex(&book);
        for position in book.positions.values_mut() {
            position.market_price = price;
        }
    }

    /// Atomically reserve capacity for an approved order.
    ///
    /// The check-and-insert runs under the symbol book lock and the account
    /// lock together, so the symbol limit and the account pool can never be
    /// jointly overcommitted by concurrent callers.
    ///
    /// # Errors
    ///
    /// [`RiskError::InsufficientReservationCapacity`] with the remaining
    /// admissible notional when either pool would be exceeded.
    pub fn reserve(
        &self,
        order: &Order,
        notional: Decimal,
        symbol_limit: Decimal,
    ) -> Result<ReservationHandle, RiskError> {
        self.sweep_expired();

        let book = self.book(&order.symbol);
        let mut book = lock_mutex(&book);

        // A zero-notional hold (a reducing order) consumes nothing and must
        // pass even when the pools are already at their limits.
        let used = book.committed_value() + book.reserved_notional();
        if notional > Decimal::ZERO && used + notional > symbol_limit {
            return Err(RiskError::InsufficientReservationCapacity {
                requested: notional,
                available: (symbol_limit - used).max(Decimal::ZERO),
            });
        }

        // Lock order: symbol book first, then account.
        let mut account = lock_mutex(&self.account);
        let capital = *lock_read(&self.account_capital);
        let account_used = account.reserved + account.committed;
        if notional > Decimal::ZERO && account_used + notional > capital {
            return Err(RiskError::InsufficientReservationCapacity {
                requested: notional,
                available: (capital - account_used).max(Decimal::ZERO),
            });
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            strategy_id: order.strategy_id.clone(),
            notional,
            created_at: Instant::now(),
            ttl: self.ttl,
        };
        let handle = ReservationHandle {
            id: reservation.id,
            symbol: order.symbol.clone(),
            strategy_id: order.strategy_id.clone(),
        };
        account.reserved += notional;
        book.reservations.insert(reservation.id, reservation);
        Ok(handle)
    }

    /// Release a reservation without a fill (cancel or mid-flight rollback).
    ///
    /// # Errors
    ///
    /// [`RiskError::UnknownReservation`] if the handle was already committed,
    /// released, or expired.
    pub fn release(&self, handle: &ReservationHandle) -> Result<(), RiskError> {
        let book = self.book(&handle.symbol);
        let mut book = lock_mutex(&book);
        let reservation = book
            .reservations
            .remove(&handle.id)
            .ok_or(RiskError::UnknownReservation(handle.id))?;
        lock_mutex(&self.account).reserved -= reservation.notional;
        Ok(())
    }

    /// Convert a reservation into a position mutation on a confirmed fill.
    ///
    /// # Errors
    ///
    /// [`RiskError::UnknownReservation`] if the handle was already committed,
    /// released, or expired past its TTL.
    pub fn commit(&self, handle: &ReservationHandle, fill: &Fill) -> Result<(), RiskError> {
        let book_arc = self.book(&handle.symbol);
        let mut book = lock_mutex(&book_arc);
        let reservation = book
            .reservations
            .remove(&handle.id)
            .ok_or(RiskError::UnknownReservation(handle.id))?;

        let old_entry = book
            .positions
            .get(&handle.strategy_id)
            .map_or(Decimal::ZERO, Position::entry_value);
        apply_fill(&mut book.positions, &handle.strategy_id, fill);
        let new_entry = book
            .positions
            .get(&handle.strategy_id)
            .map_or(Decimal::ZERO, Position::entry_value);

        let mut account = lock_mutex(&self.account);
        account.reserved -= reservation.notional;
        account.committed += new_entry - old_entry;
        Ok(())
    }

    /// Release every reservation older than its TTL.
    ///
    /// Called lazily on each `reserve` and by the host on a periodic cadence,
    /// preventing capital leaks from lost execution confirmations.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let books: Vec<(String, Arc<Mutex<SymbolBook>>)> = lock_read(&self.books)
            .iter()
            .map(|(symbol, book)| (symbol.clone(), Arc::clone(book)))
            .collect();

        let mut freed = Decimal::ZERO;
        let mut expired = Vec::new();
        for (symbol, book) in books {
            let mut book = lock_mutex(&book);
            let ids: Vec<Uuid> = book
                .reservations
                .values()
                .filter(|r| r.is_expired(now))
                .map(|r| r.id)
                .collect();
            for id in ids {
                if let Some(reservation) = book.reservations.remove(&id) {
                    freed += reservation.notional;
                    expired.push((id, symbol.clone(), reservation.notional));
                }
            }
        }

        if freed > Decimal::ZERO {
            lock_mutex(&self.account).reserved -= freed;
            for (id, symbol, notional) in expired {
                self.events.publish(RiskEvent::ReservationExpired {
                    reservation_id: id,
                    symbol,
                    notional,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Full exposure breakdown across strategies and sectors.
    #[must_use]
    pub fn exposure(&self) -> ExposureReport {
        let books: Vec<(String, Arc<Mutex<SymbolBook>>)> = lock_read(&self.books)
            .iter()
            .map(|(symbol, book)| (symbol.clone(), Arc::clone(book)))
            .collect();
        let sectors = lock_read(&self.sectors).clone();

        let mut gross = Decimal::ZERO;
        let mut net = Decimal::ZERO;
        let mut by_sector: HashMap<String, Decimal> = HashMap::new();
        let mut by_strategy: HashMap<String, Decimal> = HashMap::new();
        let mut reserved = Decimal::ZERO;

        for (symbol, book) in books {
            let book = lock_mutex(&book);
            let sector = sectors
                .get(&symbol)
                .cloned()
                .unwrap_or_else(|| "UNCLASSIFIED".to_string());
            for position in book.positions.values() {
                let value = position.market_value();
                gross += value;
                net += position.signed_value();
                *by_sector.entry(sector.clone()).or_default() += value;
                *by_strategy
                    .entry(position.strategy_id.clone())
                    .or_default() += value;
            }
            for reservation in book.reservations.values() {
                reserved += reservation.notional;
                *by_strategy
                    .entry(reservation.strategy_id.clone())
                    .or_default() += reservation.notional;
            }
        }

        ExposureReport {
            gross,
            net,
            by_sector,
            by_strategy,
            reserved,
        }
    }

    /// Committed plus reserved usage for one symbol.
    #[must_use]
    pub fn symbol_usage(&self, symbol: &str) -> SymbolUsage {
        let book = self.book(symbol);
        let book = lock_mutex(&book);
        SymbolUsage {
            committed: book.committed_value(),
            reserved: book.reserved_notional(),
            net_quantity: book.positions.values().map(|p| p.quantity).sum(),
        }
    }

    /// Signed position quantity a strategy holds in a symbol, if any.
    #[must_use]
    pub fn position_quantity(&self, symbol: &str, strategy_id: &str) -> Option<Decimal> {
        let book = self.book(symbol);
        let book = lock_mutex(&book);
        book.positions.get(strategy_id).map(|p| p.quantity)
    }

    /// Committed (entry value) plus reserved notional for one strategy.
    #[must_use]
    pub fn strategy_usage(&self, strategy_id: &str) -> Decimal {
        let books: Vec<Arc<Mutex<SymbolBook>>> =
            lock_read(&self.books).values().cloned().collect();
        let mut total = Decimal::ZERO;
        for book in books {
            let book = lock_mutex(&book);
            if let Some(position) = book.positions.get(strategy_id) {
                total += position.entry_value();
            }
            total += book
                .reservations
                .values()
                .filter(|r| r.strategy_id == strategy_id)
                .map(|r| r.notional)
                .sum::<Decimal>();
        }
        total
    }

    /// Number of open (non-zero) positions account-wide.
    #[must_use]
    pub fn open_position_count(&self) -> usize {
        let books: Vec<Arc<Mutex<SymbolBook>>> =
            lock_read(&self.books).values().cloned().collect();
        books
            .iter()
            .map(|book| {
                lock_mutex(book)
                    .positions
                    .values()
                    .filter(|p| !p.quantity.is_zero())
                    .count()
            })
            .sum()
    }

    /// Snapshot of all open positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        let books: Vec<Arc<Mutex<SymbolBook>>> =
            lock_read(&self.books).values().cloned().collect();
        books
            .iter()
            .flat_map(|book| lock_mutex(book).positions.values().cloned().collect::<Vec<_>>())
            .collect()
    }
}

/// Apply a fill to the strategy's position in a symbol book.
fn apply_fill(positions: &mut HashMap<String, Position>, strategy_id: &str, fill: &Fill) {
    match positions.get_mut(strategy_id) {
        None => {
            positions.insert(
                strategy_id.to_string(),
                Position {
                    symbol: fill.symbol.clone(),
                    strategy_id: strategy_id.to_string(),
                    quantity: fill.quantity,
                    avg_entry_price: fill.price,
                    market_price: fill.price,
                    opened_at: fill.filled_at,
                },
            );
        }
        Some(position) => {
            let adds_exposure = position.quantity.is_zero()
                || position.quantity.is_sign_positive() == fill.quantity.is_sign_positive();
            let new_quantity = position.quantity + fill.quantity;

            if adds_exposure {
                // Volume-weighted average entry.
                let old_abs = position.quantity.abs();
                let fill_abs = fill.quantity.abs();
                position.avg_entry_price = (old_abs * position.avg_entry_price
                    + fill_abs * fill.price)
                    / (old_abs + fill_abs);
            } else if new_quantity.is_zero()
                || new_quantity.is_sign_positive() == position.quantity.is_sign_positive()
            {
                // Pure reduction keeps the entry price.
            } else {
                // Crossed through zero: the residual lot was opened at the
                // fill price.
                position.avg_entry_price = fill.price;
                position.opened_at = fill.filled_at;
            }

            position.quantity = new_quantity;
            position.market_price = fill.price;
            if position.quantity.is_zero() {
                positions.remove(strategy_id);
            }
        }
    }
}

fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_mutex<T>(lock: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
