//! Order book types and the snapshot+diff book state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

use super::ids::VenueId;
use super::money::{Price, Quantity};
use super::pair::TradingPair;

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookLevel {
    price: Price,
    quantity: Quantity,
}

impl OrderBookLevel {
    /// Create a new price level.
    #[must_use]
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Get the price.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Get the quantity.
    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }
}

/// Side of the book a level or diff belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    /// Buy side, sorted descending by price.
    Bid,
    /// Sell side, sorted ascending by price.
    Ask,
}

/// Immutable order book snapshot for one (venue, pair).
///
/// Bids are sorted descending, asks ascending, with no duplicate price
/// levels. Consumers only ever see complete copies; the mutable state lives
/// in [`OrderBookState`].
#[derive(Debug, Clone)]
pub struct OrderBook {
    venue: VenueId,
    pair: TradingPair,
    timestamp: DateTime<Utc>,
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Create an order book from raw levels.
    ///
    /// Levels are sorted into canonical order and duplicate prices are
    /// collapsed, last write wins. Zero-quantity levels are dropped.
    #[must_use]
    pub fn new(
        venue: VenueId,
        pair: TradingPair,
        timestamp: DateTime<Utc>,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
    ) -> Self {
        Self {
            venue,
            pair,
            timestamp,
            bids: canonicalize(bids, BookSide::Bid),
            asks: canonicalize(asks, BookSide::Ask),
        }
    }

    /// Get the venue id.
    #[must_use]
    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// Get the trading pair.
    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Get the snapshot timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get all bid levels, best first.
    #[must_use]
    pub fn bids(&self) -> &[OrderBookLevel] {
        &self.bids
    }

    /// Get all ask levels, best first.
    #[must_use]
    pub fn asks(&self) -> &[OrderBookLevel] {
        &self.asks
    }

    /// Best bid (highest buy price).
    #[must_use]
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    /// Best ask (lowest sell price).
    #[must_use]
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

/// Sort levels into canonical order, collapsing duplicate prices (last
/// write wins) and dropping empty levels.
fn canonicalize(levels: Vec<OrderBookLevel>, side: BookSide) -> Vec<OrderBookLevel> {
    let mut by_price: BTreeMap<Price, Quantity> = BTreeMap::new();
    for level in levels {
        by_price.insert(level.price, level.quantity);
    }

    let iter = by_price
        .into_iter()
        .filter(|(_, qty)| !qty.is_zero())
        .map(|(price, quantity)| OrderBookLevel { price, quantity });

    match side {
        BookSide::Bid => iter.rev().collect(),
        BookSide::Ask => iter.collect(),
    }
}

/// Mutable per-(venue, pair) order book built from a snapshot + diff feed.
///
/// Diffs arriving before the first snapshot are discarded. Readers obtain
/// immutable copies via [`snapshot`](Self::snapshot) and never observe a
/// level set mid-mutation.
#[derive(Debug)]
pub struct OrderBookState {
    venue: VenueId,
    pair: TradingPair,
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
    last_update: DateTime<Utc>,
    primed: bool,
}

impl OrderBookState {
    /// Create an empty, unprimed book state.
    #[must_use]
    pub fn new(venue: VenueId, pair: TradingPair) -> Self {
        Self {
            venue,
            pair,
            bids: Vec::new(),
            asks: Vec::new(),
            last_update: DateTime::<Utc>::MIN_UTC,
            primed: false,
        }
    }

    /// Whether a snapshot has been applied yet.
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    /// Replace the entire level set from a snapshot and mark the state
    /// primed.
    pub fn apply_snapshot(
        &mut self,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
        timestamp: DateTime<Utc>,
    ) {
        self.bids = canonicalize(bids, BookSide::Bid);
        self.asks = canonicalize(asks, BookSide::Ask);
        self.last_update = timestamp;
        self.primed = true;
    }

    /// Apply an incremental diff to one side of the book.
    ///
    /// A zero quantity removes the level at `price` if present (no-op
    /// otherwise); any other quantity upserts it, preserving strict price
    /// ordering. Returns `false` when the diff was discarded (unprimed
    /// state or malformed values).
    pub fn apply_diff(
        &mut self,
        side: BookSide,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    ) -> bool {
        if !self.primed {
            warn!(
                venue = %self.venue,
                pair = %self.pair,
                "Discarding diff received before first snapshot"
            );
            return false;
        }
        if price <= Decimal::ZERO || quantity < Decimal::ZERO {
            warn!(
                venue = %self.venue,
                pair = %self.pair,
                %price,
                %quantity,
                "Discarding malformed diff"
            );
            return false;
        }

        let levels = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        upsert(levels, side, price, quantity);
        self.last_update = timestamp;
        true
    }

    /// Immutable copy of the current book, or `None` before the first
    /// snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<OrderBook> {
        if !self.primed {
            return None;
        }
        Some(OrderBook {
            venue: self.venue.clone(),
            pair: self.pair.clone(),
            timestamp: self.last_update,
            bids: self.bids.clone(),
            asks: self.asks.clone(),
        })
    }
}

/// Upsert or remove a level at `price`, touching only the insertion point.
fn upsert(levels: &mut Vec<OrderBookLevel>, side: BookSide, price: Price, quantity: Quantity) {
    let position = levels.binary_search_by(|level| match side {
        // Bids are descending, so the comparator is reversed.
        BookSide::Bid => price.cmp(&level.price),
        BookSide::Ask => level.price.cmp(&price),
    });

    match position {
        Ok(i) => {
            if quantity.is_zero() {
                levels.remove(i);
            } else {
                levels[i].quantity = quantity;
            }
        }
        Err(i) => {
            if !quantity.is_zero() {
                levels.insert(i, OrderBookLevel::new(price, quantity));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state() -> OrderBookState {
        OrderBookState::new(
            VenueId::from("test-venue"),
            TradingPair::new("BTC", "USD").unwrap(),
        )
    }

    fn level(price: Decimal, qty: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(price, qty)
    }

    #[test]
    fn diff_before_snapshot_is_discarded() {
        let mut book = state();
        assert!(!book.apply_diff(BookSide::Bid, dec!(100), dec!(1), Utc::now()));
        assert!(book.snapshot().is_none());
    }

    #[test]
    fn snapshot_replaces_level_set_and_sorts() {
        let mut book = state();
        book.apply_snapshot(
            vec![level(dec!(99), dec!(1)), level(dec!(101), dec!(2))],
            vec![level(dec!(105), dec!(1)), level(dec!(103), dec!(2))],
            Utc::now(),
        );

        let snap = book.snapshot().unwrap();
        assert_eq!(snap.best_bid().unwrap().price(), dec!(101));
        assert_eq!(snap.best_ask().unwrap().price(), dec!(103));
        assert_eq!(snap.bids().len(), 2);
        assert_eq!(snap.asks().len(), 2);
    }

    #[test]
    fn zero_quantity_diff_removes_level_and_reappears_on_upsert() {
        let mut book = state();
        book.apply_snapshot(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(102), dec!(1))],
            Utc::now(),
        );

        assert!(book.apply_diff(BookSide::Bid, dec!(100), dec!(0), Utc::now()));
        assert!(book.snapshot().unwrap().best_bid().is_none());

        assert!(book.apply_diff(BookSide::Bid, dec!(100), dec!(3), Utc::now()));
        let snap = book.snapshot().unwrap();
        assert_eq!(snap.best_bid().unwrap().price(), dec!(100));
        assert_eq!(snap.best_bid().unwrap().quantity(), dec!(3));
    }

    #[test]
    fn removing_absent_level_is_a_no_op() {
        let mut book = state();
        book.apply_snapshot(vec![level(dec!(100), dec!(1))], vec![], Utc::now());

        assert!(book.apply_diff(BookSide::Bid, dec!(95), dec!(0), Utc::now()));
        assert_eq!(book.snapshot().unwrap().bids().len(), 1);
    }

    #[test]
    fn identical_upsert_is_idempotent() {
        let mut once = state();
        once.apply_snapshot(vec![level(dec!(100), dec!(1))], vec![], Utc::now());
        once.apply_diff(BookSide::Bid, dec!(101), dec!(2), Utc::now());

        let mut twice = state();
        twice.apply_snapshot(vec![level(dec!(100), dec!(1))], vec![], Utc::now());
        twice.apply_diff(BookSide::Bid, dec!(101), dec!(2), Utc::now());
        twice.apply_diff(BookSide::Bid, dec!(101), dec!(2), Utc::now());

        let a = once.snapshot().unwrap();
        let b = twice.snapshot().unwrap();
        assert_eq!(a.bids(), b.bids());
    }

    #[test]
    fn upsert_preserves_strict_ordering() {
        let mut book = state();
        book.apply_snapshot(
            vec![level(dec!(100), dec!(1)), level(dec!(98), dec!(1))],
            vec![level(dec!(102), dec!(1)), level(dec!(104), dec!(1))],
            Utc::now(),
        );

        book.apply_diff(BookSide::Bid, dec!(99), dec!(5), Utc::now());
        book.apply_diff(BookSide::Ask, dec!(103), dec!(5), Utc::now());

        let snap = book.snapshot().unwrap();
        let bid_prices: Vec<Decimal> = snap.bids().iter().map(OrderBookLevel::price).collect();
        let ask_prices: Vec<Decimal> = snap.asks().iter().map(OrderBookLevel::price).collect();
        assert_eq!(bid_prices, vec![dec!(100), dec!(99), dec!(98)]);
        assert_eq!(ask_prices, vec![dec!(102), dec!(103), dec!(104)]);
    }

    #[test]
    fn duplicate_snapshot_prices_keep_last_write() {
        let snap = OrderBook::new(
            VenueId::from("v"),
            TradingPair::new("BTC", "USD").unwrap(),
            Utc::now(),
            vec![level(dec!(100), dec!(1)), level(dec!(100), dec!(7))],
            vec![],
        );
        assert_eq!(snap.bids().len(), 1);
        assert_eq!(snap.best_bid().unwrap().quantity(), dec!(7));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut book = state();
        book.apply_snapshot(vec![level(dec!(100), dec!(1))], vec![], Utc::now());

        let before = book.snapshot().unwrap();
        book.apply_diff(BookSide::Bid, dec!(100), dec!(9), Utc::now());

        assert_eq!(before.best_bid().unwrap().quantity(), dec!(1));
    }
}
