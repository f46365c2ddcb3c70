//! Top-of-book price quotes.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::ids::VenueId;
use super::money::{Price, Quantity};
use super::order_book::OrderBook;
use super::pair::TradingPair;

/// Best bid/ask for one (venue, pair), derived from an order book snapshot.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    venue: VenueId,
    pair: TradingPair,
    timestamp: DateTime<Utc>,
    bid_price: Price,
    bid_quantity: Quantity,
    ask_price: Price,
    ask_quantity: Quantity,
}

impl PriceQuote {
    /// Create a quote directly from its parts.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn new(
        venue: VenueId,
        pair: TradingPair,
        timestamp: DateTime<Utc>,
        bid_price: Price,
        bid_quantity: Quantity,
        ask_price: Price,
        ask_quantity: Quantity,
    ) -> Self {
        Self {
            venue,
            pair,
            timestamp,
            bid_price,
            bid_quantity,
            ask_price,
            ask_quantity,
        }
    }

    /// Derive the top of book from an order book snapshot.
    ///
    /// Returns `None` when either side of the book is empty — a one-sided
    /// book cannot quote both legs of a spread.
    #[must_use]
    pub fn from_book(book: &OrderBook) -> Option<Self> {
        let bid = book.best_bid()?;
        let ask = book.best_ask()?;
        Some(Self {
            venue: book.venue().clone(),
            pair: book.pair().clone(),
            timestamp: book.timestamp(),
            bid_price: bid.price(),
            bid_quantity: bid.quantity(),
            ask_price: ask.price(),
            ask_quantity: ask.quantity(),
        })
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

    /// Get the quote timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Best bid price.
    #[must_use]
    pub const fn bid_price(&self) -> Price {
        self.bid_price
    }

    /// Quantity available at the best bid.
    #[must_use]
    pub const fn bid_quantity(&self) -> Quantity {
        self.bid_quantity
    }

    /// Best ask price.
    #[must_use]
    pub const fn ask_price(&self) -> Price {
        self.ask_price
    }

    /// Quantity available at the best ask.
    #[must_use]
    pub const fn ask_quantity(&self) -> Quantity {
        self.ask_quantity
    }

    /// Whether the quote is older than the freshness window at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age > window,
            // A quote from the future counts as fresh; a negative window
            // conversion only happens in that case.
            Err(_) => false,
        }
    }
}
