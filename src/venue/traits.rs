//! Venue adapter trait definitions.
//!
//! These traits define the interface any venue implementation must
//! provide. The update stream is the core's only protocol: every adapter
//! normalizes its native feed into snapshot and diff messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::domain::{
    BookSide, OrderBook, OrderBookLevel, Price, Quantity, TradeLegResult, TradingPair, VenueId,
};
use crate::error::Result;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Lower-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Maker/taker fee rates in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub maker_percent: Decimal,
    pub taker_percent: Decimal,
}

impl Default for FeeSchedule {
    /// Fallback applied when a venue reports no fee schedule.
    fn default() -> Self {
        Self {
            maker_percent: Decimal::new(1, 1),  // 0.1%
            taker_percent: Decimal::new(2, 1),  // 0.2%
        }
    }
}

/// Normalized order-book update emitted by every adapter.
#[derive(Debug, Clone)]
pub enum BookUpdate {
    /// Full replacement of the level set.
    Snapshot {
        pair: TradingPair,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
        timestamp: DateTime<Utc>,
    },
    /// Incremental change to one price level. A zero quantity removes the
    /// level.
    Diff {
        pair: TradingPair,
        side: BookSide,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    },
}

/// Receiving end of an adapter's update stream. The stream ends when the
/// sender is dropped (connection lost, unsubscribe, shutdown).
pub type BookUpdateStream = mpsc::Receiver<BookUpdate>;

/// A trading venue the engine can stream books from and place orders on.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue id used for registry lookups and tie-breaking.
    fn venue_id(&self) -> &VenueId;

    /// Establish connectivity. Must be called before subscribing.
    async fn connect(&self) -> Result<()>;

    /// Tear down connectivity and end all update streams.
    async fn disconnect(&self) -> Result<()>;

    /// Authenticate for private endpoints.
    ///
    /// Venues without authentication keep the default no-op. A failure
    /// degrades the venue to public/read-only mode; it never aborts
    /// monitoring.
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    /// Subscribe to order-book updates for one pair.
    ///
    /// The stream always begins with a snapshot before any diffs.
    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<BookUpdateStream>;

    /// Fetch a point-in-time book snapshot.
    async fn order_book_snapshot(&self, pair: &TradingPair, depth: usize) -> Result<OrderBook>;

    /// Place a market order.
    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Quantity,
    ) -> Result<TradeLegResult>;

    /// Place a limit order.
    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> Result<TradeLegResult>;

    /// The venue's fee schedule.
    async fn fee_schedule(&self) -> Result<FeeSchedule>;
}
