//! In-process simulated venue.
//!
//! Drives a random-walk mid price per pair and emits the same normalized
//! snapshot+diff stream a real gateway would, so the whole pipeline can be
//! exercised in paper-trading demos and tests without network access.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{SimParams, VenueConfig};
use crate::domain::{
    BookSide, OrderBook, OrderBookLevel, Price, Quantity, TradeLegResult, TradingPair, VenueId,
};
use crate::error::Result;

use super::traits::{BookUpdate, BookUpdateStream, FeeSchedule, OrderSide, VenueAdapter};

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const SNAPSHOT_EVERY_TICKS: u32 = 20;
const BOOK_DEPTH: usize = 3;

/// Simulated venue with a random-walk book per pair.
pub struct SimVenue {
    venue: VenueId,
    params: SimParams,
    fees: FeeSchedule,
    /// Current mid price per pair, shared with tick tasks so order fills
    /// track the stream.
    mids: Arc<Mutex<HashMap<TradingPair, Decimal>>>,
    shutdown: Mutex<watch::Sender<bool>>,
}

impl SimVenue {
    /// Create a simulated venue.
    #[must_use]
    pub fn new(venue: VenueId, params: SimParams, fees: FeeSchedule) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            venue,
            params,
            fees,
            mids: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Mutex::new(shutdown),
        }
    }

    /// Build from a config entry, honoring fee overrides.
    #[must_use]
    pub fn from_config(config: &VenueConfig) -> Self {
        let defaults = FeeSchedule::default();
        let fees = FeeSchedule {
            maker_percent: config.maker_fee_percent.unwrap_or(defaults.maker_percent),
            taker_percent: config.taker_fee_percent.unwrap_or(defaults.taker_percent),
        };
        Self::new(VenueId::new(config.id.clone()), config.sim.clone(), fees)
    }

    fn mid(&self, pair: &TradingPair) -> Decimal {
        *self
            .mids
            .lock()
            .entry(pair.clone())
            .or_insert(self.params.start_price)
    }

    fn half_spread(&self, mid: Decimal) -> Decimal {
        mid * self.params.half_spread_percent / Decimal::ONE_HUNDRED
    }

    fn levels(&self, mid: Decimal) -> (Vec<OrderBookLevel>, Vec<OrderBookLevel>) {
        let half_spread = self.half_spread(mid);
        let mut bids = Vec::with_capacity(BOOK_DEPTH);
        let mut asks = Vec::with_capacity(BOOK_DEPTH);
        for i in 0..BOOK_DEPTH {
            let offset = half_spread * Decimal::from(i as u32 + 1);
            bids.push(OrderBookLevel::new(mid - offset, self.params.level_quantity));
            asks.push(OrderBookLevel::new(mid + offset, self.params.level_quantity));
        }
        (bids, asks)
    }

    fn fill(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> TradeLegResult {
        let value = price * quantity;
        let fee = value * self.fees.taker_percent / Decimal::ONE_HUNDRED;
        TradeLegResult::filled(
            self.venue.clone(),
            Uuid::new_v4().to_string(),
            quantity,
            price,
            quantity,
            fee,
            pair.quote(),
        )
    }
}

#[async_trait]
impl VenueAdapter for SimVenue {
    fn venue_id(&self) -> &VenueId {
        &self.venue
    }

    async fn connect(&self) -> Result<()> {
        info!(venue = %self.venue, start_price = %self.params.start_price, "Simulated venue ready");
        let (tx, _) = watch::channel(false);
        *self.shutdown.lock() = tx;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let _ = self.shutdown.lock().send(true);
        Ok(())
    }

    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<BookUpdateStream> {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        let venue = self.venue.clone();
        let pair = pair.clone();
        let params = self.params.clone();
        let mids = Arc::clone(&self.mids);
        let mut shutdown = self.shutdown.lock().subscribe();

        // Per-tick move bounded by step_percent, expressed in basis points
        // so the walk stays in decimal arithmetic.
        let step_bps = (params.step_percent * Decimal::ONE_HUNDRED)
            .to_i64()
            .unwrap_or(0);

        let half_spread_percent = params.half_spread_percent;
        let level_quantity = params.level_quantity;

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(params.tick_ms));
            let mut ticks: u32 = 0;

            let mut mid = *mids.lock().entry(pair.clone()).or_insert(params.start_price);
            let make_levels = |mid: Decimal| {
                let half_spread = mid * half_spread_percent / Decimal::ONE_HUNDRED;
                let bids: Vec<OrderBookLevel> = (0..BOOK_DEPTH)
                    .map(|i| {
                        OrderBookLevel::new(
                            mid - half_spread * Decimal::from(i as u32 + 1),
                            level_quantity,
                        )
                    })
                    .collect();
                let asks: Vec<OrderBookLevel> = (0..BOOK_DEPTH)
                    .map(|i| {
                        OrderBookLevel::new(
                            mid + half_spread * Decimal::from(i as u32 + 1),
                            level_quantity,
                        )
                    })
                    .collect();
                (bids, asks)
            };

            let (bids, asks) = make_levels(mid);
            if tx
                .send(BookUpdate::Snapshot {
                    pair: pair.clone(),
                    bids,
                    asks,
                    timestamp: Utc::now(),
                })
                .await
                .is_err()
            {
                return;
            }

            loop {
                tokio::select! {
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            debug!(venue = %venue, pair = %pair, "Sim stream shut down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        ticks += 1;

                        let old_best_bid = mid - mid * half_spread_percent / Decimal::ONE_HUNDRED;
                        let old_best_ask = mid + mid * half_spread_percent / Decimal::ONE_HUNDRED;

                        if step_bps > 0 {
                            let delta_bps = rng.gen_range(-step_bps..=step_bps);
                            mid += mid * Decimal::new(delta_bps, 4);
                        }
                        mids.lock().insert(pair.clone(), mid);

                        let now = Utc::now();
                        let updates = if ticks % SNAPSHOT_EVERY_TICKS == 0 {
                            let (bids, asks) = make_levels(mid);
                            vec![BookUpdate::Snapshot {
                                pair: pair.clone(),
                                bids,
                                asks,
                                timestamp: now,
                            }]
                        } else {
                            let new_best_bid =
                                mid - mid * half_spread_percent / Decimal::ONE_HUNDRED;
                            let new_best_ask =
                                mid + mid * half_spread_percent / Decimal::ONE_HUNDRED;
                            vec![
                                BookUpdate::Diff {
                                    pair: pair.clone(),
                                    side: BookSide::Bid,
                                    price: old_best_bid,
                                    quantity: Decimal::ZERO,
                                    timestamp: now,
                                },
                                BookUpdate::Diff {
                                    pair: pair.clone(),
                                    side: BookSide::Ask,
                                    price: old_best_ask,
                                    quantity: Decimal::ZERO,
                                    timestamp: now,
                                },
                                BookUpdate::Diff {
                                    pair: pair.clone(),
                                    side: BookSide::Bid,
                                    price: new_best_bid,
                                    quantity: level_quantity,
                                    timestamp: now,
                                },
                                BookUpdate::Diff {
                                    pair: pair.clone(),
                                    side: BookSide::Ask,
                                    price: new_best_ask,
                                    quantity: level_quantity,
                                    timestamp: now,
                                },
                            ]
                        };

                        let mut closed = false;
                        for update in updates {
                            if tx.send(update).await.is_err() {
                                closed = true;
                                break;
                            }
                        }
                        if closed {
                            debug!(venue = %venue, pair = %pair, "Update channel closed");
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn order_book_snapshot(&self, pair: &TradingPair, depth: usize) -> Result<OrderBook> {
        let mid = self.mid(pair);
        let (mut bids, mut asks) = self.levels(mid);
        bids.truncate(depth);
        asks.truncate(depth);
        Ok(OrderBook::new(
            self.venue.clone(),
            pair.clone(),
            Utc::now(),
            bids,
            asks,
        ))
    }

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        let mid = self.mid(pair);
        let half_spread = self.half_spread(mid);
        let price = match side {
            OrderSide::Buy => mid + half_spread,
            OrderSide::Sell => mid - half_spread,
        };
        Ok(self.fill(pair, side, price, quantity))
    }

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        let mid = self.mid(pair);
        let half_spread = self.half_spread(mid);
        let (crosses, fill_price) = match side {
            OrderSide::Buy => (price >= mid + half_spread, mid + half_spread),
            OrderSide::Sell => (price <= mid - half_spread, mid - half_spread),
        };

        if !crosses {
            return Ok(TradeLegResult::failed(
                self.venue.clone(),
                quantity,
                format!("limit {price} does not cross the simulated book"),
            ));
        }
        let mut leg = self.fill(pair, side, fill_price, quantity);
        leg.requested_price = Some(price);
        Ok(leg)
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        Ok(self.fees)
    }
}
