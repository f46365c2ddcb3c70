//! Integration tests for the detection pipeline: scripted venues feed the
//! aggregator, the engine's per-pair loops pick crossed quotes off the
//! board and publish qualified opportunities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::time::timeout;

use skimmer::app::AppState;
use skimmer::domain::{
    OrderBook, OrderBookLevel, Price, Quantity, RiskProfile, TradeLegResult, TradingPair, VenueId,
};
use skimmer::engine::DetectionEngine;
use skimmer::error::Result;
use skimmer::market::MarketDataAggregator;
use skimmer::venue::{
    BookUpdate, BookUpdateStream, FeeSchedule, FeeTable, OrderSide, VenueAdapter, VenueRegistry,
};

/// Venue that replays a fixed script of book updates per pair, then keeps
/// the stream open.
struct ScriptedVenue {
    venue: VenueId,
    scripts: Mutex<HashMap<TradingPair, Vec<BookUpdate>>>,
}

impl ScriptedVenue {
    fn new(venue: &str) -> Self {
        Self {
            venue: VenueId::from(venue),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    fn with_top_of_book(venue: &str, pair: &TradingPair, bid: Decimal, ask: Decimal) -> Self {
        let scripted = Self::new(venue);
        scripted.script(
            pair,
            vec![BookUpdate::Snapshot {
                pair: pair.clone(),
                bids: vec![OrderBookLevel::new(bid, dec!(1))],
                asks: vec![OrderBookLevel::new(ask, dec!(1))],
                timestamp: Utc::now(),
            }],
        );
        scripted
    }

    fn script(&self, pair: &TradingPair, updates: Vec<BookUpdate>) {
        self.scripts.lock().insert(pair.clone(), updates);
    }
}

#[async_trait]
impl VenueAdapter for ScriptedVenue {
    fn venue_id(&self) -> &VenueId {
        &self.venue
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<BookUpdateStream> {
        let updates = self.scripts.lock().remove(pair).unwrap_or_default();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for update in updates {
                if tx.send(update).await.is_err() {
                    return;
                }
            }
            // Keep the stream open so the aggregator doesn't resubscribe.
            std::future::pending::<()>().await;
        });
        Ok(rx)
    }

    async fn order_book_snapshot(&self, _pair: &TradingPair, _depth: usize) -> Result<OrderBook> {
        unimplemented!("not used by detection tests")
    }

    async fn place_market_order(
        &self,
        _pair: &TradingPair,
        _side: OrderSide,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        Ok(TradeLegResult::failed(
            self.venue.clone(),
            quantity,
            "scripted venue does not trade",
        ))
    }

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        _price: Price,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        self.place_market_order(pair, side, quantity).await
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        Ok(FeeSchedule {
            maker_percent: dec!(0.1),
            taker_percent: dec!(0.1),
        })
    }
}

fn pair(base: &str) -> TradingPair {
    TradingPair::new(base, "USD").unwrap()
}

fn risk(min_profit_percent: Decimal) -> RiskProfile {
    RiskProfile {
        min_profit_percent,
        max_trade_amount: dec!(100000),
        ..RiskProfile::default()
    }
}

fn fee_table(venues: &[&str], percent: Decimal) -> FeeTable {
    let mut table = FeeTable::new();
    for venue in venues {
        table.insert(
            VenueId::from(*venue),
            FeeSchedule {
                maker_percent: percent,
                taker_percent: percent,
            },
        );
    }
    table
}

struct Pipeline {
    aggregator: Arc<MarketDataAggregator>,
    engine: DetectionEngine,
    opportunities: mpsc::Receiver<skimmer::domain::ArbitrageOpportunity>,
}

async fn start_pipeline(
    adapters: Vec<Arc<dyn VenueAdapter>>,
    pairs: &[TradingPair],
    profile: RiskProfile,
    fees: FeeTable,
) -> Pipeline {
    let mut registry = VenueRegistry::new();
    let venue_ids: Vec<VenueId> = adapters.iter().map(|a| a.venue_id().clone()).collect();
    for adapter in adapters {
        registry.register(adapter);
    }
    let registry = Arc::new(registry);

    let aggregator = Arc::new(MarketDataAggregator::new(
        Arc::clone(&registry),
        Duration::from_secs(30),
    ));
    aggregator.start_monitoring(&venue_ids, pairs).await;

    let (tx, rx) = mpsc::channel(16);
    let engine = DetectionEngine::new(
        Arc::clone(&aggregator),
        Arc::new(AppState::new(profile)),
        Arc::new(fees),
        tx,
        Duration::from_millis(20),
    );
    for pair in pairs {
        engine.add_pair(pair);
    }

    Pipeline {
        aggregator,
        engine,
        opportunities: rx,
    }
}

#[tokio::test]
async fn crossed_quotes_emit_an_opportunity_with_correct_venues() {
    let btc = pair("BTC");
    let alpha = ScriptedVenue::with_top_of_book("alpha", &btc, dec!(49900), dec!(50000));
    let beta = ScriptedVenue::with_top_of_book("beta", &btc, dec!(50600), dec!(50700));

    let mut pipeline = start_pipeline(
        vec![Arc::new(alpha) as Arc<dyn VenueAdapter>, Arc::new(beta)],
        &[btc.clone()],
        risk(dec!(0.5)),
        fee_table(&["alpha", "beta"], dec!(0.1)),
    )
    .await;

    let opportunity = timeout(Duration::from_secs(2), pipeline.opportunities.recv())
        .await
        .expect("no opportunity within timeout")
        .unwrap();

    assert_eq!(opportunity.pair(), &btc);
    assert_eq!(opportunity.buy_venue().as_str(), "alpha");
    assert_eq!(opportunity.sell_venue().as_str(), "beta");
    assert_eq!(opportunity.buy_price(), dec!(50000));
    assert_eq!(opportunity.sell_price(), dec!(50600));

    pipeline.engine.shutdown().await;
    pipeline.aggregator.stop_monitoring().await;
}

#[tokio::test]
async fn below_breakeven_spread_is_suppressed_by_fees() {
    // 100 gross on a 50000 buy is wiped out by ~100.1 of fees.
    let btc = pair("BTC");
    let alpha = ScriptedVenue::with_top_of_book("alpha", &btc, dec!(49900), dec!(50000));
    let beta = ScriptedVenue::with_top_of_book("beta", &btc, dec!(50100), dec!(50200));

    let mut pipeline = start_pipeline(
        vec![Arc::new(alpha) as Arc<dyn VenueAdapter>, Arc::new(beta)],
        &[btc.clone()],
        risk(dec!(0.5)),
        fee_table(&["alpha", "beta"], dec!(0.1)),
    )
    .await;

    let result = timeout(Duration::from_millis(300), pipeline.opportunities.recv()).await;
    assert!(result.is_err(), "marginal opportunity should not be published");

    pipeline.engine.shutdown().await;
    pipeline.aggregator.stop_monitoring().await;
}

#[tokio::test]
async fn single_venue_never_detects() {
    let btc = pair("BTC");
    let alpha = ScriptedVenue::with_top_of_book("alpha", &btc, dec!(49000), dec!(50000));

    let mut pipeline = start_pipeline(
        vec![Arc::new(alpha) as Arc<dyn VenueAdapter>],
        &[btc.clone()],
        risk(dec!(0)),
        FeeTable::new(),
    )
    .await;

    let result = timeout(Duration::from_millis(300), pipeline.opportunities.recv()).await;
    assert!(result.is_err());

    pipeline.engine.shutdown().await;
    pipeline.aggregator.stop_monitoring().await;
}

#[tokio::test]
async fn removing_one_pair_leaves_the_other_detecting() {
    let btc = pair("BTC");
    let eth = pair("ETH");

    let alpha = ScriptedVenue::new("alpha");
    alpha.script(
        &btc,
        vec![BookUpdate::Snapshot {
            pair: btc.clone(),
            bids: vec![OrderBookLevel::new(dec!(49900), dec!(1))],
            asks: vec![OrderBookLevel::new(dec!(50000), dec!(1))],
            timestamp: Utc::now(),
        }],
    );
    alpha.script(
        &eth,
        vec![BookUpdate::Snapshot {
            pair: eth.clone(),
            bids: vec![OrderBookLevel::new(dec!(2990), dec!(10))],
            asks: vec![OrderBookLevel::new(dec!(3000), dec!(10))],
            timestamp: Utc::now(),
        }],
    );

    let beta = ScriptedVenue::new("beta");
    beta.script(
        &btc,
        vec![BookUpdate::Snapshot {
            pair: btc.clone(),
            bids: vec![OrderBookLevel::new(dec!(51000), dec!(1))],
            asks: vec![OrderBookLevel::new(dec!(51100), dec!(1))],
            timestamp: Utc::now(),
        }],
    );
    beta.script(
        &eth,
        vec![BookUpdate::Snapshot {
            pair: eth.clone(),
            bids: vec![OrderBookLevel::new(dec!(3060), dec!(10))],
            asks: vec![OrderBookLevel::new(dec!(3070), dec!(10))],
            timestamp: Utc::now(),
        }],
    );

    let mut pipeline = start_pipeline(
        vec![Arc::new(alpha) as Arc<dyn VenueAdapter>, Arc::new(beta)],
        &[btc.clone(), eth.clone()],
        risk(dec!(0.5)),
        fee_table(&["alpha", "beta"], dec!(0)),
    )
    .await;

    // Both pairs produce opportunities initially.
    let mut seen = std::collections::HashSet::new();
    while seen.len() < 2 {
        let opportunity = timeout(Duration::from_secs(2), pipeline.opportunities.recv())
            .await
            .expect("expected opportunities for both pairs")
            .unwrap();
        seen.insert(opportunity.pair().clone());
    }

    // Stop BTC; ETH must keep flowing.
    pipeline.engine.remove_pair(&btc).await;
    assert_eq!(pipeline.engine.monitored_pairs(), vec![eth.clone()]);

    // Drain whatever BTC opportunities were already queued.
    while let Ok(Some(opportunity)) =
        timeout(Duration::from_millis(200), pipeline.opportunities.recv()).await
    {
        if opportunity.pair() == &eth {
            break;
        }
    }

    let opportunity = timeout(Duration::from_secs(2), pipeline.opportunities.recv())
        .await
        .expect("ETH detection should continue")
        .unwrap();
    assert_eq!(opportunity.pair(), &eth);

    pipeline.engine.shutdown().await;
    pipeline.aggregator.stop_monitoring().await;
}

#[tokio::test]
async fn stop_monitoring_when_idle_is_a_no_op() {
    let registry = Arc::new(VenueRegistry::new());
    let aggregator = MarketDataAggregator::new(registry, Duration::from_secs(30));
    // Never started; must return without hanging.
    aggregator.stop_monitoring().await;
}
