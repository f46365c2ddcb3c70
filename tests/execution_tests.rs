//! Integration tests for the execution coordinator: mock venues with
//! scripted order outcomes drive the two-leg flow, partial-fill handling
//! and the best-effort compensation path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use skimmer::app::AppState;
use skimmer::config::NotificationConfig;
use skimmer::domain::{
    ArbitrageOpportunity, ArbitrageTradeResult, OpportunityStatus, OrderBook, Price, Quantity,
    TradeLegResult, TradingPair, VenueId,
};
use skimmer::error::Result;
use skimmer::execution::{ExecutionCoordinator, TradeExecutor};
use skimmer::service::{MemoryRepository, NotifierRegistry, Repository};
use skimmer::venue::{
    BookUpdateStream, FeeSchedule, FeeTable, OrderSide, VenueAdapter, VenueRegistry,
};

/// A placed order as seen by a mock venue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlacedOrder {
    side: OrderSide,
    quantity: Quantity,
}

/// Venue that pops scripted leg results and records every placement.
struct MockVenue {
    venue: VenueId,
    responses: Mutex<VecDeque<TradeLegResult>>,
    placed: Mutex<Vec<PlacedOrder>>,
}

impl MockVenue {
    fn new(venue: &str) -> Self {
        Self {
            venue: VenueId::from(venue),
            responses: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
        }
    }

    fn push_fill(&self, price: Price, quantity: Quantity, fee: Price) {
        let mut responses = self.responses.lock();
        let order_id = format!("order-{}", responses.len() + 1);
        responses.push_back(TradeLegResult::filled(
            self.venue.clone(),
            order_id,
            quantity,
            price,
            quantity,
            fee,
            "USD",
        ));
    }

    fn push_rejection(&self, reason: &str) {
        self.responses
            .lock()
            .push_back(TradeLegResult::failed(self.venue.clone(), dec!(0), reason));
    }

    fn placed(&self) -> Vec<PlacedOrder> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn venue_id(&self) -> &VenueId {
        &self.venue
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe_order_book(&self, _pair: &TradingPair) -> Result<BookUpdateStream> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn order_book_snapshot(&self, _pair: &TradingPair, _depth: usize) -> Result<OrderBook> {
        unimplemented!("not used by execution tests")
    }

    async fn place_market_order(
        &self,
        _pair: &TradingPair,
        side: OrderSide,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        self.placed.lock().push(PlacedOrder { side, quantity });
        let mut leg = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                TradeLegResult::failed(self.venue.clone(), quantity, "no scripted response")
            });
        leg.requested_quantity = quantity;
        Ok(leg)
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
        Ok(FeeSchedule::default())
    }
}

fn opportunity() -> ArbitrageOpportunity {
    ArbitrageOpportunity::new(
        TradingPair::new("BTC", "USD").unwrap(),
        VenueId::from("alpha"),
        dec!(50000),
        dec!(1),
        VenueId::from("beta"),
        dec!(50600),
        dec!(1),
        dec!(100000),
        Utc::now(),
    )
    .unwrap()
}

struct LiveHarness {
    alpha: Arc<MockVenue>,
    beta: Arc<MockVenue>,
    executor: Arc<TradeExecutor>,
    repository: Arc<MemoryRepository>,
    results: mpsc::Receiver<ArbitrageTradeResult>,
}

fn live_harness() -> LiveHarness {
    let alpha = Arc::new(MockVenue::new("alpha"));
    let beta = Arc::new(MockVenue::new("beta"));

    let mut registry = VenueRegistry::new();
    registry.register(Arc::clone(&alpha) as Arc<dyn VenueAdapter>);
    registry.register(Arc::clone(&beta) as Arc<dyn VenueAdapter>);

    let repository = Arc::new(MemoryRepository::new());
    let (results_tx, results) = mpsc::channel(16);

    let executor = Arc::new(TradeExecutor::new(
        Arc::new(registry),
        Arc::new(FeeTable::new()),
        None,
        Arc::new(AppState::default()),
        Arc::clone(&repository) as Arc<dyn skimmer::service::Repository>,
        Arc::new(NotifierRegistry::new(NotificationConfig::default())),
        results_tx,
        Duration::from_secs(60),
    ));

    LiveHarness {
        alpha,
        beta,
        executor,
        repository,
        results,
    }
}

#[tokio::test]
async fn both_legs_filling_produces_a_successful_trade() {
    let mut harness = live_harness();
    harness.alpha.push_fill(dec!(50000), dec!(1), dec!(50));
    harness.beta.push_fill(dec!(50600), dec!(1), dec!(50.6));

    harness.executor.process(opportunity()).await;

    let result = harness.results.recv().await.unwrap();
    assert!(result.success);
    assert_eq!(result.opportunity.status(), OpportunityStatus::Executed);
    assert_eq!(result.net_profit, dec!(499.4));
    assert!(result.compensation.is_none());

    // One buy on alpha, one sell on beta.
    assert_eq!(
        harness.alpha.placed(),
        vec![PlacedOrder {
            side: OrderSide::Buy,
            quantity: dec!(1)
        }]
    );
    assert_eq!(
        harness.beta.placed(),
        vec![PlacedOrder {
            side: OrderSide::Sell,
            quantity: dec!(1)
        }]
    );
}

#[tokio::test]
async fn failed_buy_never_attempts_the_sell() {
    let mut harness = live_harness();
    harness.alpha.push_rejection("insufficient funds");

    harness.executor.process(opportunity()).await;

    let result = harness.results.recv().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.opportunity.status(), OpportunityStatus::Failed);
    assert!(result.sell.is_none());
    assert!(result.compensation.is_none());
    assert!(result.error.as_deref().unwrap().contains("buy leg failed"));
    assert!(harness.beta.placed().is_empty());
}

#[tokio::test]
async fn failed_sell_triggers_compensating_sell_on_buy_venue() {
    let mut harness = live_harness();
    // Buy fills 1.0 on alpha; sell on beta is rejected; compensation sells
    // 1.0 back on alpha.
    harness.alpha.push_fill(dec!(50000), dec!(1), dec!(50));
    harness.beta.push_rejection("post-only violation");
    harness.alpha.push_fill(dec!(49950), dec!(1), dec!(49.95));

    harness.executor.process(opportunity()).await;

    let result = harness.results.recv().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.opportunity.status(), OpportunityStatus::Failed);

    let error = result.error.as_deref().unwrap();
    assert!(error.contains("sell leg failed"), "error was: {error}");
    assert!(error.contains("compensating sell"), "error was: {error}");

    let compensation = result.compensation.as_ref().unwrap();
    assert!(compensation.is_filled());
    assert_eq!(compensation.venue, VenueId::from("alpha"));
    assert_eq!(compensation.executed_quantity, dec!(1));

    assert_eq!(
        harness.alpha.placed(),
        vec![
            PlacedOrder {
                side: OrderSide::Buy,
                quantity: dec!(1)
            },
            PlacedOrder {
                side: OrderSide::Sell,
                quantity: dec!(1)
            },
        ]
    );
}

#[tokio::test]
async fn partial_buy_fill_sizes_the_sell_leg() {
    let mut harness = live_harness();
    // Buy requested 1.0 but fills only 0.4; the sell must be for 0.4.
    let partial = TradeLegResult::filled(
        VenueId::from("alpha"),
        "order-1",
        dec!(1),
        dec!(50000),
        dec!(0.4),
        dec!(20),
        "USD",
    );
    harness.alpha.responses.lock().push_back(partial);
    harness.beta.push_fill(dec!(50600), dec!(0.4), dec!(20.24));

    harness.executor.process(opportunity()).await;

    let result = harness.results.recv().await.unwrap();
    assert!(result.success);
    assert_eq!(
        harness.beta.placed(),
        vec![PlacedOrder {
            side: OrderSide::Sell,
            quantity: dec!(0.4)
        }]
    );
    // 0.4 * 600 spread - 40.24 fees
    assert_eq!(result.net_profit, dec!(240) - dec!(40.24));
}

#[tokio::test]
async fn statistics_flow_through_the_coordinator() {
    let alpha = Arc::new(MockVenue::new("alpha"));
    let beta = Arc::new(MockVenue::new("beta"));
    alpha.push_fill(dec!(50000), dec!(1), dec!(50));
    beta.push_fill(dec!(50600), dec!(1), dec!(50.6));

    let mut registry = VenueRegistry::new();
    registry.register(Arc::clone(&alpha) as Arc<dyn VenueAdapter>);
    registry.register(Arc::clone(&beta) as Arc<dyn VenueAdapter>);

    let state = Arc::new(AppState::default());
    let repository = Arc::new(MemoryRepository::new());
    let (results_tx, mut results) = mpsc::channel(16);

    let executor = Arc::new(TradeExecutor::new(
        Arc::new(registry),
        Arc::new(FeeTable::new()),
        None,
        Arc::clone(&state),
        Arc::clone(&repository) as Arc<dyn skimmer::service::Repository>,
        Arc::new(NotifierRegistry::new(NotificationConfig::default())),
        results_tx,
        Duration::from_secs(60),
    ));

    let (opportunity_tx, opportunity_rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);
    let coordinator = ExecutionCoordinator::new(Arc::clone(&executor), opportunity_rx, stop_rx, true);
    let handle = tokio::spawn(coordinator.run());

    opportunity_tx.send(opportunity()).await.unwrap();

    let result = timeout(Duration::from_secs(2), results.recv())
        .await
        .expect("coordinator should produce a result")
        .unwrap();
    assert!(result.success);

    let _ = stop_tx.send(true);
    handle.await.unwrap();

    let stats = state.statistics();
    assert_eq!(stats.opportunities_detected, 1);
    assert_eq!(stats.trades_executed, 1);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.total_profit, dec!(499.4));
    assert_eq!(stats.by_pair["BTC/USD"].trades, 1);

    // The shutdown path flushes statistics to the repository.
    let persisted = repository.last_statistics().unwrap();
    assert_eq!(persisted.trades_executed, 1);

    // Both the detection-time and terminal opportunity snapshots landed.
    let opportunities = repository.recent_opportunities(10).await.unwrap();
    assert_eq!(opportunities.len(), 2);
    assert_eq!(opportunities[0].status(), OpportunityStatus::Executed);
}
