//! Trade execution coordinator.
//!
//! Consumes opportunities from the detection engine and executes the two
//! dependent legs, honoring partial fills and attempting a best-effort
//! compensating trade when the sell leg fails after a successful buy.
//! Statistics are updated here and nowhere else.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::domain::{
    ArbitrageOpportunity, ArbitrageTradeResult, OpportunityStatus, Quantity, RiskProfile,
    TradeLegResult, TradingPair, VenueId,
};
use crate::service::{Event, NotifierRegistry, Repository};
use crate::venue::{FeeTable, OrderSide, VenueRegistry};

use super::paper::PaperLedger;

/// Persist statistics after this many trades...
const STATS_FLUSH_TRADES: u32 = 10;
/// ...or after this much time, whichever comes first.
const STATS_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

struct FlushState {
    trades_since: u32,
    last: Instant,
}

/// Executes individual opportunities and owns all statistics writes.
pub struct TradeExecutor {
    registry: Arc<VenueRegistry>,
    fees: Arc<FeeTable>,
    /// `Some` enables paper trading; live venues are never contacted.
    paper: Option<Arc<PaperLedger>>,
    state: Arc<AppState>,
    repository: Arc<dyn Repository>,
    notifiers: Arc<NotifierRegistry>,
    results: mpsc::Sender<ArbitrageTradeResult>,
    execution_window: Duration,
    flush: Mutex<FlushState>,
}

impl TradeExecutor {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        registry: Arc<VenueRegistry>,
        fees: Arc<FeeTable>,
        paper: Option<Arc<PaperLedger>>,
        state: Arc<AppState>,
        repository: Arc<dyn Repository>,
        notifiers: Arc<NotifierRegistry>,
        results: mpsc::Sender<ArbitrageTradeResult>,
        execution_window: Duration,
    ) -> Self {
        Self {
            registry,
            fees,
            paper,
            state,
            repository,
            notifiers,
            results,
            execution_window,
            flush: Mutex::new(FlushState {
                trades_since: 0,
                last: Instant::now(),
            }),
        }
    }

    /// Current risk profile (copy-on-read).
    #[must_use]
    pub fn risk_profile(&self) -> RiskProfile {
        self.state.risk_profile()
    }

    /// Record and announce a freshly received opportunity.
    pub async fn on_detected(&self, opportunity: &ArbitrageOpportunity) {
        self.state
            .with_statistics(|stats| stats.record_detection(opportunity));

        if let Err(e) = self.repository.save_opportunity(opportunity).await {
            warn!(error = %e, "Failed to persist opportunity");
        }

        self.notifiers
            .notify_all(Event::OpportunityDetected(opportunity.into()))
            .await;
    }

    /// Execute one opportunity end to end.
    pub async fn process(&self, mut opportunity: ArbitrageOpportunity) {
        // Stale opportunities are missed, never executed against old prices.
        if opportunity.age(Utc::now()) > self.execution_window {
            self.mark_missed(opportunity).await;
            return;
        }

        if let Err(e) = opportunity.advance(OpportunityStatus::Executing) {
            warn!(error = %e, "Opportunity not executable");
            return;
        }

        let result = match &self.paper {
            Some(ledger) => self.execute_paper(opportunity, ledger),
            None => self.execute_live(opportunity).await,
        };

        self.finalize(result).await;
    }

    async fn mark_missed(&self, mut opportunity: ArbitrageOpportunity) {
        info!(
            pair = %opportunity.pair(),
            age = ?opportunity.age(Utc::now()),
            window = ?self.execution_window,
            "Opportunity missed"
        );
        if let Err(e) = opportunity.advance(OpportunityStatus::Missed) {
            warn!(error = %e, "Could not mark opportunity missed");
            return;
        }
        self.state
            .with_statistics(|stats| stats.record_missed(&opportunity));
        if let Err(e) = self.repository.save_opportunity(&opportunity).await {
            warn!(error = %e, "Failed to persist missed opportunity");
        }
    }

    /// Simulate both legs against the paper ledger.
    fn execute_paper(
        &self,
        mut opportunity: ArbitrageOpportunity,
        ledger: &PaperLedger,
    ) -> ArbitrageTradeResult {
        let pair = opportunity.pair().clone();
        let quantity = opportunity.effective_quantity();
        let buy_venue = opportunity.buy_venue().clone();
        let sell_venue = opportunity.sell_venue().clone();

        let buy = ledger.execute_buy(
            &buy_venue,
            &pair,
            opportunity.buy_price(),
            quantity,
            self.fees.taker_percent(&buy_venue),
        );
        if !buy.is_filled() {
            return self.fail(opportunity, buy, None, None, "buy leg failed");
        }

        let filled = buy.executed_quantity;
        let sell = ledger.execute_sell(
            &sell_venue,
            &pair,
            opportunity.sell_price(),
            filled,
            self.fees.taker_percent(&sell_venue),
        );
        if !sell.is_filled() {
            // Flatten the paper position back on the buy venue.
            let compensation = ledger.execute_sell(
                &buy_venue,
                &pair,
                opportunity.buy_price(),
                filled,
                self.fees.taker_percent(&buy_venue),
            );
            return self.fail(opportunity, buy, Some(sell), Some(compensation), "sell leg failed");
        }

        self.advance_executed(&mut opportunity);
        ArbitrageTradeResult::success(opportunity, buy, sell)
    }

    /// Execute both legs against live venues.
    async fn execute_live(&self, mut opportunity: ArbitrageOpportunity) -> ArbitrageTradeResult {
        let pair = opportunity.pair().clone();
        let quantity = opportunity.effective_quantity();
        let buy_venue = opportunity.buy_venue().clone();
        let sell_venue = opportunity.sell_venue().clone();

        let buy = self
            .place_market(&buy_venue, &pair, OrderSide::Buy, quantity)
            .await;
        if !buy.is_filled() {
            return self.fail(opportunity, buy, None, None, "buy leg failed");
        }

        // Sell exactly what the buy actually filled; partial fills are
        // honored, never the originally requested quantity.
        let filled = buy.executed_quantity;
        let sell = self
            .place_market(&sell_venue, &pair, OrderSide::Sell, filled)
            .await;
        if !sell.is_filled() {
            let compensation = self
                .place_market(&buy_venue, &pair, OrderSide::Sell, filled)
                .await;
            return self.fail(opportunity, buy, Some(sell), Some(compensation), "sell leg failed");
        }

        self.advance_executed(&mut opportunity);
        ArbitrageTradeResult::success(opportunity, buy, sell)
    }

    async fn place_market(
        &self,
        venue: &VenueId,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Quantity,
    ) -> TradeLegResult {
        let adapter = match self.registry.require(venue) {
            Ok(adapter) => adapter,
            Err(e) => return TradeLegResult::failed(venue.clone(), quantity, e.to_string()),
        };
        match adapter.place_market_order(pair, side, quantity).await {
            Ok(leg) => leg,
            Err(e) => TradeLegResult::failed(venue.clone(), quantity, e.to_string()),
        }
    }

    fn advance_executed(&self, opportunity: &mut ArbitrageOpportunity) {
        if let Err(e) = opportunity.advance(OpportunityStatus::Executed) {
            warn!(error = %e, "Could not mark opportunity executed");
        }
    }

    fn fail(
        &self,
        mut opportunity: ArbitrageOpportunity,
        buy: TradeLegResult,
        sell: Option<TradeLegResult>,
        compensation: Option<TradeLegResult>,
        stage: &str,
    ) -> ArbitrageTradeResult {
        if let Err(e) = opportunity.advance(OpportunityStatus::Failed) {
            warn!(error = %e, "Could not mark opportunity failed");
        }

        let leg_error = sell
            .as_ref()
            .filter(|leg| !leg.success)
            .or(Some(&buy))
            .and_then(|leg| leg.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());

        let message = match compensation.as_ref() {
            Some(comp) if comp.is_filled() => {
                format!("{stage}: {leg_error}; compensating sell on buy venue succeeded")
            }
            Some(comp) => format!(
                "{stage}: {leg_error}; compensating sell on buy venue failed: {}",
                comp.error.as_deref().unwrap_or("unknown error")
            ),
            None => format!("{stage}: {leg_error}"),
        };

        ArbitrageTradeResult::failure(opportunity, buy, sell, compensation, message)
    }

    /// Warn when a filled leg deviated from the quoted price beyond the
    /// profile's slippage tolerance. Slippage is a venue-reported fact;
    /// it is observed here, not simulated.
    fn check_slippage(&self, result: &ArbitrageTradeResult) {
        let max = self.risk_profile().max_slippage_percent;
        let legs = [
            (Some(&result.buy), result.opportunity.buy_price()),
            (result.sell.as_ref(), result.opportunity.sell_price()),
        ];
        for (leg, quoted) in legs {
            let Some(leg) = leg.filter(|leg| leg.is_filled()) else {
                continue;
            };
            if quoted.is_zero() {
                continue;
            }
            let slippage =
                (leg.executed_price - quoted).abs() / quoted * rust_decimal::Decimal::ONE_HUNDRED;
            if slippage > max {
                warn!(
                    venue = %leg.venue,
                    quoted = %quoted,
                    executed = %leg.executed_price,
                    slippage_percent = %slippage,
                    max_percent = %max,
                    "Leg slipped beyond tolerance"
                );
            }
        }
    }

    /// Record, persist, notify and publish one finished trade.
    async fn finalize(&self, result: ArbitrageTradeResult) {
        self.check_slippage(&result);
        self.state.with_statistics(|stats| stats.record_trade(&result));

        if let Err(e) = self.repository.save_trade_result(&result).await {
            warn!(error = %e, "Failed to persist trade result");
        }
        if let Err(e) = self.repository.save_opportunity(&result.opportunity).await {
            warn!(error = %e, "Failed to persist opportunity status");
        }

        let event = if result.success {
            Event::TradeCompleted((&result).into())
        } else {
            Event::TradeFailed((&result).into())
        };
        self.notifiers.notify_all(event).await;

        if let Err(e) = self.results.try_send(result) {
            debug!(error = %e, "No consumer for trade result");
        }

        let due = {
            let mut flush = self.flush.lock();
            flush.trades_since += 1;
            flush.trades_since >= STATS_FLUSH_TRADES
                || flush.last.elapsed() >= STATS_FLUSH_INTERVAL
        };
        if due {
            self.flush_statistics().await;
        }
    }

    /// Persist the current statistics snapshot.
    pub async fn flush_statistics(&self) {
        let snapshot = self.state.statistics();
        if let Err(e) = self.repository.save_statistics(&snapshot).await {
            warn!(error = %e, "Failed to persist statistics");
        } else {
            debug!(
                trades = snapshot.trades_executed,
                profit = %snapshot.total_profit,
                "Statistics flushed"
            );
        }
        let mut flush = self.flush.lock();
        flush.trades_since = 0;
        flush.last = Instant::now();
    }
}

/// Consumer loop over the opportunity channel.
///
/// A single logical consumer fans execution out to at most
/// `max_concurrent_trades` in-flight trades; within one pair opportunities
/// arrive in detection order, and the bound is the only global
/// serialization.
pub struct ExecutionCoordinator {
    executor: Arc<TradeExecutor>,
    opportunities: mpsc::Receiver<ArbitrageOpportunity>,
    shutdown: watch::Receiver<bool>,
    auto_trade: bool,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(
        executor: Arc<TradeExecutor>,
        opportunities: mpsc::Receiver<ArbitrageOpportunity>,
        shutdown: watch::Receiver<bool>,
        auto_trade: bool,
    ) -> Self {
        Self {
            executor,
            opportunities,
            shutdown,
            auto_trade,
        }
    }

    /// Run until shutdown or the opportunity channel closes.
    pub async fn run(mut self) {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut flush_interval = tokio::time::interval(STATS_FLUSH_INTERVAL);
        flush_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it.
        flush_interval.tick().await;

        loop {
            tokio::select! {
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        info!("Execution coordinator shutting down");
                        break;
                    }
                }
                _ = flush_interval.tick() => {
                    self.executor.flush_statistics().await;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                opportunity = self.opportunities.recv() => {
                    let Some(opportunity) = opportunity else {
                        info!("Opportunity channel closed");
                        break;
                    };

                    self.executor.on_detected(&opportunity).await;
                    if !self.auto_trade {
                        debug!(pair = %opportunity.pair(), "Auto-trade disabled, not executing");
                        continue;
                    }

                    let risk = self.executor.risk_profile();
                    while in_flight.len() >= risk.max_concurrent_trades.max(1) {
                        if in_flight.join_next().await.is_none() {
                            break;
                        }
                    }

                    let executor = Arc::clone(&self.executor);
                    in_flight.spawn(async move {
                        executor.process(opportunity).await;
                    });

                    if !risk.cooldown.is_zero() {
                        tokio::select! {
                            () = tokio::time::sleep(risk.cooldown) => {}
                            _ = self.shutdown.changed() => {
                                if *self.shutdown.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        // Let in-flight trades finish, then flush once more.
        while in_flight.join_next().await.is_some() {}
        self.executor.flush_statistics().await;
    }
}
