//! Per-pair detection loops.
//!
//! The engine owns one independently cancellable loop per monitored pair.
//! Loops share nothing but the quote board, the hot-swapped risk profile
//! and the opportunity channel, so adding or removing a pair never
//! disturbs its siblings.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::domain::{ArbitrageOpportunity, TradingPair};
use crate::market::MarketDataAggregator;
use crate::venue::FeeTable;

use super::detector;

/// Backoff after an unexpected loop error.
const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(10);

struct PairLoop {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the per-pair detection loops.
pub struct DetectionEngine {
    aggregator: Arc<MarketDataAggregator>,
    state: Arc<AppState>,
    fees: Arc<FeeTable>,
    opportunities: mpsc::Sender<ArbitrageOpportunity>,
    poll_interval: Duration,
    shutdown: watch::Sender<bool>,
    pairs: Mutex<HashMap<TradingPair, PairLoop>>,
}

impl DetectionEngine {
    /// Create an engine publishing onto `opportunities`.
    #[must_use]
    pub fn new(
        aggregator: Arc<MarketDataAggregator>,
        state: Arc<AppState>,
        fees: Arc<FeeTable>,
        opportunities: mpsc::Sender<ArbitrageOpportunity>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            aggregator,
            state,
            fees,
            opportunities,
            poll_interval,
            shutdown,
            pairs: Mutex::new(HashMap::new()),
        }
    }

    /// Start the detection loop for a pair. A loop that already exists is
    /// left running.
    pub fn add_pair(&self, pair: &TradingPair) {
        let mut pairs = self.pairs.lock();
        if pairs.contains_key(pair) {
            debug!(pair = %pair, "Detection loop already running");
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = spawn_pair_loop(
            pair.clone(),
            Arc::clone(&self.aggregator),
            Arc::clone(&self.state),
            Arc::clone(&self.fees),
            self.opportunities.clone(),
            self.poll_interval,
            self.shutdown.subscribe(),
            stop_rx,
        );
        pairs.insert(pair.clone(), PairLoop { stop, handle });
        info!(pair = %pair, "Detection loop started");
    }

    /// Stop one pair's loop and its ingestion, leaving other pairs alone.
    pub async fn remove_pair(&self, pair: &TradingPair) {
        let entry = self.pairs.lock().remove(pair);
        let Some(PairLoop { stop, handle }) = entry else {
            return;
        };

        let _ = stop.send(true);
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!(pair = %pair, error = %e, "Detection loop ended abnormally");
            }
        }
        self.aggregator.stop_pair(pair);
        info!(pair = %pair, "Detection loop stopped");
    }

    /// Currently monitored pairs.
    #[must_use]
    pub fn monitored_pairs(&self) -> Vec<TradingPair> {
        self.pairs.lock().keys().cloned().collect()
    }

    /// Stop every loop and await their exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let loops: Vec<(TradingPair, PairLoop)> = self.pairs.lock().drain().collect();
        for (pair, pair_loop) in loops {
            if let Err(e) = pair_loop.handle.await {
                if !e.is_cancelled() {
                    warn!(pair = %pair, error = %e, "Detection loop ended abnormally");
                }
            }
        }
        info!("Detection engine stopped");
    }
}

/// Spawn the detection loop for one pair.
#[allow(clippy::too_many_arguments)]
fn spawn_pair_loop(
    pair: TradingPair,
    aggregator: Arc<MarketDataAggregator>,
    state: Arc<AppState>,
    fees: Arc<FeeTable>,
    opportunities: mpsc::Sender<ArbitrageOpportunity>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                result = stop.changed() => {
                    if result.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let quotes = aggregator.latest_quotes(&pair);
                    if quotes.len() < 2 {
                        continue;
                    }

                    let risk = state.risk_profile();
                    let Some(opportunity) =
                        detector::evaluate(&pair, &quotes, &risk, &fees, chrono::Utc::now())
                    else {
                        continue;
                    };

                    match opportunities.try_send(opportunity) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // Detection never blocks on a slow consumer.
                            warn!(pair = %pair, "Opportunity channel full, dropping");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            warn!(
                                pair = %pair,
                                retry_in = ?LOOP_ERROR_BACKOFF,
                                "Opportunity channel closed"
                            );
                            // The consumer may be restarting; back off
                            // rather than terminate the loop.
                            tokio::select! {
                                () = tokio::time::sleep(LOOP_ERROR_BACKOFF) => {}
                                _ = shutdown.changed() => break,
                                _ = stop.changed() => break,
                            }
                        }
                    }
                }
            }
        }

        debug!(pair = %pair, "Detection loop terminated");
    })
}
