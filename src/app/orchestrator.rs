//! Application orchestration.
//!
//! Builds every component from configuration, wires the channels between
//! them and runs until shutdown: venue registry → market data aggregator →
//! detection engine → opportunity channel → execution coordinator →
//! results channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{Config, RepositoryConfig, VenueKind};
use crate::domain::{ArbitrageTradeResult, VenueId};
use crate::engine::DetectionEngine;
use crate::error::Result;
use crate::execution::{ExecutionCoordinator, PaperLedger, TradeExecutor};
use crate::market::MarketDataAggregator;
use crate::service::{
    JsonlRepository, LogNotifier, MemoryRepository, NotifierRegistry, Repository, WebhookNotifier,
};
use crate::venue::{feed::FeedVenue, sim::SimVenue, FeeSchedule, FeeTable, VenueRegistry};

use super::state::AppState;

const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Main application struct.
pub struct App;

impl App {
    /// Run until the process is signalled.
    pub async fn run(config: Config) -> Result<()> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        Self::run_with_shutdown(config, shutdown_rx).await
    }

    /// Run with an externally controlled shutdown signal.
    pub async fn run_with_shutdown(
        config: Config,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            pairs = config.arbitrage.pairs.len(),
            venues = config.venues.len(),
            paper = config.arbitrage.paper_trading,
            auto_trade = config.arbitrage.auto_trade,
            "Starting skimmer"
        );

        let state = Arc::new(AppState::new(config.risk_profile()));
        let registry = Arc::new(build_venue_registry(&config));

        let aggregator = Arc::new(MarketDataAggregator::new(
            Arc::clone(&registry),
            config.arbitrage.quote_freshness(),
        ));
        aggregator
            .start_monitoring(&registry.venue_ids(), &config.arbitrage.pairs)
            .await;

        let fees = Arc::new(build_fee_table(&config, &registry).await);
        let repository = build_repository(&config)?;
        let notifiers = Arc::new(build_notifier_registry(&config));
        info!(notifiers = notifiers.len(), "Notifiers initialized");

        let paper = if config.arbitrage.paper_trading {
            Some(build_paper_ledger(&config, &registry))
        } else {
            None
        };

        let (opportunity_tx, opportunity_rx) = mpsc::channel(config.arbitrage.channel_capacity);
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let executor = Arc::new(TradeExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&fees),
            paper,
            Arc::clone(&state),
            repository,
            Arc::clone(&notifiers),
            results_tx,
            config.arbitrage.execution_window(),
        ));

        let (coordinator_stop, coordinator_stop_rx) = watch::channel(false);
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&executor),
            opportunity_rx,
            coordinator_stop_rx,
            config.arbitrage.auto_trade,
        );
        let coordinator_handle = tokio::spawn(coordinator.run());
        let results_handle = tokio::spawn(log_results(results_rx));

        let engine = DetectionEngine::new(
            Arc::clone(&aggregator),
            Arc::clone(&state),
            fees,
            opportunity_tx,
            config.arbitrage.poll_interval(),
        );
        for pair in &config.arbitrage.pairs {
            engine.add_pair(pair);
        }

        // Park until told to stop.
        loop {
            if shutdown.changed().await.is_err() || *shutdown.borrow() {
                break;
            }
        }

        info!("Shutting down");
        engine.shutdown().await;
        aggregator.stop_monitoring().await;

        let _ = coordinator_stop.send(true);
        if let Err(e) = coordinator_handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Coordinator ended abnormally");
            }
        }

        // The coordinator is gone; dropping our executor handle closes the
        // results channel and lets the logger drain out.
        drop(executor);
        if let Err(e) = results_handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Result logger ended abnormally");
            }
        }

        let stats = state.statistics();
        info!(
            opportunities = stats.opportunities_detected,
            trades = stats.trades_executed,
            profit = %stats.total_profit,
            "Skimmer stopped"
        );
        Ok(())
    }
}

/// Build adapters for every configured venue.
fn build_venue_registry(config: &Config) -> VenueRegistry {
    let mut registry = VenueRegistry::new();
    for venue in &config.venues {
        match venue.kind {
            VenueKind::Sim => {
                registry.register(Arc::new(SimVenue::from_config(venue)));
            }
            VenueKind::Feed => {
                registry.register(Arc::new(FeedVenue::from_config(venue)));
            }
        }
        debug!(venue = %venue.id, kind = ?venue.kind, "Venue registered");
    }
    registry
}

/// Cache fee schedules: config overrides win, then the venue's own
/// schedule, then the default fallback.
async fn build_fee_table(config: &Config, registry: &VenueRegistry) -> FeeTable {
    let mut table = FeeTable::new();

    for venue_config in &config.venues {
        let venue = VenueId::new(venue_config.id.clone());

        let reported = match registry.get(&venue) {
            Some(adapter) => match adapter.fee_schedule().await {
                Ok(schedule) => Some(schedule),
                Err(e) => {
                    warn!(venue = %venue, error = %e, "No fee schedule, using fallback");
                    None
                }
            },
            None => None,
        };

        let base = reported.unwrap_or_default();
        table.insert(
            venue.clone(),
            FeeSchedule {
                maker_percent: venue_config.maker_fee_percent.unwrap_or(base.maker_percent),
                taker_percent: venue_config.taker_fee_percent.unwrap_or(base.taker_percent),
            },
        );
    }

    table
}

fn build_repository(config: &Config) -> Result<Arc<dyn Repository>> {
    Ok(match &config.repository {
        RepositoryConfig::Memory => Arc::new(MemoryRepository::new()),
        RepositoryConfig::Jsonl { path } => {
            info!(path = %path.display(), "Recording to JSONL repository");
            Arc::new(JsonlRepository::open(path)?)
        }
    })
}

fn build_notifier_registry(config: &Config) -> NotifierRegistry {
    let mut registry = NotifierRegistry::new(config.notifications.clone());

    // Always log.
    registry.register(Box::new(LogNotifier));

    if let Some(url) = &config.notifications.webhook_url {
        registry.register(Box::new(WebhookNotifier::new(url.clone())));
        info!(url = %url, "Webhook notifier enabled");
    }

    registry
}

/// Seed every venue's paper balances from config.
fn build_paper_ledger(config: &Config, registry: &VenueRegistry) -> Arc<PaperLedger> {
    let ledger = Arc::new(PaperLedger::new());
    if config.paper.balances.is_empty() {
        warn!("Paper trading enabled with no seeded balances; every leg will fail");
    }
    for venue in registry.venue_ids() {
        for (currency, amount) in &config.paper.balances {
            ledger.seed(&venue, currency, *amount);
        }
    }
    ledger
}

async fn log_results(mut results: mpsc::Receiver<ArbitrageTradeResult>) {
    while let Some(result) = results.recv().await {
        debug!(
            pair = %result.opportunity.pair(),
            success = result.success,
            net_profit = %result.net_profit,
            "Trade result"
        );
    }
}
