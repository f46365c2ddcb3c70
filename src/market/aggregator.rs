//! Market data aggregator.
//!
//! Fans ingestion out across venues × pairs: one task per combination
//! drains the adapter's normalized update stream into its own
//! [`OrderBookState`] and publishes the latest top-of-book quote onto the
//! shared quote board. Detection only ever reads the board.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{OrderBookState, PriceQuote, TradingPair, VenueId};
use crate::venue::{BookUpdate, VenueAdapter, VenueRegistry};

/// First resubscribe delay after a stream failure.
const RESUBSCRIBE_INITIAL: Duration = Duration::from_secs(5);
/// Ceiling for the resubscribe delay.
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(10);

struct Running {
    shutdown: watch::Sender<bool>,
    pair_stops: HashMap<TradingPair, watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    connected: Vec<Arc<dyn VenueAdapter>>,
}

/// Owns ingestion tasks and the latest-quote board.
pub struct MarketDataAggregator {
    registry: Arc<VenueRegistry>,
    freshness: Duration,
    quotes: Arc<DashMap<(VenueId, TradingPair), PriceQuote>>,
    running: AtomicBool,
    inner: Mutex<Option<Running>>,
}

impl MarketDataAggregator {
    /// Create an aggregator over the given registry.
    #[must_use]
    pub fn new(registry: Arc<VenueRegistry>, freshness: Duration) -> Self {
        Self {
            registry,
            freshness,
            quotes: Arc::new(DashMap::new()),
            running: AtomicBool::new(false),
            inner: Mutex::new(None),
        }
    }

    /// Start one ingestion task per (venue, pair).
    ///
    /// Idempotent: a second call while running is a logged no-op. A venue
    /// without a registered adapter, or one whose connection fails, is
    /// skipped without affecting the others; an authentication failure
    /// degrades that venue to public mode.
    pub async fn start_monitoring(&self, venues: &[VenueId], pairs: &[TradingPair]) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Aggregator already monitoring, ignoring start request");
            return;
        }

        let (shutdown, _) = watch::channel(false);
        let mut connected: Vec<Arc<dyn VenueAdapter>> = Vec::new();

        for venue in venues {
            let Some(adapter) = self.registry.get(venue) else {
                warn!(venue = %venue, "No adapter registered, skipping venue");
                continue;
            };

            if let Err(e) = adapter.connect().await {
                warn!(venue = %venue, error = %e, "Venue connection failed, skipping venue");
                continue;
            }

            if let Err(e) = adapter.authenticate().await {
                warn!(
                    venue = %venue,
                    error = %e,
                    "Authentication failed, continuing in public mode"
                );
            }

            connected.push(adapter);
        }

        let mut pair_stops: HashMap<TradingPair, watch::Sender<bool>> = HashMap::new();
        let mut tasks = Vec::new();

        for pair in pairs {
            let (pair_stop, _) = watch::channel(false);

            for adapter in &connected {
                tasks.push(spawn_ingestion(
                    Arc::clone(adapter),
                    pair.clone(),
                    Arc::clone(&self.quotes),
                    shutdown.subscribe(),
                    pair_stop.subscribe(),
                ));
            }

            pair_stops.insert(pair.clone(), pair_stop);
        }

        info!(
            venues = connected.len(),
            pairs = pairs.len(),
            tasks = tasks.len(),
            "Market data monitoring started"
        );

        *self.inner.lock() = Some(Running {
            shutdown,
            pair_stops,
            tasks,
            connected,
        });
    }

    /// Latest fresh quote per venue for a pair, in venue-id order.
    ///
    /// Quotes older than the freshness window are filtered out; the result
    /// may be empty or a single venue.
    #[must_use]
    pub fn latest_quotes(&self, pair: &TradingPair) -> Vec<PriceQuote> {
        let now = Utc::now();
        let mut quotes: Vec<PriceQuote> = self
            .quotes
            .iter()
            .filter(|entry| &entry.key().1 == pair)
            .map(|entry| entry.value().clone())
            .filter(|quote| !quote.is_stale(now, self.freshness))
            .collect();
        quotes.sort_by(|a, b| a.venue().cmp(b.venue()));
        quotes
    }

    /// Stop ingestion for a single pair, leaving other pairs untouched.
    pub fn stop_pair(&self, pair: &TradingPair) {
        let mut inner = self.inner.lock();
        if let Some(running) = inner.as_mut() {
            if let Some(stop) = running.pair_stops.remove(pair) {
                let _ = stop.send(true);
                info!(pair = %pair, "Stopped pair ingestion");
            }
        }
        self.quotes.retain(|(_, p), _| p != pair);
    }

    /// Cancel all ingestion tasks, await them, disconnect adapters and
    /// clear the quote board. Safe to call when not running.
    pub async fn stop_monitoring(&self) {
        let Some(running) = self.inner.lock().take() else {
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        let _ = running.shutdown.send(true);
        for stop in running.pair_stops.values() {
            let _ = stop.send(true);
        }

        for task in running.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Ingestion task ended abnormally");
                }
            }
        }

        for adapter in running.connected {
            if let Err(e) = adapter.disconnect().await {
                warn!(venue = %adapter.venue_id(), error = %e, "Disconnect failed");
            }
        }

        self.quotes.clear();
        self.running.store(false, Ordering::SeqCst);
        info!("Market data monitoring stopped");
    }
}

/// Spawn the ingestion loop for one (venue, pair).
fn spawn_ingestion(
    adapter: Arc<dyn VenueAdapter>,
    pair: TradingPair,
    quotes: Arc<DashMap<(VenueId, TradingPair), PriceQuote>>,
    mut shutdown: watch::Receiver<bool>,
    mut pair_stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let venue = adapter.venue_id().clone();
        let mut state = OrderBookState::new(venue.clone(), pair.clone());
        let mut backoff = RESUBSCRIBE_INITIAL;

        debug!(venue = %venue, pair = %pair, "Ingestion task starting");

        'outer: loop {
            let mut stream = match adapter.subscribe_order_book(&pair).await {
                Ok(stream) => {
                    backoff = RESUBSCRIBE_INITIAL;
                    stream
                }
                Err(e) => {
                    warn!(
                        venue = %venue,
                        pair = %pair,
                        error = %e,
                        retry_in = ?backoff,
                        "Subscription failed"
                    );
                    if !sleep_or_stop(backoff, &mut shutdown, &mut pair_stop).await {
                        break;
                    }
                    backoff = (backoff * 2).min(RESUBSCRIBE_MAX);
                    continue;
                }
            };

            loop {
                tokio::select! {
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break 'outer;
                        }
                    }
                    result = pair_stop.changed() => {
                        if result.is_err() || *pair_stop.borrow() {
                            break 'outer;
                        }
                    }
                    update = stream.recv() => {
                        match update {
                            Some(update) => {
                                apply_update(&mut state, update, &venue, &pair, &quotes);
                            }
                            None => {
                                warn!(
                                    venue = %venue,
                                    pair = %pair,
                                    retry_in = ?backoff,
                                    "Update stream ended, resubscribing"
                                );
                                if !sleep_or_stop(backoff, &mut shutdown, &mut pair_stop).await {
                                    break 'outer;
                                }
                                backoff = (backoff * 2).min(RESUBSCRIBE_MAX);
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!(venue = %venue, pair = %pair, "Ingestion task terminated");
    })
}

/// Apply one normalized update and publish the refreshed quote.
fn apply_update(
    state: &mut OrderBookState,
    update: BookUpdate,
    venue: &VenueId,
    pair: &TradingPair,
    quotes: &DashMap<(VenueId, TradingPair), PriceQuote>,
) {
    let applied = match update {
        BookUpdate::Snapshot {
            bids,
            asks,
            timestamp,
            ..
        } => {
            state.apply_snapshot(bids, asks, timestamp);
            true
        }
        BookUpdate::Diff {
            side,
            price,
            quantity,
            timestamp,
            ..
        } => state.apply_diff(side, price, quantity, timestamp),
    };

    if !applied {
        return;
    }

    if let Some(book) = state.snapshot() {
        if let Some(quote) = PriceQuote::from_book(&book) {
            quotes.insert((venue.clone(), pair.clone()), quote);
        }
    }
}

/// Sleep for `delay` unless a stop signal arrives first. Returns `false`
/// when the task should terminate.
async fn sleep_or_stop(
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
    pair_stop: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        result = shutdown.changed() => result.is_ok() && !*shutdown.borrow(),
        result = pair_stop.changed() => result.is_ok() && !*pair_stop.borrow(),
    }
}
