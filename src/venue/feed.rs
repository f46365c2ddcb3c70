//! Generic adapter for gateways speaking the normalized feed protocol.
//!
//! Venue-specific framing belongs to external gateway processes; this
//! adapter consumes their already-normalized JSON: `snapshot` and `diff`
//! frames over WebSocket, plus a small HTTP surface for point-in-time
//! snapshots, order placement and fee schedules.
//!
//! Reconnection is deliberately not handled here. A stream ends when the
//! connection drops and the market-data aggregator resubscribes with
//! backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use crate::config::VenueConfig;
use crate::domain::{
    BookSide, OrderBook, OrderBookLevel, Price, Quantity, TradeLegResult, TradingPair, VenueId,
};
use crate::error::{Error, ExecutionError, Result, VenueError};

use super::traits::{BookUpdate, BookUpdateStream, FeeSchedule, OrderSide, VenueAdapter};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Subscription request sent after connecting.
#[derive(Debug, Serialize)]
struct SubscribeFrame {
    op: &'static str,
    channel: &'static str,
    pair: String,
}

/// One price level on the wire: `[price, quantity]`.
#[derive(Debug, Deserialize)]
struct LevelFrame(Decimal, Decimal);

impl LevelFrame {
    fn into_level(self) -> OrderBookLevel {
        OrderBookLevel::new(self.0, self.1)
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotFrame {
    pair: String,
    bids: Vec<LevelFrame>,
    asks: Vec<LevelFrame>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct DiffFrame {
    pair: String,
    side: String,
    price: Decimal,
    quantity: Decimal,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Inbound frame from the gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedFrame {
    Snapshot(SnapshotFrame),
    Diff(DiffFrame),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    status: String,
    filled_quantity: Decimal,
    average_price: Decimal,
    #[serde(default)]
    fee: Decimal,
    #[serde(default)]
    fee_currency: String,
}

#[derive(Debug, Deserialize)]
struct FeeResponse {
    maker_percent: Decimal,
    taker_percent: Decimal,
}

#[derive(Debug, Serialize)]
struct OrderRequestBody {
    pair: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Price>,
}

impl OrderRequestBody {
    fn market(pair: &TradingPair, side: OrderSide, quantity: Quantity) -> Self {
        Self {
            pair: pair.to_string(),
            side: side.as_str(),
            order_type: "market",
            quantity,
            price: None,
        }
    }

    fn limit(pair: &TradingPair, side: OrderSide, price: Price, quantity: Quantity) -> Self {
        Self {
            pair: pair.to_string(),
            side: side.as_str(),
            order_type: "limit",
            quantity,
            price: Some(price),
        }
    }
}

/// Venue adapter over a normalized-feed gateway.
pub struct FeedVenue {
    venue: VenueId,
    ws_url: String,
    api_url: Option<String>,
    api_key: Option<String>,
    http: reqwest::Client,
    /// Fresh channel per connect; flipping it true ends every stream task.
    shutdown: Mutex<watch::Sender<bool>>,
}

impl FeedVenue {
    /// Create an adapter for a gateway at `ws_url`.
    #[must_use]
    pub fn new(
        venue: VenueId,
        ws_url: String,
        api_url: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            venue,
            ws_url,
            api_url,
            api_key,
            http: reqwest::Client::new(),
            shutdown: Mutex::new(shutdown),
        }
    }

    /// Build from a config entry.
    #[must_use]
    pub fn from_config(config: &VenueConfig) -> Self {
        Self::new(
            VenueId::new(config.id.clone()),
            config.ws_url.clone().unwrap_or_default(),
            config.api_url.clone(),
            config.api_key.clone(),
        )
    }

    fn api_base(&self, capability: &'static str) -> Result<&str> {
        self.api_url.as_deref().ok_or_else(|| {
            VenueError::Unsupported {
                venue: self.venue.to_string(),
                capability,
            }
            .into()
        })
    }

    fn bearer(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            VenueError::NotAuthenticated {
                venue: self.venue.to_string(),
            }
            .into()
        })
    }

    fn leg_from_response(
        &self,
        response: OrderResponse,
        requested_price: Option<Price>,
        requested_quantity: Quantity,
        pair: &TradingPair,
    ) -> TradeLegResult {
        if response.status == "rejected" {
            let error = ExecutionError::OrderRejected {
                venue: self.venue.to_string(),
                reason: format!("order {}", response.order_id),
            };
            return TradeLegResult::failed(self.venue.clone(), requested_quantity, error.to_string());
        }
        if response.filled_quantity.is_zero() {
            let error = ExecutionError::ZeroFill {
                venue: self.venue.to_string(),
            };
            return TradeLegResult::failed(self.venue.clone(), requested_quantity, error.to_string());
        }

        let fee_currency = if response.fee_currency.is_empty() {
            pair.quote().to_string()
        } else {
            response.fee_currency
        };
        let mut leg = TradeLegResult::filled(
            self.venue.clone(),
            response.order_id,
            requested_quantity,
            response.average_price,
            response.filled_quantity,
            response.fee,
            fee_currency,
        );
        leg.requested_price = requested_price;
        leg
    }

    async fn place_order(
        &self,
        pair: &TradingPair,
        body: OrderRequestBody,
    ) -> Result<TradeLegResult> {
        let base = self.api_base("order placement")?;
        let key = self.bearer()?;
        let requested_price = body.price;
        let requested_quantity = body.quantity;

        let response = self
            .http
            .post(format!("{base}/v1/orders"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<OrderResponse>()
            .await?;

        Ok(self.leg_from_response(response, requested_price, requested_quantity, pair))
    }
}

#[async_trait]
impl VenueAdapter for FeedVenue {
    fn venue_id(&self) -> &VenueId {
        &self.venue
    }

    async fn connect(&self) -> Result<()> {
        url::Url::parse(&self.ws_url)?;
        info!(venue = %self.venue, url = %self.ws_url, "Probing feed gateway");

        // Probe connection; subscriptions each hold their own socket.
        let (ws, response) = connect_async(&self.ws_url).await.map_err(|e| {
            Error::from(VenueError::Connection {
                venue: self.venue.to_string(),
                reason: e.to_string(),
            })
        })?;
        drop(ws);
        info!(venue = %self.venue, status = %response.status(), "Feed gateway reachable");

        // Arm a fresh shutdown channel for this session.
        let (tx, _) = watch::channel(false);
        *self.shutdown.lock() = tx;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let _ = self.shutdown.lock().send(true);
        Ok(())
    }

    async fn authenticate(&self) -> Result<()> {
        let base = self.api_base("authentication")?;
        let key = self.bearer().map_err(|_| {
            Error::from(VenueError::Authentication {
                venue: self.venue.to_string(),
                reason: "no API key configured".into(),
            })
        })?;

        let response = self
            .http
            .get(format!("{base}/v1/account"))
            .bearer_auth(key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VenueError::Authentication {
                venue: self.venue.to_string(),
                reason: format!("account check returned {}", response.status()),
            }
            .into());
        }
        info!(venue = %self.venue, "Authenticated");
        Ok(())
    }

    async fn subscribe_order_book(&self, pair: &TradingPair) -> Result<BookUpdateStream> {
        let (mut ws, _) = connect_async(&self.ws_url).await.map_err(|e| {
            Error::from(VenueError::Subscription {
                venue: self.venue.to_string(),
                pair: pair.to_string(),
                reason: e.to_string(),
            })
        })?;

        let frame = SubscribeFrame {
            op: "subscribe",
            channel: "book",
            pair: pair.to_string(),
        };
        ws.send(Message::Text(serde_json::to_string(&frame)?)).await?;
        info!(venue = %self.venue, pair = %pair, "Subscribed to book feed");

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let venue = self.venue.clone();
        let pair = pair.clone();
        let mut shutdown = self.shutdown.lock().subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            debug!(venue = %venue, pair = %pair, "Feed stream shut down");
                            break;
                        }
                    }
                    frame = ws.next() => {
                        let Some(frame) = frame else {
                            warn!(venue = %venue, pair = %pair, "Feed stream ended");
                            break;
                        };
                        match frame {
                            Ok(Message::Text(text)) => {
                                trace!(venue = %venue, bytes = text.len(), "Feed frame");
                                let Some(update) = parse_frame(&venue, &pair, &text) else {
                                    continue;
                                };
                                if tx.send(update).await.is_err() {
                                    debug!(venue = %venue, pair = %pair, "Update channel closed");
                                    break;
                                }
                            }
                            Ok(Message::Ping(data)) => {
                                if ws.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Message::Close(frame)) => {
                                info!(venue = %venue, pair = %pair, frame = ?frame, "Feed closed by gateway");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(venue = %venue, pair = %pair, error = %e, "Feed error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn order_book_snapshot(&self, pair: &TradingPair, depth: usize) -> Result<OrderBook> {
        let base = self.api_base("book snapshots")?;
        let frame = self
            .http
            .get(format!("{base}/v1/book"))
            .query(&[("pair", pair.to_string()), ("depth", depth.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json::<SnapshotFrame>()
            .await?;

        Ok(OrderBook::new(
            self.venue.clone(),
            pair.clone(),
            frame.timestamp.unwrap_or_else(Utc::now),
            frame.bids.into_iter().map(LevelFrame::into_level).collect(),
            frame.asks.into_iter().map(LevelFrame::into_level).collect(),
        ))
    }

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        self.place_order(pair, OrderRequestBody::market(pair, side, quantity))
            .await
    }

    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
    ) -> Result<TradeLegResult> {
        self.place_order(pair, OrderRequestBody::limit(pair, side, price, quantity))
            .await
    }

    async fn fee_schedule(&self) -> Result<FeeSchedule> {
        let base = self.api_base("fee schedules")?;
        let fees = self
            .http
            .get(format!("{base}/v1/fees"))
            .send()
            .await?
            .error_for_status()?
            .json::<FeeResponse>()
            .await?;

        Ok(FeeSchedule {
            maker_percent: fees.maker_percent,
            taker_percent: fees.taker_percent,
        })
    }
}

/// Parse one text frame into a normalized update.
///
/// Frames for other pairs and malformed payloads are skipped; a malformed
/// frame never ends the stream.
fn parse_frame(venue: &VenueId, subscribed: &TradingPair, text: &str) -> Option<BookUpdate> {
    let frame = match serde_json::from_str::<FeedFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            let error = VenueError::Protocol {
                venue: venue.to_string(),
                reason: e.to_string(),
            };
            warn!(error = %error, bytes = text.len(), "Skipping malformed feed frame");
            return None;
        }
    };

    match frame {
        FeedFrame::Snapshot(snapshot) => {
            let pair = parse_pair(venue, &snapshot.pair)?;
            if &pair != subscribed {
                return None;
            }
            Some(BookUpdate::Snapshot {
                pair,
                bids: snapshot.bids.into_iter().map(LevelFrame::into_level).collect(),
                asks: snapshot.asks.into_iter().map(LevelFrame::into_level).collect(),
                timestamp: snapshot.timestamp.unwrap_or_else(Utc::now),
            })
        }
        FeedFrame::Diff(diff) => {
            let pair = parse_pair(venue, &diff.pair)?;
            if &pair != subscribed {
                return None;
            }
            let side = match diff.side.as_str() {
                "bid" | "buy" => BookSide::Bid,
                "ask" | "sell" => BookSide::Ask,
                other => {
                    warn!(venue = %venue, side = other, "Unknown diff side");
                    return None;
                }
            };
            Some(BookUpdate::Diff {
                pair,
                side,
                price: diff.price,
                quantity: diff.quantity,
                timestamp: diff.timestamp.unwrap_or_else(Utc::now),
            })
        }
        FeedFrame::Unknown => None,
    }
}

fn parse_pair(venue: &VenueId, raw: &str) -> Option<TradingPair> {
    match raw.parse() {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!(venue = %venue, pair = raw, error = %e, "Unparseable pair in feed frame");
            None
        }
    }
}
