//! Notification events and delivery.
//!
//! Notifications are strictly fire-and-forget: a failing notifier is
//! logged and never propagates into the trading path.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::domain::{ArbitrageOpportunity, ArbitrageTradeResult};

/// Opportunity summary carried by notification events.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityEvent {
    pub pair: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub spread_percent: Decimal,
    pub estimated_profit: Decimal,
}

impl From<&ArbitrageOpportunity> for OpportunityEvent {
    fn from(opportunity: &ArbitrageOpportunity) -> Self {
        Self {
            pair: opportunity.pair().to_string(),
            buy_venue: opportunity.buy_venue().to_string(),
            sell_venue: opportunity.sell_venue().to_string(),
            spread_percent: opportunity.spread_percent(),
            estimated_profit: opportunity.estimated_profit(),
        }
    }
}

/// Trade summary carried by notification events.
#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub pair: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub success: bool,
    pub net_profit: Decimal,
    pub profit_percent: Decimal,
    pub error: Option<String>,
}

impl From<&ArbitrageTradeResult> for TradeEvent {
    fn from(result: &ArbitrageTradeResult) -> Self {
        Self {
            pair: result.opportunity.pair().to_string(),
            buy_venue: result.opportunity.buy_venue().to_string(),
            sell_venue: result.opportunity.sell_venue().to_string(),
            success: result.success,
            net_profit: result.net_profit,
            profit_percent: result.profit_percent,
            error: result.error.clone(),
        }
    }
}

/// System error notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct SystemErrorEvent {
    pub component: String,
    pub message: String,
}

impl SystemErrorEvent {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Events emitted to notifiers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    OpportunityDetected(OpportunityEvent),
    TradeCompleted(TradeEvent),
    TradeFailed(TradeEvent),
    SystemError(SystemErrorEvent),
}

/// A notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event. Implementations swallow their own failures.
    async fn notify(&self, event: &Event);

    /// Channel name for logging.
    fn name(&self) -> &'static str;
}

/// Fans events out to every registered notifier, honoring the per-event
/// enable flags.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
    config: NotificationConfig,
}

impl NotifierRegistry {
    /// Create a registry with the given flags.
    #[must_use]
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            notifiers: Vec::new(),
            config,
        }
    }

    /// Register a notifier.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Number of registered notifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Whether no notifiers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    fn enabled(&self, event: &Event) -> bool {
        match event {
            Event::OpportunityDetected(_) => self.config.notify_opportunities,
            Event::TradeCompleted(_) => self.config.notify_trades,
            Event::TradeFailed(_) => self.config.notify_failures,
            Event::SystemError(_) => self.config.notify_system_errors,
        }
    }

    /// Deliver an event to every notifier, subject to the enable flags.
    pub async fn notify_all(&self, event: Event) {
        if !self.enabled(&event) {
            return;
        }
        for notifier in &self.notifiers {
            notifier.notify(&event).await;
        }
    }
}

/// Notifier that writes events to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) {
        match event {
            Event::OpportunityDetected(e) => {
                info!(
                    pair = %e.pair,
                    buy = %e.buy_venue,
                    sell = %e.sell_venue,
                    spread_percent = %e.spread_percent,
                    estimated_profit = %e.estimated_profit,
                    "Opportunity detected"
                );
            }
            Event::TradeCompleted(e) => {
                info!(
                    pair = %e.pair,
                    net_profit = %e.net_profit,
                    profit_percent = %e.profit_percent,
                    "Trade completed"
                );
            }
            Event::TradeFailed(e) => {
                warn!(
                    pair = %e.pair,
                    net_profit = %e.net_profit,
                    error = e.error.as_deref().unwrap_or("unknown"),
                    "Trade failed"
                );
            }
            Event::SystemError(e) => {
                warn!(component = %e.component, message = %e.message, "System error");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Notifier that POSTs events as JSON to a webhook.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier targeting `url`.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &Event) {
        let result = self.http.post(&self.url).json(event).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "Webhook returned an error status");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Webhook delivery failed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
