//! Trade leg and arbitrage trade result records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::ids::VenueId;
use super::money::{Price, Quantity};
use super::opportunity::ArbitrageOpportunity;

/// Outcome of a single order placement on one venue.
#[derive(Debug, Clone, Serialize)]
pub struct TradeLegResult {
    /// Venue the order was placed on.
    pub venue: VenueId,
    /// Venue-assigned order id, when the order reached the venue.
    pub order_id: Option<String>,
    /// Limit price requested, `None` for market orders.
    pub requested_price: Option<Price>,
    /// Average fill price, zero when nothing filled.
    pub executed_price: Price,
    /// Quantity requested.
    pub requested_quantity: Quantity,
    /// Quantity actually filled.
    pub executed_quantity: Quantity,
    /// Fee charged by the venue.
    pub fee: Decimal,
    /// Currency the fee was charged in.
    pub fee_currency: String,
    /// Whether the leg succeeded.
    pub success: bool,
    /// Failure reason, when `success` is false.
    pub error: Option<String>,
}

impl TradeLegResult {
    /// A successfully filled leg.
    pub fn filled(
        venue: VenueId,
        order_id: impl Into<String>,
        requested_quantity: Quantity,
        executed_price: Price,
        executed_quantity: Quantity,
        fee: Decimal,
        fee_currency: impl Into<String>,
    ) -> Self {
        Self {
            venue,
            order_id: Some(order_id.into()),
            requested_price: None,
            executed_price,
            requested_quantity,
            executed_quantity,
            fee,
            fee_currency: fee_currency.into(),
            success: true,
            error: None,
        }
    }

    /// A failed leg that never filled.
    pub fn failed(
        venue: VenueId,
        requested_quantity: Quantity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            venue,
            order_id: None,
            requested_price: None,
            executed_price: Decimal::ZERO,
            requested_quantity,
            executed_quantity: Decimal::ZERO,
            fee: Decimal::ZERO,
            fee_currency: String::new(),
            success: false,
            error: Some(reason.into()),
        }
    }

    /// Whether the leg filled any quantity at all.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.success && !self.executed_quantity.is_zero()
    }

    /// Executed notional value, price × quantity.
    #[must_use]
    pub fn executed_value(&self) -> Decimal {
        self.executed_price * self.executed_quantity
    }
}

/// Final accounting for one two-legged arbitrage attempt.
///
/// `net_profit` is computed from the legs that actually filled, so a
/// failed trade carries its realized loss (buy value plus fees, less any
/// compensation proceeds) rather than a hypothetical number.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageTradeResult {
    pub opportunity: ArbitrageOpportunity,
    pub buy: TradeLegResult,
    pub sell: Option<TradeLegResult>,
    /// Best-effort flattening trade after a failed sell leg.
    pub compensation: Option<TradeLegResult>,
    pub success: bool,
    pub net_profit: Decimal,
    pub profit_percent: Decimal,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ArbitrageTradeResult {
    /// Build a successful result from two filled legs.
    #[must_use]
    pub fn success(
        opportunity: ArbitrageOpportunity,
        buy: TradeLegResult,
        sell: TradeLegResult,
    ) -> Self {
        let buy_value = buy.executed_value();
        let sell_value = sell.executed_value();
        let net_profit = sell_value - buy_value - buy.fee - sell.fee;
        let profit_percent = if buy_value.is_zero() {
            Decimal::ZERO
        } else {
            net_profit / buy_value * Decimal::ONE_HUNDRED
        };

        Self {
            opportunity,
            buy,
            sell: Some(sell),
            compensation: None,
            success: true,
            net_profit,
            profit_percent,
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Build a failed result from whatever legs were attempted.
    #[must_use]
    pub fn failure(
        opportunity: ArbitrageOpportunity,
        buy: TradeLegResult,
        sell: Option<TradeLegResult>,
        compensation: Option<TradeLegResult>,
        error: impl Into<String>,
    ) -> Self {
        // Realized PnL over the filled legs only.
        let mut net_profit = Decimal::ZERO;
        let mut buy_value = Decimal::ZERO;
        if buy.is_filled() {
            buy_value = buy.executed_value();
            net_profit -= buy_value + buy.fee;
        }
        if let Some(leg) = sell.as_ref().filter(|leg| leg.is_filled()) {
            net_profit += leg.executed_value() - leg.fee;
        }
        if let Some(leg) = compensation.as_ref().filter(|leg| leg.is_filled()) {
            net_profit += leg.executed_value() - leg.fee;
        }
        let profit_percent = if buy_value.is_zero() {
            Decimal::ZERO
        } else {
            net_profit / buy_value * Decimal::ONE_HUNDRED
        };

        Self {
            opportunity,
            buy,
            sell,
            compensation,
            success: false,
            net_profit,
            profit_percent,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    /// Sum of fees across all attempted legs.
    #[must_use]
    pub fn total_fees(&self) -> Decimal {
        self.buy.fee
            + self.sell.as_ref().map_or(Decimal::ZERO, |leg| leg.fee)
            + self
                .compensation
                .as_ref()
                .map_or(Decimal::ZERO, |leg| leg.fee)
    }

    /// Executed buy-side notional, the volume figure used in statistics.
    #[must_use]
    pub fn executed_volume(&self) -> Decimal {
        self.buy.executed_value()
    }
}
