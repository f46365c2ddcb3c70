//! Arbitrage opportunity type and its status machine.
//!
//! An [`ArbitrageOpportunity`] can only be constructed from a genuinely
//! crossed pair of quotes; the constructor rejects anything else. Status
//! transitions are monotonic and terminal states are never left.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::DomainError;

use super::ids::VenueId;
use super::money::{Price, Quantity};
use super::pair::TradingPair;

/// Lifecycle status of an opportunity.
///
/// Valid transitions: `Detected → Executing → {Executed, Failed}` and
/// `Detected → Missed`. `Executed`, `Failed` and `Missed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Executing,
    Executed,
    Failed,
    Missed,
}

impl OpportunityStatus {
    /// Whether this status can never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Missed)
    }

    /// Whether the transition `self → next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Detected, Self::Executing)
                | (Self::Detected, Self::Missed)
                | (Self::Executing, Self::Executed)
                | (Self::Executing, Self::Failed)
        )
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Detected => "detected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Missed => "missed",
        };
        write!(f, "{s}")
    }
}

/// A detected cross-venue arbitrage opportunity.
///
/// Derived fields (effective quantity, spread, estimated profit) are
/// computed once at construction. Only the status field ever changes after
/// publication, and only through [`advance`](Self::advance).
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageOpportunity {
    id: Uuid,
    pair: TradingPair,
    buy_venue: VenueId,
    buy_price: Price,
    buy_quantity: Quantity,
    sell_venue: VenueId,
    sell_price: Price,
    sell_quantity: Quantity,
    effective_quantity: Quantity,
    spread: Decimal,
    spread_percent: Decimal,
    estimated_profit: Decimal,
    status: OpportunityStatus,
    detected_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Construct a validated opportunity.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidOpportunity`] unless `buy_price <
    /// sell_price`, every price and quantity is strictly positive, the
    /// venues differ, and `max_trade_amount` is positive.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: TradingPair,
        buy_venue: VenueId,
        buy_price: Price,
        buy_quantity: Quantity,
        sell_venue: VenueId,
        sell_price: Price,
        sell_quantity: Quantity,
        max_trade_amount: Decimal,
        detected_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let invalid = |reason: String| DomainError::InvalidOpportunity { reason };

        if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO {
            return Err(invalid(format!(
                "prices must be positive: buy {buy_price}, sell {sell_price}"
            )));
        }
        if buy_quantity <= Decimal::ZERO || sell_quantity <= Decimal::ZERO {
            return Err(invalid(format!(
                "quantities must be positive: buy {buy_quantity}, sell {sell_quantity}"
            )));
        }
        if buy_price >= sell_price {
            return Err(invalid(format!(
                "buy price {buy_price} is not below sell price {sell_price}"
            )));
        }
        if buy_venue == sell_venue {
            return Err(invalid(format!("buy and sell venue are both {buy_venue}")));
        }
        if max_trade_amount <= Decimal::ZERO {
            return Err(invalid(format!(
                "max trade amount must be positive, got {max_trade_amount}"
            )));
        }

        let effective_quantity = buy_quantity
            .min(sell_quantity)
            .min(max_trade_amount / buy_price);
        let spread = sell_price - buy_price;
        let spread_percent = spread / buy_price * Decimal::ONE_HUNDRED;
        let estimated_profit = spread * effective_quantity;

        Ok(Self {
            id: Uuid::new_v4(),
            pair,
            buy_venue,
            buy_price,
            buy_quantity,
            sell_venue,
            sell_price,
            sell_quantity,
            effective_quantity,
            spread,
            spread_percent,
            estimated_profit,
            status: OpportunityStatus::Detected,
            detected_at,
        })
    }

    /// Unique opportunity id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Get the trading pair.
    #[must_use]
    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    /// Venue to buy on (lowest ask).
    #[must_use]
    pub fn buy_venue(&self) -> &VenueId {
        &self.buy_venue
    }

    /// Ask price at the buy venue.
    #[must_use]
    pub const fn buy_price(&self) -> Price {
        self.buy_price
    }

    /// Quantity available at the buy venue's best ask.
    #[must_use]
    pub const fn buy_quantity(&self) -> Quantity {
        self.buy_quantity
    }

    /// Venue to sell on (highest bid).
    #[must_use]
    pub fn sell_venue(&self) -> &VenueId {
        &self.sell_venue
    }

    /// Bid price at the sell venue.
    #[must_use]
    pub const fn sell_price(&self) -> Price {
        self.sell_price
    }

    /// Quantity available at the sell venue's best bid.
    #[must_use]
    pub const fn sell_quantity(&self) -> Quantity {
        self.sell_quantity
    }

    /// Tradable size: min of both legs' quantity and the risk-capped size.
    #[must_use]
    pub const fn effective_quantity(&self) -> Quantity {
        self.effective_quantity
    }

    /// Gross spread, sell price minus buy price.
    #[must_use]
    pub const fn spread(&self) -> Decimal {
        self.spread
    }

    /// Gross spread as a percentage of the buy price.
    #[must_use]
    pub const fn spread_percent(&self) -> Decimal {
        self.spread_percent
    }

    /// Gross estimated profit, spread × effective quantity.
    #[must_use]
    pub const fn estimated_profit(&self) -> Decimal {
        self.estimated_profit
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OpportunityStatus {
        self.status
    }

    /// Detection timestamp.
    #[must_use]
    pub const fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Age of the opportunity at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.detected_at).to_std().unwrap_or_default()
    }

    /// Advance the status.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for any transition not in
    /// the monotonic state machine, including any transition out of a
    /// terminal state.
    pub fn advance(&mut self, next: OpportunityStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity::new(
            TradingPair::new("BTC", "USD").unwrap(),
            VenueId::from("alpha"),
            dec!(50000),
            dec!(2),
            VenueId::from("beta"),
            dec!(50500),
            dec!(1.5),
            dec!(100000),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn derived_fields_are_computed() {
        let opp = opportunity();
        assert_eq!(opp.spread(), dec!(500));
        assert_eq!(opp.spread_percent(), dec!(1));
        // min(2, 1.5, 100000/50000 = 2) = 1.5
        assert_eq!(opp.effective_quantity(), dec!(1.5));
        assert_eq!(opp.estimated_profit(), dec!(750));
        assert_eq!(opp.status(), OpportunityStatus::Detected);
    }

    #[test]
    fn max_trade_amount_caps_quantity() {
        let opp = ArbitrageOpportunity::new(
            TradingPair::new("BTC", "USD").unwrap(),
            VenueId::from("alpha"),
            dec!(50000),
            dec!(2),
            VenueId::from("beta"),
            dec!(50500),
            dec!(2),
            dec!(25000),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(opp.effective_quantity(), dec!(0.5));
    }

    #[test]
    fn rejects_uncrossed_prices() {
        let result = ArbitrageOpportunity::new(
            TradingPair::new("BTC", "USD").unwrap(),
            VenueId::from("alpha"),
            dec!(50000),
            dec!(1),
            VenueId::from("beta"),
            dec!(50000),
            dec!(1),
            dec!(100000),
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(DomainError::InvalidOpportunity { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        let pair = TradingPair::new("BTC", "USD").unwrap();
        let cases = [
            (dec!(0), dec!(1), dec!(50500), dec!(1)),
            (dec!(50000), dec!(0), dec!(50500), dec!(1)),
            (dec!(50000), dec!(1), dec!(-1), dec!(1)),
            (dec!(50000), dec!(1), dec!(50500), dec!(0)),
        ];
        for (bp, bq, sp, sq) in cases {
            let result = ArbitrageOpportunity::new(
                pair.clone(),
                VenueId::from("alpha"),
                bp,
                bq,
                VenueId::from("beta"),
                sp,
                sq,
                dec!(100000),
                Utc::now(),
            );
            assert!(result.is_err(), "accepted bp={bp} bq={bq} sp={sp} sq={sq}");
        }
    }

    #[test]
    fn rejects_same_venue_on_both_legs() {
        let result = ArbitrageOpportunity::new(
            TradingPair::new("BTC", "USD").unwrap(),
            VenueId::from("alpha"),
            dec!(50000),
            dec!(1),
            VenueId::from("alpha"),
            dec!(50500),
            dec!(1),
            dec!(100000),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn status_follows_the_happy_path() {
        let mut opp = opportunity();
        opp.advance(OpportunityStatus::Executing).unwrap();
        opp.advance(OpportunityStatus::Executed).unwrap();
        assert!(opp.status().is_terminal());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut opp = opportunity();
        opp.advance(OpportunityStatus::Missed).unwrap();
        let err = opp.advance(OpportunityStatus::Executing).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(opp.status(), OpportunityStatus::Missed);
    }

    #[test]
    fn cannot_skip_executing() {
        let mut opp = opportunity();
        assert!(opp.advance(OpportunityStatus::Executed).is_err());
        assert!(opp.advance(OpportunityStatus::Failed).is_err());
        assert_eq!(opp.status(), OpportunityStatus::Detected);
    }
}
