//! Paper-trading ledger.
//!
//! Maintains per-(venue, currency) balances and simulates fills with the
//! same failure semantics as live trading: an insufficient balance is a
//! terminal failure for that leg.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Price, Quantity, TradeLegResult, TradingPair, VenueId};
use crate::error::ExecutionError;

/// In-memory balances for simulated execution.
#[derive(Default)]
pub struct PaperLedger {
    balances: Mutex<HashMap<(VenueId, String), Decimal>>,
}

impl PaperLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting balance for one (venue, currency).
    pub fn seed(&self, venue: &VenueId, currency: &str, amount: Decimal) {
        self.balances
            .lock()
            .insert((venue.clone(), currency.to_string()), amount);
    }

    /// Current balance for one (venue, currency).
    #[must_use]
    pub fn balance(&self, venue: &VenueId, currency: &str) -> Decimal {
        self.balances
            .lock()
            .get(&(venue.clone(), currency.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Simulate a buy: debit quote currency (value + fee), credit base.
    pub fn execute_buy(
        &self,
        venue: &VenueId,
        pair: &TradingPair,
        price: Price,
        quantity: Quantity,
        fee_percent: Decimal,
    ) -> TradeLegResult {
        let value = price * quantity;
        let fee = value * fee_percent / Decimal::ONE_HUNDRED;
        let needed = value + fee;

        let mut balances = self.balances.lock();
        let quote_key = (venue.clone(), pair.quote().to_string());
        let available = balances.get(&quote_key).copied().unwrap_or(Decimal::ZERO);

        if available < needed {
            let error = ExecutionError::InsufficientBalance {
                venue: venue.to_string(),
                currency: pair.quote().to_string(),
                needed,
                available,
            };
            return TradeLegResult::failed(venue.clone(), quantity, error.to_string());
        }

        *balances.entry(quote_key).or_insert(Decimal::ZERO) -= needed;
        *balances
            .entry((venue.clone(), pair.base().to_string()))
            .or_insert(Decimal::ZERO) += quantity;

        TradeLegResult::filled(
            venue.clone(),
            format!("paper-{}", Uuid::new_v4()),
            quantity,
            price,
            quantity,
            fee,
            pair.quote(),
        )
    }

    /// Simulate a sell: debit base currency, credit quote net of fee.
    pub fn execute_sell(
        &self,
        venue: &VenueId,
        pair: &TradingPair,
        price: Price,
        quantity: Quantity,
        fee_percent: Decimal,
    ) -> TradeLegResult {
        let mut balances = self.balances.lock();
        let base_key = (venue.clone(), pair.base().to_string());
        let available = balances.get(&base_key).copied().unwrap_or(Decimal::ZERO);

        if available < quantity {
            let error = ExecutionError::InsufficientBalance {
                venue: venue.to_string(),
                currency: pair.base().to_string(),
                needed: quantity,
                available,
            };
            return TradeLegResult::failed(venue.clone(), quantity, error.to_string());
        }

        let value = price * quantity;
        let fee = value * fee_percent / Decimal::ONE_HUNDRED;

        *balances.entry(base_key).or_insert(Decimal::ZERO) -= quantity;
        *balances
            .entry((venue.clone(), pair.quote().to_string()))
            .or_insert(Decimal::ZERO) += value - fee;

        TradeLegResult::filled(
            venue.clone(),
            format!("paper-{}", Uuid::new_v4()),
            quantity,
            price,
            quantity,
            fee,
            pair.quote(),
        )
    }
}
