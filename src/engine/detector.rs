//! Candidate selection and fee-adjusted spread math.
//!
//! Everything here is pure so the detection rules can be tested without
//! tasks or channels. The per-pair loop in [`super::engine`] feeds it the
//! latest quotes each iteration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{ArbitrageOpportunity, PriceQuote, RiskProfile, TradingPair};
use crate::venue::FeeTable;

/// Pick the buy candidate (globally lowest best-ask) and sell candidate
/// (globally highest best-bid).
///
/// Ties on price break to the lexicographically smallest venue id, so the
/// choice is deterministic regardless of quote ordering.
#[must_use]
pub fn select_candidates(quotes: &[PriceQuote]) -> Option<(&PriceQuote, &PriceQuote)> {
    if quotes.len() < 2 {
        return None;
    }

    let buy = quotes.iter().min_by(|a, b| {
        a.ask_price()
            .cmp(&b.ask_price())
            .then_with(|| a.venue().cmp(b.venue()))
    })?;
    let sell = quotes.iter().max_by(|a, b| {
        a.bid_price()
            .cmp(&b.bid_price())
            // For a max, the later-ordered venue wins a tie, so reverse it
            // to prefer the lexicographically smallest id.
            .then_with(|| b.venue().cmp(a.venue()))
    })?;

    Some((buy, sell))
}

/// Fee-adjusted view of an opportunity.
#[derive(Debug, Clone, Copy)]
pub struct NetAssessment {
    pub buy_fee: Decimal,
    pub sell_fee: Decimal,
    pub net_profit: Decimal,
    pub net_spread_percent: Decimal,
}

/// Subtract both legs' taker fees from the gross profit and restate the
/// spread as a percentage of the buy-side notional.
#[must_use]
pub fn assess(opportunity: &ArbitrageOpportunity, fees: &FeeTable) -> NetAssessment {
    let quantity = opportunity.effective_quantity();
    let buy_value = opportunity.buy_price() * quantity;
    let sell_value = opportunity.sell_price() * quantity;

    let buy_fee = buy_value * fees.taker_percent(opportunity.buy_venue()) / Decimal::ONE_HUNDRED;
    let sell_fee = sell_value * fees.taker_percent(opportunity.sell_venue()) / Decimal::ONE_HUNDRED;

    let net_profit = opportunity.estimated_profit() - buy_fee - sell_fee;
    let net_spread_percent = if buy_value.is_zero() {
        Decimal::ZERO
    } else {
        net_profit / buy_value * Decimal::ONE_HUNDRED
    };

    NetAssessment {
        buy_fee,
        sell_fee,
        net_profit,
        net_spread_percent,
    }
}

/// Run one full detection pass over a pair's fresh quotes.
///
/// Returns a qualified opportunity when the venues differ, the books are
/// crossed and the fee-adjusted spread clears `risk.min_profit_percent`
/// (inclusive).
#[must_use]
pub fn evaluate(
    pair: &TradingPair,
    quotes: &[PriceQuote],
    risk: &RiskProfile,
    fees: &FeeTable,
    now: DateTime<Utc>,
) -> Option<ArbitrageOpportunity> {
    let (buy, sell) = select_candidates(quotes)?;

    if buy.venue() == sell.venue() {
        return None;
    }
    if sell.bid_price() <= buy.ask_price() {
        return None;
    }

    let opportunity = match ArbitrageOpportunity::new(
        pair.clone(),
        buy.venue().clone(),
        buy.ask_price(),
        buy.ask_quantity(),
        sell.venue().clone(),
        sell.bid_price(),
        sell.bid_quantity(),
        risk.max_trade_amount,
        now,
    ) {
        Ok(opportunity) => opportunity,
        Err(e) => {
            // The guards above make this unreachable for sane quotes; a
            // venue publishing zero quantities lands here.
            debug!(pair = %pair, error = %e, "Rejected opportunity candidate");
            return None;
        }
    };

    let assessment = assess(&opportunity, fees);
    if assessment.net_spread_percent >= risk.min_profit_percent {
        debug!(
            pair = %pair,
            buy_venue = %opportunity.buy_venue(),
            sell_venue = %opportunity.sell_venue(),
            gross = %opportunity.estimated_profit(),
            net = %assessment.net_profit,
            net_percent = %assessment.net_spread_percent,
            "Opportunity qualifies"
        );
        Some(opportunity)
    } else {
        None
    }
}
