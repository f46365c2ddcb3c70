//! Running arbitrage statistics.
//!
//! Mutated only by the execution coordinator; everyone else sees cloned
//! snapshots. Periodic persistence is the coordinator's job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::opportunity::ArbitrageOpportunity;
use super::trade::ArbitrageTradeResult;

/// Per-venue leg aggregates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VenueStats {
    pub legs: u64,
    pub volume: Decimal,
    pub fees: Decimal,
}

/// Per-pair trade aggregates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PairStats {
    pub detected: u64,
    pub trades: u64,
    pub successes: u64,
    pub failures: u64,
    pub net_profit: Decimal,
    pub volume: Decimal,
}

/// Per-hour trade aggregates, keyed `"YYYY-MM-DDTHH"`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HourlyStats {
    pub trades: u64,
    pub net_profit: Decimal,
}

/// Counters and monetary aggregates across the engine's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArbitrageStatistics {
    pub opportunities_detected: u64,
    pub opportunities_missed: u64,
    pub trades_executed: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_profit: Decimal,
    pub total_fees: Decimal,
    pub total_volume: Decimal,
    pub by_venue: HashMap<String, VenueStats>,
    pub by_pair: HashMap<String, PairStats>,
    pub by_hour: BTreeMap<String, HourlyStats>,
}

fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

impl ArbitrageStatistics {
    /// Record a published opportunity.
    pub fn record_detection(&mut self, opportunity: &ArbitrageOpportunity) {
        self.opportunities_detected += 1;
        self.by_pair
            .entry(opportunity.pair().to_string())
            .or_default()
            .detected += 1;
    }

    /// Record an opportunity that timed out before execution.
    pub fn record_missed(&mut self, opportunity: &ArbitrageOpportunity) {
        self.opportunities_missed += 1;
        let _ = opportunity;
    }

    /// Record a completed trade attempt.
    pub fn record_trade(&mut self, result: &ArbitrageTradeResult) {
        self.trades_executed += 1;
        if result.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_profit += result.net_profit;
        self.total_fees += result.total_fees();
        self.total_volume += result.executed_volume();

        let pair = self
            .by_pair
            .entry(result.opportunity.pair().to_string())
            .or_default();
        pair.trades += 1;
        if result.success {
            pair.successes += 1;
        } else {
            pair.failures += 1;
        }
        pair.net_profit += result.net_profit;
        pair.volume += result.executed_volume();

        for leg in [Some(&result.buy), result.sell.as_ref(), result.compensation.as_ref()]
            .into_iter()
            .flatten()
        {
            let venue = self.by_venue.entry(leg.venue.to_string()).or_default();
            venue.legs += 1;
            venue.volume += leg.executed_value();
            venue.fees += leg.fee;
        }

        let hour = self.by_hour.entry(hour_bucket(result.completed_at)).or_default();
        hour.trades += 1;
        hour.net_profit += result.net_profit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TradeLegResult, TradingPair, VenueId};
    use rust_decimal_macros::dec;

    fn result(success: bool) -> ArbitrageTradeResult {
        let opportunity = ArbitrageOpportunity::new(
            TradingPair::new("BTC", "USD").unwrap(),
            VenueId::from("alpha"),
            dec!(50000),
            dec!(1),
            VenueId::from("beta"),
            dec!(50600),
            dec!(1),
            dec!(100000),
            Utc::now(),
        )
        .unwrap();

        let buy = TradeLegResult::filled(
            VenueId::from("alpha"),
            "o-1",
            dec!(1),
            dec!(50000),
            dec!(1),
            dec!(50),
            "USD",
        );
        if success {
            let sell = TradeLegResult::filled(
                VenueId::from("beta"),
                "o-2",
                dec!(1),
                dec!(50600),
                dec!(1),
                dec!(50.6),
                "USD",
            );
            ArbitrageTradeResult::success(opportunity, buy, sell)
        } else {
            let sell = TradeLegResult::failed(VenueId::from("beta"), dec!(1), "rejected");
            ArbitrageTradeResult::failure(opportunity, buy, Some(sell), None, "sell rejected")
        }
    }

    #[test]
    fn trade_updates_counters_and_breakdowns() {
        let mut stats = ArbitrageStatistics::default();
        stats.record_trade(&result(true));
        stats.record_trade(&result(false));

        assert_eq!(stats.trades_executed, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);

        let pair = &stats.by_pair["BTC/USD"];
        assert_eq!(pair.trades, 2);
        assert_eq!(pair.successes, 1);

        // 2 buy legs + 1 filled sell leg touch the venue breakdown; the
        // failed sell leg still counts as an attempted leg on beta.
        assert_eq!(stats.by_venue["alpha"].legs, 2);
        assert_eq!(stats.by_venue["beta"].legs, 2);
        assert_eq!(stats.by_hour.len(), 1);
    }

    #[test]
    fn detection_and_missed_counters() {
        let mut stats = ArbitrageStatistics::default();
        let opp = result(true).opportunity;
        stats.record_detection(&opp);
        stats.record_detection(&opp);
        stats.record_missed(&opp);

        assert_eq!(stats.opportunities_detected, 2);
        assert_eq!(stats.opportunities_missed, 1);
        assert_eq!(stats.by_pair["BTC/USD"].detected, 2);
    }
}
