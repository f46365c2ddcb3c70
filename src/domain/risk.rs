//! Risk profile policy object.

use rust_decimal::Decimal;
use std::time::Duration;

/// Policy governing minimum acceptable profit, trade sizing and
/// execution concurrency.
///
/// The profile is process-wide and hot-swappable; readers always take a
/// copy (see `app::state::AppState::risk_profile`), so a concurrent swap
/// can never produce a torn read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskProfile {
    /// Minimum fee-adjusted spread percentage to publish an opportunity.
    pub min_profit_percent: Decimal,
    /// Maximum size of a single trade, in quote currency.
    pub max_trade_amount: Decimal,
    /// Maximum number of trades in flight at once.
    pub max_concurrent_trades: usize,
    /// Pause between trade dispatches.
    pub cooldown: Duration,
    /// Maximum tolerated slippage percentage per leg.
    pub max_slippage_percent: Decimal,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            min_profit_percent: Decimal::new(5, 1), // 0.5%
            max_trade_amount: Decimal::from(1000),
            max_concurrent_trades: 1,
            cooldown: Duration::from_secs(1),
            max_slippage_percent: Decimal::ONE, // 1%
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_profile_is_conservative() {
        let profile = RiskProfile::default();
        assert_eq!(profile.min_profit_percent, dec!(0.5));
        assert_eq!(profile.max_concurrent_trades, 1);
    }
}
