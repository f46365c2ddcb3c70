//! Venue-agnostic domain logic.

mod ids;
mod money;
mod opportunity;
mod order_book;
mod pair;
mod quote;
mod risk;
mod stats;
mod trade;

pub use ids::VenueId;
pub use money::{Price, Quantity};
pub use opportunity::{ArbitrageOpportunity, OpportunityStatus};
pub use order_book::{BookSide, OrderBook, OrderBookLevel, OrderBookState};
pub use pair::TradingPair;
pub use quote::PriceQuote;
pub use risk::RiskProfile;
pub use stats::{ArbitrageStatistics, HourlyStats, PairStats, VenueStats};
pub use trade::{ArbitrageTradeResult, TradeLegResult};
