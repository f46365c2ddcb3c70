//! Trade execution.

mod coordinator;
mod paper;

pub use coordinator::{ExecutionCoordinator, TradeExecutor};
pub use paper::PaperLedger;
