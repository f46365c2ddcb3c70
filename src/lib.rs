//! Skimmer - cross-venue arbitrage detection and execution.
//!
//! This crate continuously reconstructs per-venue order books from
//! snapshot+diff feeds, merges the resulting quotes across venues per
//! trading pair, and executes two-legged buy/sell trades when the
//! fee-adjusted spread clears the configured risk threshold.
//!
//! # Architecture
//!
//! Data flows one way through independently cancellable tasks:
//!
//! ```text
//! venue adapter → order book state → market data aggregator
//!     → detection engine → opportunity channel
//!     → execution coordinator → results / statistics / repository
//! ```
//!
//! - **[`venue`]** - The [`venue::VenueAdapter`] trait, the normalized
//!   snapshot+diff contract, and the built-in adapters (a generic
//!   normalized-feed WebSocket gateway and an in-process simulator).
//! - **[`market`]** - One ingestion task per (venue, pair) feeding the
//!   shared latest-quote board.
//! - **[`engine`]** - One detection loop per pair; pure candidate
//!   selection and fee math live in [`engine::detector`].
//! - **[`execution`]** - The coordinator executing both legs with
//!   partial-failure compensation, and the paper-trading ledger.
//! - **[`domain`]** - Venue-agnostic types: pairs, books, quotes,
//!   opportunities, trade results, the risk profile and statistics.
//! - **[`service`]** - Notifier and repository collaborators.
//! - **[`config`]** - TOML configuration with env-only secrets.
//! - **[`app`]** - Wiring and the shared hot-swappable state.
//!
//! # Example
//!
//! ```no_run
//! use skimmer::app::App;
//! use skimmer::config::Config;
//!
//! # async fn run() -> skimmer::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! App::run(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod market;
pub mod service;
pub mod venue;
