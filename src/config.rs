//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides for sensitive values: venue API keys are read from
//! `SKIMMER_<VENUE>_API_KEY` and never from the config file.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::{RiskProfile, TradingPair};
use crate::error::{ConfigError, Result};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub arbitrage: ArbitrageConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Arbitrage engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Pairs to monitor, e.g. `["BTC/USD", "ETH/USD"]`.
    pub pairs: Vec<TradingPair>,
    /// Execute detected opportunities automatically.
    #[serde(default = "default_true")]
    pub auto_trade: bool,
    /// Simulate execution against the paper ledger instead of venues.
    #[serde(default = "default_true")]
    pub paper_trading: bool,
    /// Detection loop polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Quotes older than this many seconds are ignored.
    #[serde(default = "default_quote_freshness_secs")]
    pub quote_freshness_secs: u64,
    /// Opportunities older than this many seconds are marked missed
    /// instead of executed.
    #[serde(default = "default_execution_window_secs")]
    pub execution_window_secs: u64,
    /// Capacity of the opportunity channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_quote_freshness_secs() -> u64 {
    30
}

const fn default_execution_window_secs() -> u64 {
    3
}

const fn default_channel_capacity() -> usize {
    64
}

impl ArbitrageConfig {
    /// Detection polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Quote freshness window.
    #[must_use]
    pub const fn quote_freshness(&self) -> Duration {
        Duration::from_secs(self.quote_freshness_secs)
    }

    /// Window after detection within which execution must start.
    #[must_use]
    pub const fn execution_window(&self) -> Duration {
        Duration::from_secs(self.execution_window_secs)
    }
}

/// Risk profile configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Minimum fee-adjusted spread percentage to act on.
    #[serde(default = "default_min_profit_percent")]
    pub min_profit_percent: Decimal,
    /// Maximum single-trade size in quote currency.
    #[serde(default = "default_max_trade_amount")]
    pub max_trade_amount: Decimal,
    /// Maximum trades in flight at once.
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
    /// Pause between trade dispatches, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum tolerated slippage percentage per leg.
    #[serde(default = "default_max_slippage_percent")]
    pub max_slippage_percent: Decimal,
}

fn default_min_profit_percent() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_max_trade_amount() -> Decimal {
    Decimal::from(1000)
}

const fn default_max_concurrent_trades() -> usize {
    1
}

const fn default_cooldown_secs() -> u64 {
    1
}

fn default_max_slippage_percent() -> Decimal {
    Decimal::ONE
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_profit_percent: default_min_profit_percent(),
            max_trade_amount: default_max_trade_amount(),
            max_concurrent_trades: default_max_concurrent_trades(),
            cooldown_secs: default_cooldown_secs(),
            max_slippage_percent: default_max_slippage_percent(),
        }
    }
}

impl From<RiskConfig> for RiskProfile {
    fn from(config: RiskConfig) -> Self {
        Self {
            min_profit_percent: config.min_profit_percent,
            max_trade_amount: config.max_trade_amount,
            max_concurrent_trades: config.max_concurrent_trades,
            cooldown: Duration::from_secs(config.cooldown_secs),
            max_slippage_percent: config.max_slippage_percent,
        }
    }
}

/// Kind of adapter backing a venue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    /// Generic gateway speaking the normalized snapshot+diff feed.
    Feed,
    /// In-process simulated venue.
    Sim,
}

/// One venue entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub id: String,
    pub kind: VenueKind,
    /// WebSocket URL of the normalized feed (`kind = "feed"`).
    #[serde(default)]
    pub ws_url: Option<String>,
    /// HTTP base URL for orders, snapshots and fee schedules
    /// (`kind = "feed"`).
    #[serde(default)]
    pub api_url: Option<String>,
    /// API key, loaded from `SKIMMER_<ID>_API_KEY` at runtime.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Maker fee override in percent.
    #[serde(default)]
    pub maker_fee_percent: Option<Decimal>,
    /// Taker fee override in percent.
    #[serde(default)]
    pub taker_fee_percent: Option<Decimal>,
    /// Simulated venue parameters (`kind = "sim"`).
    #[serde(default)]
    pub sim: SimParams,
}

/// Random-walk parameters for a simulated venue.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Starting mid price.
    #[serde(default = "default_sim_start_price")]
    pub start_price: Decimal,
    /// Half-spread around the mid, in percent.
    #[serde(default = "default_sim_half_spread_percent")]
    pub half_spread_percent: Decimal,
    /// Maximum per-tick mid move, in percent.
    #[serde(default = "default_sim_step_percent")]
    pub step_percent: Decimal,
    /// Quantity resting at each top-of-book level.
    #[serde(default = "default_sim_level_quantity")]
    pub level_quantity: Decimal,
    /// Milliseconds between ticks.
    #[serde(default = "default_sim_tick_ms")]
    pub tick_ms: u64,
}

fn default_sim_start_price() -> Decimal {
    Decimal::from(100)
}

fn default_sim_half_spread_percent() -> Decimal {
    Decimal::new(5, 2) // 0.05%
}

fn default_sim_step_percent() -> Decimal {
    Decimal::new(10, 2) // 0.10%
}

fn default_sim_level_quantity() -> Decimal {
    Decimal::from(5)
}

const fn default_sim_tick_ms() -> u64 {
    250
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            start_price: default_sim_start_price(),
            half_spread_percent: default_sim_half_spread_percent(),
            step_percent: default_sim_step_percent(),
            level_quantity: default_sim_level_quantity(),
            tick_ms: default_sim_tick_ms(),
        }
    }
}

/// Paper-trading ledger seeding. Each venue's ledger starts with these
/// balances per currency.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub balances: std::collections::HashMap<String, Decimal>,
}

/// Per-event notification flags and the optional webhook target.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// POST events as JSON to this URL when set.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Announce detected opportunities (can be noisy).
    #[serde(default)]
    pub notify_opportunities: bool,
    /// Announce completed trades.
    #[serde(default = "default_true")]
    pub notify_trades: bool,
    /// Announce failed trades.
    #[serde(default = "default_true")]
    pub notify_failures: bool,
    /// Announce system errors.
    #[serde(default = "default_true")]
    pub notify_system_errors: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            notify_opportunities: false,
            notify_trades: true,
            notify_failures: true,
            notify_system_errors: true,
        }
    }
}

/// Repository backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum RepositoryConfig {
    /// Keep recent records in memory only.
    Memory,
    /// Append JSON lines under a directory.
    Jsonl { path: std::path::PathBuf },
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load, apply env overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;

        // API keys come from the environment only.
        for venue in &mut config.venues {
            let var = format!(
                "SKIMMER_{}_API_KEY",
                venue.id.to_ascii_uppercase().replace('-', "_")
            );
            venue.api_key = std::env::var(var).ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.arbitrage.pairs.is_empty() {
            return Err(ConfigError::MissingField {
                field: "arbitrage.pairs",
            }
            .into());
        }
        if self.venues.len() < 2 {
            return Err(ConfigError::InvalidValue {
                field: "venues",
                reason: format!(
                    "cross-venue arbitrage needs at least 2 venues, got {}",
                    self.venues.len()
                ),
            }
            .into());
        }
        for venue in &self.venues {
            if venue.id.trim().is_empty() {
                return Err(ConfigError::MissingField { field: "venues.id" }.into());
            }
            if venue.kind == VenueKind::Feed && venue.ws_url.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "venues.ws_url",
                    reason: format!("feed venue '{}' has no ws_url", venue.id),
                }
                .into());
            }
        }
        if self.risk.max_trade_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "risk.max_trade_amount",
                reason: "must be positive".into(),
            }
            .into());
        }
        if self.risk.max_concurrent_trades == 0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.max_concurrent_trades",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Build the initial risk profile.
    #[must_use]
    pub fn risk_profile(&self) -> RiskProfile {
        self.risk.clone().into()
    }

    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.logging.level));

        match self.logging.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}
