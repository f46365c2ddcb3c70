//! Persistence port and implementations.
//!
//! The engine only depends on the [`Repository`] trait; failures are the
//! caller's to log and never halt trading.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{ArbitrageOpportunity, ArbitrageStatistics, ArbitrageTradeResult};
use crate::error::Result;

/// Persistence collaborator for opportunities, trades and statistics.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;

    async fn save_trade_result(&self, result: &ArbitrageTradeResult) -> Result<()>;

    async fn save_statistics(&self, statistics: &ArbitrageStatistics) -> Result<()>;

    /// Most recent opportunities, newest first.
    async fn recent_opportunities(&self, limit: usize) -> Result<Vec<ArbitrageOpportunity>>;

    /// Most recent trade results, newest first.
    async fn recent_trades(&self, limit: usize) -> Result<Vec<ArbitrageTradeResult>>;
}

const MEMORY_CAPACITY: usize = 1000;

/// Ring-buffered in-memory repository. The default backend and the one
/// tests use.
pub struct MemoryRepository {
    opportunities: Mutex<VecDeque<ArbitrageOpportunity>>,
    trades: Mutex<VecDeque<ArbitrageTradeResult>>,
    statistics: Mutex<Option<ArbitrageStatistics>>,
    capacity: usize,
}

impl MemoryRepository {
    /// Create a repository retaining the default number of records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_CAPACITY)
    }

    /// Create a repository retaining at most `capacity` records per kind.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            opportunities: Mutex::new(VecDeque::new()),
            trades: Mutex::new(VecDeque::new()),
            statistics: Mutex::new(None),
            capacity,
        }
    }

    /// Last statistics snapshot saved, if any.
    #[must_use]
    pub fn last_statistics(&self) -> Option<ArbitrageStatistics> {
        self.statistics.lock().clone()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, value: T, capacity: usize) {
    if buffer.len() == capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        push_capped(
            &mut self.opportunities.lock(),
            opportunity.clone(),
            self.capacity,
        );
        Ok(())
    }

    async fn save_trade_result(&self, result: &ArbitrageTradeResult) -> Result<()> {
        push_capped(&mut self.trades.lock(), result.clone(), self.capacity);
        Ok(())
    }

    async fn save_statistics(&self, statistics: &ArbitrageStatistics) -> Result<()> {
        *self.statistics.lock() = Some(statistics.clone());
        Ok(())
    }

    async fn recent_opportunities(&self, limit: usize) -> Result<Vec<ArbitrageOpportunity>> {
        Ok(self
            .opportunities
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<ArbitrageTradeResult>> {
        Ok(self.trades.lock().iter().rev().take(limit).cloned().collect())
    }
}

/// Append-only JSON-lines repository.
///
/// Keeps the in-memory ring for recency queries and additionally appends
/// every record to `opportunities.jsonl` / `trades.jsonl` /
/// `statistics.jsonl` under the configured directory. Writes are tiny and
/// serialized behind a mutex.
pub struct JsonlRepository {
    dir: PathBuf,
    memory: MemoryRepository,
    write_lock: Mutex<()>,
}

impl JsonlRepository {
    /// Create the directory if needed and open the repository.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            memory: MemoryRepository::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn append(&self, file: &str, value: &impl serde::Serialize) -> Result<()> {
        let line = serde_json::to_string(value)?;
        let _guard = self.write_lock.lock();
        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        writeln!(handle, "{line}")?;
        Ok(())
    }
}

#[async_trait]
impl Repository for JsonlRepository {
    async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        self.append("opportunities.jsonl", opportunity)?;
        self.memory.save_opportunity(opportunity).await
    }

    async fn save_trade_result(&self, result: &ArbitrageTradeResult) -> Result<()> {
        self.append("trades.jsonl", result)?;
        self.memory.save_trade_result(result).await
    }

    async fn save_statistics(&self, statistics: &ArbitrageStatistics) -> Result<()> {
        self.append("statistics.jsonl", statistics)?;
        self.memory.save_statistics(statistics).await
    }

    async fn recent_opportunities(&self, limit: usize) -> Result<Vec<ArbitrageOpportunity>> {
        self.memory.recent_opportunities(limit).await
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<ArbitrageTradeResult>> {
        self.memory.recent_trades(limit).await
    }
}
