//! Quote and analytics persistence
//!
//! The cycle talks to storage only through the traits below. Two backends are
//! provided:
//! - [`MemoryStore`]: in-process maps, used by tests and `--memory` runs
//! - [`RocksStore`]: RocksDB with MessagePack values (feature `rocksdb_store`)
//!
//! Timestamp convention at this boundary: quotes and patterns carry
//! milliseconds, pattern scores and level `last_seen` are seconds. Readers
//! normalize either unit (see [`crate::orderflow::units`]).

pub mod memory;

#[cfg(feature = "rocksdb_store")]
pub mod rocks;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::orderflow::levels::price_key;
use crate::orderflow::types::{
    Pattern, PriceLevelSnapshot, Quote, Side, SignificantLevels, WindowLabel, WindowMetrics,
};

pub use memory::MemoryStore;

#[cfg(feature = "rocksdb_store")]
pub use rocks::RocksStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Patterns older than this are pruned on every append
pub const DEFAULT_PATTERN_TTL_SECS: u64 = 3600;

/// Quotes older than this are removed by `prune_quotes`
pub const DEFAULT_QUOTE_RETENTION_SECS: u64 = 600;

/// Levels kept per (ticker, side), best score first
pub const LEVELS_RETAINED: usize = 20;

/// Levels returned per side on read
pub const LEVELS_READ_LIMIT: usize = 11;

/// A (ticker, side) level set expires this long after its last save
pub const LEVEL_SET_TTL_SECS: u64 = 3600;

/// Read side for quotes
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Quotes with `start_ms <= timestamp <= end_ms`, ascending
    async fn quotes_between(&self, ticker: &str, start_ms: i64, end_ms: i64)
        -> StoreResult<Vec<Quote>>;

    /// Quotes from the trailing `window_secs`, ascending; empty if none
    async fn recent_quotes(&self, ticker: &str, window_secs: u64) -> StoreResult<Vec<Quote>> {
        let now_ms = Utc::now().timestamp_millis();
        self.quotes_between(ticker, now_ms - window_secs as i64 * 1000, now_ms)
            .await
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>>;

    /// Tickers with at least one stored quote
    async fn active_tickers(&self) -> StoreResult<Vec<String>>;

    /// Cheap reachability check
    async fn ping(&self) -> StoreResult<()>;
}

/// Write side for quotes
#[async_trait]
pub trait QuoteRecorder: Send + Sync {
    /// Append quotes; returns the number stored
    async fn record_quotes(&self, quotes: &[Quote]) -> StoreResult<usize>;

    /// Remove quotes with timestamp before `cutoff_ms`; returns the number removed
    async fn prune_quotes(&self, cutoff_ms: i64) -> StoreResult<usize>;
}

/// Analytics output produced by the cycle
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn save_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
        metrics: &WindowMetrics,
        ttl_secs: u64,
    ) -> StoreResult<()>;

    /// Append with score = timestamp in seconds, then prune past the retention
    async fn save_pattern(&self, ticker: &str, pattern: &Pattern) -> StoreResult<()>;

    /// Upsert by price, keep the top 20 by score
    async fn save_significant_level(
        &self,
        ticker: &str,
        side: Side,
        level: &PriceLevelSnapshot,
    ) -> StoreResult<()>;
}

/// Analytics read path used by reporting surfaces
#[async_trait]
pub trait AnalyticsReader: Send + Sync {
    /// Latest unexpired snapshot for (ticker, window)
    async fn current_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
    ) -> StoreResult<Option<WindowMetrics>>;

    async fn significant_levels(&self, ticker: &str) -> StoreResult<SignificantLevels>;

    /// Patterns scored within the trailing `window_secs`, ascending
    async fn recent_patterns(&self, ticker: &str, window_secs: u64) -> StoreResult<Vec<Pattern>>;
}

/// Everything the engine needs from one backend
pub trait OrderFlowStore: QuoteSource + QuoteRecorder + AnalyticsSink + AnalyticsReader {}

impl<T> OrderFlowStore for T where T: QuoteSource + QuoteRecorder + AnalyticsSink + AnalyticsReader {}

/// Metric snapshot with its expiry, as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredMetrics {
    pub expires_at_ms: i64,
    pub metrics: WindowMetrics,
}

impl StoredMetrics {
    pub fn new(metrics: &WindowMetrics, ttl_secs: u64, now_ms: i64) -> Self {
        Self {
            expires_at_ms: now_ms + ttl_secs as i64 * 1000,
            metrics: metrics.clone(),
        }
    }

    pub fn live(self, now_ms: i64) -> Option<WindowMetrics> {
        (self.expires_at_ms > now_ms).then_some(self.metrics)
    }
}

/// Ranked significant levels for one (ticker, side)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LevelSet {
    pub expires_at_ms: i64,
    pub levels: Vec<PriceLevelSnapshot>,
}

impl LevelSet {
    /// Replace any level at the same price, re-rank, cap, and refresh the expiry
    pub fn upsert(&mut self, level: &PriceLevelSnapshot, now_ms: i64) {
        if self.expires_at_ms <= now_ms {
            self.levels.clear();
        }

        let key = price_key(level.price);
        self.levels.retain(|existing| price_key(existing.price) != key);
        self.levels.push(level.clone());
        self.levels
            .sort_by(|a, b| b.score().total_cmp(&a.score()));
        self.levels.truncate(LEVELS_RETAINED);
        self.expires_at_ms = now_ms + LEVEL_SET_TTL_SECS as i64 * 1000;
    }

    /// Best-first levels for reading; empty once expired
    pub fn top(&self, now_ms: i64) -> Vec<PriceLevelSnapshot> {
        if self.expires_at_ms <= now_ms {
            return Vec::new();
        }
        self.levels.iter().take(LEVELS_READ_LIMIT).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, appearances: u32, total_size: u64) -> PriceLevelSnapshot {
        PriceLevelSnapshot {
            price,
            appearances,
            total_size,
            avg_size: total_size as f64 / appearances as f64,
            last_seen: 1_700_000_000.0,
        }
    }

    #[test]
    fn test_level_set_ranks_and_caps() {
        let now = 1_700_000_000_000;
        let mut set = LevelSet::default();
        for i in 0..25u64 {
            set.upsert(&level(100.0 + i as f64, 3, 10_000 + i * 1000), now);
        }

        assert_eq!(set.levels.len(), LEVELS_RETAINED);
        assert_eq!(set.levels[0].price, 124.0);

        let top = set.top(now);
        assert_eq!(top.len(), LEVELS_READ_LIMIT);
        assert!(top.windows(2).all(|w| w[0].score() >= w[1].score()));
    }

    #[test]
    fn test_level_set_replaces_same_price() {
        let now = 1_700_000_000_000;
        let mut set = LevelSet::default();
        set.upsert(&level(50.25, 3, 18_000), now);
        set.upsert(&level(50.25, 4, 25_000), now);

        assert_eq!(set.levels.len(), 1);
        assert_eq!(set.levels[0].appearances, 4);
    }

    #[test]
    fn test_level_set_expires() {
        let now = 1_700_000_000_000;
        let mut set = LevelSet::default();
        set.upsert(&level(50.25, 3, 18_000), now);

        assert!(set.top(now + LEVEL_SET_TTL_SECS as i64 * 1000).is_empty());
    }

    #[test]
    fn test_stored_metrics_expiry() {
        let metrics = WindowMetrics {
            ticker: "SPY".into(),
            window: WindowLabel::TenSeconds,
            computed_at_ms: 0,
            sample_count: 0,
            momentum: Default::default(),
            size: Default::default(),
            spread: None,
            last_sweep: None,
            behaviors: None,
        };
        let stored = StoredMetrics::new(&metrics, 60, 1_000);
        assert!(stored.clone().live(60_999).is_some());
        assert!(stored.live(61_000).is_none());
    }
}
