//! In-process store
//!
//! Same semantics as the RocksDB backend without touching disk.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    AnalyticsReader, AnalyticsSink, LevelSet, QuoteRecorder, QuoteSource, StoreResult,
    StoredMetrics, DEFAULT_PATTERN_TTL_SECS,
};
use crate::orderflow::types::{
    Pattern, PriceLevelSnapshot, Quote, Side, SignificantLevels, WindowLabel, WindowMetrics,
};
use crate::orderflow::units::{millis_to_score_secs, normalize_epoch_secs};

#[derive(Default)]
struct Inner {
    /// Per ticker, ascending by timestamp
    quotes: HashMap<String, Vec<Quote>>,
    metrics: HashMap<(String, WindowLabel), StoredMetrics>,
    /// Per ticker, (score, pattern) ascending by score
    patterns: HashMap<String, Vec<(f64, Pattern)>>,
    levels: HashMap<(String, Side), LevelSet>,
}

/// Store backed by in-memory maps
pub struct MemoryStore {
    inner: RwLock<Inner>,
    pattern_ttl_secs: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_pattern_ttl(DEFAULT_PATTERN_TTL_SECS)
    }

    pub fn with_pattern_ttl(pattern_ttl_secs: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            pattern_ttl_secs,
        }
    }

    /// Insert a pattern under an explicit raw score (seconds or milliseconds)
    ///
    /// Mirrors stores written by other producers that score in milliseconds.
    #[cfg(test)]
    pub(crate) async fn insert_pattern_with_score(&self, ticker: &str, score: f64, pattern: Pattern) {
        let mut inner = self.inner.write().await;
        let entries = inner.patterns.entry(ticker.to_string()).or_default();
        let at = entries.partition_point(|(s, _)| normalize_epoch_secs(*s) <= normalize_epoch_secs(score));
        entries.insert(at, (score, pattern));
    }
}

#[async_trait]
impl QuoteSource for MemoryStore {
    async fn quotes_between(
        &self,
        ticker: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Quote>> {
        let inner = self.inner.read().await;
        Ok(inner
            .quotes
            .get(ticker)
            .map(|quotes| {
                quotes
                    .iter()
                    .filter(|q| q.timestamp_ms >= start_ms && q.timestamp_ms <= end_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>> {
        let inner = self.inner.read().await;
        Ok(inner.quotes.get(ticker).and_then(|q| q.last().cloned()))
    }

    async fn active_tickers(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut tickers: Vec<String> = inner
            .quotes
            .iter()
            .filter(|(_, quotes)| !quotes.is_empty())
            .map(|(ticker, _)| ticker.clone())
            .collect();
        tickers.sort();
        Ok(tickers)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl QuoteRecorder for MemoryStore {
    async fn record_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        for quote in quotes {
            let series = inner.quotes.entry(quote.ticker.clone()).or_default();
            let at = series.partition_point(|q| q.timestamp_ms <= quote.timestamp_ms);
            series.insert(at, quote.clone());
        }
        Ok(quotes.len())
    }

    async fn prune_quotes(&self, cutoff_ms: i64) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for series in inner.quotes.values_mut() {
            let before = series.len();
            series.retain(|q| q.timestamp_ms >= cutoff_ms);
            removed += before - series.len();
        }
        inner.quotes.retain(|_, series| !series.is_empty());
        Ok(removed)
    }
}

#[async_trait]
impl AnalyticsSink for MemoryStore {
    async fn save_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
        metrics: &WindowMetrics,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let mut inner = self.inner.write().await;
        inner.metrics.insert(
            (ticker.to_string(), window),
            StoredMetrics::new(metrics, ttl_secs, now_ms),
        );
        Ok(())
    }

    async fn save_pattern(&self, ticker: &str, pattern: &Pattern) -> StoreResult<()> {
        let score = millis_to_score_secs(pattern.timestamp_ms);
        let cutoff = Utc::now().timestamp() as f64 - self.pattern_ttl_secs as f64;

        let mut inner = self.inner.write().await;
        let entries = inner.patterns.entry(ticker.to_string()).or_default();
        let at = entries.partition_point(|(s, _)| normalize_epoch_secs(*s) <= score);
        entries.insert(at, (score, pattern.clone()));
        entries.retain(|(s, _)| normalize_epoch_secs(*s) >= cutoff);
        Ok(())
    }

    async fn save_significant_level(
        &self,
        ticker: &str,
        side: Side,
        level: &PriceLevelSnapshot,
    ) -> StoreResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let mut inner = self.inner.write().await;
        inner
            .levels
            .entry((ticker.to_string(), side))
            .or_default()
            .upsert(level, now_ms);
        Ok(())
    }
}

#[async_trait]
impl AnalyticsReader for MemoryStore {
    async fn current_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
    ) -> StoreResult<Option<WindowMetrics>> {
        let now_ms = Utc::now().timestamp_millis();
        let inner = self.inner.read().await;
        Ok(inner
            .metrics
            .get(&(ticker.to_string(), window))
            .cloned()
            .and_then(|stored| stored.live(now_ms)))
    }

    async fn significant_levels(&self, ticker: &str) -> StoreResult<SignificantLevels> {
        let now_ms = Utc::now().timestamp_millis();
        let inner = self.inner.read().await;

        let mut levels = SignificantLevels::default();
        for side in Side::BOTH {
            if let Some(set) = inner.levels.get(&(ticker.to_string(), side)) {
                *levels.side_mut(side) = set.top(now_ms);
            }
        }
        Ok(levels)
    }

    async fn recent_patterns(&self, ticker: &str, window_secs: u64) -> StoreResult<Vec<Pattern>> {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let start = now - window_secs as f64;

        let inner = self.inner.read().await;
        Ok(inner
            .patterns
            .get(ticker)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(score, _)| {
                        let secs = normalize_epoch_secs(*score);
                        secs >= start && secs <= now
                    })
                    .map(|(_, pattern)| pattern.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
