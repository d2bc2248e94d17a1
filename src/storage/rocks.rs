//! RocksDB-backed store
//!
//! Key layout:
//! - `quotes:{ticker}:{timestamp_ms:020}:{seq:06}` → Quote
//! - `latest:{ticker}` → Quote (newest seen)
//! - `metrics:{ticker}:{window}` → StoredMetrics
//! - `patterns:{ticker}:{timestamp_ms:020}:{seq:06}` → Pattern
//! - `levels:{ticker}:{side}` → LevelSet
//!
//! Values are MessagePack with named fields. Zero-padded timestamps keep each
//! ticker's quotes and patterns in time order under a prefix scan. Every
//! RocksDB call runs on the blocking pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;

use super::{
    AnalyticsReader, AnalyticsSink, LevelSet, QuoteRecorder, QuoteSource, StoreResult,
    StoredMetrics, DEFAULT_PATTERN_TTL_SECS,
};
use crate::error::StoreError;
use crate::orderflow::types::{
    Pattern, PriceLevelSnapshot, Quote, Side, SignificantLevels, WindowLabel, WindowMetrics,
};
use crate::orderflow::units::normalize_epoch_millis;

const TIMESTAMP_WIDTH: usize = 20;
const SEQ_MODULUS: u64 = 1_000_000;

/// RocksDB store handle
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    seq: Arc<AtomicU64>,
    pattern_ttl_secs: u64,
}

impl RocksStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with_pattern_ttl(path, DEFAULT_PATTERN_TTL_SECS)
    }

    pub fn open_with_pattern_ttl<P: AsRef<Path>>(path: P, pattern_ttl_secs: u64) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);

        let db = DB::open(&opts, path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
            pattern_ttl_secs,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) % SEQ_MODULUS
    }
}

fn quote_prefix(ticker: &str) -> String {
    format!("quotes:{}:", ticker)
}

fn quote_key(ticker: &str, timestamp_ms: i64, seq: u64) -> String {
    format!(
        "quotes:{}:{:020}:{:06}",
        ticker,
        timestamp_ms.max(0),
        seq
    )
}

fn latest_key(ticker: &str) -> String {
    format!("latest:{}", ticker)
}

fn metrics_key(ticker: &str, window: WindowLabel) -> String {
    format!("metrics:{}:{}", ticker, window)
}

fn pattern_prefix(ticker: &str) -> String {
    format!("patterns:{}:", ticker)
}

fn pattern_key(ticker: &str, timestamp_ms: i64, seq: u64) -> String {
    format!(
        "patterns:{}:{:020}:{:06}",
        ticker,
        timestamp_ms.max(0),
        seq
    )
}

fn levels_key(ticker: &str, side: Side) -> String {
    format!("levels:{}:{}", ticker, side)
}

/// Timestamp segment following `prefix` in a time-ordered key
fn key_timestamp(key: &str, prefix: &str) -> Option<i64> {
    key.get(prefix.len()..prefix.len() + TIMESTAMP_WIDTH)?
        .parse()
        .ok()
}

/// Decode a value, dropping it with a warning if malformed
fn decode<T: DeserializeOwned>(key: &[u8], value: &[u8]) -> Option<T> {
    match rmp_serde::from_slice(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(
                key = %String::from_utf8_lossy(key),
                error = %e,
                "Dropping malformed record"
            );
            None
        }
    }
}

fn get_decoded<T: DeserializeOwned>(db: &DB, key: &str) -> StoreResult<Option<T>> {
    Ok(db
        .get(key.as_bytes())?
        .and_then(|value| decode(key.as_bytes(), &value)))
}

/// Collect every (key, value) under `prefix`, starting at `from`
fn scan_prefix(db: &DB, prefix: &str, from: &str) -> StoreResult<Vec<(String, Box<[u8]>)>> {
    let mut entries = Vec::new();
    for item in db.iterator(IteratorMode::From(from.as_bytes(), Direction::Forward)) {
        let (key, value) = item?;
        let key = String::from_utf8_lossy(&key).into_owned();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key, value));
    }
    Ok(entries)
}

#[async_trait]
impl QuoteSource for RocksStore {
    async fn quotes_between(
        &self,
        ticker: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Quote>> {
        let db = self.db.clone();
        let prefix = quote_prefix(ticker);
        let from = format!("{}{:020}", prefix, start_ms.max(0));

        tokio::task::spawn_blocking(move || -> StoreResult<Vec<Quote>> {
            let mut quotes = Vec::new();
            for item in db.iterator(IteratorMode::From(from.as_bytes(), Direction::Forward)) {
                let (key, value) = item?;
                let key_str = String::from_utf8_lossy(&key);
                if !key_str.starts_with(&prefix) {
                    break;
                }
                match key_timestamp(&key_str, &prefix) {
                    Some(ts) if ts > end_ms => break,
                    Some(_) => {}
                    None => continue,
                }
                if let Some(quote) = decode::<Quote>(&key, &value) {
                    quotes.push(quote);
                }
            }
            Ok(quotes)
        })
        .await?
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>> {
        let db = self.db.clone();
        let key = latest_key(ticker);
        tokio::task::spawn_blocking(move || get_decoded(&db, &key)).await?
    }

    async fn active_tickers(&self) -> StoreResult<Vec<String>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            let entries = scan_prefix(&db, "latest:", "latest:")?;
            Ok(entries
                .into_iter()
                .map(|(key, _)| key["latest:".len()..].to_string())
                .filter(|ticker| !ticker.is_empty())
                .collect())
        })
        .await?
    }

    async fn ping(&self) -> StoreResult<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            db.get(b"ping")?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl QuoteRecorder for RocksStore {
    async fn record_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        let mut entries = Vec::with_capacity(quotes.len());
        let mut newest: HashMap<String, Quote> = HashMap::new();

        for quote in quotes {
            let key = quote_key(&quote.ticker, quote.timestamp_ms, self.next_seq());
            entries.push((key, rmp_serde::to_vec_named(quote)?));

            let replace = newest
                .get(&quote.ticker)
                .map_or(true, |current| quote.timestamp_ms >= current.timestamp_ms);
            if replace {
                newest.insert(quote.ticker.clone(), quote.clone());
            }
        }

        let db = self.db.clone();
        let count = quotes.len();

        tokio::task::spawn_blocking(move || -> StoreResult<usize> {
            let mut batch = WriteBatch::default();
            for (key, value) in &entries {
                batch.put(key.as_bytes(), value);
            }
            for (ticker, quote) in newest {
                let key = latest_key(&ticker);
                let stale = get_decoded::<Quote>(&db, &key)?
                    .map_or(true, |stored| quote.timestamp_ms >= stored.timestamp_ms);
                if stale {
                    batch.put(key.as_bytes(), rmp_serde::to_vec_named(&quote)?);
                }
            }
            db.write(batch)?;
            Ok(count)
        })
        .await?
    }

    async fn prune_quotes(&self, cutoff_ms: i64) -> StoreResult<usize> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<usize> {
            let mut batch = WriteBatch::default();
            let mut deleted = 0;

            for item in db.iterator(IteratorMode::From(b"quotes:", Direction::Forward)) {
                let (key, _) = item?;
                let key_str = String::from_utf8_lossy(&key);
                if !key_str.starts_with("quotes:") {
                    break;
                }

                // quotes:{ticker}:{ts}:{seq}
                let ts = key_str
                    .rsplitn(3, ':')
                    .nth(1)
                    .and_then(|segment| segment.parse::<i64>().ok());
                if matches!(ts, Some(ts) if ts < cutoff_ms) {
                    batch.delete(&key);
                    deleted += 1;
                }
            }

            if deleted > 0 {
                db.write(batch)?;
            }
            Ok(deleted)
        })
        .await?
    }
}

#[async_trait]
impl AnalyticsSink for RocksStore {
    async fn save_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
        metrics: &WindowMetrics,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let stored = StoredMetrics::new(metrics, ttl_secs, Utc::now().timestamp_millis());
        let value = rmp_serde::to_vec_named(&stored)?;
        let db = self.db.clone();
        let key = metrics_key(ticker, window);

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            db.put(key.as_bytes(), value)?;
            Ok(())
        })
        .await?
    }

    async fn save_pattern(&self, ticker: &str, pattern: &Pattern) -> StoreResult<()> {
        let value = rmp_serde::to_vec_named(pattern)?;
        let key = pattern_key(ticker, pattern.timestamp_ms, self.next_seq());
        let prefix = pattern_prefix(ticker);
        let cutoff_ms = Utc::now().timestamp_millis() - self.pattern_ttl_secs as i64 * 1000;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let mut batch = WriteBatch::default();
            batch.put(key.as_bytes(), value);

            for (existing, _) in scan_prefix(&db, &prefix, &prefix)? {
                let expired = key_timestamp(&existing, &prefix)
                    .map(|raw| normalize_epoch_millis(raw as f64) < cutoff_ms)
                    .unwrap_or(false);
                if expired {
                    batch.delete(existing.as_bytes());
                }
            }

            db.write(batch)?;
            Ok(())
        })
        .await?
    }

    async fn save_significant_level(
        &self,
        ticker: &str,
        side: Side,
        level: &PriceLevelSnapshot,
    ) -> StoreResult<()> {
        let db = self.db.clone();
        let key = levels_key(ticker, side);
        let level = level.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let now_ms = Utc::now().timestamp_millis();
            let mut set: LevelSet = get_decoded(&db, &key)?.unwrap_or_default();
            set.upsert(&level, now_ms);
            db.put(key.as_bytes(), rmp_serde::to_vec_named(&set)?)?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl AnalyticsReader for RocksStore {
    async fn current_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
    ) -> StoreResult<Option<WindowMetrics>> {
        let db = self.db.clone();
        let key = metrics_key(ticker, window);

        tokio::task::spawn_blocking(move || -> StoreResult<Option<WindowMetrics>> {
            let stored: Option<StoredMetrics> = get_decoded(&db, &key)?;
            Ok(stored.and_then(|s| s.live(Utc::now().timestamp_millis())))
        })
        .await?
    }

    async fn significant_levels(&self, ticker: &str) -> StoreResult<SignificantLevels> {
        let db = self.db.clone();
        let ticker = ticker.to_string();

        tokio::task::spawn_blocking(move || -> StoreResult<SignificantLevels> {
            let now_ms = Utc::now().timestamp_millis();
            let mut levels = SignificantLevels::default();
            for side in Side::BOTH {
                let set: Option<LevelSet> = get_decoded(&db, &levels_key(&ticker, side))?;
                if let Some(set) = set {
                    *levels.side_mut(side) = set.top(now_ms);
                }
            }
            Ok(levels)
        })
        .await?
    }

    async fn recent_patterns(&self, ticker: &str, window_secs: u64) -> StoreResult<Vec<Pattern>> {
        let db = self.db.clone();
        let prefix = pattern_prefix(ticker);
        let now_ms = Utc::now().timestamp_millis();
        let start_ms = now_ms - window_secs as i64 * 1000;

        tokio::task::spawn_blocking(move || -> StoreResult<Vec<Pattern>> {
            let mut scored: Vec<(i64, Pattern)> = scan_prefix(&db, &prefix, &prefix)?
                .into_iter()
                .filter_map(|(key, value)| {
                    let score_ms = normalize_epoch_millis(key_timestamp(&key, &prefix)? as f64);
                    if score_ms < start_ms || score_ms > now_ms {
                        return None;
                    }
                    decode::<Pattern>(key.as_bytes(), &value).map(|p| (score_ms, p))
                })
                .collect();

            scored.sort_by_key(|(score, _)| *score);
            Ok(scored.into_iter().map(|(_, pattern)| pattern).collect())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderflow::types::{MomentumDirection, PatternKind, Strength};
    use anyhow::Result;
    use tempfile::TempDir;

    fn quote(ts: i64, bid_size: u64) -> Quote {
        Quote::new("TSLA", ts, 250.0, 250.05, bid_size, 800)
    }

    #[tokio::test]
    async fn test_quote_range_and_latest() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = RocksStore::open(temp_dir.path())?;

        let now = Utc::now().timestamp_millis();
        store
            .record_quotes(&[quote(now - 20_000, 1), quote(now - 3_000, 2), quote(now - 1_000, 3)])
            .await?;

        let recent = store.recent_quotes("TSLA", 10).await?;
        assert_eq!(
            recent.iter().map(|q| q.bid_size).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(store.latest_quote("TSLA").await?.map(|q| q.bid_size), Some(3));
        assert_eq!(store.active_tickers().await?, vec!["TSLA".to_string()]);

        assert_eq!(store.prune_quotes(now - 10_000).await?, 1);
        assert_eq!(store.quotes_between("TSLA", 0, now).await?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_pattern_round_trip_preserves_instant() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = RocksStore::open(temp_dir.path())?;

        let ts = Utc::now().timestamp_millis() - 2_000;
        let pattern = Pattern::new(
            PatternKind::MomentumShift {
                direction: MomentumDirection::Bearish,
                strength: Strength::Strong,
                ratio: 5.0,
            },
            ts,
            "Bearish momentum: 15 drops vs 3 lifts",
        );
        store.save_pattern("TSLA", &pattern).await?;

        let patterns = store.recent_patterns("TSLA", 60).await?;
        assert_eq!(patterns, vec![pattern]);

        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_record_skipped() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = RocksStore::open(temp_dir.path())?;

        let now = Utc::now().timestamp_millis();
        store.record_quotes(&[quote(now - 1_000, 7)]).await?;
        store
            .db
            .put(quote_key("TSLA", now - 500, 999_999).as_bytes(), b"not msgpack")?;

        let recent = store.recent_quotes("TSLA", 10).await?;
        assert_eq!(recent.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_levels_and_metrics_persist() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = RocksStore::open(temp_dir.path())?;

        let level = PriceLevelSnapshot {
            price: 249.95,
            appearances: 3,
            total_size: 24_000,
            avg_size: 8000.0,
            last_seen: Utc::now().timestamp() as f64,
        };
        store.save_significant_level("TSLA", Side::Ask, &level).await?;

        let levels = store.significant_levels("TSLA").await?;
        assert!(levels.bid.is_empty());
        assert_eq!(levels.ask, vec![level]);

        let metrics = WindowMetrics {
            ticker: "TSLA".into(),
            window: WindowLabel::OneMinute,
            computed_at_ms: Utc::now().timestamp_millis(),
            sample_count: 12,
            momentum: Default::default(),
            size: Default::default(),
            spread: None,
            last_sweep: None,
            behaviors: None,
        };
        store.save_metrics("TSLA", WindowLabel::OneMinute, &metrics, 300).await?;
        assert_eq!(
            store.current_metrics("TSLA", WindowLabel::OneMinute).await?,
            Some(metrics)
        );
        assert_eq!(store.current_metrics("TSLA", WindowLabel::FiveMinutes).await?, None);

        Ok(())
    }
}
