// Supervisor behavior across tickers
//
// - Full cycles write metrics and levels through the store
// - A failing or panicking ticker never stops its worker or its neighbours
// - Shutdown drains every worker

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use orderflow_engine::config::EngineConfig;
use orderflow_engine::error::StoreError;
use orderflow_engine::orderflow::{
    Pattern, PriceLevelSnapshot, Quote, Side, SignificantLevels, WindowLabel, WindowMetrics,
};
use orderflow_engine::service::ProcessorService;
use orderflow_engine::storage::{
    AnalyticsReader, AnalyticsSink, MemoryStore, QuoteRecorder, QuoteSource, StoreResult,
};

/// Memory store that errors on reads for `FAIL` and panics for `BOOM`
struct FlakyStore {
    inner: MemoryStore,
}

#[async_trait]
impl QuoteSource for FlakyStore {
    async fn quotes_between(
        &self,
        ticker: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> StoreResult<Vec<Quote>> {
        match ticker {
            "FAIL" => Err(StoreError::Unavailable("connection refused".to_string())),
            "BOOM" => panic!("corrupt quote stream"),
            _ => self.inner.quotes_between(ticker, start_ms, end_ms).await,
        }
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>> {
        self.inner.latest_quote(ticker).await
    }

    async fn active_tickers(&self) -> StoreResult<Vec<String>> {
        self.inner.active_tickers().await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

#[async_trait]
impl QuoteRecorder for FlakyStore {
    async fn record_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        self.inner.record_quotes(quotes).await
    }

    async fn prune_quotes(&self, cutoff_ms: i64) -> StoreResult<usize> {
        self.inner.prune_quotes(cutoff_ms).await
    }
}

#[async_trait]
impl AnalyticsSink for FlakyStore {
    async fn save_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
        metrics: &WindowMetrics,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        self.inner.save_metrics(ticker, window, metrics, ttl_secs).await
    }

    async fn save_pattern(&self, ticker: &str, pattern: &Pattern) -> StoreResult<()> {
        self.inner.save_pattern(ticker, pattern).await
    }

    async fn save_significant_level(
        &self,
        ticker: &str,
        side: Side,
        level: &PriceLevelSnapshot,
    ) -> StoreResult<()> {
        self.inner.save_significant_level(ticker, side, level).await
    }
}

#[async_trait]
impl AnalyticsReader for FlakyStore {
    async fn current_metrics(
        &self,
        ticker: &str,
        window: WindowLabel,
    ) -> StoreResult<Option<WindowMetrics>> {
        self.inner.current_metrics(ticker, window).await
    }

    async fn significant_levels(&self, ticker: &str) -> StoreResult<SignificantLevels> {
        self.inner.significant_levels(ticker).await
    }

    async fn recent_patterns(&self, ticker: &str, window_secs: u64) -> StoreResult<Vec<Pattern>> {
        self.inner.recent_patterns(ticker, window_secs).await
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        process_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Five quotes in the last few seconds, all at one large bid
fn fresh_quotes(ticker: &str) -> Vec<Quote> {
    let now = Utc::now().timestamp_millis();
    (0..5)
        .map(|i| Quote::new(ticker, now - 2_000 + i * 200, 50.00, 50.02, 7000, 800))
        .collect()
}

#[tokio::test]
async fn healthy_ticker_writes_metrics_and_levels() {
    let store = Arc::new(MemoryStore::new());
    store.record_quotes(&fresh_quotes("INTC")).await.unwrap();

    let service = ProcessorService::new(store.clone(), fast_config());
    assert_eq!(service.discover().await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = service.stats("INTC").await.unwrap();
    assert!(stats.process_count >= 1);
    assert_eq!(stats.errors, 0);

    let metrics = store
        .current_metrics("INTC", WindowLabel::TenSeconds)
        .await
        .unwrap()
        .expect("10s metrics written");
    assert_eq!(metrics.sample_count, 5);
    assert!(metrics.behaviors.is_some());

    let levels = store.significant_levels("INTC").await.unwrap();
    assert_eq!(levels.bid.len(), 1);
    assert_eq!(levels.bid[0].price, 50.00);
    assert!(levels.ask.is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn failing_tickers_do_not_stop_workers() {
    let inner = MemoryStore::new();
    inner.record_quotes(&fresh_quotes("INTC")).await.unwrap();
    let store = Arc::new(FlakyStore { inner });

    let service = ProcessorService::new(store, fast_config());
    service.ensure_worker("INTC").await;
    service.ensure_worker("FAIL").await;
    service.ensure_worker("BOOM").await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let failed = service.stats("FAIL").await.unwrap();
    let boom = service.stats("BOOM").await.unwrap();
    let healthy = service.stats("INTC").await.unwrap();

    // Every tick keeps failing, so the counters keep climbing
    assert!(failed.errors >= 2, "errors: {}", failed.errors);
    assert!(boom.errors >= 2, "errors: {}", boom.errors);
    assert_eq!(failed.process_count, 0);
    assert!(healthy.process_count >= 1);
    assert_eq!(healthy.errors, 0);

    let status = service.status().await;
    assert_eq!(status.active_tickers, vec!["BOOM", "FAIL", "INTC"]);

    service.shutdown().await;
    assert!(service.tickers().await.is_empty());
}

#[tokio::test]
async fn run_loop_discovers_and_stops_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        tickers: vec!["AAPL".to_string()],
        ..fast_config()
    };
    let service = Arc::new(ProcessorService::new(store.clone(), config));

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run().await })
    };

    store.record_quotes(&fresh_quotes("GOOG")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(service.status().await.running);
    assert_eq!(service.tickers().await, vec!["AAPL".to_string(), "GOOG".to_string()]);

    service.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("run loop exits after shutdown")
        .unwrap();
    assert!(!service.status().await.running);
}
