//! Per-ticker analytics cycle
//!
//! One [`TickerProcessor`] owns all mutable analytics state for a ticker (the
//! price level tracker and the last persisted sweep). A cycle reads the quote
//! windows, computes everything in memory, then writes the results. The
//! tracker update and its sweep happen back to back with no await in between,
//! so a cycle abandoned at any await point never leaves the level map half
//! updated.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CycleError, StoreError};
use crate::orderflow::behavior::BehaviorAnalyzer;
use crate::orderflow::levels::{PriceLevelTracker, DEFAULT_SIGNIFICANCE_FLOOR};
use crate::orderflow::metrics::{MetricsCalculator, DEFAULT_LARGE_ORDER_SIZE, DEFAULT_SWEEP_THRESHOLD};
use crate::orderflow::patterns::PatternDetector;
use crate::orderflow::types::{
    BehaviorFlags, Pattern, PriceLevelSnapshot, Quote, Side, WindowLabel, WindowMetrics,
};
use crate::storage::OrderFlowStore;

/// Tunables for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    /// Soft budget; overruns are logged, never aborted
    pub latency_budget_ms: u64,
    /// The 5min window is computed only above this many samples
    pub min_5min_samples: usize,
    pub large_order_size: u64,
    pub sweep_threshold: u64,
    pub significance_floor: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            latency_budget_ms: 100,
            min_5min_samples: 100,
            large_order_size: DEFAULT_LARGE_ORDER_SIZE,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            significance_floor: DEFAULT_SIGNIFICANCE_FLOOR,
        }
    }
}

/// What a completed cycle produced
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub ticker: String,
    pub computed_at_ms: i64,
    /// Windows whose metrics were computed this cycle
    pub windows: Vec<WindowLabel>,
    pub behaviors: BehaviorFlags,
    /// Patterns handed to the store, including a newly observed sweep
    pub patterns: Vec<Pattern>,
    pub levels_exported: usize,
    /// Writes the store rejected; the cycle still counts as processed
    pub sink_failures: usize,
    pub elapsed_ms: u64,
    pub over_budget: bool,
}

/// Result of a cycle that did not fail
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The 10s window was empty; nothing computed or written
    NoData,
    Processed(CycleReport),
}

/// Analytics context for a single ticker
pub struct TickerProcessor {
    ticker: String,
    store: Arc<dyn OrderFlowStore>,
    settings: CycleSettings,
    calculator: MetricsCalculator,
    detector: PatternDetector,
    analyzer: BehaviorAnalyzer,
    tracker: PriceLevelTracker,
    last_persisted_sweep_ms: Option<i64>,
}

impl TickerProcessor {
    pub fn new(ticker: impl Into<String>, store: Arc<dyn OrderFlowStore>, settings: CycleSettings) -> Self {
        Self {
            ticker: ticker.into(),
            store,
            calculator: MetricsCalculator::new(settings.large_order_size, settings.sweep_threshold),
            detector: PatternDetector::new(),
            analyzer: BehaviorAnalyzer::new(),
            tracker: PriceLevelTracker::new(settings.significance_floor),
            last_persisted_sweep_ms: None,
            settings,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn tracker(&self) -> &PriceLevelTracker {
        &self.tracker
    }

    /// Drop accumulated state after a cycle was torn down mid-flight
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.last_persisted_sweep_ms = None;
    }

    /// Run one cycle at the current wall-clock time
    pub async fn process(&mut self) -> Result<CycleOutcome, CycleError> {
        self.process_at(Utc::now()).await
    }

    /// Run one cycle as of `now`
    ///
    /// # Returns
    /// * `Ok(CycleOutcome::NoData)` - the 10s window was empty
    /// * `Ok(CycleOutcome::Processed(_))` - metrics computed and written (individual
    ///   write failures are counted in the report)
    ///
    /// # Errors
    /// * `CycleError::Retrieval` - a quote window could not be read; nothing was
    ///   computed or written and the tracker is untouched
    pub async fn process_at(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let started = Instant::now();
        let now_ms = now.timestamp_millis();

        let quotes_10s = self.fetch(WindowLabel::TenSeconds, now_ms).await?;
        if quotes_10s.is_empty() {
            debug!(ticker = %self.ticker, "No quotes in last 10s");
            return Ok(CycleOutcome::NoData);
        }
        let quotes_1m = self.fetch(WindowLabel::OneMinute, now_ms).await?;

        let within_budget = started.elapsed().as_millis() < self.settings.latency_budget_ms as u128;
        let quotes_5m = if within_budget {
            self.fetch(WindowLabel::FiveMinutes, now_ms).await?
        } else {
            debug!(ticker = %self.ticker, "Skipping 5min window, cycle already over budget");
            Vec::new()
        };

        // Compute
        let mut metrics_10s = self.window_metrics(WindowLabel::TenSeconds, &quotes_10s, now_ms);
        let behaviors =
            self.analyzer
                .analyze(&quotes_10s, &metrics_10s.momentum, &metrics_10s.size);
        metrics_10s.behaviors = Some(behaviors.clone());

        let metrics_1m = (!quotes_1m.is_empty())
            .then(|| self.window_metrics(WindowLabel::OneMinute, &quotes_1m, now_ms));
        let metrics_5m = (quotes_5m.len() > self.settings.min_5min_samples)
            .then(|| self.window_metrics(WindowLabel::FiveMinutes, &quotes_5m, now_ms));

        let mut patterns = match &metrics_1m {
            Some(metrics) => self.detector.detect(&quotes_1m, &metrics.momentum, now_ms),
            None => Vec::new(),
        };
        if let Some(sweep) = metrics_1m.as_ref().and_then(|m| m.last_sweep.as_ref()) {
            let unseen = self
                .last_persisted_sweep_ms
                .map_or(true, |last| sweep.timestamp_ms > last);
            if unseen {
                patterns.push(Pattern::from(sweep));
                self.last_persisted_sweep_ms = Some(sweep.timestamp_ms);
            }
        }

        let exported = self
            .tracker
            .update_and_sweep(&quotes_10s, now_ms as f64 / 1000.0);

        // Persist
        let mut windows = vec![WindowLabel::TenSeconds];
        let mut sink_failures = self.save_metrics(&metrics_10s).await;
        for metrics in [metrics_1m, metrics_5m].iter().flatten() {
            windows.push(metrics.window);
            sink_failures += self.save_metrics(metrics).await;
        }
        sink_failures += self.save_patterns(&patterns).await;
        sink_failures += self.save_levels(&exported).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let over_budget = elapsed_ms > self.settings.latency_budget_ms;
        if over_budget {
            warn!(
                ticker = %self.ticker,
                elapsed_ms,
                budget_ms = self.settings.latency_budget_ms,
                "Slow processing cycle"
            );
        }

        Ok(CycleOutcome::Processed(CycleReport {
            ticker: self.ticker.clone(),
            computed_at_ms: now_ms,
            windows,
            behaviors,
            patterns,
            levels_exported: exported.len(),
            sink_failures,
            elapsed_ms,
            over_budget,
        }))
    }

    async fn fetch(&self, window: WindowLabel, now_ms: i64) -> Result<Vec<Quote>, CycleError> {
        let start_ms = now_ms - window.seconds() as i64 * 1000;
        self.store
            .quotes_between(&self.ticker, start_ms, now_ms)
            .await
            .map_err(|source| {
                warn!(ticker = %self.ticker, window = %window, error = %source, "Quote retrieval failed, skipping cycle");
                CycleError::Retrieval { window, source }
            })
    }

    fn window_metrics(&self, window: WindowLabel, quotes: &[Quote], now_ms: i64) -> WindowMetrics {
        WindowMetrics {
            ticker: self.ticker.clone(),
            window,
            computed_at_ms: now_ms,
            sample_count: quotes.len(),
            momentum: self.calculator.momentum(quotes),
            size: self.calculator.size_dynamics(quotes),
            spread: self.calculator.spread_metrics(quotes),
            last_sweep: self.calculator.sweep(quotes),
            behaviors: None,
        }
    }

    async fn save_metrics(&self, metrics: &WindowMetrics) -> usize {
        let window = metrics.window;
        let result = self
            .store
            .save_metrics(&self.ticker, window, metrics, window.metrics_ttl_secs())
            .await;
        self.count_failure(result, "metrics")
    }

    async fn save_patterns(&self, patterns: &[Pattern]) -> usize {
        let mut failures = 0;
        for pattern in patterns {
            let result = self.store.save_pattern(&self.ticker, pattern).await;
            failures += self.count_failure(result, pattern.type_name());
        }
        failures
    }

    async fn save_levels(&self, levels: &[(Side, PriceLevelSnapshot)]) -> usize {
        let mut failures = 0;
        for (side, level) in levels {
            let result = self
                .store
                .save_significant_level(&self.ticker, *side, level)
                .await;
            failures += self.count_failure(result, "level");
        }
        failures
    }

    fn count_failure(&self, result: Result<(), StoreError>, what: &str) -> usize {
        match result {
            Ok(()) => 0,
            Err(e) => {
                warn!(ticker = %self.ticker, record = what, error = %e, "Failed to persist analytics");
                1
            }
        }
    }
}
