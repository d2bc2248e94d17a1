//! Background processor supervisor
//!
//! Owns one worker per ticker. Workers are created the first time a ticker is
//! seen (from the store's active tickers or the configured list) and live until
//! shutdown. Each worker runs its ticker's cycle on a fixed cadence; a cycle
//! always finishes before the next tick is awaited, so two cycles for the same
//! ticker never overlap.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{CycleError, StoreError};
use crate::orderflow::{CycleOutcome, TickerProcessor};
use crate::storage::OrderFlowStore;

/// How often quotes past retention are pruned
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Counters for one ticker's worker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorStats {
    /// Cycles that computed and wrote metrics
    pub process_count: u64,
    /// Cycles that failed retrieval or panicked
    pub errors: u64,
    pub patterns_detected: u64,
    /// Cycles skipped because the 10s window was empty
    pub no_data_count: u64,
    pub last_process_time: Option<DateTime<Utc>>,
    pub last_cycle_ms: Option<u64>,
}

/// Snapshot of the supervisor
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub process_interval_secs: u64,
    pub active_tickers: Vec<String>,
    pub store_reachable: bool,
    pub processors: BTreeMap<String, ProcessorStats>,
}

struct WorkerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ProcessorStats>>,
}

/// Supervisor for per-ticker workers
pub struct ProcessorService {
    store: Arc<dyn OrderFlowStore>,
    config: EngineConfig,
    workers: Arc<RwLock<HashMap<String, WorkerHandle>>>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl ProcessorService {
    pub fn new(store: Arc<dyn OrderFlowStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            workers: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> Arc<dyn OrderFlowStore> {
        Arc::clone(&self.store)
    }

    /// Token cancelled when the service shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start a worker for `ticker` unless one already exists
    ///
    /// # Returns
    /// `true` if a worker was created
    pub async fn ensure_worker(&self, ticker: &str) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }

        {
            let workers = self.workers.read().await;
            if workers.contains_key(ticker) {
                return false;
            }
        }

        let mut workers = self.workers.write().await;
        if workers.contains_key(ticker) {
            return false;
        }

        let processor = TickerProcessor::new(ticker, self.store(), self.config.cycle.clone());
        let token = self.shutdown.child_token();
        let stats = Arc::new(Mutex::new(ProcessorStats::default()));

        let join = tokio::spawn(run_worker(
            processor,
            self.config.process_interval,
            token.clone(),
            Arc::clone(&stats),
        ));

        info!(ticker = %ticker, "Created processor");
        workers.insert(ticker.to_string(), WorkerHandle { token, join, stats });
        true
    }

    /// Create workers for every configured or active ticker not yet tracked
    ///
    /// # Returns
    /// Number of workers created
    pub async fn discover(&self) -> Result<usize, StoreError> {
        let mut tickers = self.config.tickers.clone();
        tickers.extend(self.store.active_tickers().await?);

        let mut created = 0;
        for ticker in &tickers {
            if self.ensure_worker(ticker).await {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Discovery loop; returns after [`ProcessorService::shutdown`]
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.config.process_interval.as_secs_f64(),
            "Processor service started"
        );

        let mut ticker = interval(self.config.process_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.discover().await {
                        warn!(error = %e, "Ticker discovery failed");
                    }
                }
            }
        }

        self.stop_workers().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Processor service stopped");
    }

    /// Cancel every worker and wait for in-flight cycles to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_workers().await;
        self.running.store(false, Ordering::SeqCst);
    }

    async fn stop_workers(&self) {
        let drained: Vec<(String, WorkerHandle)> = self.workers.write().await.drain().collect();

        for (ticker, handle) in drained {
            handle.token.cancel();
            if let Err(e) = handle.join.await {
                error!(ticker = %ticker, error = %e, "Worker task did not exit cleanly");
            }
            debug!(ticker = %ticker, "Stopped processor");
        }
    }

    pub async fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.workers.read().await.keys().cloned().collect();
        tickers.sort();
        tickers
    }

    pub async fn stats(&self, ticker: &str) -> Option<ProcessorStats> {
        let workers = self.workers.read().await;
        workers.get(ticker).map(|handle| read_stats(&handle.stats))
    }

    pub async fn status(&self) -> ServiceStatus {
        let store_reachable = self.store.ping().await.is_ok();

        let processors: BTreeMap<String, ProcessorStats> = {
            let workers = self.workers.read().await;
            workers
                .iter()
                .map(|(ticker, handle)| (ticker.clone(), read_stats(&handle.stats)))
                .collect()
        };

        ServiceStatus {
            running: self.running.load(Ordering::SeqCst),
            process_interval_secs: self.config.process_interval.as_secs(),
            active_tickers: processors.keys().cloned().collect(),
            store_reachable,
            processors,
        }
    }
}

fn read_stats(stats: &Mutex<ProcessorStats>) -> ProcessorStats {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
}

/// Worker loop for one ticker
///
/// Cancellation is observed only while waiting for the next tick. A panicking
/// cycle is logged, counted, and its tracker state discarded; the worker keeps
/// running.
async fn run_worker(
    mut processor: TickerProcessor,
    every: Duration,
    token: CancellationToken,
    stats: Arc<Mutex<ProcessorStats>>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = AssertUnwindSafe(processor.process()).catch_unwind().await;

        let panicked = result.is_err();
        record_cycle(processor.ticker(), &stats, result);
        if panicked {
            processor.reset();
        }
    }
}

fn record_cycle(
    ticker: &str,
    stats: &Mutex<ProcessorStats>,
    result: std::thread::Result<Result<CycleOutcome, CycleError>>,
) {
    let mut stats = stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    match result {
        Ok(Ok(CycleOutcome::Processed(report))) => {
            stats.process_count += 1;
            stats.patterns_detected += report.patterns.len() as u64;
            stats.last_process_time = Some(Utc::now());
            stats.last_cycle_ms = Some(report.elapsed_ms);
        }
        Ok(Ok(CycleOutcome::NoData)) => {
            stats.no_data_count += 1;
        }
        Ok(Err(e)) => {
            stats.errors += 1;
            debug!(ticker = %ticker, transient = e.is_transient(), "Cycle skipped");
        }
        Err(_) => {
            stats.errors += 1;
            error!(ticker = %ticker, "Processing cycle panicked, resetting ticker state");
        }
    }
}

/// Periodically prune quotes older than the retention window
///
/// # Arguments
/// * `store` - Store to prune
/// * `retention` - Quotes older than this are removed
/// * `every` - Time between prunes
/// * `token` - Stops the task when cancelled
pub fn spawn_maintenance(
    store: Arc<dyn OrderFlowStore>,
    retention: Duration,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let cutoff_ms = Utc::now().timestamp_millis() - retention.as_millis() as i64;
                    match store.prune_quotes(cutoff_ms).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "Pruned expired quotes"),
                        Err(e) => warn!(error = %e, "Quote pruning failed"),
                    }
                }
            }
        }
    })
}
