//! Engine Configuration
//!
//! Cycle cadence, thresholds, and store settings loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::orderflow::CycleSettings;
use crate::storage::{DEFAULT_PATTERN_TTL_SECS, DEFAULT_QUOTE_RETENTION_SECS};

/// Order flow engine configuration
///
/// ## Environment Variables
///
/// - `PROCESSOR_INTERVAL`: Cycle cadence per ticker in seconds (default: 1)
/// - `ORDERFLOW_DATA_PATH`: RocksDB directory (default: ./data/orderflow)
/// - `ORDERFLOW_LATENCY_BUDGET_MS`: Soft cycle latency budget (default: 100)
/// - `ORDERFLOW_MIN_5MIN_SAMPLES`: 5min window needs more samples than this (default: 100)
/// - `ORDERFLOW_SIGNIFICANCE_FLOOR`: Price level size floor (default: 5000)
/// - `ORDERFLOW_LARGE_ORDER_SIZE`: Large-order floor (default: 10000)
/// - `ORDERFLOW_SWEEP_THRESHOLD`: Sweep size-delta threshold (default: 15000)
/// - `ORDERFLOW_PATTERN_TTL_SECS`: Pattern retention (default: 3600)
/// - `ORDERFLOW_QUOTE_RETENTION_SECS`: Quote retention (default: 600)
/// - `ORDERFLOW_TICKERS`: Comma-separated tickers registered at startup (default: none)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between cycle starts for one ticker
    pub process_interval: Duration,

    /// RocksDB data directory
    pub data_path: PathBuf,

    /// Per-cycle thresholds
    pub cycle: CycleSettings,

    pub pattern_ttl_secs: u64,
    pub quote_retention_secs: u64,

    /// Tickers to start workers for before any quote arrives
    pub tickers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(1),
            data_path: PathBuf::from("./data/orderflow"),
            cycle: CycleSettings::default(),
            pattern_ttl_secs: DEFAULT_PATTERN_TTL_SECS,
            quote_retention_secs: DEFAULT_QUOTE_RETENTION_SECS,
            tickers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the variable when a value fails to parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let cycle = &defaults.cycle;

        let interval_secs: u64 = parse_var(&lookup, "PROCESSOR_INTERVAL", 1)?;
        if interval_secs == 0 {
            return Err(EngineError::Config(
                "PROCESSOR_INTERVAL must be at least 1 second".to_string(),
            ));
        }

        let tickers = lookup("ORDERFLOW_TICKERS")
            .map(|raw| parse_tickers(&raw))
            .unwrap_or_default();

        Ok(Self {
            process_interval: Duration::from_secs(interval_secs),
            data_path: lookup("ORDERFLOW_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path.clone()),
            cycle: CycleSettings {
                latency_budget_ms: parse_var(
                    &lookup,
                    "ORDERFLOW_LATENCY_BUDGET_MS",
                    cycle.latency_budget_ms,
                )?,
                min_5min_samples: parse_var(
                    &lookup,
                    "ORDERFLOW_MIN_5MIN_SAMPLES",
                    cycle.min_5min_samples,
                )?,
                large_order_size: parse_var(
                    &lookup,
                    "ORDERFLOW_LARGE_ORDER_SIZE",
                    cycle.large_order_size,
                )?,
                sweep_threshold: parse_var(
                    &lookup,
                    "ORDERFLOW_SWEEP_THRESHOLD",
                    cycle.sweep_threshold,
                )?,
                significance_floor: parse_var(
                    &lookup,
                    "ORDERFLOW_SIGNIFICANCE_FLOOR",
                    cycle.significance_floor,
                )?,
            },
            pattern_ttl_secs: parse_var(
                &lookup,
                "ORDERFLOW_PATTERN_TTL_SECS",
                defaults.pattern_ttl_secs,
            )?,
            quote_retention_secs: parse_var(
                &lookup,
                "ORDERFLOW_QUOTE_RETENTION_SECS",
                defaults.quote_retention_secs,
            )?,
            tickers,
        })
    }
}

/// Split a comma list into trimmed, upper-cased, de-duplicated tickers
pub fn parse_tickers(raw: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for ticker in raw.split(',').map(|t| t.trim().to_uppercase()) {
        if !ticker.is_empty() && !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }
    tickers
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| EngineError::Config(format!("{}={:?}: {}", name, raw, e))),
        _ => Ok(default),
    }
}
