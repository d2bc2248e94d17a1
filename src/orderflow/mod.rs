//! Order flow analytics engine
//!
//! Pure calculators ([`metrics`], [`patterns`], [`behavior`]), the stateful
//! [`levels`] tracker, and the per-ticker [`processor`] that ties them to a
//! store.

pub mod behavior;
pub mod levels;
pub mod metrics;
pub mod patterns;
pub mod processor;
pub mod types;
pub mod units;

pub use behavior::BehaviorAnalyzer;
pub use levels::PriceLevelTracker;
pub use metrics::MetricsCalculator;
pub use patterns::PatternDetector;
pub use processor::{CycleOutcome, CycleReport, CycleSettings, TickerProcessor};
pub use types::{
    BehaviorFlags, Pattern, PatternKind, PriceLevelSnapshot, Quote, Side, SignificantLevels,
    WindowLabel, WindowMetrics,
};
