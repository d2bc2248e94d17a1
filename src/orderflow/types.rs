//! Core data types for order flow analytics
//!
//! This module defines the quote input record, the per-window metric snapshot,
//! the detected pattern variants, and the significant price level snapshot.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::units::{deserialize_epoch_millis, normalize_epoch_millis};

// ============================================================================
// Input
// ============================================================================

/// Top-of-book quote sample for a ticker
///
/// Sizes are whole shares/contracts. Negative or non-finite values coming from
/// upstream are clamped to zero on decode (see [`RawQuote`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawQuote")]
pub struct Quote {
    pub ticker: String,

    /// Milliseconds since epoch
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,

    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: u64,
    pub ask_size: u64,
}

impl Quote {
    pub fn new(
        ticker: impl Into<String>,
        timestamp_ms: i64,
        bid_price: f64,
        ask_price: f64,
        bid_size: u64,
        ask_size: u64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            timestamp_ms,
            bid_price,
            ask_price,
            bid_size,
            ask_size,
        }
    }

    /// Ask minus bid, only when both sides carry a positive price
    pub fn spread(&self) -> Option<f64> {
        (self.bid_price > 0.0 && self.ask_price > 0.0).then(|| self.ask_price - self.bid_price)
    }

    pub fn price(&self, side: Side) -> f64 {
        match side {
            Side::Bid => self.bid_price,
            Side::Ask => self.ask_price,
        }
    }

    pub fn size(&self, side: Side) -> u64 {
        match side {
            Side::Bid => self.bid_size,
            Side::Ask => self.ask_size,
        }
    }
}

/// Wire shape accepted from stores and the ingest endpoint
///
/// Every numeric field is read leniently (integers or floats) and the field
/// name `timestamp_ms` is accepted as an alias of `timestamp`. The timestamp
/// may be in seconds or milliseconds.
#[derive(Debug, Deserialize)]
pub struct RawQuote {
    #[serde(default)]
    ticker: String,
    #[serde(alias = "timestamp_ms")]
    timestamp: f64,
    #[serde(default)]
    bid_price: f64,
    #[serde(default)]
    ask_price: f64,
    #[serde(default)]
    bid_size: f64,
    #[serde(default)]
    ask_size: f64,
}

impl From<RawQuote> for Quote {
    fn from(raw: RawQuote) -> Self {
        let clamped = [raw.bid_price, raw.ask_price, raw.bid_size, raw.ask_size]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0);

        if clamped {
            tracing::warn!(
                ticker = %raw.ticker,
                timestamp = raw.timestamp,
                "Quote carried negative or non-finite values, clamping to zero"
            );
        }

        Self {
            ticker: raw.ticker,
            timestamp_ms: normalize_epoch_millis(raw.timestamp),
            bid_price: non_negative(raw.bid_price),
            ask_price: non_negative(raw.ask_price),
            bid_size: non_negative(raw.bid_size) as u64,
            ask_size: non_negative(raw.ask_size) as u64,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ============================================================================
// Supporting Enums
// ============================================================================

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Bid, Side::Ask];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trailing window a metric snapshot was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum WindowLabel {
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
}

impl WindowLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::TenSeconds => "10s",
            WindowLabel::OneMinute => "1min",
            WindowLabel::FiveMinutes => "5min",
        }
    }

    /// Window length in seconds
    pub fn seconds(&self) -> u64 {
        match self {
            WindowLabel::TenSeconds => 10,
            WindowLabel::OneMinute => 60,
            WindowLabel::FiveMinutes => 300,
        }
    }

    /// Expiry handed to the store with each snapshot
    pub fn metrics_ttl_secs(&self) -> u64 {
        match self {
            WindowLabel::TenSeconds => 60,
            WindowLabel::OneMinute => 300,
            WindowLabel::FiveMinutes => 600,
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10s" => Ok(WindowLabel::TenSeconds),
            "1min" | "60s" => Ok(WindowLabel::OneMinute),
            "5min" | "300s" => Ok(WindowLabel::FiveMinutes),
            other => Err(format!("unknown window label: {}", other)),
        }
    }
}

/// Size acceleration between the first and second half of a window
///
/// Thresholds (second-half avg / first-half avg):
/// - INCREASING: ratio > 1.2
/// - DECREASING: ratio < 0.8
/// - STABLE: otherwise, or fewer than 11 samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeAcceleration {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl SizeAcceleration {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.2 {
            Self::Increasing
        } else if ratio < 0.8 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

/// Direction of the spread over the recent samples of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadTrend {
    Tightening,
    Widening,
    #[default]
    Stable,
}

/// YES/NO behavior flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Yes,
    #[default]
    No,
}

impl From<bool> for Signal {
    fn from(value: bool) -> Self {
        if value {
            Signal::Yes
        } else {
            Signal::No
        }
    }
}

/// Pattern strength classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
}

/// Momentum shift direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MomentumDirection {
    Bullish,
    Bearish,
}

/// Sweep direction: `lift` when the swept side's price rose, otherwise `hit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SweepDirection {
    Lift,
    Hit,
}

// ============================================================================
// Window Metrics
// ============================================================================

/// Price movement and tick-direction counts over a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MomentumMetrics {
    /// Last bid price minus first bid price
    pub bid_price_movement: f64,
    /// Last ask price minus first ask price
    pub ask_price_movement: f64,
    pub bid_lift_count: u32,
    pub bid_drop_count: u32,
    pub ask_lift_count: u32,
    pub ask_drop_count: u32,
    /// Last bid size minus first bid size
    pub net_bid_size_change: i64,
    /// Last ask size minus first ask size
    pub net_ask_size_change: i64,
}

/// Size dynamics over a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SizeDynamics {
    /// Samples whose bid size exceeded the large-order floor
    pub large_bids_appeared: u32,
    /// Samples whose ask size exceeded the large-order floor
    pub large_asks_appeared: u32,
    /// Mean bid size, truncated
    pub avg_bid_size: u64,
    /// Mean ask size, truncated
    pub avg_ask_size: u64,
    pub bid_size_acceleration: SizeAcceleration,
    pub ask_size_acceleration: SizeAcceleration,
}

/// Spread statistics over the samples where both prices are positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpreadMetrics {
    pub avg_spread: f64,
    pub min_spread: f64,
    pub max_spread: f64,
    /// max - min
    pub spread_volatility: f64,
    pub spread_trend: SpreadTrend,
}

/// First large size change found in a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sweep {
    pub side: Side,
    /// Price on the swept side after the change
    pub price: f64,
    /// Absolute size delta
    pub size: u64,
    pub direction: SweepDirection,

    /// Timestamp of the quote that completed the pair (milliseconds)
    #[serde(rename = "timestamp", deserialize_with = "deserialize_epoch_millis")]
    #[schemars(with = "i64")]
    pub timestamp_ms: i64,
}

/// YES/NO market behavior flags derived from a short window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BehaviorFlags {
    pub bid_stacking: Signal,
    pub ask_pulling: Signal,
    pub spread_tightening: Signal,
    pub momentum_building: Signal,
    pub aggressive_buying: Signal,
    pub aggressive_selling: Signal,
}

/// Immutable metric snapshot for one (ticker, window)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowMetrics {
    pub ticker: String,
    pub window: WindowLabel,

    /// When the snapshot was computed (milliseconds)
    pub computed_at_ms: i64,

    /// Number of quotes in the window
    pub sample_count: usize,

    pub momentum: MomentumMetrics,
    pub size: SizeDynamics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<SpreadMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sweep: Option<Sweep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behaviors: Option<BehaviorFlags>,
}

// ============================================================================
// Patterns
// ============================================================================

/// Detected order flow pattern
///
/// Created once per detection and never mutated. `timestamp` is read in either
/// seconds or milliseconds and always held in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pattern {
    pub kind: PatternKind,

    /// Detection time (milliseconds since epoch)
    #[serde(rename = "timestamp", deserialize_with = "deserialize_epoch_millis")]
    #[schemars(with = "i64")]
    pub timestamp_ms: i64,

    pub description: String,
}

impl Pattern {
    pub fn new(kind: PatternKind, timestamp_ms: i64, description: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp_ms,
            description: description.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Pattern variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    /// Sustained large size at a stable price
    Absorption {
        side: Side,
        /// Mean price of the absorbing side over the window
        price_level: f64,
        avg_size: f64,
        max_size: u64,
        strength: Strength,
    },
    /// Growing wall on one side over the last samples
    Stacking {
        side: Side,
        levels: u32,
        total_size: u64,
        /// last size / first size
        growth_rate: f64,
    },
    /// Lift/drop imbalance over the window
    MomentumShift {
        direction: MomentumDirection,
        strength: Strength,
        /// dominant count / minority count (or the dominant count when the minority is zero)
        ratio: f64,
    },
    /// Repeated replenishment at one bid price
    Iceberg {
        side: Side,
        price: f64,
        refill_count: u32,
        avg_size: f64,
        total_volume: u64,
    },
    /// Large size change between two consecutive quotes
    Sweep {
        side: Side,
        price: f64,
        size: u64,
        direction: SweepDirection,
    },
}

impl PatternKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PatternKind::Absorption { .. } => "absorption",
            PatternKind::Stacking { .. } => "stacking",
            PatternKind::MomentumShift { .. } => "momentum_shift",
            PatternKind::Iceberg { .. } => "iceberg",
            PatternKind::Sweep { .. } => "sweep",
        }
    }
}

impl From<&Sweep> for Pattern {
    fn from(sweep: &Sweep) -> Self {
        let description = format!(
            "{} sweep ({}) of {} at {:.2}",
            match sweep.side {
                Side::Bid => "Bid",
                Side::Ask => "Ask",
            },
            match sweep.direction {
                SweepDirection::Lift => "lift",
                SweepDirection::Hit => "hit",
            },
            sweep.size,
            sweep.price
        );

        Pattern::new(
            PatternKind::Sweep {
                side: sweep.side,
                price: sweep.price,
                size: sweep.size,
                direction: sweep.direction,
            },
            sweep.timestamp_ms,
            description,
        )
    }
}

// ============================================================================
// Price Levels
// ============================================================================

/// Read-only export of a significant price level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriceLevelSnapshot {
    pub price: f64,

    /// Number of samples the level was observed above the significance floor
    #[schemars(range(min = 1))]
    pub appearances: u32,

    pub total_size: u64,

    /// total_size / appearances
    pub avg_size: f64,

    /// Wall-clock seconds of the latest observation
    pub last_seen: f64,
}

impl PriceLevelSnapshot {
    /// Ranking score used by stores: total_size × appearances
    pub fn score(&self) -> f64 {
        self.total_size as f64 * self.appearances as f64
    }
}

/// Significant levels per side, best score first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignificantLevels {
    pub bid: Vec<PriceLevelSnapshot>,
    pub ask: Vec<PriceLevelSnapshot>,
}

impl SignificantLevels {
    pub fn side_mut(&mut self, side: Side) -> &mut Vec<PriceLevelSnapshot> {
        match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        }
    }
}
