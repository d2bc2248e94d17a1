//! YES/NO market behavior flags over a short window

use crate::orderflow::metrics::mean_f64;
use crate::orderflow::types::{
    BehaviorFlags, MomentumMetrics, Quote, Signal, SizeAcceleration, SizeDynamics,
};

/// Below this many samples every flag is NO
pub const MIN_BEHAVIOR_SAMPLES: usize = 5;

const TAIL: usize = 5;
const STACKING_MIN_SIZE: u64 = 3_000;
const STACKING_MIN_GROWTH: f64 = 1.3;
const PULLING_MIN_REDUCTION: f64 = 0.3;
const SPREAD_RECENT: usize = 3;
const MOMENTUM_IMBALANCE: f64 = 1.5;
const MOMENTUM_MIN_MOVEMENT: f64 = 0.02;
const AGGRESSION_LARGE_ORDERS: u32 = 3;
const AGGRESSION_MIN_MOVEMENT: f64 = 0.05;
const AGGRESSION_MIN_INDICATORS: usize = 2;

/// Stateless behavior analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorAnalyzer;

impl BehaviorAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Derive all six flags from a window and the metrics computed over it
    pub fn analyze(
        &self,
        quotes: &[Quote],
        momentum: &MomentumMetrics,
        size: &SizeDynamics,
    ) -> BehaviorFlags {
        if quotes.len() < MIN_BEHAVIOR_SAMPLES {
            return BehaviorFlags::default();
        }

        let tail = &quotes[quotes.len() - TAIL..];

        BehaviorFlags {
            bid_stacking: bid_stacking(tail).into(),
            ask_pulling: ask_pulling(tail).into(),
            spread_tightening: spread_tightening(quotes).into(),
            momentum_building: momentum_building(momentum, size).into(),
            aggressive_buying: aggressive_buying(momentum, size),
            aggressive_selling: aggressive_selling(momentum, size),
        }
    }
}

fn bid_stacking(tail: &[Quote]) -> bool {
    let sizes: Vec<u64> = tail.iter().map(|q| q.bid_size).collect();
    let non_decreasing = sizes.windows(2).all(|w| w[0] <= w[1]);
    let all_significant = sizes.iter().all(|&s| s > STACKING_MIN_SIZE);
    let growth = ratio(sizes[sizes.len() - 1], sizes[0]);

    non_decreasing && all_significant && growth > STACKING_MIN_GROWTH
}

fn ask_pulling(tail: &[Quote]) -> bool {
    let sizes: Vec<u64> = tail.iter().map(|q| q.ask_size).collect();
    let non_increasing = sizes.windows(2).all(|w| w[0] >= w[1]);
    let reduction = if sizes[0] > 0 {
        1.0 - ratio(sizes[sizes.len() - 1], sizes[0])
    } else {
        0.0
    };

    non_increasing && reduction > PULLING_MIN_REDUCTION
}

fn spread_tightening(quotes: &[Quote]) -> bool {
    let spreads: Vec<f64> = quotes.iter().filter_map(Quote::spread).collect();
    if spreads.len() < SPREAD_RECENT {
        return false;
    }

    let split = spreads.len() - SPREAD_RECENT;
    let recent = mean_f64(&spreads[split..]);
    let older = if split > 0 {
        mean_f64(&spreads[..split])
    } else {
        spreads[0]
    };

    older > 0.0 && recent < older * 0.8
}

fn momentum_building(momentum: &MomentumMetrics, size: &SizeDynamics) -> bool {
    let lifts = momentum.bid_lift_count as f64;
    let drops = momentum.bid_drop_count as f64;
    let moved = momentum.bid_price_movement.abs() > MOMENTUM_MIN_MOVEMENT;

    let imbalanced = lifts > drops * MOMENTUM_IMBALANCE || drops > lifts * MOMENTUM_IMBALANCE;

    (imbalanced && moved)
        || size.bid_size_acceleration == SizeAcceleration::Increasing
        || size.ask_size_acceleration == SizeAcceleration::Decreasing
}

fn aggressive_buying(momentum: &MomentumMetrics, size: &SizeDynamics) -> Signal {
    score([
        momentum.ask_lift_count > momentum.ask_drop_count * 2,
        size.large_bids_appeared > AGGRESSION_LARGE_ORDERS,
        size.bid_size_acceleration == SizeAcceleration::Increasing,
        momentum.bid_price_movement > AGGRESSION_MIN_MOVEMENT,
    ])
}

fn aggressive_selling(momentum: &MomentumMetrics, size: &SizeDynamics) -> Signal {
    score([
        momentum.bid_drop_count > momentum.bid_lift_count * 2,
        size.large_asks_appeared > AGGRESSION_LARGE_ORDERS,
        size.ask_size_acceleration == SizeAcceleration::Increasing,
        momentum.bid_price_movement < -AGGRESSION_MIN_MOVEMENT,
    ])
}

fn score(indicators: [bool; 4]) -> Signal {
    (indicators.iter().filter(|&&fired| fired).count() >= AGGRESSION_MIN_INDICATORS).into()
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}
