//! Windowed quote metrics
//!
//! Pure functions over an ascending quote window: price momentum and tick
//! direction counts, size dynamics with half-window acceleration, first-match
//! sweep detection, and spread statistics. Nothing here suspends or touches a
//! store.

use crate::orderflow::types::{
    MomentumMetrics, Quote, Side, SizeAcceleration, SizeDynamics, SpreadMetrics, SpreadTrend,
    Sweep, SweepDirection,
};

/// Default large-order floor (shares)
pub const DEFAULT_LARGE_ORDER_SIZE: u64 = 10_000;

/// Default sweep size-delta threshold (shares)
pub const DEFAULT_SWEEP_THRESHOLD: u64 = 15_000;

/// Acceleration is only computed above this many samples
const MIN_ACCELERATION_SAMPLES: usize = 10;

/// Spread trend compares the trailing samples against everything before them
const SPREAD_TREND_RECENT: usize = 5;

/// Calculator for per-window metrics
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    pub large_order_size: u64,
    pub sweep_threshold: u64,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self {
            large_order_size: DEFAULT_LARGE_ORDER_SIZE,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

impl MetricsCalculator {
    pub fn new(large_order_size: u64, sweep_threshold: u64) -> Self {
        Self {
            large_order_size,
            sweep_threshold,
        }
    }

    /// Price movement and strict lift/drop counts between consecutive quotes
    ///
    /// Returns default (all zero) metrics for an empty window.
    pub fn momentum(&self, quotes: &[Quote]) -> MomentumMetrics {
        let (Some(first), Some(last)) = (quotes.first(), quotes.last()) else {
            return MomentumMetrics::default();
        };

        let mut metrics = MomentumMetrics {
            bid_price_movement: last.bid_price - first.bid_price,
            ask_price_movement: last.ask_price - first.ask_price,
            net_bid_size_change: size_change(first.bid_size, last.bid_size),
            net_ask_size_change: size_change(first.ask_size, last.ask_size),
            ..Default::default()
        };

        for pair in quotes.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);

            if curr.bid_price > prev.bid_price {
                metrics.bid_lift_count += 1;
            } else if curr.bid_price < prev.bid_price {
                metrics.bid_drop_count += 1;
            }

            if curr.ask_price > prev.ask_price {
                metrics.ask_lift_count += 1;
            } else if curr.ask_price < prev.ask_price {
                metrics.ask_drop_count += 1;
            }
        }

        metrics
    }

    /// Large-order counts, mean sizes, and first-half/second-half acceleration
    ///
    /// Windows of 10 samples or fewer always report STABLE on both sides.
    pub fn size_dynamics(&self, quotes: &[Quote]) -> SizeDynamics {
        if quotes.is_empty() {
            return SizeDynamics::default();
        }

        let bid_sizes: Vec<u64> = quotes.iter().map(|q| q.bid_size).collect();
        let ask_sizes: Vec<u64> = quotes.iter().map(|q| q.ask_size).collect();

        let count_large = |sizes: &[u64]| {
            sizes.iter().filter(|&&s| s > self.large_order_size).count() as u32
        };

        let mut dynamics = SizeDynamics {
            large_bids_appeared: count_large(&bid_sizes),
            large_asks_appeared: count_large(&ask_sizes),
            avg_bid_size: mean_u64(&bid_sizes) as u64,
            avg_ask_size: mean_u64(&ask_sizes) as u64,
            ..Default::default()
        };

        if quotes.len() > MIN_ACCELERATION_SAMPLES {
            dynamics.bid_size_acceleration = acceleration(&bid_sizes);
            dynamics.ask_size_acceleration = acceleration(&ask_sizes);
        }

        dynamics
    }

    /// First consecutive pair whose size delta exceeds the configured threshold
    pub fn sweep(&self, quotes: &[Quote]) -> Option<Sweep> {
        detect_sweep(quotes, self.sweep_threshold)
    }

    /// Spread statistics over samples with both prices positive
    ///
    /// Returns `None` when no sample carries a valid spread.
    pub fn spread_metrics(&self, quotes: &[Quote]) -> Option<SpreadMetrics> {
        let spreads: Vec<f64> = quotes.iter().filter_map(Quote::spread).collect();
        if spreads.is_empty() {
            return None;
        }

        let min = spreads.iter().copied().fold(f64::INFINITY, f64::min);
        let max = spreads.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let spread_trend = if spreads.len() > SPREAD_TREND_RECENT {
            let split = spreads.len() - SPREAD_TREND_RECENT;
            let older = mean_f64(&spreads[..split]);
            let recent = mean_f64(&spreads[split..]);

            if recent < older * 0.8 {
                SpreadTrend::Tightening
            } else if recent > older * 1.2 {
                SpreadTrend::Widening
            } else {
                SpreadTrend::Stable
            }
        } else {
            SpreadTrend::Stable
        };

        Some(SpreadMetrics {
            avg_spread: mean_f64(&spreads),
            min_spread: min,
            max_spread: max,
            spread_volatility: max - min,
            spread_trend,
        })
    }
}

/// Scan consecutive pairs in order and report the first size delta above `threshold`
///
/// Within a pair the bid side is checked before the ask side. Only one sweep is
/// reported per call: the earliest, not the largest.
///
/// # Arguments
/// * `quotes` - Ascending quote window
/// * `threshold` - Absolute size delta that must be exceeded
///
/// # Returns
/// The sweep priced and timestamped at the second quote of the pair, or `None`
pub fn detect_sweep(quotes: &[Quote], threshold: u64) -> Option<Sweep> {
    for pair in quotes.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        for side in Side::BOTH {
            let change = curr.size(side).abs_diff(prev.size(side));
            if change > threshold {
                let direction = if curr.price(side) > prev.price(side) {
                    SweepDirection::Lift
                } else {
                    SweepDirection::Hit
                };

                return Some(Sweep {
                    side,
                    price: curr.price(side),
                    size: change,
                    direction,
                    timestamp_ms: curr.timestamp_ms,
                });
            }
        }
    }

    None
}

fn acceleration(sizes: &[u64]) -> SizeAcceleration {
    let mid = sizes.len() / 2;
    let first_half = mean_u64(&sizes[..mid]);
    let second_half = mean_u64(&sizes[mid..]);

    let ratio = if first_half > 0.0 {
        second_half / first_half
    } else {
        1.0
    };

    SizeAcceleration::from_ratio(ratio)
}

/// Signed `to - from`, saturating at the i64 bounds
fn size_change(from: u64, to: u64) -> i64 {
    let from = i64::try_from(from).unwrap_or(i64::MAX);
    let to = i64::try_from(to).unwrap_or(i64::MAX);
    to.saturating_sub(from)
}

pub(crate) fn saturating_sum(values: &[u64]) -> u64 {
    values.iter().fold(0u64, |acc, &v| acc.saturating_add(v))
}

pub(crate) fn mean_u64(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(ts: i64, bid: f64, ask: f64, bid_size: u64, ask_size: u64) -> Quote {
        Quote::new("SPY", ts, bid, ask, bid_size, ask_size)
    }

    fn sized(bid_sizes: &[u64]) -> Vec<Quote> {
        bid_sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| quote(i as i64 * 100, 100.0, 100.01, s, 1000))
            .collect()
    }

    #[test]
    fn test_momentum_counts_strict_moves() {
        let quotes = vec![
            quote(0, 100.00, 100.02, 1000, 1000),
            quote(1, 100.01, 100.02, 1200, 900),
            quote(2, 100.01, 100.03, 1500, 800),
            quote(3, 100.00, 100.01, 500, 1100),
        ];
        let m = MetricsCalculator::default().momentum(&quotes);

        assert_eq!(m.bid_lift_count, 1);
        assert_eq!(m.bid_drop_count, 1);
        assert_eq!(m.ask_lift_count, 1);
        assert_eq!(m.ask_drop_count, 1);
        assert_eq!(m.net_bid_size_change, -500);
        assert_eq!(m.net_ask_size_change, 100);
        assert!(m.bid_price_movement.abs() < 1e-9);
    }

    #[test]
    fn test_momentum_huge_sizes_saturate() {
        let quotes = vec![
            quote(0, 100.00, 100.02, 0, u64::MAX),
            quote(1, 100.00, 100.02, u64::MAX, 0),
        ];
        let m = MetricsCalculator::default().momentum(&quotes);

        assert_eq!(m.net_bid_size_change, i64::MAX);
        assert_eq!(m.net_ask_size_change, -i64::MAX);
        assert_eq!(saturating_sum(&[u64::MAX, u64::MAX]), u64::MAX);
    }

    #[test]
    fn test_momentum_empty_window() {
        assert_eq!(
            MetricsCalculator::default().momentum(&[]),
            MomentumMetrics::default()
        );
    }

    #[test]
    fn test_acceleration_increasing_when_second_half_doubles() {
        let quotes = sized(&[
            5000, 5000, 5000, 5000, 5000, 10000, 10000, 10000, 10000, 10000, 10000,
        ]);
        let dynamics = MetricsCalculator::default().size_dynamics(&quotes);

        assert_eq!(dynamics.bid_size_acceleration, SizeAcceleration::Increasing);
        assert_eq!(dynamics.ask_size_acceleration, SizeAcceleration::Stable);
    }

    #[test]
    fn test_acceleration_stable_at_ten_samples() {
        let quotes = sized(&[1, 1, 1, 1, 1, 90_000, 90_000, 90_000, 90_000, 90_000]);
        let dynamics = MetricsCalculator::default().size_dynamics(&quotes);

        assert_eq!(dynamics.bid_size_acceleration, SizeAcceleration::Stable);
        assert_eq!(dynamics.large_bids_appeared, 5);
    }

    #[test]
    fn test_acceleration_zero_first_half_is_stable() {
        let quotes = sized(&[0, 0, 0, 0, 0, 8000, 8000, 8000, 8000, 8000, 8000]);
        let dynamics = MetricsCalculator::default().size_dynamics(&quotes);

        assert_eq!(dynamics.bid_size_acceleration, SizeAcceleration::Stable);
    }

    #[test]
    fn test_average_size_truncates() {
        let quotes = sized(&[1000, 1001]);
        let dynamics = MetricsCalculator::default().size_dynamics(&quotes);

        assert_eq!(dynamics.avg_bid_size, 1000);
    }

    #[test]
    fn test_sweep_first_match_wins() {
        let quotes = sized(&[1000, 20000, 1000, 40000]);
        let sweep = detect_sweep(&quotes, 15_000).unwrap();

        assert_eq!(sweep.side, Side::Bid);
        assert_eq!(sweep.size, 19_000);
        assert_eq!(sweep.timestamp_ms, 100);
        assert_eq!(sweep.direction, SweepDirection::Hit);
    }

    #[test]
    fn test_sweep_checks_ask_and_direction() {
        let quotes = vec![
            quote(0, 100.00, 100.02, 1000, 1000),
            quote(1, 100.00, 100.03, 1000, 30_000),
        ];
        let sweep = detect_sweep(&quotes, 15_000).unwrap();

        assert_eq!(sweep.side, Side::Ask);
        assert_eq!(sweep.direction, SweepDirection::Lift);
        assert_eq!(sweep.price, 100.03);
    }

    #[test]
    fn test_sweep_requires_strictly_greater_delta() {
        let quotes = sized(&[1000, 16_000]);
        assert!(detect_sweep(&quotes, 15_000).is_none());
        assert!(detect_sweep(&quotes[..1], 15_000).is_none());
    }

    #[test]
    fn test_spread_metrics_trend() {
        let mut quotes: Vec<Quote> = (0..5)
            .map(|i| quote(i, 100.0, 100.10, 1000, 1000))
            .collect();
        quotes.extend((5..10).map(|i| quote(i, 100.0, 100.02, 1000, 1000)));

        let spread = MetricsCalculator::default().spread_metrics(&quotes).unwrap();
        assert_eq!(spread.spread_trend, SpreadTrend::Tightening);
        assert!((spread.max_spread - 0.10).abs() < 1e-9);
        assert!((spread.spread_volatility - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_spread_metrics_widening() {
        let mut quotes: Vec<Quote> = (0..5)
            .map(|i| quote(i, 100.0, 100.02, 1000, 1000))
            .collect();
        quotes.extend((5..10).map(|i| quote(i, 100.0, 100.10, 1000, 1000)));

        let spread = MetricsCalculator::default().spread_metrics(&quotes).unwrap();
        assert_eq!(spread.spread_trend, SpreadTrend::Widening);
        assert!((spread.min_spread - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_spread_metrics_needs_six_for_trend() {
        let quotes: Vec<Quote> = (0..5)
            .map(|i| quote(i, 100.0, 100.0 + 0.01 * (i + 1) as f64, 1000, 1000))
            .collect();
        let spread = MetricsCalculator::default().spread_metrics(&quotes).unwrap();
        assert_eq!(spread.spread_trend, SpreadTrend::Stable);
    }

    #[test]
    fn test_spread_metrics_skips_invalid_prices() {
        let quotes = vec![quote(0, 0.0, 100.0, 1000, 1000)];
        assert!(MetricsCalculator::default().spread_metrics(&quotes).is_none());
    }
}
