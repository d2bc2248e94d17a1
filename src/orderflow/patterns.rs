//! Pattern detection over a quote window
//!
//! Each detector is evaluated independently and returns at most one pattern.
//! Results are concatenated in a fixed order: absorption, stacking, momentum
//! shift, iceberg. Sweep detection lives in [`crate::orderflow::metrics`].

use rust_decimal::Decimal;

use crate::orderflow::levels::price_key;
use crate::orderflow::metrics::{mean_u64, saturating_sum};
use crate::orderflow::types::{
    MomentumDirection, MomentumMetrics, Pattern, PatternKind, Quote, Side, Strength,
};

/// Sub-window length for absorption
const ABSORPTION_WINDOW: usize = 10;
/// Both price ranges must stay below this for the window to count as stable
const ABSORPTION_MAX_RANGE: f64 = 0.02;
const ABSORPTION_MIN_AVG: f64 = 8_000.0;
const ABSORPTION_MIN_PEAK: u64 = 15_000;
const ABSORPTION_STRONG_AVG: f64 = 12_000.0;

const STACKING_WINDOW: usize = 5;
const STACKING_MIN_SIZE: u64 = 5_000;
const STACKING_MIN_GROWTH: f64 = 1.5;

const MOMENTUM_MIN_MOVES: u32 = 10;

const ICEBERG_MIN_QUOTES: usize = 10;
const ICEBERG_LOOKBACK: usize = 20;
const ICEBERG_MIN_SIZE: u64 = 5_000;
const ICEBERG_MIN_REFILLS: usize = 5;
const ICEBERG_MIN_AVG: f64 = 7_000.0;

/// Stateless pattern detector
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// Run every detector and concatenate their results
    ///
    /// # Arguments
    /// * `quotes` - Ascending quote window
    /// * `momentum` - Momentum metrics computed over the same window
    /// * `now_ms` - Detection time stamped on every returned pattern
    pub fn detect(&self, quotes: &[Quote], momentum: &MomentumMetrics, now_ms: i64) -> Vec<Pattern> {
        [
            detect_absorption(quotes, now_ms),
            detect_stacking(quotes, now_ms),
            detect_momentum_shift(momentum, now_ms),
            detect_iceberg(quotes, now_ms),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Earliest stable 10-sample window with sustained large size on one side
///
/// Every full window is scanned, oldest first. Within a window the bid side is
/// checked before the ask side.
pub fn detect_absorption(quotes: &[Quote], now_ms: i64) -> Option<Pattern> {
    if quotes.len() < ABSORPTION_WINDOW {
        return None;
    }

    for window in quotes.windows(ABSORPTION_WINDOW) {
        if price_range(window, Side::Bid) >= ABSORPTION_MAX_RANGE
            || price_range(window, Side::Ask) >= ABSORPTION_MAX_RANGE
        {
            continue;
        }

        for side in Side::BOTH {
            let sizes: Vec<u64> = window.iter().map(|q| q.size(side)).collect();
            let avg_size = mean_u64(&sizes);
            let max_size = sizes.iter().copied().max().unwrap_or(0);

            if avg_size > ABSORPTION_MIN_AVG && max_size > ABSORPTION_MIN_PEAK {
                let prices: Vec<f64> = window.iter().map(|q| q.price(side)).collect();
                let price_level = prices.iter().sum::<f64>() / prices.len() as f64;
                let last_price = prices.last().copied().unwrap_or(price_level);

                let strength = if avg_size > ABSORPTION_STRONG_AVG {
                    Strength::Strong
                } else {
                    Strength::Moderate
                };

                return Some(Pattern::new(
                    PatternKind::Absorption {
                        side,
                        price_level,
                        avg_size,
                        max_size,
                        strength,
                    },
                    now_ms,
                    format!(
                        "{} absorption at {:.2} with avg size {:.0}",
                        side_title(side),
                        last_price,
                        avg_size
                    ),
                ));
            }
        }
    }

    None
}

/// Growing wall over the last 5 quotes, bid side first
pub fn detect_stacking(quotes: &[Quote], now_ms: i64) -> Option<Pattern> {
    if quotes.len() < STACKING_WINDOW {
        return None;
    }

    let recent = &quotes[quotes.len() - STACKING_WINDOW..];

    for side in Side::BOTH {
        let sizes: Vec<u64> = recent.iter().map(|q| q.size(side)).collect();
        let first = sizes[0];
        let last = sizes[sizes.len() - 1];

        if sizes.iter().all(|&s| s > STACKING_MIN_SIZE)
            && last as f64 > first as f64 * STACKING_MIN_GROWTH
        {
            let total_size = saturating_sum(&sizes);
            let levels = sizes.iter().filter(|&&s| s > STACKING_MIN_SIZE).count() as u32;

            return Some(Pattern::new(
                PatternKind::Stacking {
                    side,
                    levels,
                    total_size,
                    growth_rate: last as f64 / first as f64,
                },
                now_ms,
                format!(
                    "{} stacking detected with {} total size",
                    side_title(side),
                    total_size
                ),
            ));
        }
    }

    None
}

/// Lift/drop imbalance on the bid side
///
/// Requires at least 10 combined lifts and drops. A side dominates when it
/// exceeds twice the other; three times is strong.
pub fn detect_momentum_shift(momentum: &MomentumMetrics, now_ms: i64) -> Option<Pattern> {
    let lifts = momentum.bid_lift_count;
    let drops = momentum.bid_drop_count;

    if lifts + drops < MOMENTUM_MIN_MOVES {
        return None;
    }

    let (direction, dominant, minority, description) = if lifts > drops * 2 {
        (
            MomentumDirection::Bullish,
            lifts,
            drops,
            format!("Bullish momentum: {} lifts vs {} drops", lifts, drops),
        )
    } else if drops > lifts * 2 {
        (
            MomentumDirection::Bearish,
            drops,
            lifts,
            format!("Bearish momentum: {} drops vs {} lifts", drops, lifts),
        )
    } else {
        return None;
    };

    let strength = if dominant > minority * 3 {
        Strength::Strong
    } else {
        Strength::Moderate
    };

    let ratio = if minority > 0 {
        dominant as f64 / minority as f64
    } else {
        dominant as f64
    };

    Some(Pattern::new(
        PatternKind::MomentumShift {
            direction,
            strength,
            ratio,
        },
        now_ms,
        description,
    ))
}

/// Repeated large bid size at one exact price within the last 20 quotes
///
/// Prices are grouped in first-seen order; the first qualifying price wins.
pub fn detect_iceberg(quotes: &[Quote], now_ms: i64) -> Option<Pattern> {
    if quotes.len() < ICEBERG_MIN_QUOTES {
        return None;
    }

    let start = quotes.len().saturating_sub(ICEBERG_LOOKBACK);
    let mut groups: Vec<(Decimal, f64, Vec<u64>)> = Vec::new();

    for quote in &quotes[start..] {
        if quote.bid_size <= ICEBERG_MIN_SIZE {
            continue;
        }
        let Some(key) = price_key(quote.bid_price) else {
            continue;
        };

        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, sizes)) => sizes.push(quote.bid_size),
            None => groups.push((key, quote.bid_price, vec![quote.bid_size])),
        }
    }

    groups.into_iter().find_map(|(_, price, sizes)| {
        let avg_size = mean_u64(&sizes);
        if sizes.len() < ICEBERG_MIN_REFILLS || avg_size <= ICEBERG_MIN_AVG {
            return None;
        }

        let refill_count = sizes.len() as u32;
        Some(Pattern::new(
            PatternKind::Iceberg {
                side: Side::Bid,
                price,
                refill_count,
                avg_size,
                total_volume: saturating_sum(&sizes),
            },
            now_ms,
            format!(
                "Iceberg order detected at {:.2} with {} refills",
                price, refill_count
            ),
        ))
    })
}

fn price_range(window: &[Quote], side: Side) -> f64 {
    let (min, max) = window.iter().map(|q| q.price(side)).fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), p| (lo.min(p), hi.max(p)),
    );
    max - min
}

fn side_title(side: Side) -> &'static str {
    match side {
        Side::Bid => "Bid",
        Side::Ask => "Ask",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn quote(i: i64, bid: f64, bid_size: u64, ask_size: u64) -> Quote {
        Quote::new("AAPL", NOW - 60_000 + i * 100, bid, bid + 0.01, bid_size, ask_size)
    }

    #[test]
    fn test_absorption_on_stable_bid() {
        let quotes: Vec<Quote> = (0..10)
            .map(|i| {
                let size = if i == 4 { 20_000 } else { 12_500 };
                quote(i, 150.00, size, 1000)
            })
            .collect();

        let pattern = detect_absorption(&quotes, NOW).unwrap();
        match pattern.kind {
            PatternKind::Absorption {
                side,
                max_size,
                strength,
                ..
            } => {
                assert_eq!(side, Side::Bid);
                assert_eq!(max_size, 20_000);
                assert_eq!(strength, Strength::Strong);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
        assert_eq!(pattern.timestamp_ms, NOW);
    }

    #[test]
    fn test_absorption_scans_final_window() {
        // Only the window ending at the last quote qualifies
        let mut quotes: Vec<Quote> = (0..10).map(|i| quote(i, 150.00, 9000, 1000)).collect();
        quotes.push(quote(10, 150.00, 16_000, 1000));
        quotes[0].bid_price = 149.90;
        quotes[0].ask_price = 149.91;

        let pattern = detect_absorption(&quotes, NOW).unwrap();
        assert!(matches!(
            pattern.kind,
            PatternKind::Absorption {
                strength: Strength::Moderate,
                ..
            }
        ));
    }

    #[test]
    fn test_absorption_earliest_window_wins() {
        // First window: moderate ask absorption. Last window: strong bid absorption.
        let mut quotes: Vec<Quote> = (0..10)
            .map(|i| {
                let ask_size = if i == 3 { 16_000 } else { 9000 };
                quote(i, 150.00, 1000, ask_size)
            })
            .collect();
        quotes.extend((10..20).map(|i| {
            let bid_size = if i == 15 { 20_000 } else { 13_000 };
            quote(i, 150.00, bid_size, 1000)
        }));

        let pattern = detect_absorption(&quotes, NOW).unwrap();
        match pattern.kind {
            PatternKind::Absorption {
                side,
                price_level,
                max_size,
                strength,
                ..
            } => {
                assert_eq!(side, Side::Ask);
                assert!((price_level - 150.01).abs() < 1e-9);
                assert_eq!(max_size, 16_000);
                assert_eq!(strength, Strength::Moderate);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
        assert!(pattern.description.starts_with("Ask absorption at 150.01"));

        let later = detect_absorption(&quotes[10..], NOW).unwrap();
        assert!(matches!(
            later.kind,
            PatternKind::Absorption {
                side: Side::Bid,
                strength: Strength::Strong,
                ..
            }
        ));
    }

    #[test]
    fn test_absorption_rejects_moving_price() {
        let quotes: Vec<Quote> = (0..10)
            .map(|i| quote(i, 150.00 + 0.01 * i as f64, 20_000, 1000))
            .collect();
        assert!(detect_absorption(&quotes, NOW).is_none());
    }

    #[test]
    fn test_stacking_bid_growth() {
        let sizes = [6000, 7000, 8000, 9000, 10_000];
        let quotes: Vec<Quote> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| quote(i as i64, 150.0, s, 100))
            .collect();

        let pattern = detect_stacking(&quotes, NOW).unwrap();
        match pattern.kind {
            PatternKind::Stacking {
                side,
                levels,
                total_size,
                growth_rate,
            } => {
                assert_eq!(side, Side::Bid);
                assert_eq!(levels, 5);
                assert_eq!(total_size, 40_000);
                assert!((growth_rate - 10_000.0 / 6000.0).abs() < 1e-9);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
    }

    #[test]
    fn test_stacking_ask_growth() {
        let sizes = [6000, 6500, 7000, 8000, 9500];
        let quotes: Vec<Quote> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| quote(i as i64, 150.0, 1000, s))
            .collect();

        let pattern = detect_stacking(&quotes, NOW).unwrap();
        match pattern.kind {
            PatternKind::Stacking {
                side, total_size, ..
            } => {
                assert_eq!(side, Side::Ask);
                assert_eq!(total_size, 37_000);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
        assert_eq!(pattern.description, "Ask stacking detected with 37000 total size");
    }

    #[test]
    fn test_stacking_needs_every_size_above_floor() {
        let sizes = [6000, 4000, 8000, 9000, 10_000];
        let quotes: Vec<Quote> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| quote(i as i64, 150.0, s, 100))
            .collect();
        assert!(detect_stacking(&quotes, NOW).is_none());
    }

    #[test]
    fn test_momentum_shift_requires_ten_moves() {
        let momentum = MomentumMetrics {
            bid_lift_count: 8,
            bid_drop_count: 1,
            ..Default::default()
        };
        assert!(detect_momentum_shift(&momentum, NOW).is_none());
    }

    #[test]
    fn test_momentum_shift_bearish_moderate() {
        let momentum = MomentumMetrics {
            bid_lift_count: 3,
            bid_drop_count: 8,
            ..Default::default()
        };
        let pattern = detect_momentum_shift(&momentum, NOW).unwrap();
        match pattern.kind {
            PatternKind::MomentumShift {
                direction,
                strength,
                ratio,
            } => {
                assert_eq!(direction, MomentumDirection::Bearish);
                assert_eq!(strength, Strength::Moderate);
                assert!((ratio - 8.0 / 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
    }

    #[test]
    fn test_momentum_shift_zero_minority_ratio() {
        let momentum = MomentumMetrics {
            bid_lift_count: 12,
            bid_drop_count: 0,
            ..Default::default()
        };
        let pattern = detect_momentum_shift(&momentum, NOW).unwrap();
        assert!(matches!(
            pattern.kind,
            PatternKind::MomentumShift { strength: Strength::Strong, ratio, .. } if ratio == 12.0
        ));
    }

    #[test]
    fn test_iceberg_refills_at_one_price() {
        let mut quotes: Vec<Quote> = (0..5).map(|i| quote(i, 149.50, 1000, 1000)).collect();
        quotes.extend((5..11).map(|i| quote(i, 150.25, 8000, 1000)));

        let pattern = detect_iceberg(&quotes, NOW).unwrap();
        match pattern.kind {
            PatternKind::Iceberg {
                price,
                refill_count,
                total_volume,
                ..
            } => {
                assert_eq!(price, 150.25);
                assert_eq!(refill_count, 6);
                assert_eq!(total_volume, 48_000);
            }
            other => panic!("unexpected pattern: {:?}", other),
        }
    }

    #[test]
    fn test_iceberg_needs_five_refills() {
        let mut quotes: Vec<Quote> = (0..6).map(|i| quote(i, 149.50, 1000, 1000)).collect();
        quotes.extend((6..10).map(|i| quote(i, 150.25, 8000, 1000)));
        assert!(detect_iceberg(&quotes, NOW).is_none());
    }

    #[test]
    fn test_iceberg_needs_average_above_floor() {
        let quotes: Vec<Quote> = (0..10).map(|i| quote(i, 150.25, 7000, 1000)).collect();
        assert!(detect_iceberg(&quotes, NOW).is_none());

        let quotes: Vec<Quote> = (0..10).map(|i| quote(i, 150.25, 7001, 1000)).collect();
        assert!(detect_iceberg(&quotes, NOW).is_some());
    }

    #[test]
    fn test_iceberg_ignores_quotes_before_last_twenty() {
        let mut quotes: Vec<Quote> = (0..6).map(|i| quote(i, 150.25, 9000, 1000)).collect();
        quotes.extend((6..26).map(|i| quote(i, 149.50, 1000, 1000)));
        assert!(detect_iceberg(&quotes, NOW).is_none());

        // Shift the refills one quote later and they fall inside the lookback
        let mut quotes: Vec<Quote> = (0..1).map(|i| quote(i, 149.50, 1000, 1000)).collect();
        quotes.extend((1..6).map(|i| quote(i, 150.25, 9000, 1000)));
        quotes.extend((6..21).map(|i| quote(i, 149.50, 1000, 1000)));
        assert!(detect_iceberg(&quotes, NOW).is_some());
    }

    #[test]
    fn test_iceberg_groups_by_exact_price() {
        let mut quotes: Vec<Quote> = (0..5).map(|i| quote(i, 0.1 + 0.2, 8000, 1000)).collect();
        quotes.extend((5..10).map(|i| quote(i, 0.3, 8000, 1000)));

        let pattern = detect_iceberg(&quotes, NOW).unwrap();
        assert!(matches!(
            pattern.kind,
            PatternKind::Iceberg { refill_count: 5, .. }
        ));
    }

    #[test]
    fn test_detect_concatenates_in_order() {
        let sizes = [12_000, 13_000, 14_000, 16_000, 19_000, 9000, 10_000, 12_000, 14_000, 24_000];
        let quotes: Vec<Quote> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| quote(i as i64, 150.0, s, 100))
            .collect();

        let patterns = PatternDetector::new().detect(&quotes, &MomentumMetrics::default(), NOW);
        let names: Vec<&str> = patterns.iter().map(Pattern::type_name).collect();
        assert_eq!(names, vec!["absorption", "stacking", "iceberg"]);
    }
}
