//! Significant price level tracking
//!
//! A [`PriceLevelTracker`] owns the accumulators for one ticker. Each cycle
//! feeds it the short quote window, then runs one sweep that evicts stale
//! levels and exports read-only snapshots of the significant ones.
//!
//! Level lifecycle: absent -> tracked (count < 3) -> significant (count >= 3).
//! `count` only grows; the only way back to absent is eviction once a level
//! has not been seen for 300 seconds.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::orderflow::types::{PriceLevelSnapshot, Quote, Side};

/// Default size floor for a quote side to be tracked
pub const DEFAULT_SIGNIFICANCE_FLOOR: u64 = 5_000;

/// Levels idle for longer than this are evicted
pub const DEFAULT_STALE_AFTER_SECS: f64 = 300.0;

/// Appearances needed before a level is exported
pub const MIN_SIGNIFICANT_APPEARANCES: u32 = 3;

/// Exact key for a floating point price
///
/// The binary value is kept without rounding, so two distinct floats never
/// share a level (`0.1 + 0.2` and `0.3` are different keys).
pub(crate) fn price_key(price: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(price).map(|d| d.normalize())
}

/// Mutable accumulator for one (side, price)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub count: u32,
    pub total_size: u64,
    /// Wall-clock seconds of the latest qualifying observation
    pub last_seen: f64,
}

impl PriceLevel {
    fn snapshot(&self) -> PriceLevelSnapshot {
        PriceLevelSnapshot {
            price: self.price,
            appearances: self.count,
            total_size: self.total_size,
            avg_size: self.total_size as f64 / self.count as f64,
            last_seen: self.last_seen,
        }
    }
}

/// Per-ticker price level state
#[derive(Debug, Clone)]
pub struct PriceLevelTracker {
    significance_floor: u64,
    stale_after_secs: f64,
    bids: BTreeMap<Decimal, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
}

impl Default for PriceLevelTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE_FLOOR)
    }
}

impl PriceLevelTracker {
    pub fn new(significance_floor: u64) -> Self {
        Self {
            significance_floor,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Record every quote side priced above zero with size above the floor
    ///
    /// # Arguments
    /// * `quotes` - Short quote window for this cycle
    /// * `now_secs` - Wall-clock seconds stamped as `last_seen`
    pub fn update(&mut self, quotes: &[Quote], now_secs: f64) {
        for quote in quotes {
            for side in Side::BOTH {
                let price = quote.price(side);
                let size = quote.size(side);

                if price <= 0.0 || size <= self.significance_floor {
                    continue;
                }
                let Some(key) = price_key(price) else {
                    continue;
                };

                let level = self.levels_mut(side).entry(key).or_insert(PriceLevel {
                    price,
                    count: 0,
                    total_size: 0,
                    last_seen: 0.0,
                });
                level.count = level.count.saturating_add(1);
                level.total_size = level.total_size.saturating_add(size);
                level.last_seen = now_secs;
            }
        }
    }

    /// Evict stale levels and export snapshots of the significant survivors
    ///
    /// Eviction is unconditional on staleness: a significant level that has not
    /// been seen for longer than the stale window is removed, not exported.
    ///
    /// # Returns
    /// Snapshots for every level with at least 3 appearances, bid side first,
    /// ascending price within a side
    pub fn sweep(&mut self, now_secs: f64) -> Vec<(Side, PriceLevelSnapshot)> {
        let stale_after = self.stale_after_secs;
        let mut exported = Vec::new();

        for side in Side::BOTH {
            let levels = self.levels_mut(side);
            levels.retain(|_, level| now_secs - level.last_seen <= stale_after);

            exported.extend(
                levels
                    .values()
                    .filter(|level| level.count >= MIN_SIGNIFICANT_APPEARANCES)
                    .map(|level| (side, level.snapshot())),
            );
        }

        exported
    }

    /// Update followed by sweep, as one step
    pub fn update_and_sweep(
        &mut self,
        quotes: &[Quote],
        now_secs: f64,
    ) -> Vec<(Side, PriceLevelSnapshot)> {
        self.update(quotes, now_secs);
        self.sweep(now_secs)
    }

    pub fn level(&self, side: Side, price: f64) -> Option<&PriceLevel> {
        price_key(price).and_then(|key| self.levels(side).get(&key))
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Drop all tracked state
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    fn levels(&self, side: Side) -> &BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }
}
