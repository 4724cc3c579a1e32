//! Recursive smoothing (EMA and Wilder's RMA) with a per-instance cache.
//!
//! The recurrence starts at the oldest index whose SMA window is complete and
//! walks toward index 0: `v = x·α + prev·(1 − α)`. If the seed (or any
//! intermediate value) is NaN, the next index is re-seeded from its own SMA,
//! so sources that only become defined part way through history still
//! smooth correctly.
//!
//! Results are cached by distance from the oldest value, which stays stable
//! when the same source later grows at the newest end. The cache lives in a
//! `RefCell`, so an instance is single-owner and never shared across threads.

use super::moving_average::sma_at;
use super::{window_fits, Series};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    /// α = 2 / (period + 1)
    Exponential,
    /// α = 1 / period
    Wilder,
}

impl Smoothing {
    pub fn alpha(&self, period: usize) -> f64 {
        match self {
            Smoothing::Exponential => 2.0 / (period as f64 + 1.0),
            Smoothing::Wilder => 1.0 / period as f64,
        }
    }
}

#[derive(Debug, Default)]
struct RecursiveCache {
    /// Source size the cached values were computed for.
    size: usize,
    /// `values[k]` is the result at distance `period - 1 + k` from the oldest value.
    values: Vec<f64>,
}

#[derive(Debug)]
pub struct RecursiveMaSeries<S> {
    source: S,
    period: usize,
    smoothing: Smoothing,
    cache: RefCell<RecursiveCache>,
}

impl<S: Series> RecursiveMaSeries<S> {
    pub fn ema(source: S, period: usize) -> Self {
        Self::new(source, period, Smoothing::Exponential)
    }

    pub fn rma(source: S, period: usize) -> Self {
        Self::new(source, period, Smoothing::Wilder)
    }

    pub fn new(source: S, period: usize, smoothing: Smoothing) -> Self {
        Self {
            source,
            period,
            smoothing,
            cache: RefCell::new(RecursiveCache::default()),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Number of values currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.borrow().values.len()
    }
}

impl<S: Series> Series for RecursiveMaSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let size = self.source.size();
        if !window_fits(size, self.period, index) {
            return f64::NAN;
        }

        let mut cache = self.cache.borrow_mut();
        if cache.size > size {
            // The source shrank: history was replaced, so start over.
            cache.values.clear();
        }
        cache.size = size;

        let distance = size - 1 - index;
        let slot = distance + 1 - self.period;
        if let Some(value) = cache.values.get(slot) {
            return *value;
        }

        let alpha = self.smoothing.alpha(self.period);
        let mut prev = cache.values.last().copied().unwrap_or(f64::NAN);
        for next_slot in cache.values.len()..=slot {
            let i = size - self.period - next_slot;
            let value = if prev.is_nan() {
                sma_at(&self.source, self.period, i)
            } else {
                self.source.value_at(i) * alpha + prev * (1.0 - alpha)
            };
            cache.values.push(value);
            prev = value;
        }
        prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::test_support::series;
    use crate::domain::series::DataSeries;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn ema_seeds_from_sma_at_oldest_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ema = RecursiveMaSeries::ema(series(&values), 3);
        // seed at index 2 = SMA(1,2,3) = 2
        assert_relative_eq!(ema.value_at(2), 2.0);
        // alpha = 0.5
        assert_relative_eq!(ema.value_at(1), 4.0 * 0.5 + 2.0 * 0.5);
        assert_relative_eq!(ema.value_at(0), 5.0 * 0.5 + 3.0 * 0.5);
        assert!(ema.value_at(3).is_nan());
    }

    #[test]
    fn rma_uses_wilder_alpha() {
        let values = [2.0, 4.0, 6.0, 8.0];
        let rma = RecursiveMaSeries::rma(series(&values), 2);
        // seed at index 2 = 3, alpha = 0.5
        assert_relative_eq!(rma.value_at(2), 3.0);
        assert_relative_eq!(rma.value_at(1), 6.0 * 0.5 + 3.0 * 0.5);
        assert_relative_eq!(rma.value_at(0), 8.0 * 0.5 + 4.5 * 0.5);
        assert_relative_eq!(Smoothing::Wilder.alpha(14), 1.0 / 14.0);
        assert_relative_eq!(Smoothing::Exponential.alpha(9), 0.2);
    }

    #[test]
    fn reseeds_after_leading_nan() {
        let values = [f64::NAN, f64::NAN, 1.0, 3.0, 5.0, 7.0];
        let ema = RecursiveMaSeries::ema(series(&values), 2);
        // first complete window is (1, 3) at index 2
        assert_relative_eq!(ema.value_at(2), 2.0);
        let alpha = 2.0 / 3.0;
        assert_relative_eq!(ema.value_at(1), 5.0 * alpha + 2.0 * (1.0 - alpha));
    }

    #[test]
    fn cache_fills_incrementally() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let ema = RecursiveMaSeries::ema(series(&values), 3);
        assert_eq!(ema.cached_len(), 0);
        ema.value_at(6);
        assert_eq!(ema.cached_len(), 2);
        ema.value_at(0);
        assert_eq!(ema.cached_len(), 8);
        ema.value_at(4);
        assert_eq!(ema.cached_len(), 8);
    }

    #[test]
    fn cached_distance_survives_growing_source() {
        let values: Vec<f64> = (1..=10).map(|v| (v * 3 % 7) as f64).collect();
        let older = RecursiveMaSeries::ema(DataSeries::new(&values, 2), 4);
        let newer = RecursiveMaSeries::ema(series(&values), 4);
        // the same bar is index 0 from the older view and index 2 from the newer one
        assert_relative_eq!(older.value_at(0), newer.value_at(2));
    }

    #[test]
    fn oversized_period_is_nan() {
        let values = [1.0, 2.0, 3.0];
        let rma = RecursiveMaSeries::rma(series(&values), usize::MAX);
        assert!(rma.value_at(0).is_nan());
        assert!(rma.value_at(usize::MAX).is_nan());
        assert_eq!(rma.cached_len(), 0);
    }

    proptest! {
        #[test]
        fn query_order_does_not_change_values(
            values in prop::collection::vec(-100.0f64..100.0, 5..60),
            period in 1usize..6,
            wilder in any::<bool>(),
            order in prop::collection::vec(0usize..64, 1..30),
        ) {
            let smoothing = if wilder { Smoothing::Wilder } else { Smoothing::Exponential };
            let reference = RecursiveMaSeries::new(series(&values), period, smoothing);
            let expected: Vec<f64> = (0..values.len())
                .rev()
                .map(|i| reference.value_at(i))
                .collect();

            let shuffled = RecursiveMaSeries::new(series(&values), period, smoothing);
            for &raw in &order {
                let i = raw % values.len();
                let got = shuffled.value_at(i);
                let want = expected[values.len() - 1 - i];
                if want.is_nan() {
                    prop_assert!(got.is_nan());
                } else {
                    prop_assert_eq!(got, want);
                }
            }
        }
    }
}
