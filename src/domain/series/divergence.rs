//! Pivot lows and bullish divergence detection.

use super::Series;

/// Strict local minima: a value is a pivot low when every neighbour within
/// `range` bars on both sides is strictly greater. Bars too close to either
/// end are NaN.
#[derive(Debug, Clone)]
pub struct PivotLowsSeries<S> {
    source: S,
    range: usize,
}

impl<S: Series> PivotLowsSeries<S> {
    pub fn new(source: S, range: usize) -> Self {
        Self { source, range }
    }
}

impl<S: Series> Series for PivotLowsSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let size = self.source.size();
        if index < self.range || index.saturating_add(self.range) >= size {
            return f64::NAN;
        }
        let value = self.source.value_at(index);
        let newer = (index - self.range)..index;
        let older = (index + 1)..=(index + self.range);
        if strictly_above(&self.source, newer, value) && strictly_above(&self.source, older, value)
        {
            value
        } else {
            f64::NAN
        }
    }
}

/// True when every value in `indices` is strictly greater than `value`.
/// NaN neighbours (including reads past the oldest bar) never disqualify.
fn strictly_above<S: Series + ?Sized>(
    source: &S,
    mut indices: impl Iterator<Item = usize>,
    value: f64,
) -> bool {
    !indices.any(|i| source.value_at(i) <= value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Signal makes a higher low while the reference makes a lower low.
    Bullish,
    /// Signal makes a lower low while the reference makes a higher low.
    HiddenBullish,
}

/// Distance back to the earlier pivot of a divergence, or -1 when none.
///
/// A pivot low of `signal` at the current index is paired with the most
/// recent older pivot low within `lookback_range` bars; the pair counts as
/// a divergence when `signal` and `reference` moved in opposite directions
/// between the two pivots.
#[derive(Debug, Clone)]
pub struct DivergenceSeries<S, R> {
    kind: DivergenceKind,
    signal: S,
    reference: R,
    pivot_range: usize,
    lookback_range: usize,
}

impl<S: Series, R: Series> DivergenceSeries<S, R> {
    pub fn new(
        kind: DivergenceKind,
        signal: S,
        reference: R,
        pivot_range: usize,
        lookback_range: usize,
    ) -> Self {
        Self {
            kind,
            signal,
            reference,
            pivot_range,
            lookback_range,
        }
    }

    /// Pivot low that relaxes the neighbourhood at either end of history,
    /// where fewer than `pivot_range` neighbours exist on one side.
    fn low_at(&self, index: usize) -> f64 {
        let size = self.signal.size();
        let range = self.pivot_range;
        if index >= size {
            return f64::NAN;
        }
        let value = self.signal.value_at(index);
        if value.is_nan() {
            return f64::NAN;
        }
        let older_end = index.saturating_add(range).min(size - 1);
        let is_low = if index < range {
            strictly_above(&self.signal, 0..index, value)
                && strictly_above(&self.signal, (index + 1)..=older_end, value)
        } else if index.saturating_add(range) >= size {
            strictly_above(&self.signal, (index - range)..index, value)
                && strictly_above(&self.signal, (index + 1)..size, value)
        } else {
            return PivotLowsSeries::new(&self.signal, range).value_at(index);
        };
        if is_low { value } else { f64::NAN }
    }
}

impl<S: Series, R: Series> Series for DivergenceSeries<S, R> {
    fn size(&self) -> usize {
        self.signal.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let signal_low = self.low_at(index);
        if signal_low.is_nan() {
            return -1.0;
        }

        let window = self.lookback_range.min(self.signal.size());
        let Some(prev_index) = (1..window)
            .map(|i| index + i)
            .find(|&i| !self.low_at(i).is_nan())
        else {
            return -1.0;
        };

        let signal_prev_low = self.low_at(prev_index);
        let reference_low = self.reference.value_at(index);
        let reference_prev_low = self.reference.value_at(prev_index);
        let diverges = match self.kind {
            DivergenceKind::Bullish => {
                signal_low > signal_prev_low && reference_low < reference_prev_low
            }
            DivergenceKind::HiddenBullish => {
                signal_low < signal_prev_low && reference_low > reference_prev_low
            }
        };
        if diverges { prev_index as f64 } else { -1.0 }
    }
}
