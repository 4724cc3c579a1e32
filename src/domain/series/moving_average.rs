//! Windowed folds: SMA, WMA, HMA, standard deviation, highest and lowest.
//!
//! A window at index `i` covers `i..i+period`. When it would run past the
//! oldest value the result is NaN, never a partial fold.

use super::recursive::RecursiveMaSeries;
use super::{window_fits, DynSeries, Series};

/// Moving average family selectable by name, e.g. for Bollinger bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    Sma,
    Ema,
    Wma,
    Rma,
    Hma,
}

impl MaKind {
    pub const ALL: [MaKind; 5] = [MaKind::Sma, MaKind::Ema, MaKind::Wma, MaKind::Rma, MaKind::Hma];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaKind::Sma => "SMA",
            MaKind::Ema => "EMA",
            MaKind::Wma => "WMA",
            MaKind::Rma => "RMA",
            MaKind::Hma => "HMA",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn build<'a, S: Series + 'a>(&self, source: S, period: usize) -> DynSeries<'a> {
        match self {
            MaKind::Sma => Box::new(SmaSeries::new(source, period)),
            MaKind::Ema => Box::new(RecursiveMaSeries::ema(source, period)),
            MaKind::Wma => Box::new(WmaSeries::new(source, period)),
            MaKind::Rma => Box::new(RecursiveMaSeries::rma(source, period)),
            MaKind::Hma => Box::new(HmaSeries::new(source, period)),
        }
    }
}

pub(crate) fn sma_at<S: Series + ?Sized>(source: &S, period: usize, index: usize) -> f64 {
    if !window_fits(source.size(), period, index) {
        return f64::NAN;
    }
    let sum: f64 = (index..index + period).map(|i| source.value_at(i)).sum();
    sum / period as f64
}

/// Linear weights, newest value weighted `period`, oldest weighted 1.
pub(crate) fn wma_at<S: Series + ?Sized>(source: &S, period: usize, index: usize) -> f64 {
    if !window_fits(source.size(), period, index) {
        return f64::NAN;
    }
    let mut sum = 0.0;
    let mut norm = 0.0;
    for (offset, i) in (index..index + period).enumerate() {
        let weight = (period - offset) as f64;
        sum += source.value_at(i) * weight;
        norm += weight;
    }
    sum / norm
}

pub(crate) fn stddev_at<S: Series + ?Sized>(
    source: &S,
    period: usize,
    index: usize,
    mean: f64,
) -> f64 {
    if !window_fits(source.size(), period, index) {
        return f64::NAN;
    }
    let sum_squared: f64 = (index..index + period)
        .map(|i| {
            let diff = source.value_at(i) - mean;
            diff * diff
        })
        .sum();
    (sum_squared / period as f64).sqrt()
}

fn extreme_at<S: Series + ?Sized>(
    source: &S,
    period: usize,
    index: usize,
    pick: fn(f64, f64) -> f64,
) -> f64 {
    if !window_fits(source.size(), period, index) {
        return f64::NAN;
    }
    let mut result = f64::NAN;
    for i in index..index + period {
        let value = source.value_at(i);
        if value.is_nan() {
            return f64::NAN;
        }
        result = if i == index { value } else { pick(result, value) };
    }
    result
}

#[derive(Debug, Clone)]
pub struct SmaSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> SmaSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for SmaSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        sma_at(&self.source, self.period, index)
    }
}

#[derive(Debug, Clone)]
pub struct WmaSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> WmaSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for WmaSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        wma_at(&self.source, self.period, index)
    }
}

/// Hull moving average: `WMA(2·WMA(n/2) − WMA(n), ⌊√n⌋)`.
#[derive(Debug, Clone)]
pub struct HmaSeries<S> {
    source: S,
    period: usize,
}

struct HullDiff<'a, S> {
    source: &'a S,
    period: usize,
}

impl<S: Series> Series for HullDiff<'_, S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let half = wma_at(self.source, self.period / 2, index);
        let full = wma_at(self.source, self.period, index);
        2.0 * half - full
    }
}

impl<S: Series> HmaSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for HmaSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let diff = HullDiff {
            source: &self.source,
            period: self.period,
        };
        let smoothing = (self.period as f64).sqrt() as usize;
        wma_at(&diff, smoothing, index)
    }
}

/// Population standard deviation over the window.
#[derive(Debug, Clone)]
pub struct StddevSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> StddevSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for StddevSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let mean = sma_at(&self.source, self.period, index);
        stddev_at(&self.source, self.period, index, mean)
    }
}

#[derive(Debug, Clone)]
pub struct HighestSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> HighestSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for HighestSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        extreme_at(&self.source, self.period, index, f64::max)
    }
}

#[derive(Debug, Clone)]
pub struct LowestSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> LowestSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for LowestSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        extreme_at(&self.source, self.period, index, f64::min)
    }
}
