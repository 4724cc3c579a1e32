//! Range and band indicators: TR, ATR, RVOL, Bollinger and Keltner.

use super::moving_average::{sma_at, stddev_at};
use super::recursive::RecursiveMaSeries;
use super::{OutputName, Series};

/// True range. The oldest bar has no previous close and uses its own.
#[derive(Debug, Clone)]
pub struct TrSeries<H, L, C> {
    high: H,
    low: L,
    close: C,
}

impl<H: Series, L: Series, C: Series> TrSeries<H, L, C> {
    pub fn new(high: H, low: L, close: C) -> Self {
        Self { high, low, close }
    }
}

impl<H: Series, L: Series, C: Series> Series for TrSeries<H, L, C> {
    fn size(&self) -> usize {
        self.close.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let size = self.size();
        if index >= size {
            return f64::NAN;
        }
        let high = self.high.value_at(index);
        let low = self.low.value_at(index);
        let prev_close = if index + 1 == size {
            self.close.value_at(index)
        } else {
            self.close.value_at(index + 1)
        };
        let hl = (high - low).abs();
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();
        if hl.is_nan() || hc.is_nan() || lc.is_nan() {
            return f64::NAN;
        }
        hl.max(hc).max(lc)
    }
}

/// Wilder-smoothed true range scaled by `multiplier`.
#[derive(Debug)]
pub struct AtrSeries<H, L, C> {
    atr: RecursiveMaSeries<TrSeries<H, L, C>>,
    multiplier: f64,
}

impl<H: Series, L: Series, C: Series> AtrSeries<H, L, C> {
    pub fn new(high: H, low: L, close: C, period: usize, multiplier: f64) -> Self {
        Self {
            atr: RecursiveMaSeries::rma(TrSeries::new(high, low, close), period),
            multiplier,
        }
    }
}

impl<H: Series, L: Series, C: Series> Series for AtrSeries<H, L, C> {
    fn size(&self) -> usize {
        self.atr.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.atr.value_at(index) * self.multiplier
    }
}

/// Relative volume: current volume over its SMA.
#[derive(Debug, Clone)]
pub struct RvolSeries<S> {
    volume: S,
    period: usize,
}

impl<S: Series> RvolSeries<S> {
    pub fn new(volume: S, period: usize) -> Self {
        Self { volume, period }
    }
}

impl<S: Series> Series for RvolSeries<S> {
    fn size(&self) -> usize {
        self.volume.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.volume.value_at(index) / sma_at(&self.volume, self.period, index)
    }
}

/// Bollinger bands: a moving average plus or minus a multiple of the
/// population standard deviation of `source` around it.
#[derive(Debug)]
pub struct BbSeries<S, M> {
    source: S,
    ma: M,
    period: usize,
    multiplier: f64,
}

impl<S: Series, M: Series> BbSeries<S, M> {
    pub fn new(source: S, ma: M, period: usize, multiplier: f64) -> Self {
        Self {
            source,
            ma,
            period,
            multiplier,
        }
    }
}

impl<S: Series, M: Series> Series for BbSeries<S, M> {
    fn size(&self) -> usize {
        self.ma.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.output_at(index, OutputName::MiddleBand)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        let middle = self.ma.value_at(index);
        let width = || stddev_at(&self.source, self.period, index, middle) * self.multiplier;
        match output {
            OutputName::Default | OutputName::MiddleBand => middle,
            OutputName::UpperBand => middle + width(),
            OutputName::LowerBand => middle - width(),
            _ => f64::NAN,
        }
    }
}

/// Keltner channels: a moving average plus or minus a multiple of a range.
#[derive(Debug)]
pub struct KcSeries<M, R> {
    ma: M,
    range: R,
    multiplier: f64,
}

impl<M: Series, R: Series> KcSeries<M, R> {
    pub fn new(ma: M, range: R, multiplier: f64) -> Self {
        Self {
            ma,
            range,
            multiplier,
        }
    }
}

impl<M: Series, R: Series> Series for KcSeries<M, R> {
    fn size(&self) -> usize {
        self.ma.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.output_at(index, OutputName::MiddleBand)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        let middle = self.ma.value_at(index);
        let width = || self.range.value_at(index) * self.multiplier;
        match output {
            OutputName::Default | OutputName::MiddleBand => middle,
            OutputName::UpperBand => middle + width(),
            OutputName::LowerBand => middle - width(),
            _ => f64::NAN,
        }
    }
}
