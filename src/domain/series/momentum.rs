//! Momentum indicators: changes, ROC, RSI, MACD and the stochastics.

use super::ops::{BinaryOp, BinarySeries, UnaryOp, UnarySeries};
use super::recursive::RecursiveMaSeries;
use super::{window_fits, OutputName, Series};
use std::rc::Rc;

/// `x[i] − x[i+1]`
#[derive(Debug, Clone)]
pub struct ChangeSeries<S> {
    source: S,
}

impl<S: Series> ChangeSeries<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: Series> Series for ChangeSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.source.value_at(index) - self.source.value_at(index.saturating_add(1))
    }
}

/// Rate of change in percent: `100·(x[i] − x[i+p]) / x[i+p]`.
#[derive(Debug, Clone)]
pub struct RocSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> RocSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for RocSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        if !window_fits(self.source.size(), self.period, index) {
            return f64::NAN;
        }
        let current = self.source.value_at(index);
        let past = self.source.value_at(index + self.period);
        100.0 * (current - past) / past
    }
}

type Movement<S> = RecursiveMaSeries<UnarySeries<ChangeSeries<Rc<S>>>>;

/// Relative strength index with Wilder smoothing of gains and losses.
#[derive(Debug)]
pub struct RsiSeries<S> {
    source: Rc<S>,
    avg_gain: Movement<S>,
    avg_loss: Movement<S>,
}

impl<S: Series> RsiSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        let source = Rc::new(source);
        let gains = UnarySeries::new(UnaryOp::Gain, ChangeSeries::new(Rc::clone(&source)));
        let losses = UnarySeries::new(UnaryOp::Loss, ChangeSeries::new(Rc::clone(&source)));
        Self {
            source,
            avg_gain: RecursiveMaSeries::rma(gains, period),
            avg_loss: RecursiveMaSeries::rma(losses, period),
        }
    }
}

impl<S: Series> Series for RsiSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        let rs = self.avg_gain.value_at(index) / self.avg_loss.value_at(index);
        100.0 - 100.0 / (1.0 + rs)
    }
}

type MacdLine<S> = BinarySeries<RecursiveMaSeries<Rc<S>>, RecursiveMaSeries<Rc<S>>>;

/// MACD line, its EMA signal line, and the histogram between them.
#[derive(Debug)]
pub struct MacdSeries<S> {
    line: Rc<MacdLine<S>>,
    signal: RecursiveMaSeries<Rc<MacdLine<S>>>,
}

impl<S: Series> MacdSeries<S> {
    pub fn new(source: S, fast: usize, slow: usize, signal: usize) -> Self {
        let source = Rc::new(source);
        let line = Rc::new(BinarySeries::new(
            BinaryOp::Subtract,
            RecursiveMaSeries::ema(Rc::clone(&source), fast),
            RecursiveMaSeries::ema(source, slow),
        ));
        let signal = RecursiveMaSeries::ema(Rc::clone(&line), signal);
        Self { line, signal }
    }
}

impl<S: Series> Series for MacdSeries<S> {
    fn size(&self) -> usize {
        self.line.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.line.value_at(index)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        match output {
            OutputName::Default | OutputName::MacdLine => self.line.value_at(index),
            OutputName::SignalLine => self.signal.value_at(index),
            OutputName::Histogram => {
                BinaryOp::Subtract.apply(self.line.value_at(index), self.signal.value_at(index))
            }
            _ => f64::NAN,
        }
    }
}

fn raw_stochastic<H, L, C>(high: &H, low: &L, close: &C, period: usize, index: usize) -> f64
where
    H: Series + ?Sized,
    L: Series + ?Sized,
    C: Series + ?Sized,
{
    if !window_fits(close.size(), period, index) {
        return f64::NAN;
    }
    let mut highest = f64::NEG_INFINITY;
    let mut lowest = f64::INFINITY;
    for i in index..index + period {
        let (h, l) = (high.value_at(i), low.value_at(i));
        if h.is_nan() || l.is_nan() {
            return f64::NAN;
        }
        highest = highest.max(h);
        lowest = lowest.min(l);
    }
    100.0 * (close.value_at(index) - lowest) / (highest - lowest)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StochasticParams {
    k_period: usize,
    k_smooth: usize,
    d_period: usize,
}

impl StochasticParams {
    fn k<H, L, C>(&self, high: &H, low: &L, close: &C, index: usize) -> f64
    where
        H: Series + ?Sized,
        L: Series + ?Sized,
        C: Series + ?Sized,
    {
        if !window_fits(close.size(), self.k_smooth, index) {
            return f64::NAN;
        }
        let sum: f64 = (0..self.k_smooth)
            .map(|j| raw_stochastic(high, low, close, self.k_period, index + j))
            .sum();
        sum / self.k_smooth as f64
    }

    fn d<H, L, C>(&self, high: &H, low: &L, close: &C, index: usize) -> f64
    where
        H: Series + ?Sized,
        L: Series + ?Sized,
        C: Series + ?Sized,
    {
        if !window_fits(close.size(), self.d_period, index) {
            return f64::NAN;
        }
        let sum: f64 = (0..self.d_period)
            .map(|m| self.k(high, low, close, index + m))
            .sum();
        sum / self.d_period as f64
    }

    fn output<H, L, C>(&self, high: &H, low: &L, close: &C, index: usize, output: OutputName) -> f64
    where
        H: Series + ?Sized,
        L: Series + ?Sized,
        C: Series + ?Sized,
    {
        match output {
            OutputName::Default | OutputName::StochasticK => self.k(high, low, close, index),
            OutputName::StochasticD => self.d(high, low, close, index),
            _ => f64::NAN,
        }
    }
}

/// Slow stochastic oscillator over high, low and close.
#[derive(Debug, Clone)]
pub struct StochSeries<H, L, C> {
    high: H,
    low: L,
    close: C,
    params: StochasticParams,
}

impl<H: Series, L: Series, C: Series> StochSeries<H, L, C> {
    pub fn new(
        high: H,
        low: L,
        close: C,
        k_period: usize,
        k_smooth: usize,
        d_period: usize,
    ) -> Self {
        Self {
            high,
            low,
            close,
            params: StochasticParams {
                k_period,
                k_smooth,
                d_period,
            },
        }
    }
}

impl<H: Series, L: Series, C: Series> Series for StochSeries<H, L, C> {
    fn size(&self) -> usize {
        self.close.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.output_at(index, OutputName::Default)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        self.params
            .output(&self.high, &self.low, &self.close, index, output)
    }
}

/// Stochastic oscillator applied to RSI values.
#[derive(Debug)]
pub struct StochRsiSeries<S> {
    rsi: RsiSeries<S>,
    params: StochasticParams,
}

impl<S: Series> StochRsiSeries<S> {
    pub fn new(
        source: S,
        rsi_period: usize,
        k_period: usize,
        k_smooth: usize,
        d_period: usize,
    ) -> Self {
        Self {
            rsi: RsiSeries::new(source, rsi_period),
            params: StochasticParams {
                k_period,
                k_smooth,
                d_period,
            },
        }
    }
}

impl<S: Series> Series for StochRsiSeries<S> {
    fn size(&self) -> usize {
        self.rsi.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.output_at(index, OutputName::Default)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        self.params
            .output(&self.rsi, &self.rsi, &self.rsi, index, output)
    }
}
