//! Lazily evaluated numeric series under the reverse-chronological convention.
//!
//! Index 0 is the most recent value and increasing index walks back in time.
//! Any read outside the available history yields NaN, and NaN propagates
//! through every operator.

pub mod divergence;
pub mod momentum;
pub mod moving_average;
pub mod ops;
pub mod recursive;
pub mod volatility;

pub use divergence::{DivergenceKind, DivergenceSeries, PivotLowsSeries};
pub use momentum::{ChangeSeries, MacdSeries, RocSeries, RsiSeries, StochRsiSeries, StochSeries};
pub use moving_average::{
    HighestSeries, HmaSeries, LowestSeries, MaKind, SmaSeries, StddevSeries, WmaSeries,
};
pub use ops::{BinaryOp, BinarySeries, UnaryOp, UnarySeries};
pub use recursive::{RecursiveMaSeries, Smoothing};
pub use volatility::{AtrSeries, BbSeries, KcSeries, RvolSeries, TrSeries};

use std::rc::Rc;

/// Named output of a multi-output series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputName {
    Default,
    UpperBand,
    MiddleBand,
    LowerBand,
    MacdLine,
    SignalLine,
    Histogram,
    StochasticK,
    StochasticD,
}

impl OutputName {
    pub const ALL: [OutputName; 9] = [
        OutputName::Default,
        OutputName::UpperBand,
        OutputName::MiddleBand,
        OutputName::LowerBand,
        OutputName::MacdLine,
        OutputName::SignalLine,
        OutputName::Histogram,
        OutputName::StochasticK,
        OutputName::StochasticD,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputName::Default => "default",
            OutputName::UpperBand => "upper-band",
            OutputName::MiddleBand => "middle-band",
            OutputName::LowerBand => "lower-band",
            OutputName::MacdLine => "macd-line",
            OutputName::SignalLine => "signal-line",
            OutputName::Histogram => "histogram",
            OutputName::StochasticK => "k-percent",
            OutputName::StochasticD => "d-percent",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|output| output.as_str() == name)
    }
}

impl std::fmt::Display for OutputName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sized, indexable numeric sequence.
pub trait Series {
    fn size(&self) -> usize;

    fn value_at(&self, index: usize) -> f64;

    /// Value of a named output. Single-output series only know `Default`.
    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        match output {
            OutputName::Default => self.value_at(index),
            _ => f64::NAN,
        }
    }
}

/// Type-erased series built by the DSL.
pub type DynSeries<'a> = Box<dyn Series + 'a>;

impl<S: Series + ?Sized> Series for &S {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn value_at(&self, index: usize) -> f64 {
        (**self).value_at(index)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        (**self).output_at(index, output)
    }
}

impl<S: Series + ?Sized> Series for Box<S> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn value_at(&self, index: usize) -> f64 {
        (**self).value_at(index)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        (**self).output_at(index, output)
    }
}

impl<S: Series + ?Sized> Series for Rc<S> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn value_at(&self, index: usize) -> f64 {
        (**self).value_at(index)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        (**self).output_at(index, output)
    }
}

/// A column of asset data viewed from a snapshot offset.
#[derive(Debug, Clone, Copy)]
pub struct DataSeries<'a> {
    values: &'a [f64],
    offset: usize,
}

impl<'a> DataSeries<'a> {
    /// `values` is in ascending time order; index 0 maps to the value
    /// `offset` steps before the last one.
    pub fn new(values: &'a [f64], offset: usize) -> Self {
        Self { values, offset }
    }
}

impl Series for DataSeries<'_> {
    fn size(&self) -> usize {
        self.values.len().saturating_sub(self.offset)
    }

    fn value_at(&self, index: usize) -> f64 {
        let size = self.size();
        if index >= size {
            return f64::NAN;
        }
        self.values[size - 1 - index]
    }
}

/// The same value repeated `size` times.
#[derive(Debug, Clone, Copy)]
pub struct RepeatSeries {
    value: f64,
    size: usize,
}

impl RepeatSeries {
    pub fn new(value: f64, size: usize) -> Self {
        Self { value, size }
    }
}

impl Series for RepeatSeries {
    fn size(&self) -> usize {
        self.size
    }

    fn value_at(&self, index: usize) -> f64 {
        if index < self.size {
            self.value
        } else {
            f64::NAN
        }
    }
}

/// `source` shifted `period` bars back in time.
#[derive(Debug, Clone)]
pub struct LookbackSeries<S> {
    source: S,
    period: usize,
}

impl<S: Series> LookbackSeries<S> {
    pub fn new(source: S, period: usize) -> Self {
        Self { source, period }
    }
}

impl<S: Series> Series for LookbackSeries<S> {
    fn size(&self) -> usize {
        self.source.size().saturating_sub(self.period)
    }

    fn value_at(&self, index: usize) -> f64 {
        self.source.value_at(index.saturating_add(self.period))
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        self.source.output_at(index.saturating_add(self.period), output)
    }
}

/// Re-targets the default output of `source` to a named output.
#[derive(Debug, Clone)]
pub struct SelectOutputSeries<S> {
    source: S,
    output: OutputName,
}

impl<S: Series> SelectOutputSeries<S> {
    pub fn new(source: S, output: OutputName) -> Self {
        Self { source, output }
    }
}

impl<S: Series> Series for SelectOutputSeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.source.output_at(index, self.output)
    }

    fn output_at(&self, index: usize, output: OutputName) -> f64 {
        match output {
            OutputName::Default => self.value_at(index),
            other => self.source.output_at(index, other),
        }
    }
}

/// True when a window of `period` values starting at `index` fits in `size`.
pub(crate) fn window_fits(size: usize, period: usize, index: usize) -> bool {
    period > 0 && period <= size && index <= size - period
}


#[cfg(test)]
mod tests {
    use super::test_support::series;
    use super::*;

    #[test]
    fn data_series_reverses_time() {
        let values = [1.0, 2.0, 3.0];
        let s = series(&values);
        assert_eq!(s.size(), 3);
        assert_eq!(s.value_at(0), 3.0);
        assert_eq!(s.value_at(2), 1.0);
        assert!(s.value_at(3).is_nan());
    }

    #[test]
    fn data_series_with_offset() {
        let values = [1.0, 2.0, 3.0];
        let s = DataSeries::new(&values, 1);
        assert_eq!(s.size(), 2);
        assert_eq!(s.value_at(0), 2.0);
        assert!(s.value_at(2).is_nan());
    }

    #[test]
    fn repeat_series_bounded() {
        let s = RepeatSeries::new(2.5, 2);
        assert_eq!(s.value_at(1), 2.5);
        assert!(s.value_at(2).is_nan());
    }

    #[test]
    fn lookback_shifts_back() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let s = LookbackSeries::new(series(&values), 2);
        assert_eq!(s.size(), 2);
        assert_eq!(s.value_at(0), 2.0);
        assert_eq!(s.value_at(1), 1.0);
        assert!(s.value_at(2).is_nan());
    }

    #[test]
    fn stacked_lookbacks_past_usize_max_are_nan() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let s = LookbackSeries::new(LookbackSeries::new(series(&values), 1), usize::MAX);
        assert_eq!(s.size(), 0);
        assert!(s.value_at(0).is_nan());
        assert!(s.value_at(3).is_nan());
        assert!(s.output_at(1, OutputName::Default).is_nan());
    }

    #[test]
    fn window_fits_never_overflows() {
        assert!(window_fits(4, 2, 2));
        assert!(!window_fits(4, 2, 3));
        assert!(!window_fits(4, 0, 0));
        assert!(!window_fits(4, usize::MAX, 1));
        assert!(!window_fits(4, 1, usize::MAX));
    }

    #[test]
    fn single_output_only_knows_default() {
        let values = [1.0];
        let s = series(&values);
        assert_eq!(s.output_at(0, OutputName::Default), 1.0);
        assert!(s.output_at(0, OutputName::UpperBand).is_nan());
    }

    #[test]
    fn output_names_round_trip() {
        for output in OutputName::ALL {
            assert_eq!(OutputName::parse(output.as_str()), Some(output));
        }
        assert_eq!(OutputName::parse("nope"), None);
    }
}
