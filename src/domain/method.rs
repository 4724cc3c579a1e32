//! Numeric DSL expressions.
//!
//! A `Method` is an immutable expression tree. Evaluating it against an
//! [`AssetSnapshot`] builds the corresponding lazy [`Series`]; the current
//! value is that series at index 0. Named references resolve through the
//! [`SeriesRegistry`] carried by the [`MethodContext`].

use crate::domain::asset::{AssetSnapshot, CLOSE, HIGH, LOW, OPEN, VOLUME};
use crate::domain::error::BarreplayError;
use crate::domain::series::{
    AtrSeries, BbSeries, BinaryOp, BinarySeries, ChangeSeries, DivergenceKind, DivergenceSeries,
    DynSeries, HighestSeries, KcSeries, LookbackSeries, LowestSeries, MaKind, MacdSeries,
    OutputName, RepeatSeries, RocSeries, RsiSeries, RvolSeries, SelectOutputSeries, Series,
    StddevSeries, StochRsiSeries, StochSeries, UnaryOp, UnarySeries,
};
use crate::domain::series_registry::SeriesRegistry;

/// Single-source indicators parameterised by a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaKind {
    Sma,
    Ema,
    Wma,
    Rma,
    Hma,
    Rsi,
    Roc,
    Stddev,
    Highest,
    Lowest,
}

impl TaKind {
    pub const ALL: [TaKind; 10] = [
        TaKind::Sma,
        TaKind::Ema,
        TaKind::Wma,
        TaKind::Rma,
        TaKind::Hma,
        TaKind::Rsi,
        TaKind::Roc,
        TaKind::Stddev,
        TaKind::Highest,
        TaKind::Lowest,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            TaKind::Sma => "SMA",
            TaKind::Ema => "EMA",
            TaKind::Wma => "WMA",
            TaKind::Rma => "RMA",
            TaKind::Hma => "HMA",
            TaKind::Rsi => "RSI",
            TaKind::Roc => "ROC",
            TaKind::Stddev => "STDDEV",
            TaKind::Highest => "HIGHEST",
            TaKind::Lowest => "LOWEST",
        }
    }

    fn build<'a>(&self, source: DynSeries<'a>, period: usize) -> DynSeries<'a> {
        match self {
            TaKind::Sma => MaKind::Sma.build(source, period),
            TaKind::Ema => MaKind::Ema.build(source, period),
            TaKind::Wma => MaKind::Wma.build(source, period),
            TaKind::Rma => MaKind::Rma.build(source, period),
            TaKind::Hma => MaKind::Hma.build(source, period),
            TaKind::Rsi => Box::new(RsiSeries::new(source, period)),
            TaKind::Roc => Box::new(RocSeries::new(source, period)),
            TaKind::Stddev => Box::new(StddevSeries::new(source, period)),
            TaKind::Highest => Box::new(HighestSeries::new(source, period)),
            TaKind::Lowest => Box::new(LowestSeries::new(source, period)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Value(f64),
    Data(String),
    Open,
    High,
    Low,
    Close,
    Volume,
    Changes {
        source: Box<Method>,
    },
    Ta {
        kind: TaKind,
        period: usize,
        source: Box<Method>,
    },
    Rvol {
        period: usize,
    },
    Atr {
        period: usize,
        multiplier: f64,
    },
    Kc {
        ma: Box<Method>,
        range: Box<Method>,
        multiplier: f64,
    },
    Bb {
        ma_kind: MaKind,
        source: Box<Method>,
        period: usize,
        stddev: f64,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
        source: Box<Method>,
    },
    Stoch {
        k_period: usize,
        k_smooth: usize,
        d_period: usize,
    },
    StochRsi {
        rsi_source: Box<Method>,
        rsi_period: usize,
        k_period: usize,
        k_smooth: usize,
        d_period: usize,
    },
    Reference(String),
    Lookback {
        period: usize,
        source: Box<Method>,
    },
    SelectOutput {
        output: OutputName,
        source: Box<Method>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Method>,
        right: Box<Method>,
    },
    Negate(Box<Method>),
    Abs(Box<Method>),
    Percentage {
        base: Box<Method>,
        percent: f64,
    },
    Divergence {
        kind: DivergenceKind,
        signal: Box<Method>,
        reference: Box<Method>,
        pivot_range: usize,
        lookback_range: usize,
    },
}

/// Evaluation environment for methods: where named references resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodContext<'a> {
    registry: Option<&'a SeriesRegistry>,
}

impl<'a> MethodContext<'a> {
    pub fn new(registry: &'a SeriesRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn resolve(&self, name: &str) -> Result<&'a Method, BarreplayError> {
        self.registry
            .and_then(|registry| registry.get(name))
            .ok_or_else(|| BarreplayError::UnresolvedReference {
                name: name.to_string(),
            })
    }
}

impl Method {
    pub fn ta(kind: TaKind, period: usize, source: Method) -> Self {
        Method::Ta {
            kind,
            period,
            source: Box::new(source),
        }
    }

    pub fn binary(op: BinaryOp, left: Method, right: Method) -> Self {
        Method::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Method::Reference(name.into())
    }

    /// Registry tag identifying this operator in JSON.
    pub fn tag(&self) -> &'static str {
        match self {
            Method::Value(_) => "VALUE",
            Method::Data(_) => "DATA",
            Method::Open => "OPEN",
            Method::High => "HIGH",
            Method::Low => "LOW",
            Method::Close => "CLOSE",
            Method::Volume => "VOLUME",
            Method::Changes { .. } => "CHANGE",
            Method::Ta { kind, .. } => kind.tag(),
            Method::Rvol { .. } => "RVOL",
            Method::Atr { .. } => "ATR",
            Method::Kc { .. } => "KC",
            Method::Bb { .. } => "BB",
            Method::Macd { .. } => "MACD",
            Method::Stoch { .. } => "STOCH",
            Method::StochRsi { .. } => "STOCH_RSI",
            Method::Reference(_) => "REFERENCE",
            Method::Lookback { .. } => "LOOKBACK",
            Method::SelectOutput { .. } => "SELECT_OUTPUT",
            Method::Binary { op, .. } => match op {
                BinaryOp::Add => "ADD",
                BinaryOp::Subtract => "SUBTRACT",
                BinaryOp::Multiply => "MULTIPLY",
                BinaryOp::Divide => "DIVIDE",
                BinaryOp::Max => "MAX",
                BinaryOp::Min => "MIN",
                BinaryOp::AbsDiff => "ABS_DIFF",
            },
            Method::Negate(_) => "NEGATE",
            Method::Abs(_) => "ABS",
            Method::Percentage { .. } => "PERCENTAGE",
            Method::Divergence { kind, .. } => match kind {
                DivergenceKind::Bullish => "BULLISH_DIVERGENCE",
                DivergenceKind::HiddenBullish => "HIDDEN_BULLISH_DIVERGENCE",
            },
        }
    }

    /// Current value: the series at index 0.
    pub fn value(
        &self,
        snapshot: AssetSnapshot<'_>,
        ctx: MethodContext<'_>,
    ) -> Result<f64, BarreplayError> {
        Ok(self.series(snapshot, ctx)?.value_at(0))
    }

    /// The full lazy series for this expression at `snapshot`.
    pub fn series<'a>(
        &'a self,
        snapshot: AssetSnapshot<'a>,
        ctx: MethodContext<'a>,
    ) -> Result<DynSeries<'a>, BarreplayError> {
        self.build(snapshot, ctx, &mut Vec::new())
    }

    /// Direct references this expression makes, in tree order.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    pub(crate) fn collect_references<'m>(&'m self, names: &mut Vec<&'m str>) {
        match self {
            Method::Reference(name) => names.push(name.as_str()),
            Method::Changes { source }
            | Method::Ta { source, .. }
            | Method::Bb { source, .. }
            | Method::Macd { source, .. }
            | Method::Lookback { source, .. }
            | Method::SelectOutput { source, .. }
            | Method::Negate(source)
            | Method::Abs(source)
            | Method::Percentage { base: source, .. }
            | Method::StochRsi {
                rsi_source: source, ..
            } => source.collect_references(names),
            Method::Kc { ma, range, .. } => {
                ma.collect_references(names);
                range.collect_references(names);
            }
            Method::Binary { left, right, .. } => {
                left.collect_references(names);
                right.collect_references(names);
            }
            Method::Divergence {
                signal, reference, ..
            } => {
                signal.collect_references(names);
                reference.collect_references(names);
            }
            Method::Value(_)
            | Method::Data(_)
            | Method::Open
            | Method::High
            | Method::Low
            | Method::Close
            | Method::Volume
            | Method::Rvol { .. }
            | Method::Atr { .. }
            | Method::Stoch { .. } => {}
        }
    }

    fn build<'a>(
        &'a self,
        snapshot: AssetSnapshot<'a>,
        ctx: MethodContext<'a>,
        resolving: &mut Vec<&'a str>,
    ) -> Result<DynSeries<'a>, BarreplayError> {
        let series: DynSeries<'a> = match self {
            Method::Value(value) => Box::new(RepeatSeries::new(*value, snapshot.size())),
            Method::Data(field) => Box::new(snapshot.series(field)),
            Method::Open => Box::new(snapshot.series(OPEN)),
            Method::High => Box::new(snapshot.series(HIGH)),
            Method::Low => Box::new(snapshot.series(LOW)),
            Method::Close => Box::new(snapshot.series(CLOSE)),
            Method::Volume => Box::new(snapshot.series(VOLUME)),
            Method::Changes { source } => {
                Box::new(ChangeSeries::new(source.build(snapshot, ctx, resolving)?))
            }
            Method::Ta {
                kind,
                period,
                source,
            } => kind.build(source.build(snapshot, ctx, resolving)?, *period),
            Method::Rvol { period } => Box::new(RvolSeries::new(snapshot.series(VOLUME), *period)),
            Method::Atr { period, multiplier } => Box::new(AtrSeries::new(
                snapshot.series(HIGH),
                snapshot.series(LOW),
                snapshot.series(CLOSE),
                *period,
                *multiplier,
            )),
            Method::Kc {
                ma,
                range,
                multiplier,
            } => {
                let ma = ma.build(snapshot, ctx, resolving)?;
                let range = range.build(snapshot, ctx, resolving)?;
                Box::new(KcSeries::new(ma, range, *multiplier))
            }
            Method::Bb {
                ma_kind,
                source,
                period,
                stddev,
            } => {
                let ma = ma_kind.build(source.build(snapshot, ctx, resolving)?, *period);
                let source = source.build(snapshot, ctx, resolving)?;
                Box::new(BbSeries::new(source, ma, *period, *stddev))
            }
            Method::Macd {
                fast,
                slow,
                signal,
                source,
            } => {
                let source = source.build(snapshot, ctx, resolving)?;
                Box::new(MacdSeries::new(source, *fast, *slow, *signal))
            }
            Method::Stoch {
                k_period,
                k_smooth,
                d_period,
            } => Box::new(StochSeries::new(
                snapshot.series(HIGH),
                snapshot.series(LOW),
                snapshot.series(CLOSE),
                *k_period,
                *k_smooth,
                *d_period,
            )),
            Method::StochRsi {
                rsi_source,
                rsi_period,
                k_period,
                k_smooth,
                d_period,
            } => Box::new(StochRsiSeries::new(
                rsi_source.build(snapshot, ctx, resolving)?,
                *rsi_period,
                *k_period,
                *k_smooth,
                *d_period,
            )),
            Method::Reference(name) => {
                if resolving.contains(&name.as_str()) {
                    return Err(BarreplayError::ReferenceCycle { name: name.clone() });
                }
                let target = ctx.resolve(name)?;
                resolving.push(name.as_str());
                let resolved = target.build(snapshot, ctx, resolving);
                resolving.pop();
                resolved?
            }
            Method::Lookback { period, source } => {
                Box::new(LookbackSeries::new(source.build(snapshot, ctx, resolving)?, *period))
            }
            Method::SelectOutput { output, source } => {
                let source = source.build(snapshot, ctx, resolving)?;
                Box::new(SelectOutputSeries::new(source, *output))
            }
            Method::Binary { op, left, right } => {
                let left = left.build(snapshot, ctx, resolving)?;
                let right = right.build(snapshot, ctx, resolving)?;
                Box::new(BinarySeries::new(*op, left, right))
            }
            Method::Negate(operand) => {
                let operand = operand.build(snapshot, ctx, resolving)?;
                Box::new(UnarySeries::new(UnaryOp::Negate, operand))
            }
            Method::Abs(operand) => {
                let operand = operand.build(snapshot, ctx, resolving)?;
                Box::new(UnarySeries::new(UnaryOp::Abs, operand))
            }
            Method::Percentage { base, percent } => {
                let base = base.build(snapshot, ctx, resolving)?;
                Box::new(UnarySeries::new(UnaryOp::Percent(*percent), base))
            }
            Method::Divergence {
                kind,
                signal,
                reference,
                pivot_range,
                lookback_range,
            } => {
                let signal = signal.build(snapshot, ctx, resolving)?;
                let reference = reference.build(snapshot, ctx, resolving)?;
                Box::new(DivergenceSeries::new(
                    *kind,
                    signal,
                    reference,
                    *pivot_range,
                    *lookback_range,
                ))
            }
        };
        Ok(series)
    }
}

impl From<f64> for Method {
    fn from(value: f64) -> Self {
        Method::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetHistory;
    use crate::domain::asset::test_support::ohlc_history;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn history(closes: &[f64]) -> AssetHistory {
        let bars: Vec<[f64; 4]> = closes.iter().map(|&c| [c, c + 1.0, c - 1.0, c]).collect();
        ohlc_history(&bars)
    }

    #[test]
    fn value_is_constant_over_history() {
        let h = history(&[1.0, 2.0, 3.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let series = Method::Value(4.5).series(snapshot, MethodContext::empty()).unwrap();
        assert_eq!(series.size(), 3);
        assert_eq!(series.value_at(2), 4.5);
    }

    #[test]
    fn sma_of_close() {
        let h = history(&[1.0, 2.0, 3.0, 4.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let sma = Method::ta(TaKind::Sma, 2, Method::Close);
        assert_relative_eq!(sma.value(snapshot, MethodContext::empty()).unwrap(), 3.5);
        assert_relative_eq!(sma.value(snapshot.shifted(1), MethodContext::empty()).unwrap(), 2.5);
    }

    #[test]
    fn binary_and_percentage() {
        let h = history(&[10.0, 20.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let ctx = MethodContext::empty();
        let spread = Method::binary(BinaryOp::Subtract, Method::High, Method::Low);
        assert_relative_eq!(spread.value(snapshot, ctx).unwrap(), 2.0);
        let pct = Method::Percentage {
            base: Box::new(Method::Close),
            percent: 5.0,
        };
        assert_relative_eq!(pct.value(snapshot, ctx).unwrap(), 1.0);
    }

    #[test]
    fn reference_resolves_through_registry() {
        let h = history(&[1.0, 2.0, 3.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let mut registry = SeriesRegistry::new();
        registry.set("doubled", Method::binary(BinaryOp::Multiply, Method::Close, 2.0.into()));
        let method = Method::reference("doubled");
        let value = method.value(snapshot, MethodContext::new(&registry)).unwrap();
        assert_relative_eq!(value, 6.0);
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let h = history(&[1.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let err = Method::reference("missing")
            .value(snapshot, MethodContext::empty())
            .unwrap_err();
        assert!(matches!(err, BarreplayError::UnresolvedReference { name } if name == "missing"));
    }

    #[test]
    fn reference_cycle_is_detected() {
        let h = history(&[1.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let mut registry = SeriesRegistry::new();
        registry.set("a", Method::reference("b"));
        registry.set("b", Method::Negate(Box::new(Method::reference("a"))));
        let err = Method::reference("a")
            .value(snapshot, MethodContext::new(&registry))
            .unwrap_err();
        assert!(matches!(err, BarreplayError::ReferenceCycle { .. }));
    }

    #[test]
    fn shared_reference_is_not_a_cycle() {
        let h = history(&[1.0, 2.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let mut registry = SeriesRegistry::new();
        registry.set("c", Method::Close);
        let method = Method::binary(BinaryOp::Add, Method::reference("c"), Method::reference("c"));
        let value = method.value(snapshot, MethodContext::new(&registry)).unwrap();
        assert_relative_eq!(value, 4.0);
    }

    #[test]
    fn select_output_reads_band() {
        let h = history(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let bb = Method::Bb {
            ma_kind: MaKind::Sma,
            source: Box::new(Method::Close),
            period: 8,
            stddev: 2.0,
        };
        let upper = Method::SelectOutput {
            output: OutputName::UpperBand,
            source: Box::new(bb.clone()),
        };
        let ctx = MethodContext::empty();
        assert_relative_eq!(bb.value(snapshot, ctx).unwrap(), 5.0);
        assert_relative_eq!(upper.value(snapshot, ctx).unwrap(), 9.0);
    }

    #[test]
    fn lookback_reads_older_bar() {
        let h = history(&[1.0, 2.0, 3.0]);
        let snapshot = AssetSnapshot::new(&h, 0);
        let method = Method::Lookback {
            period: 2,
            source: Box::new(Method::Close),
        };
        assert_relative_eq!(method.value(snapshot, MethodContext::empty()).unwrap(), 1.0);
    }

    #[test]
    fn structural_equality() {
        let a = Method::ta(TaKind::Ema, 10, Method::Close);
        assert_eq!(a, Method::ta(TaKind::Ema, 10, Method::Close));
        assert_ne!(a, Method::ta(TaKind::Ema, 11, Method::Close));
        assert_ne!(a, Method::ta(TaKind::Sma, 10, Method::Close));
    }

    #[test]
    fn references_in_tree_order() {
        let method = Method::binary(
            BinaryOp::Add,
            Method::reference("x"),
            Method::ta(TaKind::Sma, 3, Method::reference("y")),
        );
        assert_eq!(method.references(), vec!["x", "y"]);
    }

    #[test]
    fn tags_are_distinct() {
        let tags: HashSet<&str> = TaKind::ALL.iter().map(TaKind::tag).collect();
        assert_eq!(tags.len(), TaKind::ALL.len());
        assert_eq!(Method::Changes { source: Box::new(Method::Close) }.tag(), "CHANGE");
    }
}
