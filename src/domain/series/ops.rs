//! Elementwise operators over series.

use super::Series;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Max,
    Min,
    AbsDiff,
}

impl BinaryOp {
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        if left.is_nan() || right.is_nan() {
            return f64::NAN;
        }
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Subtract => left - right,
            BinaryOp::Multiply => left * right,
            BinaryOp::Divide => left / right,
            BinaryOp::Max => left.max(right),
            BinaryOp::Min => left.min(right),
            BinaryOp::AbsDiff => (left - right).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Negate,
    Abs,
    /// Positive part, used for RSI gains.
    Gain,
    /// Magnitude of the negative part, used for RSI losses.
    Loss,
    /// `value * factor / 100`.
    Percent(f64),
}

impl UnaryOp {
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        match self {
            UnaryOp::Negate => -value,
            UnaryOp::Abs => value.abs(),
            UnaryOp::Gain => value.max(0.0),
            UnaryOp::Loss => (-value).max(0.0),
            UnaryOp::Percent(percent) => value * (percent / 100.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinarySeries<L, R> {
    op: BinaryOp,
    left: L,
    right: R,
}

impl<L: Series, R: Series> BinarySeries<L, R> {
    pub fn new(op: BinaryOp, left: L, right: R) -> Self {
        Self { op, left, right }
    }
}

impl<L: Series, R: Series> Series for BinarySeries<L, R> {
    fn size(&self) -> usize {
        self.left.size().max(self.right.size())
    }

    fn value_at(&self, index: usize) -> f64 {
        self.op
            .apply(self.left.value_at(index), self.right.value_at(index))
    }
}

#[derive(Debug, Clone)]
pub struct UnarySeries<S> {
    op: UnaryOp,
    source: S,
}

impl<S: Series> UnarySeries<S> {
    pub fn new(op: UnaryOp, source: S) -> Self {
        Self { op, source }
    }
}

impl<S: Series> Series for UnarySeries<S> {
    fn size(&self) -> usize {
        self.source.size()
    }

    fn value_at(&self, index: usize) -> f64 {
        self.op.apply(self.source.value_at(index))
    }
}
