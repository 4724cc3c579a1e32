//! Boolean DSL expressions over methods.

use crate::domain::asset::AssetSnapshot;
use crate::domain::error::BarreplayError;
use crate::domain::method::{Method, MethodContext};
use crate::domain::series::Series;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    pub const ALL: [Comparison; 6] = [
        Comparison::GreaterThan,
        Comparison::GreaterEqual,
        Comparison::LessThan,
        Comparison::LessEqual,
        Comparison::Equal,
        Comparison::NotEqual,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => "GREATER_THAN",
            Comparison::GreaterEqual => "GREATER_EQUAL",
            Comparison::LessThan => "LESS_THAN",
            Comparison::LessEqual => "LESS_EQUAL",
            Comparison::Equal => "EQUAL",
            Comparison::NotEqual => "NOT_EQUAL",
        }
    }

    /// Any comparison with NaN is false, except `NotEqual`.
    pub fn holds(&self, target: f64, threshold: f64) -> bool {
        match self {
            Comparison::GreaterThan => target > threshold,
            Comparison::GreaterEqual => target >= threshold,
            Comparison::LessThan => target < threshold,
            Comparison::LessEqual => target <= threshold,
            Comparison::Equal => target == threshold,
            Comparison::NotEqual => target != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

impl LogicalOp {
    pub fn tag(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Xor => "XOR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    False,
    AllOf(Vec<Filter>),
    AnyOf(Vec<Filter>),
    Crossover {
        signal: Method,
        reference: Method,
    },
    Crossunder {
        signal: Method,
        reference: Method,
    },
    Compare {
        comparison: Comparison,
        target: Method,
        threshold: Method,
    },
    Logical {
        op: LogicalOp,
        first: Box<Filter>,
        second: Box<Filter>,
    },
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(comparison: Comparison, target: Method, threshold: Method) -> Self {
        Filter::Compare {
            comparison,
            target,
            threshold,
        }
    }

    pub fn logical(op: LogicalOp, first: Filter, second: Filter) -> Self {
        Filter::Logical {
            op,
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Filter::True => "TRUE",
            Filter::False => "FALSE",
            Filter::AllOf(_) => "ALL_OF",
            Filter::AnyOf(_) => "ANY_OF",
            Filter::Crossover { .. } => "CROSSOVER",
            Filter::Crossunder { .. } => "CROSSUNDER",
            Filter::Compare { comparison, .. } => comparison.tag(),
            Filter::Logical { op, .. } => op.tag(),
            Filter::Not(_) => "NOT",
        }
    }

    /// Whether the condition holds at `snapshot`. Errors come from methods
    /// that cannot be built, such as an unresolved reference.
    pub fn evaluate(
        &self,
        snapshot: AssetSnapshot<'_>,
        ctx: MethodContext<'_>,
    ) -> Result<bool, BarreplayError> {
        match self {
            Filter::True => Ok(true),
            Filter::False => Ok(false),
            Filter::AllOf(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(snapshot, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::AnyOf(conditions) => {
                for condition in conditions {
                    if condition.evaluate(snapshot, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Crossover { signal, reference } => {
                let signal = signal.series(snapshot, ctx)?;
                let reference = reference.series(snapshot, ctx)?;
                Ok(signal.value_at(0) > reference.value_at(0)
                    && signal.value_at(1) <= reference.value_at(1))
            }
            Filter::Crossunder { signal, reference } => {
                let signal = signal.series(snapshot, ctx)?;
                let reference = reference.series(snapshot, ctx)?;
                Ok(signal.value_at(0) < reference.value_at(0)
                    && signal.value_at(1) >= reference.value_at(1))
            }
            Filter::Compare {
                comparison,
                target,
                threshold,
            } => {
                let target = target.value(snapshot, ctx)?;
                let threshold = threshold.value(snapshot, ctx)?;
                Ok(comparison.holds(target, threshold))
            }
            Filter::Logical { op, first, second } => {
                let first = first.evaluate(snapshot, ctx)?;
                Ok(match op {
                    LogicalOp::And => first && second.evaluate(snapshot, ctx)?,
                    LogicalOp::Or => first || second.evaluate(snapshot, ctx)?,
                    LogicalOp::Xor => first != second.evaluate(snapshot, ctx)?,
                })
            }
            Filter::Not(condition) => Ok(!condition.evaluate(snapshot, ctx)?),
        }
    }

    /// Names referenced by any method inside this filter.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'m>(&'m self, names: &mut Vec<&'m str>) {
        match self {
            Filter::True | Filter::False => {}
            Filter::AllOf(conditions) | Filter::AnyOf(conditions) => {
                for condition in conditions {
                    condition.collect_references(names);
                }
            }
            Filter::Crossover { signal, reference } | Filter::Crossunder { signal, reference } => {
                signal.collect_references(names);
                reference.collect_references(names);
            }
            Filter::Compare {
                target, threshold, ..
            } => {
                target.collect_references(names);
                threshold.collect_references(names);
            }
            Filter::Logical { first, second, .. } => {
                first.collect_references(names);
                second.collect_references(names);
            }
            Filter::Not(condition) => condition.collect_references(names),
        }
    }
}

impl From<bool> for Filter {
    fn from(value: bool) -> Self {
        if value { Filter::True } else { Filter::False }
    }
}
