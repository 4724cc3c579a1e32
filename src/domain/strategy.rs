//! Strategy definition and its JSON document form.

use crate::domain::config_parser::{ConfigParser, JsonMap};
use crate::domain::error::BarreplayError;
use crate::domain::filter::Filter;
use crate::domain::method::{Method, MethodContext};
use crate::domain::series_registry::SeriesRegistry;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StopLoss {
    pub enabled: bool,
    pub trailing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeProfit {
    pub enabled: bool,
    pub risk_multiplier: f64,
}

impl Default for TakeProfit {
    fn default() -> Self {
        TakeProfit {
            enabled: false,
            risk_multiplier: 1.0,
        }
    }
}

/// Entry and exit rules plus risk sizing. Immutable once built; backtests
/// share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub series: SeriesRegistry,
    pub risk: Method,
    pub long_entry: Filter,
    pub long_exit: Filter,
    pub short_entry: Filter,
    pub short_exit: Filter,
    pub stop_loss: StopLoss,
    pub take_profit: TakeProfit,
}

impl Strategy {
    /// A strategy that never trades, sized by `risk`.
    pub fn new(name: impl Into<String>, risk: Method) -> Self {
        Strategy {
            name: name.into(),
            series: SeriesRegistry::new(),
            risk,
            long_entry: Filter::False,
            long_exit: Filter::False,
            short_entry: Filter::False,
            short_exit: Filter::False,
            stop_loss: StopLoss::default(),
            take_profit: TakeProfit::default(),
        }
    }

    /// Context that resolves references against this strategy's series.
    pub fn method_context(&self) -> MethodContext<'_> {
        MethodContext::new(&self.series)
    }

    /// Every reference must name a registered series, and the series must
    /// not reference each other in a cycle.
    pub fn validate(&self) -> Result<(), BarreplayError> {
        let mut names = self.risk.references();
        for filter in [
            &self.long_entry,
            &self.long_exit,
            &self.short_entry,
            &self.short_exit,
        ] {
            names.extend(filter.references());
        }
        for (_, method) in self.series.iter() {
            names.extend(method.references());
        }
        if let Some(name) = names.into_iter().find(|name| !self.series.has(name)) {
            return Err(BarreplayError::UnresolvedReference {
                name: name.to_string(),
            });
        }

        for (name, _) in self.series.iter() {
            self.check_acyclic(name, &mut Vec::new())?;
        }
        Ok(())
    }

    fn check_acyclic<'s>(
        &'s self,
        name: &'s str,
        path: &mut Vec<&'s str>,
    ) -> Result<(), BarreplayError> {
        if path.contains(&name) {
            return Err(BarreplayError::ReferenceCycle {
                name: name.to_string(),
            });
        }
        let Some(method) = self.series.get(name) else {
            return Ok(());
        };
        path.push(name);
        for next in method.references() {
            self.check_acyclic(next, path)?;
        }
        path.pop();
        Ok(())
    }
}

/// Parse a strategy document from JSON text.
pub fn parse_strategy_json(name: &str, json: &str) -> Result<Strategy, BarreplayError> {
    let value: Value = serde_json::from_str(json)?;
    parse_strategy(name, &value)
}

/// Parse a strategy document. Nothing is returned unless every part parses
/// and all references resolve.
pub fn parse_strategy(name: &str, json: &Value) -> Result<Strategy, BarreplayError> {
    let root = json.as_object().ok_or_else(|| BarreplayError::StrategyInvalid {
        reason: "strategy document must be a JSON object".into(),
    })?;
    let parser = ConfigParser::with_default_codecs();
    let risk_parser = ConfigParser::risk_parser();

    let mut series = SeriesRegistry::new();
    match root.get("series") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (series_name, expr) in entries {
                series.set(series_name.as_str(), parser.parse_method(expr)?);
            }
        }
        Some(_) => return Err(BarreplayError::invalid("series", "expected an object")),
    }

    let risk = root.get("risk").ok_or_else(|| BarreplayError::missing("risk"))?;
    let risk = risk_parser.parse_method(risk)?;

    let signal = |position: &str, side: &str| -> Result<Filter, BarreplayError> {
        match root
            .get(position)
            .and_then(|p| p.get(side))
            .and_then(|s| s.get("signal"))
        {
            Some(expr) => parser.parse_filter(expr),
            None => Ok(Filter::False),
        }
    };

    let strategy = Strategy {
        name: name.to_string(),
        series,
        risk,
        long_entry: signal("longPosition", "entry")?,
        long_exit: signal("longPosition", "exit")?,
        short_entry: signal("shortPosition", "entry")?,
        short_exit: signal("shortPosition", "exit")?,
        stop_loss: parse_stop_loss(root.get("stopLoss"))?,
        take_profit: parse_take_profit(root.get("takeProfit"))?,
    };
    strategy.validate()?;
    Ok(strategy)
}

fn parse_stop_loss(json: Option<&Value>) -> Result<StopLoss, BarreplayError> {
    match json {
        None | Some(Value::Null) => Ok(StopLoss::default()),
        Some(Value::Bool(enabled)) => Ok(StopLoss {
            enabled: *enabled,
            trailing: false,
        }),
        Some(Value::Object(fields)) => Ok(StopLoss {
            enabled: bool_field(fields, "enabled", true)?,
            trailing: bool_field(fields, "isTrailing", false)?,
        }),
        Some(_) => Err(BarreplayError::invalid(
            "stopLoss",
            "expected a boolean or an object",
        )),
    }
}

fn parse_take_profit(json: Option<&Value>) -> Result<TakeProfit, BarreplayError> {
    match json {
        None | Some(Value::Null) => Ok(TakeProfit::default()),
        Some(Value::Bool(enabled)) => Ok(TakeProfit {
            enabled: *enabled,
            risk_multiplier: 1.0,
        }),
        Some(Value::Object(fields)) => {
            let risk_multiplier = match fields.get("riskMultiplier") {
                None => 1.0,
                Some(value) => value.as_f64().ok_or_else(|| {
                    BarreplayError::invalid("riskMultiplier", "expected a number")
                })?,
            };
            Ok(TakeProfit {
                enabled: bool_field(fields, "enabled", true)?,
                risk_multiplier,
            })
        }
        Some(_) => Err(BarreplayError::invalid(
            "takeProfit",
            "expected a boolean or an object",
        )),
    }
}

fn bool_field(fields: &JsonMap, key: &str, default: bool) -> Result<bool, BarreplayError> {
    match fields.get(key) {
        None => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| BarreplayError::invalid(key, "expected a boolean")),
    }
}

/// Serialize a strategy back into its document form.
pub fn stringify_strategy(strategy: &Strategy) -> Result<Value, BarreplayError> {
    let parser = ConfigParser::with_default_codecs();
    let risk_parser = ConfigParser::risk_parser();

    let mut series = JsonMap::new();
    for (name, method) in strategy.series.iter() {
        series.insert(name.to_string(), parser.serialize_method(method)?);
    }

    let position = |entry: &Filter, exit: &Filter| -> Result<Value, BarreplayError> {
        Ok(serde_json::json!({
            "entry": { "signal": parser.serialize_filter(entry)? },
            "exit": { "signal": parser.serialize_filter(exit)? },
        }))
    };

    let mut root = JsonMap::new();
    root.insert("series".into(), Value::Object(series));
    root.insert("risk".into(), risk_parser.serialize_method(&strategy.risk)?);
    root.insert(
        "longPosition".into(),
        position(&strategy.long_entry, &strategy.long_exit)?,
    );
    root.insert(
        "shortPosition".into(),
        position(&strategy.short_entry, &strategy.short_exit)?,
    );
    root.insert(
        "stopLoss".into(),
        serde_json::json!({
            "enabled": strategy.stop_loss.enabled,
            "isTrailing": strategy.stop_loss.trailing,
        }),
    );
    root.insert(
        "takeProfit".into(),
        serde_json::json!({
            "enabled": strategy.take_profit.enabled,
            "riskMultiplier": strategy.take_profit.risk_multiplier,
        }),
    );
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::OperatorKind;
    use crate::domain::filter::Comparison;
    use crate::domain::method::TaKind;
    use serde_json::json;

    fn sma_cross() -> Value {
        json!({
            "series": {
                "fast": { "method": "SMA", "period": 5 },
                "slow": { "method": "SMA", "period": 20 }
            },
            "risk": { "method": "ATR", "atr": { "period": 14, "multiplier": 2 } },
            "longPosition": {
                "entry": { "signal": { "filter": "CROSSOVER", "signal": "fast", "reference": "slow" } },
                "exit": { "signal": { "filter": "CROSSUNDER", "signal": "fast", "reference": "slow" } }
            },
            "stopLoss": { "isTrailing": true },
            "takeProfit": { "riskMultiplier": 3 }
        })
    }

    mod parse {
        use super::*;

        #[test]
        fn full_document() {
            let strategy = parse_strategy("cross", &sma_cross()).unwrap();
            assert_eq!(strategy.name, "cross");
            assert_eq!(
                strategy.series.get("fast"),
                Some(&Method::ta(TaKind::Sma, 5, Method::Close))
            );
            assert_eq!(
                strategy.risk,
                Method::Atr {
                    period: 14,
                    multiplier: 2.0
                }
            );
            assert_eq!(
                strategy.long_entry,
                Filter::Crossover {
                    signal: Method::reference("fast"),
                    reference: Method::reference("slow"),
                }
            );
            assert_eq!(strategy.short_entry, Filter::False);
            assert_eq!(strategy.short_exit, Filter::False);
            assert_eq!(
                strategy.stop_loss,
                StopLoss {
                    enabled: true,
                    trailing: true
                }
            );
            assert_eq!(
                strategy.take_profit,
                TakeProfit {
                    enabled: true,
                    risk_multiplier: 3.0
                }
            );
        }

        #[test]
        fn absent_stops_are_disabled() {
            let strategy = parse_strategy("s", &json!({ "risk": 1 })).unwrap();
            assert_eq!(
                strategy.stop_loss,
                StopLoss {
                    enabled: false,
                    trailing: false
                }
            );
            assert!(!strategy.take_profit.enabled);
            assert_eq!(strategy.risk, Method::Value(1.0));
        }

        #[test]
        fn boolean_stops() {
            let strategy =
                parse_strategy("s", &json!({ "risk": 1, "stopLoss": true, "takeProfit": false }))
                    .unwrap();
            assert_eq!(
                strategy.stop_loss,
                StopLoss {
                    enabled: true,
                    trailing: false
                }
            );
            assert!(!strategy.take_profit.enabled);
        }

        #[test]
        fn rejects_non_object_stop_loss() {
            let err = parse_strategy("s", &json!({ "risk": 1, "stopLoss": 5 })).unwrap_err();
            assert!(matches!(err, BarreplayError::InvalidValue { field, .. } if field == "stopLoss"));
        }

        #[test]
        fn risk_is_required() {
            let err = parse_strategy("s", &json!({})).unwrap_err();
            assert!(matches!(err, BarreplayError::MissingField { field } if field == "risk"));
        }

        #[test]
        fn unknown_operator_returns_no_strategy() {
            let err = parse_strategy("s", &json!({ "risk": { "method": "NOPE" } })).unwrap_err();
            assert!(matches!(
                err,
                BarreplayError::UnknownOperator { kind: OperatorKind::Method, ref tag } if tag == "NOPE"
            ));
            assert!(err.to_string().contains("NOPE"));
        }

        #[test]
        fn unresolved_reference_fails_at_parse() {
            let doc = json!({
                "risk": 1,
                "longPosition": { "entry": { "signal": {
                    "filter": "GREATER_THAN", "target": "missing", "threshold": 1
                } } }
            });
            let err = parse_strategy("s", &doc).unwrap_err();
            assert!(
                matches!(err, BarreplayError::UnresolvedReference { name } if name == "missing")
            );
        }

        #[test]
        fn reference_cycle_fails_at_parse() {
            let doc = json!({
                "series": { "a": "b", "b": { "method": "ABS", "operand": "a" } },
                "risk": 1
            });
            let err = parse_strategy("s", &doc).unwrap_err();
            assert!(matches!(err, BarreplayError::ReferenceCycle { .. }));
        }

        #[test]
        fn rejects_non_object_document() {
            let err = parse_strategy_json("s", "[1, 2]").unwrap_err();
            assert!(matches!(err, BarreplayError::StrategyInvalid { .. }));
            assert!(matches!(
                parse_strategy_json("s", "{ not json").unwrap_err(),
                BarreplayError::Json(_)
            ));
        }
    }

    mod stringify {
        use super::*;

        #[test]
        fn round_trips() {
            let strategy = parse_strategy("cross", &sma_cross()).unwrap();
            let json = stringify_strategy(&strategy).unwrap();
            assert_eq!(parse_strategy("cross", &json).unwrap(), strategy);
        }

        #[test]
        fn writes_every_section() {
            let mut strategy = Strategy::new("s", Method::Percentage {
                base: Box::new(Method::Close),
                percent: 2.0,
            });
            strategy.short_entry =
                Filter::compare(Comparison::LessThan, Method::Close, 10.0.into());
            let json = stringify_strategy(&strategy).unwrap();
            assert_eq!(json["risk"], json!({ "method": "PERCENTAGE", "percentage": 2.0 }));
            assert_eq!(json["longPosition"]["entry"]["signal"], json!({ "filter": "FALSE" }));
            assert_eq!(
                json["shortPosition"]["entry"]["signal"]["filter"],
                json!("LESS_THAN")
            );
            assert_eq!(json["stopLoss"], json!({ "enabled": false, "isTrailing": false }));
            assert_eq!(
                json["takeProfit"],
                json!({ "enabled": false, "riskMultiplier": 1.0 })
            );
        }
    }
}
