//! JSON codec registry for the method/filter DSL.
//!
//! Each operator tag maps to a codec: a serializer producing the operator's
//! parameter object and a parser building the operator back from it. The
//! discriminator key (`"method"` or `"filter"`) is stamped by the registry,
//! never by the codecs. Nested operands recurse through the same registry,
//! so a parser with overridden codecs applies them at every depth.
//!
//! Shorthands accepted when parsing:
//! - a bare number is `VALUE`;
//! - a bare string `"X"` is `{"method": "X"}`;
//! - a bare boolean is `TRUE` or `FALSE`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::error::{BarreplayError, OperatorKind};
use crate::domain::filter::{Comparison, Filter, LogicalOp};
use crate::domain::method::{Method, TaKind};
use crate::domain::series::{BinaryOp, DivergenceKind, MaKind, OutputName};

pub type JsonMap = Map<String, Value>;

type SerializeFn<T> =
    Box<dyn Fn(&ConfigParser, &T) -> Result<JsonMap, BarreplayError> + Send + Sync>;
type ParseFn<T> = Box<dyn Fn(&ConfigParser, &JsonMap) -> Result<T, BarreplayError> + Send + Sync>;

/// Serializer and parser pair for one operator tag.
pub struct Codec<T> {
    serialize: SerializeFn<T>,
    parse: ParseFn<T>,
}

impl<T> Codec<T> {
    pub fn new<S, P>(serialize: S, parse: P) -> Self
    where
        S: Fn(&ConfigParser, &T) -> Result<JsonMap, BarreplayError> + Send + Sync + 'static,
        P: Fn(&ConfigParser, &JsonMap) -> Result<T, BarreplayError> + Send + Sync + 'static,
    {
        Self {
            serialize: Box::new(serialize),
            parse: Box::new(parse),
        }
    }
}

pub struct ConfigParser {
    methods: HashMap<String, Codec<Method>>,
    filters: HashMap<String, Codec<Filter>>,
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::with_default_codecs()
    }
}

impl std::fmt::Debug for ConfigParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigParser")
            .field("methods", &self.method_tags())
            .field("filters", &self.filter_tags())
            .finish()
    }
}

impl ConfigParser {
    /// A parser with no registered tags.
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    /// A parser knowing every built-in method and filter tag.
    pub fn with_default_codecs() -> Self {
        let mut parser = Self::empty();
        register_default_methods(&mut parser);
        register_default_filters(&mut parser);
        parser
    }

    /// The default parser with the risk sizing shorthands for `ATR`,
    /// `PERCENTAGE` and `VALUE`.
    pub fn risk_parser() -> Self {
        let mut parser = Self::with_default_codecs();
        parser.register_method("ATR", Codec::new(serialize_risk_atr, parse_risk_atr));
        parser.register_method(
            "PERCENTAGE",
            Codec::new(serialize_risk_percentage, parse_risk_percentage),
        );
        parser.register_method("VALUE", Codec::new(serialize_method_fields, parse_value));
        parser
    }

    /// Registers `codec` for `tag`, replacing any previous codec.
    pub fn register_method(&mut self, tag: impl Into<String>, codec: Codec<Method>) {
        self.methods.insert(tag.into(), codec);
    }

    pub fn register_filter(&mut self, tag: impl Into<String>, codec: Codec<Filter>) {
        self.filters.insert(tag.into(), codec);
    }

    pub fn method_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn filter_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn parse_method(&self, json: &Value) -> Result<Method, BarreplayError> {
        match json {
            Value::Number(number) => number
                .as_f64()
                .map(Method::Value)
                .ok_or_else(|| BarreplayError::invalid("value", "number out of range")),
            Value::String(tag) if self.methods.contains_key(tag.as_str()) => {
                self.parse_method_tagged(tag, &JsonMap::new())
            }
            // any other bare string names a registered series
            Value::String(name) => Ok(Method::Reference(name.clone())),
            Value::Object(params) => {
                let tag = discriminator(params, "method")?;
                self.parse_method_tagged(tag, params)
            }
            other => Err(BarreplayError::invalid(
                "method",
                format!("expected a number, string or object, got {}", kind_of(other)),
            )),
        }
    }

    fn parse_method_tagged(&self, tag: &str, params: &JsonMap) -> Result<Method, BarreplayError> {
        let codec = self
            .methods
            .get(tag)
            .ok_or_else(|| BarreplayError::UnknownOperator {
                kind: OperatorKind::Method,
                tag: tag.to_string(),
            })?;
        (codec.parse)(self, params).map_err(|source| BarreplayError::OperatorParse {
            kind: OperatorKind::Method,
            tag: tag.to_string(),
            source: Box::new(source),
        })
    }

    pub fn serialize_method(&self, method: &Method) -> Result<Value, BarreplayError> {
        let tag = method.tag();
        let codec = self
            .methods
            .get(tag)
            .ok_or_else(|| BarreplayError::UnknownOperator {
                kind: OperatorKind::Method,
                tag: tag.to_string(),
            })?;
        let fields = (codec.serialize)(self, method)?;
        Ok(stamp("method", tag, fields))
    }

    pub fn parse_filter(&self, json: &Value) -> Result<Filter, BarreplayError> {
        match json {
            Value::Bool(value) => Ok(Filter::from(*value)),
            Value::String(tag) => self.parse_filter_tagged(tag, &JsonMap::new()),
            Value::Object(params) => {
                let tag = discriminator(params, "filter")?;
                self.parse_filter_tagged(tag, params)
            }
            other => Err(BarreplayError::invalid(
                "filter",
                format!("expected a boolean, string or object, got {}", kind_of(other)),
            )),
        }
    }

    fn parse_filter_tagged(&self, tag: &str, params: &JsonMap) -> Result<Filter, BarreplayError> {
        let codec = self
            .filters
            .get(tag)
            .ok_or_else(|| BarreplayError::UnknownOperator {
                kind: OperatorKind::Filter,
                tag: tag.to_string(),
            })?;
        (codec.parse)(self, params).map_err(|source| BarreplayError::OperatorParse {
            kind: OperatorKind::Filter,
            tag: tag.to_string(),
            source: Box::new(source),
        })
    }

    pub fn serialize_filter(&self, filter: &Filter) -> Result<Value, BarreplayError> {
        let tag = filter.tag();
        let codec = self
            .filters
            .get(tag)
            .ok_or_else(|| BarreplayError::UnknownOperator {
                kind: OperatorKind::Filter,
                tag: tag.to_string(),
            })?;
        let fields = (codec.serialize)(self, filter)?;
        Ok(stamp("filter", tag, fields))
    }
}

fn discriminator<'j>(params: &'j JsonMap, key: &str) -> Result<&'j str, BarreplayError> {
    match params.get(key) {
        Some(Value::String(tag)) => Ok(tag.as_str()),
        Some(other) => Err(BarreplayError::invalid(
            key,
            format!("expected a string, got {}", kind_of(other)),
        )),
        None => Err(BarreplayError::missing(key)),
    }
}

/// Puts the discriminator first, followed by the operator's own fields.
fn stamp(key: &str, tag: &str, fields: JsonMap) -> Value {
    let mut object = JsonMap::new();
    object.insert(key.to_string(), Value::from(tag));
    for (name, value) in fields {
        if name != key {
            object.insert(name, value);
        }
    }
    Value::Object(object)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn required<'j>(params: &'j JsonMap, key: &str) -> Result<&'j Value, BarreplayError> {
    params.get(key).ok_or_else(|| BarreplayError::missing(key))
}

fn as_f64(value: &Value, key: &str) -> Result<f64, BarreplayError> {
    value
        .as_f64()
        .ok_or_else(|| {
            BarreplayError::invalid(key, format!("expected a number, got {}", kind_of(value)))
        })
}

fn as_usize(value: &Value, key: &str) -> Result<usize, BarreplayError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            BarreplayError::invalid(key, format!("expected a non-negative integer, got {value}"))
        })
}

fn as_str<'j>(value: &'j Value, key: &str) -> Result<&'j str, BarreplayError> {
    value
        .as_str()
        .ok_or_else(|| {
            BarreplayError::invalid(key, format!("expected a string, got {}", kind_of(value)))
        })
}

fn f64_or(params: &JsonMap, key: &str, default: f64) -> Result<f64, BarreplayError> {
    params.get(key).map_or(Ok(default), |value| as_f64(value, key))
}

fn usize_or(params: &JsonMap, key: &str, default: usize) -> Result<usize, BarreplayError> {
    params.get(key).map_or(Ok(default), |value| as_usize(value, key))
}

fn method_at(
    parser: &ConfigParser,
    params: &JsonMap,
    key: &str,
) -> Result<Box<Method>, BarreplayError> {
    parser.parse_method(required(params, key)?).map(Box::new)
}

fn method_or(
    parser: &ConfigParser,
    params: &JsonMap,
    key: &str,
    default: Method,
) -> Result<Box<Method>, BarreplayError> {
    match params.get(key) {
        Some(json) => parser.parse_method(json).map(Box::new),
        None => Ok(Box::new(default)),
    }
}

fn filter_at(
    parser: &ConfigParser,
    params: &JsonMap,
    key: &str,
) -> Result<Box<Filter>, BarreplayError> {
    parser.parse_filter(required(params, key)?).map(Box::new)
}

fn filters_at(
    parser: &ConfigParser,
    params: &JsonMap,
    key: &str,
) -> Result<Vec<Filter>, BarreplayError> {
    match required(params, key)? {
        Value::Array(items) => items.iter().map(|item| parser.parse_filter(item)).collect(),
        other => Err(BarreplayError::invalid(
            key,
            format!("expected an array, got {}", kind_of(other)),
        )),
    }
}

fn object(fields: Vec<(&str, Value)>) -> JsonMap {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

const DEFAULT_PERIOD: usize = 14;

fn binary_fields(op: BinaryOp) -> (&'static str, &'static str) {
    match op {
        BinaryOp::Add => ("augend", "addend"),
        BinaryOp::Subtract | BinaryOp::AbsDiff => ("minuend", "subtrahend"),
        BinaryOp::Multiply => ("multiplicand", "multiplier"),
        BinaryOp::Divide => ("dividend", "divisor"),
        BinaryOp::Max | BinaryOp::Min => ("first", "second"),
    }
}

const BINARY_OPS: [BinaryOp; 7] = [
    BinaryOp::Add,
    BinaryOp::Subtract,
    BinaryOp::Multiply,
    BinaryOp::Divide,
    BinaryOp::Max,
    BinaryOp::Min,
    BinaryOp::AbsDiff,
];

/// Default serializer for every method variant.
pub fn serialize_method_fields(
    parser: &ConfigParser,
    method: &Method,
) -> Result<JsonMap, BarreplayError> {
    let fields = match method {
        Method::Value(value) => object(vec![("value", Value::from(*value))]),
        Method::Data(field) => object(vec![("field", Value::from(field.as_str()))]),
        Method::Open | Method::High | Method::Low | Method::Close | Method::Volume => {
            JsonMap::new()
        }
        Method::Changes { source } => object(vec![("source", parser.serialize_method(source)?)]),
        Method::Ta { period, source, .. } => {
            object(vec![
                ("period", Value::from(*period)),
                ("source", parser.serialize_method(source)?),
            ])
        }
        Method::Rvol { period } => object(vec![("period", Value::from(*period))]),
        Method::Atr { period, multiplier } => object(vec![
            ("period", Value::from(*period)),
            ("multiplier", Value::from(*multiplier)),
        ]),
        Method::Kc {
            ma,
            range,
            multiplier,
        } => object(vec![
            ("ma", parser.serialize_method(ma)?),
            ("range", parser.serialize_method(range)?),
            ("multiplier", Value::from(*multiplier)),
        ]),
        Method::Bb {
            ma_kind,
            source,
            period,
            stddev,
        } => object(vec![
            ("maType", Value::from(ma_kind.as_str())),
            ("maSource", parser.serialize_method(source)?),
            ("period", Value::from(*period)),
            ("stddev", Value::from(*stddev)),
        ]),
        Method::Macd {
            fast,
            slow,
            signal,
            source,
        } => object(vec![
            ("fast", Value::from(*fast)),
            ("slow", Value::from(*slow)),
            ("signal", Value::from(*signal)),
            ("source", parser.serialize_method(source)?),
        ]),
        Method::Stoch {
            k_period,
            k_smooth,
            d_period,
        } => object(vec![
            ("kPeriod", Value::from(*k_period)),
            ("kSmooth", Value::from(*k_smooth)),
            ("dPeriod", Value::from(*d_period)),
        ]),
        Method::StochRsi {
            rsi_source,
            rsi_period,
            k_period,
            k_smooth,
            d_period,
        } => object(vec![
            ("rsiSource", parser.serialize_method(rsi_source)?),
            ("rsiPeriod", Value::from(*rsi_period)),
            ("kPeriod", Value::from(*k_period)),
            ("kSmooth", Value::from(*k_smooth)),
            ("dPeriod", Value::from(*d_period)),
        ]),
        Method::Reference(name) => object(vec![("name", Value::from(name.as_str()))]),
        Method::Lookback { period, source } => {
            object(vec![
                ("period", Value::from(*period)),
                ("source", parser.serialize_method(source)?),
            ])
        }
        Method::SelectOutput { output, source } => object(vec![
            ("name", Value::from(output.as_str())),
            ("source", parser.serialize_method(source)?),
        ]),
        Method::Binary { op, left, right } => {
            let (left_key, right_key) = binary_fields(*op);
            object(vec![
                (left_key, parser.serialize_method(left)?),
                (right_key, parser.serialize_method(right)?),
            ])
        }
        Method::Negate(operand) | Method::Abs(operand) => object(vec![
            ("operand", parser.serialize_method(operand)?),
        ]),
        Method::Percentage { base, percent } => {
            object(vec![
                ("base", parser.serialize_method(base)?),
                ("percent", Value::from(*percent)),
            ])
        }
        Method::Divergence {
            signal,
            reference,
            pivot_range,
            lookback_range,
            ..
        } => object(vec![
            ("signal", parser.serialize_method(signal)?),
            ("reference", parser.serialize_method(reference)?),
            ("pivotRange", Value::from(*pivot_range)),
            ("lookbackRange", Value::from(*lookback_range)),
        ]),
    };
    Ok(fields)
}

fn parse_value(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Value(as_f64(required(params, "value")?, "value")?))
}

fn parse_data(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    let field = as_str(required(params, "field")?, "field")?;
    Ok(Method::Data(field.to_string()))
}

fn parse_changes(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Changes {
        source: method_or(parser, params, "source", Method::Close)?,
    })
}

fn parse_ta(
    parser: &ConfigParser,
    params: &JsonMap,
    kind: TaKind,
) -> Result<Method, BarreplayError> {
    Ok(Method::Ta {
        kind,
        period: usize_or(params, "period", DEFAULT_PERIOD)?,
        source: method_or(parser, params, "source", Method::Close)?,
    })
}

fn parse_rvol(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Rvol {
        period: usize_or(params, "period", DEFAULT_PERIOD)?,
    })
}

fn parse_atr(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Atr {
        period: usize_or(params, "period", DEFAULT_PERIOD)?,
        multiplier: f64_or(params, "multiplier", 1.0)?,
    })
}

fn parse_kc(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Kc {
        ma: method_at(parser, params, "ma")?,
        range: method_at(parser, params, "range")?,
        multiplier: f64_or(params, "multiplier", 2.0)?,
    })
}

fn parse_bb(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    let ma_kind = match params.get("maType") {
        Some(value) => {
            let name = as_str(value, "maType")?;
            MaKind::parse(name).ok_or_else(|| {
                BarreplayError::invalid("maType", format!("unknown moving average '{name}'"))
            })?
        }
        None => MaKind::Sma,
    };
    Ok(Method::Bb {
        ma_kind,
        source: method_or(parser, params, "maSource", Method::Close)?,
        period: usize_or(params, "period", 20)?,
        stddev: f64_or(params, "stddev", 2.0)?,
    })
}

fn parse_macd(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Macd {
        fast: usize_or(params, "fast", 12)?,
        slow: usize_or(params, "slow", 26)?,
        signal: usize_or(params, "signal", 9)?,
        source: method_or(parser, params, "source", Method::Close)?,
    })
}

fn parse_stoch(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Stoch {
        k_period: usize_or(params, "kPeriod", 5)?,
        k_smooth: usize_or(params, "kSmooth", 3)?,
        d_period: usize_or(params, "dPeriod", 3)?,
    })
}

fn parse_stoch_rsi(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::StochRsi {
        rsi_source: method_or(parser, params, "rsiSource", Method::Close)?,
        rsi_period: usize_or(params, "rsiPeriod", DEFAULT_PERIOD)?,
        k_period: usize_or(params, "kPeriod", 5)?,
        k_smooth: usize_or(params, "kSmooth", 3)?,
        d_period: usize_or(params, "dPeriod", 3)?,
    })
}

fn parse_reference(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    let name = as_str(required(params, "name")?, "name")?;
    Ok(Method::Reference(name.to_string()))
}

fn parse_lookback(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Lookback {
        period: usize_or(params, "period", 1)?,
        source: method_or(parser, params, "source", Method::Close)?,
    })
}

fn parse_select_output(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    let output = match params.get("name") {
        Some(value) => {
            let name = as_str(value, "name")?;
            OutputName::parse(name)
                .ok_or_else(|| BarreplayError::invalid("name", format!("unknown output '{name}'")))?
        }
        None => OutputName::Default,
    };
    Ok(Method::SelectOutput {
        output,
        source: method_or(parser, params, "source", Method::Close)?,
    })
}

fn parse_binary(
    parser: &ConfigParser,
    params: &JsonMap,
    op: BinaryOp,
) -> Result<Method, BarreplayError> {
    let (left_key, right_key) = binary_fields(op);
    Ok(Method::Binary {
        op,
        left: method_at(parser, params, left_key)?,
        right: method_at(parser, params, right_key)?,
    })
}

fn parse_percentage(parser: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    Ok(Method::Percentage {
        base: method_or(parser, params, "base", Method::Close)?,
        percent: f64_or(params, "percent", 100.0)?,
    })
}

fn parse_divergence(
    parser: &ConfigParser,
    params: &JsonMap,
    kind: DivergenceKind,
) -> Result<Method, BarreplayError> {
    Ok(Method::Divergence {
        kind,
        signal: method_or(
            parser,
            params,
            "signal",
            Method::ta(TaKind::Rsi, DEFAULT_PERIOD, Method::Close),
        )?,
        reference: method_or(parser, params, "reference", Method::Close)?,
        pivot_range: usize_or(params, "pivotRange", 5)?,
        lookback_range: usize_or(params, "lookbackRange", 60)?,
    })
}

fn register_default_methods(parser: &mut ConfigParser) {
    let codec = |parse: fn(&ConfigParser, &JsonMap) -> Result<Method, BarreplayError>| {
        Codec::new(serialize_method_fields, parse)
    };

    parser.register_method("VALUE", codec(parse_value));
    parser.register_method("DATA", codec(parse_data));
    parser.register_method("OPEN", codec(|_, _| Ok(Method::Open)));
    parser.register_method("HIGH", codec(|_, _| Ok(Method::High)));
    parser.register_method("LOW", codec(|_, _| Ok(Method::Low)));
    parser.register_method("CLOSE", codec(|_, _| Ok(Method::Close)));
    parser.register_method("VOLUME", codec(|_, _| Ok(Method::Volume)));
    parser.register_method("CHANGE", codec(parse_changes));
    for kind in TaKind::ALL {
        parser.register_method(
            kind.tag(),
            Codec::new(serialize_method_fields, move |p, params| parse_ta(p, params, kind)),
        );
    }
    parser.register_method("RVOL", codec(parse_rvol));
    parser.register_method("ATR", codec(parse_atr));
    parser.register_method("KC", codec(parse_kc));
    parser.register_method("BB", codec(parse_bb));
    parser.register_method("MACD", codec(parse_macd));
    parser.register_method("STOCH", codec(parse_stoch));
    parser.register_method("STOCH_RSI", codec(parse_stoch_rsi));
    parser.register_method("REFERENCE", codec(parse_reference));
    parser.register_method("LOOKBACK", codec(parse_lookback));
    parser.register_method("SELECT_OUTPUT", codec(parse_select_output));
    for op in BINARY_OPS {
        let tag = Method::binary(op, Method::Close, Method::Close).tag();
        parser.register_method(
            tag,
            Codec::new(serialize_method_fields, move |p, params| parse_binary(p, params, op)),
        );
    }
    parser.register_method(
        "NEGATE",
        codec(|p, params| Ok(Method::Negate(method_at(p, params, "operand")?))),
    );
    parser.register_method(
        "ABS",
        codec(|p, params| Ok(Method::Abs(method_at(p, params, "operand")?))),
    );
    parser.register_method("PERCENTAGE", codec(parse_percentage));
    parser.register_method(
        "BULLISH_DIVERGENCE",
        codec(|p, params| parse_divergence(p, params, DivergenceKind::Bullish)),
    );
    parser.register_method(
        "HIDDEN_BULLISH_DIVERGENCE",
        codec(|p, params| parse_divergence(p, params, DivergenceKind::HiddenBullish)),
    );
}

// Risk sizing shorthands.

fn serialize_risk_atr(parser: &ConfigParser, method: &Method) -> Result<JsonMap, BarreplayError> {
    match method {
        Method::Atr { period, multiplier } => {
            let atr = object(vec![
                ("period", Value::from(*period)),
                ("multiplier", Value::from(*multiplier)),
            ]);
            Ok(object(vec![("atr", Value::Object(atr))]))
        }
        other => serialize_method_fields(parser, other),
    }
}

fn parse_risk_atr(_: &ConfigParser, params: &JsonMap) -> Result<Method, BarreplayError> {
    let (mut period, mut multiplier) = (DEFAULT_PERIOD, 1.0);
    if let Some(Value::Object(atr)) = params.get("atr") {
        period = usize_or(atr, "period", period)?;
        multiplier = f64_or(atr, "multiplier", multiplier)?;
    }
    Ok(Method::Atr { period, multiplier })
}

fn serialize_risk_percentage(
    parser: &ConfigParser,
    method: &Method,
) -> Result<JsonMap, BarreplayError> {
    match method {
        Method::Percentage { base, percent } if **base == Method::Close => {
            Ok(object(vec![("percentage", Value::from(*percent))]))
        }
        other => serialize_method_fields(parser, other),
    }
}

fn parse_risk_percentage(
    parser: &ConfigParser,
    params: &JsonMap,
) -> Result<Method, BarreplayError> {
    match params.get("percentage") {
        Some(value) => Ok(Method::Percentage {
            base: Box::new(Method::Close),
            percent: as_f64(value, "percentage")?,
        }),
        None => parse_percentage(parser, params),
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Default serializer for every filter variant.
pub fn serialize_filter_fields(
    parser: &ConfigParser,
    filter: &Filter,
) -> Result<JsonMap, BarreplayError> {
    let fields = match filter {
        Filter::True | Filter::False => JsonMap::new(),
        Filter::AllOf(conditions) | Filter::AnyOf(conditions) => {
            let conditions = conditions
                .iter()
                .map(|condition| parser.serialize_filter(condition))
                .collect::<Result<Vec<Value>, _>>()?;
            object(vec![("conditions", Value::Array(conditions))])
        }
        Filter::Crossover { signal, reference } | Filter::Crossunder { signal, reference } => {
            object(vec![
                ("signal", parser.serialize_method(signal)?),
                ("reference", parser.serialize_method(reference)?),
            ])
        }
        Filter::Compare {
            target, threshold, ..
        } => object(vec![
            ("target", parser.serialize_method(target)?),
            ("threshold", parser.serialize_method(threshold)?),
        ]),
        Filter::Logical { first, second, .. } => object(vec![
            ("firstCondition", parser.serialize_filter(first)?),
            ("secondCondition", parser.serialize_filter(second)?),
        ]),
        Filter::Not(condition) => object(vec![("condition", parser.serialize_filter(condition)?)]),
    };
    Ok(fields)
}

fn parse_crossing(
    parser: &ConfigParser,
    params: &JsonMap,
    over: bool,
) -> Result<Filter, BarreplayError> {
    let signal = *method_at(parser, params, "signal")?;
    let reference = *method_at(parser, params, "reference")?;
    Ok(if over {
        Filter::Crossover { signal, reference }
    } else {
        Filter::Crossunder { signal, reference }
    })
}

fn parse_comparison(
    parser: &ConfigParser,
    params: &JsonMap,
    comparison: Comparison,
) -> Result<Filter, BarreplayError> {
    Ok(Filter::Compare {
        comparison,
        target: *method_at(parser, params, "target")?,
        threshold: *method_at(parser, params, "threshold")?,
    })
}

fn parse_logical(
    parser: &ConfigParser,
    params: &JsonMap,
    op: LogicalOp,
) -> Result<Filter, BarreplayError> {
    Ok(Filter::Logical {
        op,
        first: filter_at(parser, params, "firstCondition")?,
        second: filter_at(parser, params, "secondCondition")?,
    })
}

fn register_default_filters(parser: &mut ConfigParser) {
    let codec = |parse: fn(&ConfigParser, &JsonMap) -> Result<Filter, BarreplayError>| {
        Codec::new(serialize_filter_fields, parse)
    };

    parser.register_filter("TRUE", codec(|_, _| Ok(Filter::True)));
    parser.register_filter("FALSE", codec(|_, _| Ok(Filter::False)));
    parser.register_filter(
        "ALL_OF",
        codec(|p, params| Ok(Filter::AllOf(filters_at(p, params, "conditions")?))),
    );
    parser.register_filter(
        "ANY_OF",
        codec(|p, params| Ok(Filter::AnyOf(filters_at(p, params, "conditions")?))),
    );
    parser.register_filter("CROSSOVER", codec(|p, params| parse_crossing(p, params, true)));
    parser.register_filter("CROSSUNDER", codec(|p, params| parse_crossing(p, params, false)));
    for comparison in Comparison::ALL {
        parser.register_filter(
            comparison.tag(),
            Codec::new(serialize_filter_fields, move |p, params| {
                parse_comparison(p, params, comparison)
            }),
        );
    }
    for op in [LogicalOp::And, LogicalOp::Or, LogicalOp::Xor] {
        parser.register_filter(
            op.tag(),
            Codec::new(serialize_filter_fields, move |p, params| parse_logical(p, params, op)),
        );
    }
    parser.register_filter(
        "NOT",
        codec(|p, params| Ok(Filter::Not(filter_at(p, params, "condition")?))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn parser() -> ConfigParser {
        ConfigParser::with_default_codecs()
    }

    fn sample_methods() -> Vec<Method> {
        let close = || Box::new(Method::Close);
        let mut methods = vec![
            Method::Value(42.5),
            Method::Data("vwap".to_string()),
            Method::Open,
            Method::High,
            Method::Low,
            Method::Close,
            Method::Volume,
            Method::Changes { source: close() },
            Method::Rvol { period: 10 },
            Method::Atr {
                period: 7,
                multiplier: 1.5,
            },
            Method::Kc {
                ma: Box::new(Method::ta(TaKind::Ema, 20, Method::Close)),
                range: Box::new(Method::Atr {
                    period: 10,
                    multiplier: 1.0,
                }),
                multiplier: 2.5,
            },
            Method::Bb {
                ma_kind: MaKind::Wma,
                source: close(),
                period: 21,
                stddev: 1.5,
            },
            Method::Macd {
                fast: 8,
                slow: 21,
                signal: 5,
                source: close(),
            },
            Method::Stoch {
                k_period: 14,
                k_smooth: 3,
                d_period: 4,
            },
            Method::StochRsi {
                rsi_source: close(),
                rsi_period: 10,
                k_period: 6,
                k_smooth: 2,
                d_period: 2,
            },
            Method::reference("fast"),
            Method::Lookback {
                period: 3,
                source: close(),
            },
            Method::SelectOutput {
                output: OutputName::Histogram,
                source: Box::new(Method::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9,
                    source: close(),
                }),
            },
            Method::Negate(close()),
            Method::Abs(Box::new(Method::Changes { source: close() })),
            Method::Percentage {
                base: Box::new(Method::High),
                percent: 2.5,
            },
            Method::Divergence {
                kind: DivergenceKind::Bullish,
                signal: Box::new(Method::ta(TaKind::Rsi, 14, Method::Close)),
                reference: close(),
                pivot_range: 3,
                lookback_range: 40,
            },
            Method::Divergence {
                kind: DivergenceKind::HiddenBullish,
                signal: Box::new(Method::ta(TaKind::Rsi, 9, Method::Close)),
                reference: Box::new(Method::Low),
                pivot_range: 4,
                lookback_range: 30,
            },
        ];
        for kind in TaKind::ALL {
            methods.push(Method::ta(kind, 9, Method::Open));
        }
        for op in BINARY_OPS {
            methods.push(Method::binary(op, Method::High, Method::Value(2.0)));
        }
        methods
    }

    fn sample_filters() -> Vec<Filter> {
        let fast = || Method::ta(TaKind::Ema, 10, Method::Close);
        let slow = || Method::ta(TaKind::Sma, 30, Method::Close);
        let mut filters = vec![
            Filter::True,
            Filter::False,
            Filter::AllOf(vec![Filter::True, Filter::False]),
            Filter::AnyOf(vec![]),
            Filter::Crossover {
                signal: fast(),
                reference: slow(),
            },
            Filter::Crossunder {
                signal: fast(),
                reference: slow(),
            },
            Filter::Not(Box::new(Filter::True)),
        ];
        for comparison in Comparison::ALL {
            filters.push(Filter::compare(comparison, Method::Close, Method::Value(100.0)));
        }
        for op in [LogicalOp::And, LogicalOp::Or, LogicalOp::Xor] {
            filters.push(Filter::logical(op, Filter::True, Filter::False));
        }
        filters
    }

    mod methods {
        use super::*;

        #[test]
        fn every_registered_method_round_trips() {
            let parser = parser();
            let methods = sample_methods();
            for method in &methods {
                let json = parser.serialize_method(method).unwrap();
                assert_eq!(json["method"], method.tag(), "{json}");
                let parsed = parser.parse_method(&json).unwrap();
                assert_eq!(&parsed, method, "round trip of {json}");
            }
            let covered: HashSet<&str> = methods.iter().map(Method::tag).collect();
            for tag in parser.method_tags() {
                assert!(covered.contains(tag), "no sample for {tag}");
            }
        }

        #[test]
        fn shorthands() {
            let parser = parser();
            assert_eq!(parser.parse_method(&json!(3.5)).unwrap(), Method::Value(3.5));
            assert_eq!(parser.parse_method(&json!("CLOSE")).unwrap(), Method::Close);
            assert_eq!(
                parser.parse_method(&json!("fast")).unwrap(),
                Method::reference("fast")
            );
            assert_eq!(
                parser.parse_method(&json!({"method": "SMA"})).unwrap(),
                Method::ta(TaKind::Sma, 14, Method::Close)
            );
        }

        #[test]
        fn defaults_applied() {
            let parser = parser();
            let bb = parser.parse_method(&json!({"method": "BB"})).unwrap();
            assert_eq!(
                bb,
                Method::Bb {
                    ma_kind: MaKind::Sma,
                    source: Box::new(Method::Close),
                    period: 20,
                    stddev: 2.0,
                }
            );
            let macd = parser.parse_method(&json!({"method": "MACD"})).unwrap();
            assert!(matches!(
                macd,
                Method::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9,
                    ..
                }
            ));
            let divergence = parser
                .parse_method(&json!({"method": "BULLISH_DIVERGENCE"}))
                .unwrap();
            assert!(matches!(
                divergence,
                Method::Divergence {
                    pivot_range: 5,
                    lookback_range: 60,
                    ..
                }
            ));
        }

        #[test]
        fn nested_operands() {
            let parser = parser();
            let json = json!({
                "method": "SUBTRACT",
                "minuend": {"method": "EMA", "period": 5},
                "subtrahend": {"method": "SMA", "period": 20, "source": "OPEN"}
            });
            assert_eq!(
                parser.parse_method(&json).unwrap(),
                Method::binary(
                    BinaryOp::Subtract,
                    Method::ta(TaKind::Ema, 5, Method::Close),
                    Method::ta(TaKind::Sma, 20, Method::Open),
                )
            );
        }

        #[test]
        fn discriminator_comes_first() {
            let parser = parser();
            let rsi = Method::ta(TaKind::Rsi, 14, Method::Close);
            let json = parser.serialize_method(&rsi).unwrap();
            let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
            assert_eq!(keys, vec!["method", "period", "source"]);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn unknown_tag_is_named() {
            let err = parser().parse_method(&json!({"method": "NOPE"})).unwrap_err();
            assert!(matches!(&err, BarreplayError::UnknownOperator { tag, .. } if tag == "NOPE"));
            assert_eq!(err.to_string(), "Unknown method: NOPE");
        }

        #[test]
        fn nested_unknown_tag_is_wrapped() {
            let json = json!({"method": "SMA", "source": {"method": "NOPE"}});
            let err = parser().parse_method(&json).unwrap_err();
            let message = err.to_string();
            assert!(message.starts_with("Error parsing method SMA"), "{message}");
            assert!(message.contains("NOPE"), "{message}");
        }

        #[test]
        fn missing_required_field() {
            let err = parser().parse_method(&json!({"method": "ADD", "augend": 1})).unwrap_err();
            match err {
                BarreplayError::OperatorParse { tag, source, .. } => {
                    assert_eq!(tag, "ADD");
                    assert!(matches!(
                        *source,
                        BarreplayError::MissingField { ref field } if field == "addend"
                    ));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn wrong_value_kind() {
            let parser = parser();
            assert!(parser.parse_method(&json!({"method": "SMA", "period": "ten"})).is_err());
            assert!(parser.parse_method(&json!({"method": "SMA", "period": -3})).is_err());
            assert!(parser.parse_method(&json!([1, 2])).is_err());
            assert!(parser.parse_method(&json!({"period": 3})).is_err());
            assert!(parser.parse_filter(&json!(1.0)).is_err());
        }

        #[test]
        fn unknown_filter_tag() {
            let err = parser().parse_filter(&json!({"filter": "MAYBE"})).unwrap_err();
            assert_eq!(err.to_string(), "Unknown filter: MAYBE");
        }

        #[test]
        fn unregistered_tag_cannot_serialize() {
            let parser = ConfigParser::empty();
            assert!(matches!(
                parser.serialize_method(&Method::Close),
                Err(BarreplayError::UnknownOperator { .. })
            ));
        }
    }

    mod filters {
        use super::*;

        #[test]
        fn every_registered_filter_round_trips() {
            let parser = parser();
            let filters = sample_filters();
            for filter in &filters {
                let json = parser.serialize_filter(filter).unwrap();
                assert_eq!(json["filter"], filter.tag());
                assert_eq!(&parser.parse_filter(&json).unwrap(), filter, "round trip of {json}");
            }
            let covered: HashSet<&str> = filters.iter().map(Filter::tag).collect();
            for tag in parser.filter_tags() {
                assert!(covered.contains(tag), "no sample for {tag}");
            }
        }

        #[test]
        fn booleans_are_constant_filters() {
            let parser = parser();
            assert_eq!(parser.parse_filter(&json!(true)).unwrap(), Filter::True);
            assert_eq!(parser.parse_filter(&json!(false)).unwrap(), Filter::False);
        }

        #[test]
        fn conditions_must_be_an_array() {
            let err = parser()
                .parse_filter(&json!({"filter": "ALL_OF", "conditions": true}))
                .unwrap_err();
            assert!(err.to_string().contains("ALL_OF"));
        }
    }

    mod risk {
        use super::*;

        #[test]
        fn atr_nested_form() {
            let parser = ConfigParser::risk_parser();
            let json = json!({"method": "ATR", "atr": {"period": 10, "multiplier": 2.0}});
            let method = parser.parse_method(&json).unwrap();
            assert_eq!(
                method,
                Method::Atr {
                    period: 10,
                    multiplier: 2.0
                }
            );
            assert_eq!(parser.serialize_method(&method).unwrap(), json);
        }

        #[test]
        fn atr_defaults_without_block() {
            let method = ConfigParser::risk_parser()
                .parse_method(&json!({"method": "ATR"}))
                .unwrap();
            assert_eq!(
                method,
                Method::Atr {
                    period: 14,
                    multiplier: 1.0
                }
            );
        }

        #[test]
        fn percentage_of_close() {
            let parser = ConfigParser::risk_parser();
            let json = json!({"method": "PERCENTAGE", "percentage": 2.0});
            let method = parser.parse_method(&json).unwrap();
            assert_eq!(
                method,
                Method::Percentage {
                    base: Box::new(Method::Close),
                    percent: 2.0
                }
            );
            assert_eq!(parser.serialize_method(&method).unwrap(), json);
        }

        #[test]
        fn other_tags_fall_back_to_defaults() {
            let parser = ConfigParser::risk_parser();
            let method = Method::binary(
                BinaryOp::Multiply,
                Method::ta(TaKind::Stddev, 20, Method::Close),
                2.0.into(),
            );
            let json = parser.serialize_method(&method).unwrap();
            assert_eq!(parser.parse_method(&json).unwrap(), method);
            assert_eq!(parser.parse_method(&json!(5.0)).unwrap(), Method::Value(5.0));
        }
    }
}
