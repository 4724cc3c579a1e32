//! Domain error types.

/// Which half of the DSL an operator tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Method,
    Filter,
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorKind::Method => write!(f, "method"),
            OperatorKind::Filter => write!(f, "filter"),
        }
    }
}

/// Top-level error type for barreplay.
#[derive(Debug, thiserror::Error)]
pub enum BarreplayError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("Unknown {kind}: {tag}")]
    UnknownOperator { kind: OperatorKind, tag: String },

    #[error("Error parsing {kind} {tag}: {source}")]
    OperatorParse {
        kind: OperatorKind,
        tag: String,
        #[source]
        source: Box<BarreplayError>,
    },

    #[error("missing field '{field}'")]
    MissingField { field: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unresolved series reference '{name}'")]
    UnresolvedReference { name: String },

    #[error("series reference cycle through '{name}'")]
    ReferenceCycle { name: String },

    #[error("invalid strategy: {reason}")]
    StrategyInvalid { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("cannot exit a closed trade")]
    PositionClosed,

    #[error("cannot reduce position size larger than current {direction} position size")]
    ReduceExceedsHeld { direction: &'static str },

    #[error("backtest '{name}' failed: {source}")]
    BacktestFailed {
        name: String,
        #[source]
        source: Box<BarreplayError>,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {name}")]
    NoData { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BarreplayError {
    pub(crate) fn missing(field: &str) -> Self {
        BarreplayError::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        BarreplayError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&BarreplayError> for std::process::ExitCode {
    fn from(err: &BarreplayError) -> Self {
        let code: u8 = match err {
            BarreplayError::Io(_) => 1,
            BarreplayError::ConfigParse { .. }
            | BarreplayError::ConfigMissing { .. }
            | BarreplayError::ConfigInvalid { .. } => 2,
            BarreplayError::Data { .. } | BarreplayError::NoData { .. } => 3,
            BarreplayError::UnknownOperator { .. }
            | BarreplayError::OperatorParse { .. }
            | BarreplayError::MissingField { .. }
            | BarreplayError::InvalidValue { .. }
            | BarreplayError::UnresolvedReference { .. }
            | BarreplayError::ReferenceCycle { .. }
            | BarreplayError::StrategyInvalid { .. }
            | BarreplayError::Json(_) => 4,
            BarreplayError::PositionClosed
            | BarreplayError::ReduceExceedsHeld { .. }
            | BarreplayError::BacktestFailed { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
