//! Domain error types.
//!
//! Every failure is fatal for the batch. The [`ErrorKind`] of a variant decides
//! the process exit code.

/// Broad classification used for exit codes and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Data,
    Config,
    Io,
}

/// Top-level error type for fxeval.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("schema error in {field}: {reason}")]
    Schema { field: String, reason: String },

    #[error("unsupported schema version {version:?}")]
    UnsupportedVersion { version: String },

    #[error("malformed prediction document: {reason}")]
    MalformedDocument { reason: String },

    #[error("instrument {instrument} missing from actual outcome data")]
    MissingInstrument { instrument: String },

    #[error("timeframe {timeframe} missing for {instrument}")]
    MissingTimeframe {
        instrument: String,
        timeframe: String,
    },

    #[error("empty bar series for {instrument}")]
    EmptySeries { instrument: String },

    #[error("bars out of order for {instrument} at index {index}")]
    BarsOutOfOrder { instrument: String, index: usize },

    #[error("duplicate bar timestamp for {instrument} at index {index}")]
    DuplicateBar { instrument: String, index: usize },

    #[error("invalid bar for {instrument} at index {index}: {reason}")]
    InvalidBar {
        instrument: String,
        index: usize,
        reason: String,
    },

    #[error("no bars on or after {date} for {instrument}")]
    EmptyWindow { instrument: String, date: String },

    #[error("malformed outcome data: {reason}")]
    DataParse { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown session {name:?}")]
    UnknownSession { name: String },

    #[error("unknown market regime {regime:?} (allowed: {allowed})")]
    UnknownRegime { regime: String, allowed: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Shorthand for a schema failure naming the offending field.
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EvalError::Schema {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Schema { .. }
            | EvalError::UnsupportedVersion { .. }
            | EvalError::MalformedDocument { .. } => ErrorKind::Schema,
            EvalError::MissingInstrument { .. }
            | EvalError::MissingTimeframe { .. }
            | EvalError::EmptySeries { .. }
            | EvalError::BarsOutOfOrder { .. }
            | EvalError::DuplicateBar { .. }
            | EvalError::InvalidBar { .. }
            | EvalError::EmptyWindow { .. }
            | EvalError::DataParse { .. } => ErrorKind::Data,
            EvalError::ConfigParse { .. }
            | EvalError::ConfigInvalid { .. }
            | EvalError::UnknownSession { .. }
            | EvalError::UnknownRegime { .. } => ErrorKind::Config,
            EvalError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<&EvalError> for std::process::ExitCode {
    fn from(err: &EvalError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Schema => 3,
            ErrorKind::Data => 4,
        };
        std::process::ExitCode::from(code)
    }
}
