//! Trace parser errors.

use retrace_core::CoreError;

/// Errors raised while parsing a trace
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    /// A `START OF` section never closed
    #[error("Unmatched START OF {name} at line {line}")]
    UnmatchedStart { line: usize, name: String },

    /// An `END OF` with no open section
    #[error("Unmatched END OF {name} at line {line}")]
    UnmatchedEnd { line: usize, name: String },

    /// Content line without `method[modifier` and `:`
    #[error("Content line {line} is missing its header separator")]
    MissingHeader { line: usize },

    /// Reading the trace failed
    #[error("Failed to read trace: {0}")]
    Io(String),
}

impl TraceError {
    /// Line number the error refers to, 0 when not line-specific
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::UnmatchedStart { line, .. }
            | Self::UnmatchedEnd { line, .. }
            | Self::MissingHeader { line } => *line,
            Self::Io(_) => 0,
        }
    }
}

impl From<TraceError> for CoreError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::Io(message) => CoreError::Io { message },
            other => CoreError::Parse {
                line: other.line(),
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
