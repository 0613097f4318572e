//! Core error types for RETRACE.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Parse and materialization failures are fatal for the trace or snapshot
/// being processed. The equivalence checker never produces one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed trace structure
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number where the problem was detected
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// Origin type name with no registry entry
    #[error("No destination mapping for origin type: {type_name}")]
    SchemaMapping {
        /// The unregistered origin type name
        type_name: String,
    },

    /// Snapshot lacks data that its kind cannot default
    #[error("Cannot materialize {type_name}: {reason}")]
    Materialization {
        /// Declared type of the snapshot
        type_name: String,
        /// What was missing or malformed
        reason: String,
    },

    /// JSON that does not describe a snapshot
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot {
        /// Deserializer message
        reason: String,
    },

    /// I/O failure while reading a trace or a file-backed value
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Build a materialization error
    #[must_use]
    pub fn materialization(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Materialization {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Build a schema mapping error
    #[must_use]
    pub fn schema_mapping(type_name: impl Into<String>) -> Self {
        Self::SchemaMapping {
            type_name: type_name.into(),
        }
    }

    /// Whether this error aborts the whole trace rather than one value
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidSnapshot {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}
