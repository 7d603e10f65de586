use serde::{Deserialize, Serialize};
use std::fmt;

/// The reason a mapper expression failed to resolve against a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingErrorKind {
    NullValue,
    PropertyNotFound,
    IndexOutOfBounds,
    NoMatchInFilter,
    InvalidExpression,
    ConversionFailed,
    MapKeyMissing,
}

/// A structured failure from applying a mapper expression to a response.
///
/// `failing_path` is the prefix of `expression` that was being resolved
/// when the failure occurred, so callers can point at exactly where a
/// response shape diverged from what the expression expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingError {
    pub expression: String,
    pub failing_path: String,
    pub kind: MappingErrorKind,
    pub message: String,
    pub suggestion: Option<String>,
}

impl MappingError {
    pub fn new(
        expression: impl Into<String>,
        failing_path: impl Into<String>,
        kind: MappingErrorKind,
        message: impl Into<String>,
    ) -> Self {
        MappingError {
            expression: expression.into(),
            failing_path: failing_path.into(),
            kind,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mapping '{}' failed at '{}': {}",
            self.expression, self.failing_path, self.message
        )?;
        if let Some(s) = &self.suggestion {
            write!(f, " ({s})")?;
        }
        Ok(())
    }
}

impl std::error::Error for MappingError {}
