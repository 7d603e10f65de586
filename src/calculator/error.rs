use serde::{Deserialize, Serialize};
use std::fmt;

/// A failure evaluating a calculated field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorError {
    pub name: String,
    pub field: String,
    pub cause: String,
}

impl CalculatorError {
    pub fn new(name: impl Into<String>, field: impl Into<String>, cause: impl Into<String>) -> Self {
        CalculatorError { name: name.into(), field: field.into(), cause: cause.into() }
    }
}

impl fmt::Display for CalculatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calculator '{}' failed on field '{}': {}", self.name, self.field, self.cause)
    }
}

impl std::error::Error for CalculatorError {}
