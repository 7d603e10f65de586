//! Error taxonomy for the rules engine core.
//!
//! Every fallible operation in the crate eventually surfaces a
//! [`RulesEngineError`], a single `thiserror` enum mirroring the error
//! codes in the external contract. Component-local error types (mapping,
//! data-service, calculator, cyclic-dependency) convert into it via `From`
//! so callers at the boundary only need to match on one type, while
//! internals keep precise, structured errors.

use serde::{Deserialize, Serialize};

use crate::calculator::CalculatorError;
use crate::dataservice::DataServiceError;
use crate::dependency::CyclicDependencyError;
use crate::mapper::MappingError;

/// Stable machine-readable error codes from the external contract.
pub const CODE_RULE_PARSE_ERROR: &str = "RULE_PARSE_ERROR";
pub const CODE_CYCLIC_DEPENDENCY: &str = "CYCLIC_DEPENDENCY";
pub const CODE_FIELD_NOT_FOUND: &str = "FIELD_NOT_FOUND";
pub const CODE_REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
pub const CODE_MAPPING_ERROR: &str = "MAPPING_ERROR";
pub const CODE_CONVERSION_ERROR: &str = "CONVERSION_ERROR";
pub const CODE_DATA_SERVICE_ERROR: &str = "DATA_SERVICE_ERROR";
pub const CODE_CALCULATOR_ERROR: &str = "CALCULATOR_ERROR";
pub const CODE_TIMEOUT: &str = "TIMEOUT";
pub const CODE_PROCESSING_ERROR: &str = "PROCESSING_ERROR";

/// A single, stable-coded error for the whole core.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum RulesEngineError {
    #[error("rule parse error: {message}")]
    RuleParseError { message: String },

    #[error("cyclic dependency: {path:?}")]
    CyclicDependency { path: Vec<String> },

    #[error("field not found: {name}")]
    FieldNotFound { name: String },

    #[error("required field missing: {name}")]
    RequiredFieldMissing { name: String },

    #[error("mapping error on '{expression}': {message}")]
    MappingError { expression: String, message: String },

    #[error("conversion error: {message}")]
    ConversionError { message: String },

    #[error("data service error at {endpoint}: {message}")]
    DataServiceError {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("calculator '{name}' failed on field '{field}': {message}")]
    CalculatorError {
        name: String,
        field: String,
        message: String,
    },

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("processing error: {message}")]
    ProcessingError { message: String },
}

impl RulesEngineError {
    /// The stable machine-readable code for this error, matching §6.
    pub fn code(&self) -> &'static str {
        match self {
            RulesEngineError::RuleParseError { .. } => CODE_RULE_PARSE_ERROR,
            RulesEngineError::CyclicDependency { .. } => CODE_CYCLIC_DEPENDENCY,
            RulesEngineError::FieldNotFound { .. } => CODE_FIELD_NOT_FOUND,
            RulesEngineError::RequiredFieldMissing { .. } => CODE_REQUIRED_FIELD_MISSING,
            RulesEngineError::MappingError { .. } => CODE_MAPPING_ERROR,
            RulesEngineError::ConversionError { .. } => CODE_CONVERSION_ERROR,
            RulesEngineError::DataServiceError { .. } => CODE_DATA_SERVICE_ERROR,
            RulesEngineError::CalculatorError { .. } => CODE_CALCULATOR_ERROR,
            RulesEngineError::Timeout { .. } => CODE_TIMEOUT,
            RulesEngineError::ProcessingError { .. } => CODE_PROCESSING_ERROR,
        }
    }
}

impl From<MappingError> for RulesEngineError {
    fn from(e: MappingError) -> Self {
        let is_conversion = matches!(e.kind, crate::mapper::MappingErrorKind::ConversionFailed);
        let message = e.to_string();
        if is_conversion {
            RulesEngineError::ConversionError { message }
        } else {
            RulesEngineError::MappingError {
                expression: e.expression,
                message,
            }
        }
    }
}

impl From<DataServiceError> for RulesEngineError {
    fn from(e: DataServiceError) -> Self {
        RulesEngineError::DataServiceError {
            endpoint: e.endpoint,
            status: e.status,
            message: e.cause,
        }
    }
}

impl From<CalculatorError> for RulesEngineError {
    fn from(e: CalculatorError) -> Self {
        RulesEngineError::CalculatorError {
            name: e.name,
            field: e.field,
            message: e.cause,
        }
    }
}

impl From<CyclicDependencyError> for RulesEngineError {
    fn from(e: CyclicDependencyError) -> Self {
        RulesEngineError::CyclicDependency { path: e.path }
    }
}

/// A `(fieldName, code, message)` triple, as used in the caller-visible
/// resolution/filter contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field_name: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field_name: impl Into<String>, err: &RulesEngineError) -> Self {
        FieldError {
            field_name: field_name.into(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
