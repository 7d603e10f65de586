//! Field calculator framework (C5): `EXPRESSION`, `BUILTIN`, and `CUSTOM`
//! calculated-field sources, dispatched from one [`CalculatorConfig`].

mod builtin;
mod context;
mod custom;
mod error;
mod expression;

pub use context::CalcContext;
pub use custom::{CustomCalculator, CustomCalculatorRegistry};
pub use error::CalculatorError;

use crate::field::CalculatorConfig;
use crate::value::Value;

/// Evaluate a calculated field's configured source against `context`.
///
/// `version` is the owning field config's version, used to key the
/// `EXPRESSION` AST cache so a mutated expression is re-parsed rather
/// than served stale.
pub fn calculate(
    config: &CalculatorConfig,
    field_name: &str,
    version: u64,
    context: &CalcContext,
    custom_registry: &CustomCalculatorRegistry,
) -> Result<Value, CalculatorError> {
    match config {
        CalculatorConfig::Expression { expr } => expression::evaluate(expr, version, field_name, context),
        CalculatorConfig::Builtin { function, parameters } => {
            builtin::calculate(function, parameters, field_name, context)
        }
        CalculatorConfig::Custom { class_ref, parameters } => {
            let calculator = custom_registry.get(class_ref).ok_or_else(|| {
                CalculatorError::new(class_ref, field_name, format!("no custom calculator registered for '{class_ref}'"))
            })?;
            calculator.validate_parameters(parameters)?;
            calculator.calculate(parameters, context)
        }
    }
}
