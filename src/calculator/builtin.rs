//! The fixed `BUILTIN` function table.

use rust_decimal::Decimal;

use crate::field::BuiltinParameters;
use crate::value::Value;

use super::context::CalcContext;
use super::error::CalculatorError;

pub fn calculate(
    function: &str,
    parameters: &BuiltinParameters,
    field_name: &str,
    ctx: &CalcContext,
) -> Result<Value, CalculatorError> {
    let err = |message: String| CalculatorError::new(function, field_name, message);

    match function {
        "sum" | "min" | "max" | "avg" | "count" => {
            let numbers: Vec<Decimal> = parameters
                .fields
                .iter()
                .filter_map(|f| ctx.get(f).and_then(Value::as_number))
                .collect();
            match function {
                "count" => Ok(Value::Number(Decimal::from(numbers.len()))),
                "sum" => Ok(Value::Number(numbers.iter().sum())),
                "min" => numbers
                    .iter()
                    .min()
                    .copied()
                    .map(Value::Number)
                    .ok_or_else(|| err("no numeric fields to take min() of".to_string())),
                "max" => numbers
                    .iter()
                    .max()
                    .copied()
                    .map(Value::Number)
                    .ok_or_else(|| err("no numeric fields to take max() of".to_string())),
                "avg" => {
                    if numbers.is_empty() {
                        return Err(err("no numeric fields to average".to_string()));
                    }
                    let sum: Decimal = numbers.iter().sum();
                    Ok(Value::Number(sum / Decimal::from(numbers.len())))
                }
                _ => unreachable!(),
            }
        }
        "concat" => {
            let separator = parameters.separator.as_deref().unwrap_or("");
            let parts: Vec<String> = parameters
                .fields
                .iter()
                .map(|f| ctx.get(f).map(Value::to_string).unwrap_or_default())
                .collect();
            Ok(Value::String(parts.join(separator)))
        }
        "dateAdd" => {
            let field = parameters.fields.first().ok_or_else(|| err("dateAdd requires one field".to_string()))?;
            let date = ctx.get(field).and_then(Value::as_date).ok_or_else(|| {
                err(format!("field '{field}' is not a date"))
            })?;
            let amount = parameters
                .amount
                .as_ref()
                .and_then(Value::as_number)
                .and_then(|d| d.to_string().parse::<i64>().ok())
                .ok_or_else(|| err("dateAdd requires an integer 'amount'".to_string()))?;
            let result = date
                .checked_add_signed(chrono::Duration::days(amount))
                .ok_or_else(|| err("date overflow".to_string()))?;
            Ok(Value::Date(result))
        }
        "dateDiff" => {
            if parameters.fields.len() != 2 {
                return Err(err("dateDiff requires exactly two fields".to_string()));
            }
            let a = ctx
                .get(&parameters.fields[0])
                .and_then(Value::as_date)
                .ok_or_else(|| err(format!("field '{}' is not a date", parameters.fields[0])))?;
            let b = ctx
                .get(&parameters.fields[1])
                .and_then(Value::as_date)
                .ok_or_else(|| err(format!("field '{}' is not a date", parameters.fields[1])))?;
            Ok(Value::Number(Decimal::from((a - b).num_days())))
        }
        "percentage" => {
            let field = parameters.fields.first().ok_or_else(|| err("percentage requires one field".to_string()))?;
            let value = ctx.get(field).and_then(Value::as_number).ok_or_else(|| {
                err(format!("field '{field}' is not numeric"))
            })?;
            let total = parameters
                .amount
                .as_ref()
                .and_then(Value::as_number)
                .ok_or_else(|| err("percentage requires a numeric 'amount' (the total)".to_string()))?;
            if total.is_zero() {
                return Err(err("percentage of a zero total is undefined".to_string()));
            }
            Ok(Value::Number(value / total * Decimal::ONE_HUNDRED))
        }
        other => Err(err(format!("unknown builtin function '{other}'"))),
    }
}
