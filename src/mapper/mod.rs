//! Reflective path-based mapper: extracts a scalar (or list) from a nested
//! data-service response using a small path grammar, then optionally
//! coerces it into a target type.
//!
//! Grammar (see spec): `segment ('.' segment)*` where a segment is
//! `name`, `name[index]`, `name[key=literal]`, `name[*]`, or a bare
//! `[...]` chained directly onto the previous bracket.
//!
//! Rust has no runtime reflection, so "reflective" here means: any
//! response that can be represented as [`serde_json::Value`] — which
//! covers both maps/dictionaries and typed structs via `Serialize` — is
//! walked uniformly. This is the "small, uniform accessor-adapter
//! abstraction" the design notes call for, grounded in the crate's
//! existing preference for hand-rolled parsers over a full grammar
//! engine (c.f. the rule JSON parser).

mod error;
mod path;

pub use error::{MappingError, MappingErrorKind};
pub use path::{parse_path, PathSegment};

use std::any::TypeId;
use std::sync::OnceLock;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value as Json;

use crate::value::{parse_iso_date, parse_iso_datetime, Value};

/// Target type to coerce a mapped value into, after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionTarget {
    /// No coercion; pass the extracted JSON through as a [`Value`].
    Raw,
    Number,
    Boolean,
    Date,
    DateTime,
}

/// Process-lifetime memo of which (type, segment) pairs have been
/// resolved before. Real reflection metadata would cache getter/accessor
/// handles here; since traversal goes through JSON, the cache instead
/// records that a given source type is known to expose a given segment,
/// which is enough to short-circuit repeated "does this exist" probing
/// for hot paths over large entity populations.
static REFLECTION_CACHE: OnceLock<DashMap<(TypeId, String), bool>> = OnceLock::new();

fn reflection_cache() -> &'static DashMap<(TypeId, String), bool> {
    REFLECTION_CACHE.get_or_init(DashMap::new)
}

/// Clear the process-wide reflection cache. Exposed for test isolation.
#[cfg(test)]
pub fn clear_reflection_cache() {
    reflection_cache().clear();
}

fn note_segment_seen<T: 'static>(segment: &str, found: bool) {
    reflection_cache().insert((TypeId::of::<T>(), segment.to_string()), found);
}

/// Map a path expression over any `Serialize` response, returning the
/// extracted value coerced per `target`.
pub fn map_value<T: Serialize + 'static>(
    source: &T,
    expression: &str,
    target: ConversionTarget,
) -> Result<Value, MappingError> {
    let json = serde_json::to_value(source).map_err(|e| {
        MappingError::new(
            expression,
            expression,
            MappingErrorKind::InvalidExpression,
            format!("response could not be represented as JSON: {e}"),
        )
    })?;
    map_json::<T>(&json, expression, target)
}

/// Map a path expression directly over a [`serde_json::Value`].
pub fn map_json<T: 'static>(
    json: &Json,
    expression: &str,
    target: ConversionTarget,
) -> Result<Value, MappingError> {
    let segments = parse_path(expression).map_err(|message| {
        MappingError::new(expression, expression, MappingErrorKind::InvalidExpression, message)
    })?;

    let mut current = json;
    let mut traversed = String::new();
    for segment in &segments {
        if !traversed.is_empty() {
            traversed.push('.');
        }
        traversed.push_str(&segment.to_string());
        current = apply_segment::<T>(current, segment, expression, &traversed)?;
    }

    convert(current, target, expression, &traversed)
}

fn apply_segment<'a, T: 'static>(
    current: &'a Json,
    segment: &PathSegment,
    expression: &str,
    failing_path: &str,
) -> Result<&'a Json, MappingError> {
    match segment {
        PathSegment::Field(name) => {
            if current.is_null() {
                return Err(MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::NullValue,
                    format!("cannot read '{name}' from null"),
                ));
            }
            let obj = current.as_object().ok_or_else(|| {
                MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::PropertyNotFound,
                    format!("'{name}' is not an object property of a non-object value"),
                )
            })?;
            match obj.get(name) {
                Some(v) => {
                    note_segment_seen::<T>(name, true);
                    Ok(v)
                }
                None => {
                    note_segment_seen::<T>(name, false);
                    Err(MappingError::new(
                        expression,
                        failing_path,
                        MappingErrorKind::PropertyNotFound,
                        format!("no property named '{name}'"),
                    )
                    .with_suggestion(suggest_key(obj.keys().map(String::as_str), name)))
                }
            }
        }
        PathSegment::Index(i) => {
            let arr = current.as_array().ok_or_else(|| {
                MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::PropertyNotFound,
                    "expected a list to index into".to_string(),
                )
            })?;
            arr.get(*i).ok_or_else(|| {
                MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::IndexOutOfBounds,
                    format!("index {i} out of bounds for list of length {}", arr.len()),
                )
            })
        }
        PathSegment::Filter { key, literal } => {
            let arr = current.as_array().ok_or_else(|| {
                MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::PropertyNotFound,
                    "expected a list to filter".to_string(),
                )
            })?;
            arr.iter()
                .find(|item| {
                    item.as_object()
                        .and_then(|o| o.get(key))
                        .map(|v| json_as_string(v) == *literal)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    MappingError::new(
                        expression,
                        failing_path,
                        MappingErrorKind::NoMatchInFilter,
                        format!("no element with {key}={literal}"),
                    )
                })
        }
        PathSegment::Wildcard => {
            if current.is_array() {
                Ok(current)
            } else {
                Err(MappingError::new(
                    expression,
                    failing_path,
                    MappingErrorKind::PropertyNotFound,
                    "expected a list for '[*]'".to_string(),
                ))
            }
        }
    }
}

fn json_as_string(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn suggest_key<'a>(keys: impl Iterator<Item = &'a str>, wanted: &str) -> String {
    let mut best: Option<(&str, usize)> = None;
    for key in keys {
        let dist = levenshtein(key, wanted);
        if best.map(|(_, d)| dist < d).unwrap_or(true) {
            best = Some((key, dist));
        }
    }
    match best {
        Some((key, dist)) if dist <= 3 => format!("did you mean '{key}'?"),
        _ => "check the mapper expression against the response shape".to_string(),
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

fn convert(
    json: &Json,
    target: ConversionTarget,
    expression: &str,
    failing_path: &str,
) -> Result<Value, MappingError> {
    if json.is_null() && target != ConversionTarget::Raw {
        return Err(MappingError::new(
            expression,
            failing_path,
            MappingErrorKind::NullValue,
            "cannot convert null".to_string(),
        ));
    }

    match target {
        ConversionTarget::Raw => Ok(Value::from(json.clone())),
        ConversionTarget::Number => {
            let raw = Value::from(json.clone());
            raw.as_number().map(Value::Number).ok_or_else(|| {
                conversion_failed(expression, failing_path, &raw, "a number")
            })
        }
        ConversionTarget::Boolean => {
            let raw = Value::from(json.clone());
            raw.as_bool().map(Value::Bool).ok_or_else(|| {
                conversion_failed(expression, failing_path, &raw, "a boolean")
            })
        }
        ConversionTarget::Date => {
            let s = json.as_str().map(str::to_string).unwrap_or_else(|| json.to_string());
            parse_iso_date(&s).map(Value::Date).ok_or_else(|| {
                conversion_failed(expression, failing_path, &Value::String(s), "a date")
            })
        }
        ConversionTarget::DateTime => {
            let s = json.as_str().map(str::to_string).unwrap_or_else(|| json.to_string());
            parse_iso_datetime(&s).map(Value::DateTime).ok_or_else(|| {
                conversion_failed(expression, failing_path, &Value::String(s), "a date-time")
            })
        }
    }
}

fn conversion_failed(
    expression: &str,
    failing_path: &str,
    got: &Value,
    wanted: &str,
) -> MappingError {
    MappingError::new(
        expression,
        failing_path,
        MappingErrorKind::ConversionFailed,
        format!("could not convert '{got}' into {wanted}"),
    )
    .with_suggestion(format!("check that the mapped value is actually {wanted}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_traversal() {
        let response = json!({"user": {"profile": {"email": "a@b.com"}}});
        let v = map_json::<Json>(&response, "user.profile.email", ConversionTarget::Raw).unwrap();
        assert_eq!(v.as_str(), Some("a@b.com"));
    }

    #[test]
    fn index_into_list() {
        let response = json!({"orders": [{"amount": 10}, {"amount": 20}]});
        let v = map_json::<Json>(&response, "orders[0].amount", ConversionTarget::Number).unwrap();
        assert_eq!(v.as_number().unwrap().to_string(), "10");
    }

    #[test]
    fn filter_by_key_equals_literal() {
        let response = json!({"data": {"users": [{"id": 123, "name": "Alice"}, {"id": 456, "name": "Bob"}]}});
        let v = map_json::<Json>(&response, "data.users[id=123].name", ConversionTarget::Raw).unwrap();
        assert_eq!(v.as_str(), Some("Alice"));
    }

    #[test]
    fn wildcard_returns_containing_list() {
        let response = json!({"data": {"items": [1, 2, 3]}});
        let v = map_json::<Json>(&response, "data.items[*]", ConversionTarget::Raw).unwrap();
        assert_eq!(v.as_list().unwrap().len(), 3);
    }

    #[test]
    fn index_out_of_bounds_is_structured_error() {
        let response = json!({"orders": [{"amount": 10}]});
        let err = map_json::<Json>(&response, "orders[5].amount", ConversionTarget::Raw).unwrap_err();
        assert_eq!(err.kind, MappingErrorKind::IndexOutOfBounds);
        assert_eq!(err.expression, "orders[5].amount");
    }

    #[test]
    fn no_match_in_filter_is_structured_error() {
        let response = json!({"data": {"users": []}});
        let err =
            map_json::<Json>(&response, "data.users[id=999].name", ConversionTarget::Raw).unwrap_err();
        assert_eq!(err.kind, MappingErrorKind::NoMatchInFilter);
    }

    #[test]
    fn property_not_found_suggests_closest_key() {
        let response = json!({"useer": {}});
        let err = map_json::<Json>(&response, "user", ConversionTarget::Raw).unwrap_err();
        assert_eq!(err.kind, MappingErrorKind::PropertyNotFound);
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn conversion_failure_is_structured() {
        let response = json!({"flag": "maybe"});
        let err = map_json::<Json>(&response, "flag", ConversionTarget::Boolean).unwrap_err();
        assert_eq!(err.kind, MappingErrorKind::ConversionFailed);
    }

    #[test]
    fn null_value_is_structured_error() {
        let response = json!({"field": null});
        let err = map_json::<Json>(&response, "field.nested", ConversionTarget::Raw).unwrap_err();
        assert_eq!(err.kind, MappingErrorKind::NullValue);
    }

    #[test]
    fn numeric_string_converts_to_number() {
        let response = json!({"amount": "42.50"});
        let v = map_json::<Json>(&response, "amount", ConversionTarget::Number).unwrap();
        assert_eq!(v.as_number().unwrap().to_string(), "42.50");
    }

    #[test]
    fn date_mm_dd_yyyy_converts() {
        let response = json!({"dob": "03/15/1990"});
        let v = map_json::<Json>(&response, "dob", ConversionTarget::Date).unwrap();
        assert!(matches!(v, Value::Date(_)));
    }
}
