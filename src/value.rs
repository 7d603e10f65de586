//! Dynamically typed scalar values that flow through the resolution and
//! evaluation pipeline, plus the coercion rules used to compare them.
//!
//! A [`Value`] is the currency of the whole engine: field values fetched
//! from data services, values computed by calculators, and the literal
//! operands embedded in a rule are all represented the same way.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A dynamically typed scalar, or a list of the same.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    pub fn number(n: impl Into<Decimal>) -> Self {
        Value::Number(n.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `isEmpty` semantics: null, empty string, or empty list are empty.
    /// Numbers and booleans are never empty.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Parse as a decimal number, accepting both native numbers and numeric
    /// strings (`"42"`, `"3.5"`).
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse::<Decimal>().ok(),
            Value::Bool(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
            _ => None,
        }
    }

    /// Parse as a date. Accepts native dates/date-times (truncated to the
    /// date) and ISO-8601 date strings.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date_naive()),
            Value::String(s) => parse_iso_date(s),
            _ => None,
        }
    }

    /// Recognize `true`/`false`/`1`/`0`/`yes`/`no` (case-insensitive) as
    /// booleans in addition to native bools.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => {
                if *n == Decimal::ONE {
                    Some(true)
                } else if n.is_zero() {
                    Some(false)
                } else {
                    None
                }
            }
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Compare two values under the coercion rules mandated by the spec:
    /// numeric if both parse as numbers, else date if both parse as dates,
    /// else lexicographic if both are strings, else incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (self.as_date(), other.as_date()) {
            return Some(a.cmp(&b));
        }
        if let (Value::String(a), Value::String(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        None
    }

    /// Equality under the same coercion rules as `compare`, plus the rule
    /// that null equals only null.
    pub fn coerced_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.coerced_eq(y))
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n
                .to_string()
                .parse::<Decimal>()
                .map(Value::Number)
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => {
                parse_iso_datetime(&s).map(Value::DateTime).unwrap_or(Value::String(s))
            }
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

/// Parse `YYYY-MM-DD`, `MM/DD/YYYY`, or `MM-DD-YYYY`.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m-%d-%Y") {
        return Some(d);
    }
    // Also accept the date portion of an ISO date-time string.
    if let Some(dt) = parse_iso_datetime(s) {
        return Some(dt.date_naive());
    }
    None
}

/// Parse ISO-8601 or `YYYY-MM-DD HH:MM:SS` date-times, always normalized to UTC.
pub fn parse_iso_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}
