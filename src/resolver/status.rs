use serde::{Deserialize, Serialize};

/// How a single field ended up in a [`super::ResolutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldStatus {
    /// Fetched, calculated, or supplied by the caller successfully.
    Resolved,
    /// Resolution failed but a `defaultValue` was available.
    Defaulted,
    /// Resolution failed and no default was available; absent from `values`.
    Missing,
}

/// Per-field resolution outcome, reported alongside the resolved values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerFieldStatus {
    pub field_name: String,
    pub status: FieldStatus,
    pub detail: Option<String>,
}

impl PerFieldStatus {
    pub fn resolved(field_name: &str) -> Self {
        PerFieldStatus { field_name: field_name.to_string(), status: FieldStatus::Resolved, detail: None }
    }

    pub fn defaulted(field_name: &str) -> Self {
        PerFieldStatus { field_name: field_name.to_string(), status: FieldStatus::Defaulted, detail: None }
    }

    pub fn missing(field_name: &str, detail: &str) -> Self {
        PerFieldStatus { field_name: field_name.to_string(), status: FieldStatus::Missing, detail: Some(detail.to_string()) }
    }
}
