//! Field configuration and entity-type data model (§3).
//!
//! These are plain data types owned by a registry (see [`crate::registry`])
//! outside this crate; the core only ever sees read-only snapshots.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::Value;

static FIELD_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("static pattern is valid"));

/// The declared type of a field's resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    Array,
    Object,
}

/// HTTP auth to apply to a data-service request, as a tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    ApiKey { header_name: String, key: String },
    BearerToken { token: String },
    Basic { user: String, password: String },
    OAuth2 {
        token_url: String,
        client_id: String,
        client_secret: String,
        #[serde(default)]
        scope: Option<String>,
    },
    None,
}

/// HTTP method for a REST data-service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

/// Where to fetch a field's raw value from, as a tagged union over the two
/// supported wire protocols.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataServiceConfig {
    #[serde(rename = "GRAPHQL")]
    GraphQl {
        endpoint: String,
        query: String,
        #[serde(default)]
        operation_name: Option<String>,
        #[serde(default = "default_auth")]
        auth: AuthConfig,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    #[serde(rename = "REST")]
    Rest {
        endpoint: String,
        method: HttpMethod,
        #[serde(default)]
        query_params: HashMap<String, String>,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
        #[serde(default = "default_auth")]
        auth: AuthConfig,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl DataServiceConfig {
    pub fn endpoint(&self) -> &str {
        match self {
            DataServiceConfig::GraphQl { endpoint, .. } => endpoint,
            DataServiceConfig::Rest { endpoint, .. } => endpoint,
        }
    }

    /// Identity used to batch fields onto one call: same endpoint, same
    /// query/method/body shape. Two configs that would issue the same
    /// outbound request share a batch key.
    pub fn batch_key(&self) -> String {
        match self {
            DataServiceConfig::GraphQl { endpoint, query, operation_name, .. } => {
                format!("graphql:{endpoint}:{query}:{:?}", operation_name)
            }
            DataServiceConfig::Rest { endpoint, method, query_params, body, .. } => {
                let mut params: Vec<_> = query_params.iter().collect();
                params.sort();
                format!("rest:{endpoint}:{method:?}:{params:?}:{body:?}")
            }
        }
    }
}

fn default_auth() -> AuthConfig {
    AuthConfig::None
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Parameters for a `BUILTIN` calculator invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuiltinParameters {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// How a calculated field's value is produced, as a tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CalculatorConfig {
    #[serde(rename = "EXPRESSION")]
    Expression { expr: String },
    #[serde(rename = "BUILTIN")]
    Builtin {
        function: String,
        #[serde(default)]
        parameters: BuiltinParameters,
    },
    #[serde(rename = "CUSTOM")]
    Custom {
        class_ref: String,
        #[serde(default)]
        parameters: HashMap<String, Value>,
    },
}

/// A validation failure raised when registering a [`FieldConfig`].
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum FieldConfigError {
    #[error("field name '{0}' does not match [A-Za-z_][A-Za-z0-9_.]*")]
    InvalidName(String),
    #[error("field '{0}' declares both dataServiceConfig and calculatorConfig")]
    ConflictingSource(String),
    #[error("field '{0}' has a mapperExpression but no dataServiceConfig")]
    MapperWithoutDataService(String),
}

/// A single field's configuration: where its value comes from, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub field_name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_calculated: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub mapper_expression: Option<String>,
    #[serde(default)]
    pub data_service_config: Option<DataServiceConfig>,
    #[serde(default)]
    pub calculator_config: Option<CalculatorConfig>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub version: u64,
}

impl FieldConfig {
    /// Validate the invariants from §3: a valid field name, no field with
    /// both a data-service and a calculator source (an
    /// [open question](crate) resolved by rejecting the config outright),
    /// and no `mapperExpression` without a `dataServiceConfig` to map from.
    pub fn validate(&self) -> Result<(), FieldConfigError> {
        if !FIELD_NAME_PATTERN.is_match(&self.field_name) {
            return Err(FieldConfigError::InvalidName(self.field_name.clone()));
        }
        if self.data_service_config.is_some() && self.calculator_config.is_some() {
            return Err(FieldConfigError::ConflictingSource(self.field_name.clone()));
        }
        if self.mapper_expression.is_some() && self.data_service_config.is_none() {
            return Err(FieldConfigError::MapperWithoutDataService(self.field_name.clone()));
        }
        Ok(())
    }
}

/// An entity type: how to fetch and map one kind of entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityType {
    pub type_name: String,
    pub data_service_config: DataServiceConfig,
    #[serde(default)]
    pub field_mappings: HashMap<String, String>,
    #[serde(default)]
    pub parent_type_name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl EntityType {
    /// Merge this entity type's field mappings on top of its parent's,
    /// child wins on conflict. `parent` is `None` at the root of the
    /// inheritance chain.
    pub fn effective_field_mappings(&self, parent: Option<&EntityType>) -> HashMap<String, String> {
        let mut merged = parent.map(|p| p.field_mappings.clone()).unwrap_or_default();
        merged.extend(self.field_mappings.clone());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(name: &str) -> FieldConfig {
        FieldConfig {
            field_name: name.to_string(),
            field_type: FieldType::String,
            is_required: false,
            is_calculated: false,
            default_value: None,
            mapper_expression: None,
            data_service_config: None,
            calculator_config: None,
            dependencies: vec![],
            version: 1,
        }
    }

    #[test]
    fn rejects_invalid_field_name() {
        let config = base_config("1bad-name");
        assert!(matches!(config.validate(), Err(FieldConfigError::InvalidName(_))));
    }

    #[test]
    fn accepts_dotted_field_name() {
        let config = base_config("profile.address.city");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_both_data_service_and_calculator() {
        let mut config = base_config("total");
        config.data_service_config = Some(DataServiceConfig::Rest {
            endpoint: "https://x/y".to_string(),
            method: HttpMethod::Get,
            query_params: HashMap::new(),
            headers: HashMap::new(),
            body: None,
            auth: AuthConfig::None,
            timeout_ms: 30_000,
        });
        config.calculator_config = Some(CalculatorConfig::Expression { expr: "#a + #b".to_string() });
        assert!(matches!(config.validate(), Err(FieldConfigError::ConflictingSource(_))));
    }

    #[test]
    fn rejects_mapper_expression_without_data_service() {
        let mut config = base_config("name");
        config.mapper_expression = Some("user.name".to_string());
        assert!(matches!(config.validate(), Err(FieldConfigError::MapperWithoutDataService(_))));
    }

    #[test]
    fn entity_type_inherits_parent_mappings_child_wins() {
        let parent = EntityType {
            type_name: "base".to_string(),
            data_service_config: DataServiceConfig::Rest {
                endpoint: "https://x/y".to_string(),
                method: HttpMethod::Get,
                query_params: HashMap::new(),
                headers: HashMap::new(),
                body: None,
                auth: AuthConfig::None,
                timeout_ms: 30_000,
            },
            field_mappings: HashMap::from([("name".to_string(), "user.name".to_string())]),
            parent_type_name: None,
            metadata: HashMap::new(),
        };
        let mut child = parent.clone();
        child.type_name = "child".to_string();
        child.parent_type_name = Some("base".to_string());
        child.field_mappings = HashMap::from([("name".to_string(), "profile.fullName".to_string())]);

        let merged = child.effective_field_mappings(Some(&parent));
        assert_eq!(merged.get("name").unwrap(), "profile.fullName");
    }
}
