//! Registry interface (C9): the read-only contract the core depends on
//! for field configurations and entity types. The registry itself —
//! storage, mutation, versioning, soft-deletes — lives outside this
//! crate; the core only ever sees an immutable snapshot through this
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::field::{EntityType, FieldConfig};

/// Read-side access to field configurations and entity types.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn find_field_configs_by_name(&self, names: &[String]) -> Vec<FieldConfig>;

    async fn find_field_config(&self, name: &str) -> Option<FieldConfig>;

    async fn find_entity_type(&self, type_name: &str) -> Option<EntityType>;

    async fn exists_field_name(&self, name: &str) -> bool;
}

/// An in-memory registry snapshot, used as a test double and as the
/// reference implementation for embedding a static configuration set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    fields: Arc<HashMap<String, FieldConfig>>,
    entity_types: Arc<HashMap<String, EntityType>>,
}

impl InMemoryRegistry {
    pub fn new(fields: Vec<FieldConfig>, entity_types: Vec<EntityType>) -> Self {
        InMemoryRegistry {
            fields: Arc::new(fields.into_iter().map(|f| (f.field_name.clone(), f)).collect()),
            entity_types: Arc::new(entity_types.into_iter().map(|e| (e.type_name.clone(), e)).collect()),
        }
    }

    /// All configured fields, keyed by name — used by the dependency
    /// analyzer, which needs the whole set rather than point lookups.
    pub fn all_fields(&self) -> HashMap<String, FieldConfig> {
        (*self.fields).clone()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn find_field_configs_by_name(&self, names: &[String]) -> Vec<FieldConfig> {
        names.iter().filter_map(|n| self.fields.get(n).cloned()).collect()
    }

    async fn find_field_config(&self, name: &str) -> Option<FieldConfig> {
        self.fields.get(name).cloned()
    }

    async fn find_entity_type(&self, type_name: &str) -> Option<EntityType> {
        self.entity_types.get(type_name).cloned()
    }

    async fn exists_field_name(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    fn field(name: &str) -> FieldConfig {
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

    #[tokio::test]
    async fn finds_registered_fields_by_name() {
        let registry = InMemoryRegistry::new(vec![field("age"), field("status")], vec![]);
        let found = registry.find_field_configs_by_name(&["age".to_string(), "missing".to_string()]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field_name, "age");
    }

    #[tokio::test]
    async fn exists_field_name_reflects_registration() {
        let registry = InMemoryRegistry::new(vec![field("age")], vec![]);
        assert!(registry.exists_field_name("age").await);
        assert!(!registry.exists_field_name("ghost").await);
    }
}
