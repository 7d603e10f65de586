//! Entity filter engine (C8): runs a rule over a population of entities,
//! fetching and resolving each entity's fields before evaluating.

mod pagination;

pub use pagination::PaginationInfo;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::calculator::CustomCalculatorRegistry;
use crate::dataservice::DataServiceClient;
use crate::dependency::{self, AnalyzerConfig};
use crate::error::RulesEngineError;
use crate::evaluator::{self, Trace};
use crate::field::{EntityType, FieldConfig};
use crate::mapper::{self, ConversionTarget};
use crate::resolver::{self, ExecutionContext, ResolutionConfig};
use crate::rule::Rule;
use crate::value::Value;

/// Tunables for one `filter` call (§6 `filter.*`).
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Page requested when `entity_ids` is not supplied.
    pub page: u64,
    pub size: u64,
    pub batch_size: usize,
    pub per_entity_concurrency: usize,
    pub trace: bool,
    pub resolution_config: ResolutionConfig,
    pub analyzer_config: AnalyzerConfig,
}

impl Default for FilterOptions {
    fn default() -> Self {
        FilterOptions {
            page: 0,
            size: 100,
            batch_size: 100,
            per_entity_concurrency: 16,
            trace: false,
            resolution_config: ResolutionConfig::default(),
            analyzer_config: AnalyzerConfig::default(),
        }
    }
}

/// A single entity's failure, isolated from the rest of the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProcessingError {
    pub entity_id: String,
    pub code: String,
    pub message: String,
}

impl EntityProcessingError {
    fn from_engine_error(entity_id: &str, err: &RulesEngineError) -> Self {
        EntityProcessingError {
            entity_id: entity_id.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One entity's outcome: either a rule result, or an isolated failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub entity_id: String,
    pub matched: bool,
    pub entity_data: Option<HashMap<String, Value>>,
    pub trace: Option<Trace>,
    pub error: Option<EntityProcessingError>,
}

/// Timing/volume accounting for one `filter` call, split by pipeline
/// phase so a caller can tell a slow data service from a slow rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilterMetrics {
    pub data_retrieval_ms: u64,
    pub rule_evaluation_ms: u64,
    pub batch_count: usize,
}

/// The full result of one `filter` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub entities: Vec<EntityOutcome>,
    pub total_processed: usize,
    pub total_matched: usize,
    pub total_failed: usize,
    pub pagination: Option<PaginationInfo>,
    pub metrics: FilterMetrics,
    pub errors: Vec<EntityProcessingError>,
}

/// Run `rule` over `entity_ids` (or, absent that, one page of IDs queried
/// from `entity_type`'s own data service), in chunks of
/// `options.batch_size`, with up to `options.per_entity_concurrency`
/// entity pipelines in flight within a chunk at once.
#[instrument(skip(entity_type, entity_ids, rule, registry, client, custom_registry, options))]
pub async fn filter(
    entity_type: &EntityType,
    entity_ids: Option<Vec<String>>,
    rule: &Rule,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    custom_registry: &CustomCalculatorRegistry,
    options: FilterOptions,
) -> FilterResult {
    let (ids, pagination) = match entity_ids {
        Some(ids) => (ids, None),
        None => match pagination::fetch_id_page(entity_type, options.page, options.size, client).await {
            Ok((ids, info)) => (ids, Some(info)),
            Err(err) => {
                warn!(error = %err, "failed to fetch entity id page");
                return FilterResult {
                    entities: Vec::new(),
                    total_processed: 0,
                    total_matched: 0,
                    total_failed: 0,
                    pagination: None,
                    metrics: FilterMetrics::default(),
                    errors: vec![EntityProcessingError {
                        entity_id: String::new(),
                        code: err.code().to_string(),
                        message: err.to_string(),
                    }],
                };
            }
        },
    };

    let referenced_fields = rule.referenced_fields();
    let semaphore = Semaphore::new(options.per_entity_concurrency.max(1));
    let mut metrics = FilterMetrics::default();
    let mut entities = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(options.batch_size.max(1)) {
        metrics.batch_count += 1;
        let futures = chunk.iter().map(|entity_id| {
            process_entity(
                entity_id,
                entity_type,
                rule,
                &referenced_fields,
                registry,
                client,
                custom_registry,
                &options,
                &semaphore,
            )
        });
        let outcomes = futures_util::future::join_all(futures).await;
        for (outcome, data_ms, eval_ms) in outcomes {
            metrics.data_retrieval_ms += data_ms;
            metrics.rule_evaluation_ms += eval_ms;
            entities.push(outcome);
        }
    }

    let total_matched = entities.iter().filter(|e| e.matched).count();
    let errors: Vec<EntityProcessingError> = entities.iter().filter_map(|e| e.error.clone()).collect();

    FilterResult {
        total_processed: entities.len(),
        total_matched,
        total_failed: errors.len(),
        entities,
        pagination,
        metrics,
        errors,
    }
}

/// `(outcome, data_retrieval_ms, rule_evaluation_ms)` for one entity.
type EntityTiming = (EntityOutcome, u64, u64);

#[allow(clippy::too_many_arguments)]
async fn process_entity(
    entity_id: &str,
    entity_type: &EntityType,
    rule: &Rule,
    referenced_fields: &[String],
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    custom_registry: &CustomCalculatorRegistry,
    options: &FilterOptions,
    semaphore: &Semaphore,
) -> EntityTiming {
    let _permit = semaphore.acquire().await.expect("semaphore not closed");
    let data_start = Instant::now();

    let entity_map = match fetch_entity_map(entity_id, entity_type, registry, client).await {
        Ok(map) => map,
        Err(err) => {
            let outcome = EntityOutcome {
                entity_id: entity_id.to_string(),
                matched: false,
                entity_data: None,
                trace: None,
                error: Some(EntityProcessingError::from_engine_error(entity_id, &err)),
            };
            return (outcome, data_start.elapsed().as_millis() as u64, 0);
        }
    };

    let missing: Vec<String> =
        referenced_fields.iter().filter(|f| !entity_map.contains_key(*f)).cloned().collect();

    let merged = if missing.is_empty() {
        entity_map
    } else {
        match dependency::build_plan(&missing, registry, &options.analyzer_config) {
            Ok(plan) => {
                let context = ExecutionContext {
                    entity_id: Some(entity_id.to_string()),
                    entity_type: Some(entity_type.type_name.clone()),
                    field_values: entity_map,
                };
                let request_cache = crate::cache::RequestCache::new();
                let result = resolver::resolve(
                    &plan,
                    &context,
                    registry,
                    client,
                    &request_cache,
                    custom_registry,
                    options.resolution_config,
                )
                .await;
                result.values
            }
            Err(cycle) => {
                let err = RulesEngineError::from(cycle);
                let outcome = EntityOutcome {
                    entity_id: entity_id.to_string(),
                    matched: false,
                    entity_data: None,
                    trace: None,
                    error: Some(EntityProcessingError::from_engine_error(entity_id, &err)),
                };
                return (outcome, data_start.elapsed().as_millis() as u64, 0);
            }
        }
    };
    let data_ms = data_start.elapsed().as_millis() as u64;

    let eval_start = Instant::now();
    let evaluation = evaluator::evaluate_with_trace(rule, &merged, options.trace);
    let eval_ms = eval_start.elapsed().as_millis() as u64;

    let outcome = EntityOutcome {
        entity_id: entity_id.to_string(),
        matched: evaluation.result,
        entity_data: Some(merged),
        trace: evaluation.trace,
        error: None,
    };
    (outcome, data_ms, eval_ms)
}

/// Fetch one entity's raw data and apply `entityType.fieldMappings` to
/// produce its starting field-value map. A fetch or mapping failure
/// fails the whole entity, matching the isolation contract: a partially
/// mapped entity is not a trustworthy basis for a rule decision.
async fn fetch_entity_map(
    entity_id: &str,
    entity_type: &EntityType,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
) -> Result<HashMap<String, Value>, RulesEngineError> {
    let mut variables = HashMap::new();
    variables.insert("entityId".to_string(), Value::String(entity_id.to_string()));

    let response = client.execute(&entity_type.data_service_config, &variables).await?;

    let mut entity_map = HashMap::with_capacity(entity_type.field_mappings.len());
    for (field_name, expression) in &entity_type.field_mappings {
        let target = registry
            .get(field_name)
            .map(|c| conversion_target_for(c))
            .unwrap_or(ConversionTarget::Raw);
        let value = mapper::map_json::<serde_json::Value>(&response, expression, target)?;
        entity_map.insert(field_name.clone(), value);
    }
    Ok(entity_map)
}

fn conversion_target_for(config: &FieldConfig) -> ConversionTarget {
    use crate::field::FieldType;
    match config.field_type {
        FieldType::Number => ConversionTarget::Number,
        FieldType::Boolean => ConversionTarget::Boolean,
        FieldType::Date => ConversionTarget::Date,
        FieldType::String | FieldType::Array | FieldType::Object => ConversionTarget::Raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dataservice::DataServiceError;
    use crate::field::{AuthConfig, DataServiceConfig, FieldType, HttpMethod};
    use crate::rule::parse_rule;

    struct EntityStub {
        by_id: HashMap<String, serde_json::Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataServiceClient for EntityStub {
        async fn execute(
            &self,
            _config: &DataServiceConfig,
            variables: &HashMap<String, Value>,
        ) -> Result<serde_json::Value, DataServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = variables.get("entityId").and_then(Value::as_str).unwrap_or_default();
            self.by_id
                .get(id)
                .cloned()
                .ok_or_else(|| DataServiceError { endpoint: "stub".to_string(), status: Some(404), cause: "not found".to_string() })
        }

        async fn validate(&self, _config: &DataServiceConfig) -> Result<(), DataServiceError> {
            Ok(())
        }
    }

    fn entity_type() -> EntityType {
        EntityType {
            type_name: "customer".to_string(),
            data_service_config: DataServiceConfig::Rest {
                endpoint: "https://entities/customer".to_string(),
                method: HttpMethod::Get,
                query_params: HashMap::new(),
                headers: HashMap::new(),
                body: None,
                auth: AuthConfig::None,
                timeout_ms: 30_000,
            },
            field_mappings: HashMap::from([
                ("age".to_string(), "age".to_string()),
                ("status".to_string(), "status".to_string()),
            ]),
            parent_type_name: None,
            metadata: HashMap::new(),
        }
    }

    fn registry() -> HashMap<String, FieldConfig> {
        HashMap::from([
            (
                "age".to_string(),
                FieldConfig {
                    field_name: "age".to_string(),
                    field_type: FieldType::Number,
                    is_required: false,
                    is_calculated: false,
                    default_value: None,
                    mapper_expression: None,
                    data_service_config: None,
                    calculator_config: None,
                    dependencies: vec![],
                    version: 1,
                },
            ),
            (
                "status".to_string(),
                FieldConfig {
                    field_name: "status".to_string(),
                    field_type: FieldType::String,
                    is_required: false,
                    is_calculated: false,
                    default_value: None,
                    mapper_expression: None,
                    data_service_config: None,
                    calculator_config: None,
                    dependencies: vec![],
                    version: 1,
                },
            ),
        ])
    }

    #[tokio::test]
    async fn partitions_matched_and_unmatched_preserving_order() {
        let stub = EntityStub {
            by_id: HashMap::from([
                ("1".to_string(), json!({"age": 30, "status": "active"})),
                ("2".to_string(), json!({"age": 12, "status": "active"})),
            ]),
            calls: AtomicUsize::new(0),
        };
        let client: Arc<dyn DataServiceClient> = Arc::new(stub);
        let rule = parse_rule(r#"{"combinator":"and","rules":[{"field":"age","operator":">=","value":18}]}"#).unwrap();
        let custom_registry = CustomCalculatorRegistry::default();

        let result = filter(
            &entity_type(),
            Some(vec!["1".to_string(), "2".to_string()]),
            &rule,
            &registry(),
            &client,
            &custom_registry,
            FilterOptions::default(),
        )
        .await;

        assert_eq!(result.total_processed, 2);
        assert_eq!(result.total_matched, 1);
        assert_eq!(result.entities[0].entity_id, "1");
        assert!(result.entities[0].matched);
        assert_eq!(result.entities[1].entity_id, "2");
        assert!(!result.entities[1].matched);
    }

    #[tokio::test]
    async fn data_service_failure_isolates_one_entity() {
        let stub = EntityStub {
            by_id: HashMap::from([("1".to_string(), json!({"age": 30, "status": "active"}))]),
            calls: AtomicUsize::new(0),
        };
        let client: Arc<dyn DataServiceClient> = Arc::new(stub);
        let rule = parse_rule(r#"{"combinator":"and","rules":[{"field":"age","operator":">=","value":18}]}"#).unwrap();
        let custom_registry = CustomCalculatorRegistry::default();

        let result = filter(
            &entity_type(),
            Some(vec!["1".to_string(), "missing".to_string()]),
            &rule,
            &registry(),
            &client,
            &custom_registry,
            FilterOptions::default(),
        )
        .await;

        assert_eq!(result.total_processed, 2);
        assert_eq!(result.total_matched, 1);
        assert_eq!(result.total_failed, 1);
        assert_eq!(result.errors[0].entity_id, "missing");
        assert!(result.entities[1].error.is_some());
    }

    #[tokio::test]
    async fn chunks_across_batch_size() {
        let stub = EntityStub {
            by_id: (0..5).map(|i| (i.to_string(), json!({"age": 20, "status": "active"}))).collect(),
            calls: AtomicUsize::new(0),
        };
        let client: Arc<dyn DataServiceClient> = Arc::new(stub);
        let rule = parse_rule(r#"{"combinator":"and","rules":[{"field":"status","operator":"=","value":"active"}]}"#).unwrap();
        let custom_registry = CustomCalculatorRegistry::default();
        let mut options = FilterOptions::default();
        options.batch_size = 2;

        let ids: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let result =
            filter(&entity_type(), Some(ids), &rule, &registry(), &client, &custom_registry, options).await;

        assert_eq!(result.metrics.batch_count, 3);
        assert_eq!(result.total_matched, 5);
    }
}
