//! Field resolver (C7): executes a [`ResolutionPlan`] against an
//! [`ExecutionContext`], fetching data-service fields and running
//! calculators, with per-resolution memoization and per-field error
//! isolation.

mod status;

pub use status::{FieldStatus, PerFieldStatus};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{instrument, warn};

use crate::cache::RequestCache;
use crate::calculator::{self, CalcContext, CustomCalculatorRegistry};
use crate::dataservice::DataServiceClient;
use crate::dependency::{Batch, ChainStep, ResolutionPlan};
use crate::error::{FieldError, RulesEngineError};
use crate::field::{DataServiceConfig, FieldConfig, FieldType};
use crate::mapper::{self, ConversionTarget};
use crate::value::Value;

/// Caller-supplied field values and entity context. Values present here
/// short-circuit all other resolution for that field name.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub field_values: HashMap<String, Value>,
}

/// The outcome of resolving one plan.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResult {
    pub values: HashMap<String, Value>,
    pub per_field_status: Vec<PerFieldStatus>,
    pub errors: Vec<FieldError>,
    pub total_ms: u64,
    pub has_errors: bool,
}

/// Bounds applied while resolving a plan.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionConfig {
    pub overall_timeout_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig { overall_timeout_ms: 60_000 }
    }
}

fn conversion_target_for(field_type: FieldType) -> ConversionTarget {
    match field_type {
        FieldType::Number => ConversionTarget::Number,
        FieldType::Boolean => ConversionTarget::Boolean,
        FieldType::Date => ConversionTarget::Date,
        FieldType::String | FieldType::Array | FieldType::Object => ConversionTarget::Raw,
    }
}

fn query_text(config: &DataServiceConfig) -> String {
    match config {
        DataServiceConfig::GraphQl { query, .. } => query.clone(),
        DataServiceConfig::Rest { method, endpoint, .. } => format!("{method:?} {endpoint}"),
    }
}

/// Resolve `plan` against `context`, using `registry` for mapper
/// expressions, field types, defaults, and calculator configs.
#[instrument(skip(plan, context, registry, client, request_cache, custom_registry))]
pub async fn resolve(
    plan: &ResolutionPlan,
    context: &ExecutionContext,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    custom_registry: &CustomCalculatorRegistry,
    config: ResolutionConfig,
) -> ResolutionResult {
    let start = Instant::now();
    let mut result = ResolutionResult::default();

    result.values.extend(plan.static_values.clone());
    result.values.extend(context.field_values.clone());
    for name in plan.static_values.keys() {
        if !context.field_values.contains_key(name) {
            result.per_field_status.push(PerFieldStatus::resolved(name));
        }
    }
    for name in context.field_values.keys() {
        result.per_field_status.push(PerFieldStatus::resolved(name));
    }

    // Snapshot of everything already known before a single data-service
    // call is issued (static defaults + context), so chains/batches that
    // are fully covered by it can be pruned before fetching (P4).
    let already_present = result.values.clone();

    let body = async {
        resolve_chains_and_levels(plan, registry, client, request_cache, &already_present, &mut result).await;

        for field_name in &plan.calculated_order {
            resolve_calculated_field(field_name, registry, custom_registry, &mut result);
        }
    };

    if tokio::time::timeout(Duration::from_millis(config.overall_timeout_ms), body).await.is_err() {
        warn!(timeout_ms = config.overall_timeout_ms, "resolution exceeded overall timeout");
        let timeout_err = RulesEngineError::Timeout { timeout_ms: config.overall_timeout_ms };
        for name in registry.keys() {
            if !result.values.contains_key(name) {
                result.has_errors = true;
                result.errors.push(FieldError::new(name, &timeout_err));
                result.per_field_status.push(PerFieldStatus::missing(name, &timeout_err.to_string()));
            }
        }
    }

    result.total_ms = start.elapsed().as_millis() as u64;
    result
}

async fn resolve_chains_and_levels(
    plan: &ResolutionPlan,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    already_present: &HashMap<String, Value>,
    result: &mut ResolutionResult,
) {
    // Chains and levels touch disjoint field sets (a chained field is
    // never also placed in a parallel group), so the two can run
    // concurrently; each chain honors its own internal order.
    let chain_results = run_chains(plan, registry, client, request_cache, already_present);
    let level_results = run_levels(plan, registry, client, request_cache, already_present);
    let (chain_outcomes, level_outcomes) = tokio::join!(chain_results, level_results);

    apply_outcomes(chain_outcomes, registry, result);
    apply_outcomes(level_outcomes, registry, result);
}

/// `(field_name, mapped_value_or_error)` from one data-service call.
type FieldOutcome = (String, Result<Value, RulesEngineError>);

async fn run_chains(
    plan: &ResolutionPlan,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    already_present: &HashMap<String, Value>,
) -> Vec<FieldOutcome> {
    let futures = plan
        .sequential_chains
        .iter()
        .map(|chain| run_chain(&chain.steps, registry, client, request_cache, already_present));
    futures_util::future::join_all(futures).await.into_iter().flatten().collect()
}

async fn run_chain(
    steps: &[ChainStep],
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    already_present: &HashMap<String, Value>,
) -> Vec<FieldOutcome> {
    let mut resolved: HashMap<String, Value> = HashMap::new();
    let mut outcomes = Vec::new();
    for step in steps {
        // Already supplied by the caller: seed it for any later step in
        // this chain that needs it as a call variable, but never fetch it.
        if let Some(value) = already_present.get(&step.field) {
            resolved.insert(step.field.clone(), value.clone());
            continue;
        }
        let outcome = fetch_and_map_single(&step.field, &step.config, registry, client, request_cache, &resolved).await;
        if let Ok(value) = &outcome {
            resolved.insert(step.field.clone(), value.clone());
        }
        outcomes.push((step.field.clone(), outcome));
    }
    outcomes
}

async fn run_levels(
    plan: &ResolutionPlan,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    already_present: &HashMap<String, Value>,
) -> Vec<FieldOutcome> {
    let max_level = plan.parallel_groups.iter().map(|g| g.level).max().unwrap_or(0);
    let mut outcomes = Vec::new();

    for level in 0..=max_level {
        let futures = plan
            .parallel_groups
            .iter()
            .filter(|g| g.level == level)
            .map(|group| run_group(&group.batches, registry, client, request_cache, already_present));
        let level_outcomes = futures_util::future::join_all(futures).await;
        outcomes.extend(level_outcomes.into_iter().flatten());
    }
    outcomes
}

async fn run_group(
    batches: &[Batch],
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    already_present: &HashMap<String, Value>,
) -> Vec<FieldOutcome> {
    let mut outcomes = Vec::new();
    for batch in batches {
        // Every field this batch's call would populate is already known;
        // skip the call entirely rather than fetch and discard (P4).
        if batch.fields.iter().all(|f| already_present.contains_key(f)) {
            continue;
        }
        outcomes.extend(fetch_and_map_batch(batch, registry, client, request_cache, &HashMap::new()).await);
    }
    outcomes
}

async fn fetch_and_map_batch(
    batch: &Batch,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    extra_variables: &HashMap<String, Value>,
) -> Vec<FieldOutcome> {
    let query = query_text(&batch.config);
    let endpoint = batch.config.endpoint().to_string();

    let response = match request_cache.get(&endpoint, &query, extra_variables) {
        Some(cached) => Ok(cached),
        None => {
            let fetched = client.execute(&batch.config, extra_variables).await;
            if let Ok(body) = &fetched {
                request_cache.insert(&endpoint, &query, extra_variables, body.clone());
            }
            fetched.map_err(RulesEngineError::from)
        }
    };

    match response {
        Ok(body) => batch
            .fields
            .iter()
            .map(|field_name| {
                let mapped = map_field(field_name, &body, registry);
                (field_name.clone(), mapped)
            })
            .collect(),
        Err(e) => batch.fields.iter().map(|field_name| (field_name.clone(), Err(e.clone()))).collect(),
    }
}

async fn fetch_and_map_single(
    field_name: &str,
    data_service_config: &DataServiceConfig,
    registry: &HashMap<String, FieldConfig>,
    client: &Arc<dyn DataServiceClient>,
    request_cache: &RequestCache,
    variables: &HashMap<String, Value>,
) -> Result<Value, RulesEngineError> {
    let batch = Batch { config: data_service_config.clone(), fields: vec![field_name.to_string()] };
    let mut outcomes = fetch_and_map_batch(&batch, registry, client, request_cache, variables).await;
    outcomes.pop().map(|(_, outcome)| outcome).unwrap_or_else(|| {
        Err(RulesEngineError::ProcessingError { message: format!("no outcome produced for '{field_name}'") })
    })
}

fn map_field(field_name: &str, response: &serde_json::Value, registry: &HashMap<String, FieldConfig>) -> Result<Value, RulesEngineError> {
    let config = registry.get(field_name).ok_or_else(|| RulesEngineError::FieldNotFound { name: field_name.to_string() })?;
    let expression = config
        .mapper_expression
        .as_deref()
        .ok_or_else(|| RulesEngineError::ProcessingError { message: format!("field '{field_name}' has no mapper expression") })?;
    let target = conversion_target_for(config.field_type);
    mapper::map_json::<serde_json::Value>(response, expression, target).map_err(RulesEngineError::from)
}

fn apply_outcomes(outcomes: Vec<FieldOutcome>, registry: &HashMap<String, FieldConfig>, result: &mut ResolutionResult) {
    for (field_name, outcome) in outcomes {
        if result.values.contains_key(&field_name) {
            // Already supplied via context/static values; the batch or
            // chain step that would have fetched it was pruned upstream
            // in run_group/run_chain, so this is a defensive no-op.
            continue;
        }
        match outcome {
            Ok(value) => {
                result.values.insert(field_name.clone(), value);
                result.per_field_status.push(PerFieldStatus::resolved(&field_name));
            }
            Err(err) => degrade_or_fail(&field_name, err, registry, result),
        }
    }
}

fn resolve_calculated_field(
    field_name: &str,
    registry: &HashMap<String, FieldConfig>,
    custom_registry: &CustomCalculatorRegistry,
    result: &mut ResolutionResult,
) {
    if result.values.contains_key(field_name) {
        return;
    }
    let Some(config) = registry.get(field_name) else {
        return;
    };
    let Some(calculator_config) = &config.calculator_config else {
        return;
    };

    let ctx = CalcContext::new(&result.values);
    let outcome = calculator::calculate(calculator_config, field_name, config.version, &ctx, custom_registry)
        .map_err(RulesEngineError::from);

    match outcome {
        Ok(value) => {
            result.values.insert(field_name.to_string(), value);
            result.per_field_status.push(PerFieldStatus::resolved(field_name));
        }
        Err(err) => degrade_or_fail(field_name, err, registry, result),
    }
}

fn degrade_or_fail(field_name: &str, err: RulesEngineError, registry: &HashMap<String, FieldConfig>, result: &mut ResolutionResult) {
    let default_value = registry.get(field_name).and_then(|c| c.default_value.clone());
    result.errors.push(FieldError::new(field_name, &err));
    match default_value {
        Some(default) => {
            warn!(field = field_name, error = %err, "field resolution failed, degrading to default");
            result.values.insert(field_name.to_string(), default);
            result.per_field_status.push(PerFieldStatus::defaulted(field_name));
        }
        None => {
            result.has_errors = true;
            result.per_field_status.push(PerFieldStatus::missing(field_name, &err.to_string()));
        }
    }
}
