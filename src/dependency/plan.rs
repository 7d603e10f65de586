use std::collections::HashMap;

use crate::field::{DataServiceConfig, FieldConfig};
use crate::rule::Rule;
use crate::value::Value;

use super::dag::{self, NodeKind};
use super::error::CyclicDependencyError;

/// Tunables for plan construction (§6 `analyzer.*`).
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    pub merge_group_threshold: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig { merge_group_threshold: 3 }
    }
}

const MS_PER_FIELD_PARALLEL: u64 = 100;
const MS_PER_FIELD_CHAIN: u64 = 150;

/// One data-service call batching together every field mapped from its
/// response.
#[derive(Debug, Clone)]
pub struct Batch {
    pub config: DataServiceConfig,
    pub fields: Vec<String>,
}

/// All the data-service fields resolvable in parallel at one dependency
/// level, partitioned into per-call batches.
#[derive(Debug, Clone)]
pub struct ParallelExecutionGroup {
    pub level: usize,
    pub batches: Vec<Batch>,
    pub estimated_ms: u64,
}

impl ParallelExecutionGroup {
    pub fn field_count(&self) -> usize {
        self.batches.iter().map(|b| b.fields.len()).sum()
    }
}

/// One step of a sequential chain: a data-service field whose call
/// variables depend on an earlier step's resolved value.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub field: String,
    pub config: DataServiceConfig,
}

/// A linear order of data-service fields, each depending on the one
/// before it transitively.
#[derive(Debug, Clone)]
pub struct SequentialExecutionChain {
    pub steps: Vec<ChainStep>,
    pub estimated_ms: u64,
}

/// The full execution plan for resolving a set of fields.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    pub static_values: HashMap<String, Value>,
    pub parallel_groups: Vec<ParallelExecutionGroup>,
    pub sequential_chains: Vec<SequentialExecutionChain>,
    pub calculated_order: Vec<String>,
    pub estimated_ms: u64,
}

/// Collect every field referenced as a leaf condition in `rule`. Used to
/// scope planning to only the fields a rule actually needs.
pub fn fields_referenced_by(rule: &Rule) -> Vec<String> {
    rule.referenced_fields()
}

/// Build a [`ResolutionPlan`] for `field_names`, resolving transitively
/// through each field's `dependencies` within `registry`.
pub fn build_plan(
    field_names: &[String],
    registry: &HashMap<String, FieldConfig>,
    analyzer: &AnalyzerConfig,
) -> Result<ResolutionPlan, CyclicDependencyError> {
    let scoped = close_over_dependencies(field_names, registry);
    dag::detect_cycle(&scoped)?;
    let levels = dag::compute_levels(&scoped);

    let mut plan = ResolutionPlan::default();
    let mut chained_fields: std::collections::HashSet<String> = std::collections::HashSet::new();

    // Sequential chains first, per the Open Question resolution: a field
    // that is part of a chain is omitted from parallel groups.
    let chains = build_chains(&scoped);
    for chain in &chains {
        for step in &chain.steps {
            chained_fields.insert(step.field.clone());
        }
    }
    plan.sequential_chains = chains;

    let max_level = levels.values().copied().max().unwrap_or(0);
    for level in 0..=max_level {
        let mut by_batch_key: HashMap<String, Batch> = HashMap::new();
        for (name, config) in &scoped {
            if levels.get(name).copied() != Some(level) {
                continue;
            }
            if chained_fields.contains(name) {
                continue;
            }
            match dag::classify(config) {
                NodeKind::DataService => {
                    let data_service = config.data_service_config.clone().expect("classified as DataService");
                    let key = data_service.batch_key();
                    by_batch_key
                        .entry(key)
                        .or_insert_with(|| Batch { config: data_service, fields: Vec::new() })
                        .fields
                        .push(name.clone());
                }
                NodeKind::Static => {
                    if let Some(default) = &config.default_value {
                        plan.static_values.insert(name.clone(), default.clone());
                    }
                }
                NodeKind::Calculated => {}
            }
        }

        let groups = merge_small_groups(by_batch_key.into_values().collect(), analyzer.merge_group_threshold);
        for batches in groups {
            let field_count: usize = batches.iter().map(|b| b.fields.len()).sum();
            plan.parallel_groups.push(ParallelExecutionGroup {
                level,
                estimated_ms: MS_PER_FIELD_PARALLEL * field_count.max(1) as u64,
                batches,
            });
        }
    }

    plan.calculated_order = topological_calculated_order(&scoped, &levels);
    plan.estimated_ms = estimate_total(&plan);
    Ok(plan)
}

/// Pull in every field transitively referenced as a dependency, so the
/// plan has a config for each node it needs to schedule.
fn close_over_dependencies(
    field_names: &[String],
    registry: &HashMap<String, FieldConfig>,
) -> HashMap<String, FieldConfig> {
    let mut scoped = HashMap::new();
    let mut stack: Vec<String> = field_names.to_vec();
    while let Some(name) = stack.pop() {
        if scoped.contains_key(&name) {
            continue;
        }
        if let Some(config) = registry.get(&name) {
            for dep in &config.dependencies {
                stack.push(dep.clone());
            }
            scoped.insert(name, config.clone());
        }
    }
    scoped
}

/// Group small parallel batches hitting the same endpoint into one group,
/// below `threshold` fields, to avoid scheduling many tiny concurrent
/// tasks for a level.
fn merge_small_groups(batches: Vec<Batch>, threshold: usize) -> Vec<Vec<Batch>> {
    let mut small_by_endpoint: HashMap<String, Vec<Batch>> = HashMap::new();
    let mut groups: Vec<Vec<Batch>> = Vec::new();

    for batch in batches {
        if batch.fields.len() < threshold {
            small_by_endpoint.entry(batch.config.endpoint().to_string()).or_default().push(batch);
        } else {
            groups.push(vec![batch]);
        }
    }
    groups.extend(small_by_endpoint.into_values());
    groups.sort_by_key(|g| g.iter().map(|b| b.fields.len()).sum::<usize>());
    groups
}

/// Build sequential chains for data-service fields that depend
/// (transitively) on other data-service fields within the same level set.
fn build_chains(scoped: &HashMap<String, FieldConfig>) -> Vec<SequentialExecutionChain> {
    let data_service_deps: HashMap<&str, Vec<&str>> = scoped
        .iter()
        .filter(|(_, c)| dag::classify(c) == NodeKind::DataService)
        .map(|(name, c)| {
            let deps: Vec<&str> = c
                .dependencies
                .iter()
                .filter(|d| {
                    scoped.get(d.as_str()).map(dag::classify) == Some(NodeKind::DataService)
                })
                .map(String::as_str)
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    // Only fields with at least one data-service dependency start a chain.
    let mut visited: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut chains = Vec::new();

    let has_ds_successor: std::collections::HashSet<&str> =
        data_service_deps.values().flatten().copied().collect();

    for (&name, deps) in &data_service_deps {
        if deps.is_empty() {
            continue;
        }
        if has_ds_successor.contains(name) {
            // not a terminal node of its chain; will be reached from its successor
            continue;
        }
        if visited.contains(name) {
            continue;
        }
        let mut order = Vec::new();
        let mut current = name;
        loop {
            order.push(current);
            visited.insert(current);
            match data_service_deps.get(current).and_then(|d| d.first()) {
                Some(next) => current = next,
                None => break,
            }
        }
        order.reverse();
        let steps: Vec<ChainStep> = order
            .into_iter()
            .map(|f| ChainStep {
                field: f.to_string(),
                config: scoped[f].data_service_config.clone().expect("chain node is DataService"),
            })
            .collect();
        let estimated_ms = MS_PER_FIELD_CHAIN * steps.len() as u64;
        chains.push(SequentialExecutionChain { steps, estimated_ms });
    }

    chains
}

fn topological_calculated_order(scoped: &HashMap<String, FieldConfig>, levels: &HashMap<String, usize>) -> Vec<String> {
    let mut calculated: Vec<&String> = scoped
        .iter()
        .filter(|(_, c)| dag::classify(c) == NodeKind::Calculated)
        .map(|(name, _)| name)
        .collect();
    calculated.sort_by_key(|name| (levels.get(*name).copied().unwrap_or(0), (*name).clone()));
    calculated.into_iter().cloned().collect()
}

fn estimate_total(plan: &ResolutionPlan) -> u64 {
    let mut by_level: HashMap<usize, u64> = HashMap::new();
    for group in &plan.parallel_groups {
        let entry = by_level.entry(group.level).or_insert(0);
        *entry = (*entry).max(group.estimated_ms);
    }
    let parallel_total: u64 = by_level.values().sum();
    let chain_total: u64 = plan.sequential_chains.iter().map(|c| c.estimated_ms).sum();
    parallel_total + chain_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{AuthConfig, FieldType, HttpMethod};

    fn rest_config(endpoint: &str) -> DataServiceConfig {
        DataServiceConfig::Rest {
            endpoint: endpoint.to_string(),
            method: HttpMethod::Get,
            query_params: HashMap::new(),
            headers: HashMap::new(),
            body: None,
            auth: AuthConfig::None,
            timeout_ms: 30_000,
        }
    }

    fn data_service_field(name: &str, endpoint: &str, deps: &[&str]) -> FieldConfig {
        FieldConfig {
            field_name: name.to_string(),
            field_type: FieldType::String,
            is_required: false,
            is_calculated: false,
            default_value: None,
            mapper_expression: Some("value".to_string()),
            data_service_config: Some(rest_config(endpoint)),
            calculator_config: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            version: 1,
        }
    }

    #[test]
    fn independent_fields_land_in_same_level_different_groups() {
        let registry = HashMap::from([
            ("creditScore".to_string(), data_service_field("creditScore", "https://credit/score", &[])),
            ("accountStatus".to_string(), data_service_field("accountStatus", "https://account/status", &[])),
        ]);
        let plan = build_plan(
            &["creditScore".to_string(), "accountStatus".to_string()],
            &registry,
            &AnalyzerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.parallel_groups.iter().map(|g| g.level).max(), Some(0));
        assert_eq!(plan.parallel_groups.iter().map(|g| g.field_count()).sum::<usize>(), 2);
    }

    #[test]
    fn chained_data_service_fields_form_a_sequential_chain() {
        let registry = HashMap::from([
            ("userId".to_string(), data_service_field("userId", "https://auth/whoami", &[])),
            ("userProfile".to_string(), data_service_field("userProfile", "https://profile/{userId}", &["userId"])),
        ]);
        let plan = build_plan(
            &["userProfile".to_string()],
            &registry,
            &AnalyzerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.sequential_chains.len(), 1);
        assert_eq!(plan.sequential_chains[0].steps[0].field, "userId");
        assert_eq!(plan.sequential_chains[0].steps[1].field, "userProfile");
        assert!(plan.parallel_groups.iter().all(|g| g.field_count() == 0
            || g.batches.iter().all(|b| !b.fields.contains(&"userId".to_string()) && !b.fields.contains(&"userProfile".to_string()))));
    }

    #[test]
    fn cyclic_dependencies_abort_planning() {
        let registry = HashMap::from([
            ("a".to_string(), FieldConfig {
                field_name: "a".to_string(),
                field_type: FieldType::String,
                is_required: false,
                is_calculated: true,
                default_value: None,
                mapper_expression: None,
                data_service_config: None,
                calculator_config: Some(crate::field::CalculatorConfig::Expression { expr: "#b".to_string() }),
                dependencies: vec!["b".to_string()],
                version: 1,
            }),
            ("b".to_string(), FieldConfig {
                field_name: "b".to_string(),
                field_type: FieldType::String,
                is_required: false,
                is_calculated: true,
                default_value: None,
                mapper_expression: None,
                data_service_config: None,
                calculator_config: Some(crate::field::CalculatorConfig::Expression { expr: "#a".to_string() }),
                dependencies: vec!["a".to_string()],
                version: 1,
            }),
        ]);
        let result = build_plan(&["a".to_string()], &registry, &AnalyzerConfig::default());
        assert!(result.is_err());
    }
}
