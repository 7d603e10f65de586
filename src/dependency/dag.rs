use std::collections::HashMap;

use tracing::warn;

use crate::field::FieldConfig;

use super::error::CyclicDependencyError;

/// A field's role in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Static,
    DataService,
    Calculated,
}

pub fn classify(config: &FieldConfig) -> NodeKind {
    if config.calculator_config.is_some() {
        NodeKind::Calculated
    } else if config.data_service_config.is_some() {
        NodeKind::DataService
    } else {
        NodeKind::Static
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Detect a cycle via standard DFS white/gray/black coloring. Dependency
/// names absent from `configs` produce a warning but no edge — they are
/// assumed to be resolved elsewhere (e.g. supplied directly in context).
pub fn detect_cycle(configs: &HashMap<String, FieldConfig>) -> Result<(), CyclicDependencyError> {
    let mut colors: HashMap<&str, Color> = configs.keys().map(|k| (k.as_str(), Color::White)).collect();
    let mut stack: Vec<String> = Vec::new();

    for name in configs.keys() {
        if colors[name.as_str()] == Color::White {
            visit(name, configs, &mut colors, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    configs: &'a HashMap<String, FieldConfig>,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<String>,
) -> Result<(), CyclicDependencyError> {
    colors.insert(name, Color::Gray);
    stack.push(name.to_string());

    if let Some(config) = configs.get(name) {
        for dep in &config.dependencies {
            if !configs.contains_key(dep) {
                warn!(field = name, dependency = %dep, "dependency not present in field-config set");
                continue;
            }
            match colors.get(dep.as_str()) {
                Some(Color::White) => visit(dep, configs, colors, stack)?,
                Some(Color::Gray) => {
                    let start = stack.iter().position(|f| f == dep).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..].to_vec();
                    path.push(dep.clone());
                    return Err(CyclicDependencyError::new(path));
                }
                _ => {}
            }
        }
    }

    stack.pop();
    colors.insert(name, Color::Black);
    Ok(())
}

/// `dependencyLevel(n) = max over dependencies of dependencyLevel+1`;
/// roots have level 0. Assumes the graph is acyclic (call after
/// [`detect_cycle`] succeeds).
pub fn compute_levels(configs: &HashMap<String, FieldConfig>) -> HashMap<String, usize> {
    let mut levels: HashMap<String, usize> = HashMap::new();
    for name in configs.keys() {
        level_of(name, configs, &mut levels);
    }
    levels
}

fn level_of(name: &str, configs: &HashMap<String, FieldConfig>, levels: &mut HashMap<String, usize>) -> usize {
    if let Some(l) = levels.get(name) {
        return *l;
    }
    let level = match configs.get(name) {
        Some(config) if !config.dependencies.is_empty() => config
            .dependencies
            .iter()
            .filter(|d| configs.contains_key(d.as_str()))
            .map(|d| level_of(d, configs, levels) + 1)
            .max()
            .unwrap_or(0),
        _ => 0,
    };
    levels.insert(name.to_string(), level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    fn field(name: &str, deps: &[&str]) -> FieldConfig {
        FieldConfig {
            field_name: name.to_string(),
            field_type: FieldType::String,
            is_required: false,
            is_calculated: !deps.is_empty(),
            default_value: None,
            mapper_expression: None,
            data_service_config: None,
            calculator_config: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            version: 1,
        }
    }

    #[test]
    fn acyclic_graph_passes() {
        let configs = HashMap::from([
            ("a".to_string(), field("a", &[])),
            ("b".to_string(), field("b", &["a"])),
        ]);
        assert!(detect_cycle(&configs).is_ok());
    }

    #[test]
    fn cycle_reports_path_with_equal_endpoints() {
        let configs = HashMap::from([
            ("a".to_string(), field("a", &["b"])),
            ("b".to_string(), field("b", &["c"])),
            ("c".to_string(), field("c", &["a"])),
        ]);
        let err = detect_cycle(&configs).unwrap_err();
        assert_eq!(err.path.first(), err.path.last());
        assert!(err.path.len() >= 2);
    }

    #[test]
    fn levels_respect_dependency_order() {
        let configs = HashMap::from([
            ("a".to_string(), field("a", &[])),
            ("b".to_string(), field("b", &["a"])),
            ("c".to_string(), field("c", &["b"])),
        ]);
        let levels = compute_levels(&configs);
        assert_eq!(levels["a"], 0);
        assert_eq!(levels["b"], 1);
        assert_eq!(levels["c"], 2);
    }

    #[test]
    fn missing_dependency_is_ignored_not_an_edge() {
        let configs = HashMap::from([("a".to_string(), field("a", &["ghost"]))]);
        assert!(detect_cycle(&configs).is_ok());
        let levels = compute_levels(&configs);
        assert_eq!(levels["a"], 0);
    }
}
