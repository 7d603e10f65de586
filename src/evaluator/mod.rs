//! Rule evaluator: walks a parsed [`Rule`] against a resolved field-value
//! map and produces a boolean result plus an optional trace.
//!
//! Evaluation is total — a missing field never panics, it just makes every
//! non-emptiness predicate false — and short-circuits the way `AND`/`OR`
//! are defined in boolean logic (P7).

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::rule::{Combinator, Condition, Operator, Rule, RuleNode};
use crate::value::Value;

/// The outcome of evaluating one leaf condition, for tracing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceOutcome {
    Matched,
    NotMatched,
    Error,
}

/// A single trace entry: one leaf evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub path: String,
    pub operator: String,
    pub lhs: Option<Value>,
    pub rhs: Option<Value>,
    pub outcome: TraceOutcome,
}

/// A roll-up for one group node: its combinator, its own result, and the
/// path of the group within the rule tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRollup {
    pub path: String,
    pub combinator: Combinator,
    pub result: bool,
}

/// Every leaf-level entry plus a roll-up for every group node evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub entries: Vec<TraceEntry>,
    pub groups: Vec<GroupRollup>,
}

/// The result of evaluating a rule against a field-value map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub result: bool,
    pub trace: Option<Trace>,
    pub duration_ms: u64,
}

/// Evaluate `rule` against `field_values`, with tracing disabled.
pub fn evaluate(rule: &Rule, field_values: &HashMap<String, Value>) -> EvaluationResult {
    evaluate_with_trace(rule, field_values, false)
}

/// Evaluate `rule` against `field_values`. When `trace` is true, every
/// leaf evaluation is recorded; the trace is otherwise omitted entirely,
/// matching the opt-in contract in the spec.
pub fn evaluate_with_trace(
    rule: &Rule,
    field_values: &HashMap<String, Value>,
    trace: bool,
) -> EvaluationResult {
    let start = Instant::now();
    let mut root_trace = Trace { entries: Vec::new(), groups: Vec::new() };
    let result = eval_node(&rule.root, field_values, trace.then_some(&mut root_trace), "root");
    EvaluationResult {
        result,
        trace: trace.then_some(root_trace),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn eval_node(
    node: &RuleNode,
    values: &HashMap<String, Value>,
    mut trace: Option<&mut Trace>,
    path: &str,
) -> bool {
    match node {
        RuleNode::Condition(cond) => {
            let entries = trace.as_deref_mut().map(|t| &mut t.entries);
            eval_condition(cond, values, entries, path)
        }
        RuleNode::Group(group) => {
            let result = if group.rules.is_empty() {
                true
            } else {
                match group.combinator {
                    Combinator::And => {
                        let mut all_true = true;
                        for (i, child) in group.rules.iter().enumerate() {
                            let child_path = format!("{path}.{i}");
                            if !eval_node(child, values, trace.as_deref_mut(), &child_path) {
                                all_true = false;
                                break;
                            }
                        }
                        all_true
                    }
                    Combinator::Or => {
                        let mut any_true = false;
                        for (i, child) in group.rules.iter().enumerate() {
                            let child_path = format!("{path}.{i}");
                            if eval_node(child, values, trace.as_deref_mut(), &child_path) {
                                any_true = true;
                                break;
                            }
                        }
                        any_true
                    }
                }
            };
            if let Some(trace) = trace.as_deref_mut() {
                trace.groups.push(GroupRollup {
                    path: path.to_string(),
                    combinator: group.combinator,
                    result,
                });
            }
            result
        }
    }
}

fn eval_condition(
    cond: &Condition,
    values: &HashMap<String, Value>,
    entries: Option<&mut Vec<TraceEntry>>,
    path: &str,
) -> bool {
    let lhs = values.get(&cond.field);

    let (is_error, result) = match cond.operator {
        Operator::IsEmpty => {
            let empty = lhs.map(Value::is_empty_value).unwrap_or(true);
            (false, empty)
        }
        Operator::IsNotEmpty => {
            let empty = lhs.map(Value::is_empty_value).unwrap_or(true);
            (false, !empty)
        }
        _ => match lhs {
            None => (false, false),
            Some(lhs) => eval_comparison(cond.operator, lhs, &cond.value),
        },
    };

    if let Some(entries) = entries {
        let outcome = if is_error {
            TraceOutcome::Error
        } else if result {
            TraceOutcome::Matched
        } else {
            TraceOutcome::NotMatched
        };
        entries.push(TraceEntry {
            path: path.to_string(),
            operator: operator_name(cond.operator).to_string(),
            lhs: lhs.cloned(),
            rhs: Some(cond.value.clone()),
            outcome,
        });
    }

    result
}

/// Evaluate a comparison operator, returning `(is_error, result)`. A
/// coercion failure yields `(true, false)`, matching the spec's failure
/// semantics: the leaf reduces to false and is traced as an error.
fn eval_comparison(operator: Operator, lhs: &Value, rhs: &Value) -> (bool, bool) {
    match operator {
        Operator::Eq => (false, lhs.coerced_eq(rhs)),
        Operator::Ne => (false, !lhs.coerced_eq(rhs)),
        Operator::Lt => match lhs.compare(rhs) {
            Some(o) => (false, o.is_lt()),
            None => (true, false),
        },
        Operator::Lte => match lhs.compare(rhs) {
            Some(o) => (false, o.is_le()),
            None => (true, false),
        },
        Operator::Gt => match lhs.compare(rhs) {
            Some(o) => (false, o.is_gt()),
            None => (true, false),
        },
        Operator::Gte => match lhs.compare(rhs) {
            Some(o) => (false, o.is_ge()),
            None => (true, false),
        },
        Operator::Contains => (false, contains(lhs, rhs)),
        Operator::NotContains => (false, !contains(lhs, rhs)),
        Operator::StartsWith => match (lhs.as_str(), rhs.as_str()) {
            (Some(l), Some(r)) => (false, l.starts_with(r)),
            _ => (true, false),
        },
        Operator::EndsWith => match (lhs.as_str(), rhs.as_str()) {
            (Some(l), Some(r)) => (false, l.ends_with(r)),
            _ => (true, false),
        },
        Operator::In => match rhs.as_list() {
            Some(items) => (false, items.iter().any(|v| v.coerced_eq(lhs))),
            None => (true, false),
        },
        Operator::NotIn => match rhs.as_list() {
            Some(items) => (false, !items.iter().any(|v| v.coerced_eq(lhs))),
            None => (true, false),
        },
        Operator::Between => match rhs.as_list() {
            Some([a, b]) => match (lhs.compare(a), lhs.compare(b)) {
                (Some(ge_a), Some(le_b)) => (false, ge_a.is_ge() && le_b.is_le()),
                _ => (true, false),
            },
            _ => (true, false),
        },
        Operator::IsEmpty | Operator::IsNotEmpty => unreachable!("handled in eval_condition"),
    }
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::String(s) => rhs.as_str().map(|r| s.contains(r)).unwrap_or(false),
        Value::List(items) => items.iter().any(|v| v.coerced_eq(rhs)),
        _ => false,
    }
}

fn operator_name(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Contains => "contains",
        Operator::NotContains => "notContains",
        Operator::StartsWith => "startsWith",
        Operator::EndsWith => "endsWith",
        Operator::In => "in",
        Operator::NotIn => "notIn",
        Operator::IsEmpty => "isEmpty",
        Operator::IsNotEmpty => "isNotEmpty",
        Operator::Between => "between",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::parse_rule;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn scenario_1_simple_numeric_and() {
        let rule =
            parse_rule(r#"{"combinator":"and","rules":[{"field":"age","operator":">=","value":18}]}"#)
                .unwrap();
        let ctx = values(&[("age", Value::Number(25.into()))]);
        let result = evaluate_with_trace(&rule, &ctx, true);
        assert!(result.result);
        assert_eq!(result.trace.unwrap().entries.len(), 1);
    }

    #[test]
    fn scenario_2_coercion_across_nested_or() {
        let rule = parse_rule(
            r#"{"combinator":"or","rules":[{"field":"status","operator":"=","value":"active"},{"field":"score","operator":">","value":"80"}]}"#,
        )
        .unwrap();
        let ctx = values(&[
            ("status", Value::String("pending".to_string())),
            ("score", Value::Number(85.into())),
        ]);
        assert!(evaluate(&rule, &ctx).result);
    }

    #[test]
    fn empty_rule_tree_is_true() {
        let rule = parse_rule(r#"{"combinator":"and","rules":[{"combinator":"or","rules":[]}]}"#).unwrap();
        assert!(evaluate(&rule, &HashMap::new()).result);
    }

    #[test]
    fn is_empty_on_missing_field_is_true() {
        let rule =
            parse_rule(r#"{"combinator":"and","rules":[{"field":"missing","operator":"isEmpty","value":null}]}"#)
                .unwrap();
        assert!(evaluate(&rule, &HashMap::new()).result);
    }

    #[test]
    fn is_not_empty_on_missing_field_is_false() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"missing","operator":"isNotEmpty","value":null}]}"#,
        )
        .unwrap();
        assert!(!evaluate(&rule, &HashMap::new()).result);
    }

    #[test]
    fn between_with_inverted_bounds_is_always_false() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"x","operator":"between","value":[10,1]}]}"#,
        )
        .unwrap();
        let ctx = values(&[("x", Value::Number(5.into()))]);
        assert!(!evaluate(&rule, &ctx).result);
    }

    #[test]
    fn between_inclusive_bounds() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"x","operator":"between","value":[1,10]}]}"#,
        )
        .unwrap();
        assert!(evaluate(&rule, &values(&[("x", Value::Number(1.into()))])).result);
        assert!(evaluate(&rule, &values(&[("x", Value::Number(10.into()))])).result);
        assert!(!evaluate(&rule, &values(&[("x", Value::Number(11.into()))])).result);
    }

    #[test]
    fn and_short_circuits_at_first_false() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"a","operator":"=","value":1},{"field":"b","operator":"=","value":2}]}"#,
        )
        .unwrap();
        let ctx = values(&[("a", Value::Number(0.into())), ("b", Value::Number(2.into()))]);
        let result = evaluate_with_trace(&rule, &ctx, true);
        assert!(!result.result);
        assert_eq!(result.trace.unwrap().entries.len(), 1);
    }

    #[test]
    fn in_and_not_in_operators() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"tag","operator":"in","value":["a","b"]}]}"#,
        )
        .unwrap();
        assert!(evaluate(&rule, &values(&[("tag", Value::String("a".to_string()))])).result);
        assert!(!evaluate(&rule, &values(&[("tag", Value::String("c".to_string()))])).result);
    }

    #[test]
    fn p7_and_or_equivalence_to_all_any() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[{"field":"a","operator":"=","value":1},{"field":"b","operator":"=","value":1},{"field":"c","operator":"=","value":1}]}"#,
        )
        .unwrap();
        let ctx = values(&[
            ("a", Value::Number(1.into())),
            ("b", Value::Number(1.into())),
            ("c", Value::Number(0.into())),
        ]);
        assert!(!evaluate(&rule, &ctx).result);
    }

    #[test]
    fn group_rollups_recorded_for_nested_structure() {
        let rule = parse_rule(
            r#"{"combinator":"and","rules":[
                {"field":"a","operator":"=","value":1},
                {"combinator":"or","rules":[{"field":"b","operator":"=","value":2}]}
            ]}"#,
        )
        .unwrap();
        let ctx = values(&[("a", Value::Number(1.into())), ("b", Value::Number(2.into()))]);
        let result = evaluate_with_trace(&rule, &ctx, true);
        assert!(result.result);
        let trace = result.trace.unwrap();
        assert_eq!(trace.entries.len(), 2);
        assert_eq!(trace.groups.len(), 2);
        assert!(trace.groups.iter().any(|g| g.path == "root" && g.combinator == Combinator::And && g.result));
        assert!(trace.groups.iter().any(|g| g.path == "root.1" && g.combinator == Combinator::Or && g.result));
    }

    #[test]
    fn no_trace_when_disabled() {
        let rule =
            parse_rule(r#"{"combinator":"and","rules":[{"field":"a","operator":"=","value":1}]}"#)
                .unwrap();
        let result = evaluate(&rule, &values(&[("a", Value::Number(1.into()))]));
        assert!(result.trace.is_none());
    }
}
