//! Canonical-JSON parser for rule trees.
//!
//! Parses `{"combinator":"and"|"or","rules":[...]}` groups and
//! `{"field":...,"operator":...,"value":...}` leaf conditions, rejecting
//! malformed input with a precise message rather than a generic serde
//! error, in the manner of the crate's other hand-rolled parsers.

use serde_json::Value as Json;

use crate::value::Value;

use super::{Combinator, Condition, Group, Operator, Rule, RuleNode};

/// Bounds enforced while parsing a rule tree.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// Maximum nesting depth of groups (default 32).
    pub max_depth: usize,
    /// Maximum number of leaf conditions across the whole tree (default 1000).
    pub max_leaves: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits {
            max_depth: 32,
            max_leaves: 1000,
        }
    }
}

/// Parse a rule from its canonical JSON string using default limits.
pub fn parse_rule(json: &str) -> Result<Rule, String> {
    parse_rule_with_limits(json, ParseLimits::default())
}

/// Parse a rule from its canonical JSON string, enforcing the given bounds.
pub fn parse_rule_with_limits(json: &str, limits: ParseLimits) -> Result<Rule, String> {
    let parsed: Json =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
    let mut leaf_count = 0usize;
    let root = parse_node(&parsed, 0, &limits, &mut leaf_count, true)?;
    Ok(Rule { root })
}

fn parse_node(
    json: &Json,
    depth: usize,
    limits: &ParseLimits,
    leaf_count: &mut usize,
    is_top_level: bool,
) -> Result<RuleNode, String> {
    if depth > limits.max_depth {
        return Err(format!(
            "rule tree exceeds maximum depth of {}",
            limits.max_depth
        ));
    }

    let obj = json
        .as_object()
        .ok_or_else(|| "expected a JSON object for a rule node".to_string())?;

    if obj.contains_key("combinator") {
        let combinator = match obj.get("combinator").and_then(Json::as_str) {
            Some("and") => Combinator::And,
            Some("or") => Combinator::Or,
            Some(other) => {
                return Err(format!(
                    "unknown combinator '{other}', expected 'and' or 'or'"
                ))
            }
            None => return Err("combinator must be a string".to_string()),
        };

        let rules_json = obj
            .get("rules")
            .and_then(Json::as_array)
            .ok_or_else(|| "group is missing a 'rules' array".to_string())?;

        if is_top_level && rules_json.is_empty() {
            return Err("top-level rule group must not be empty".to_string());
        }

        let mut rules = Vec::with_capacity(rules_json.len());
        for child in rules_json {
            rules.push(parse_node(child, depth + 1, limits, leaf_count, false)?);
        }

        Ok(RuleNode::Group(Group { combinator, rules }))
    } else if obj.contains_key("field") {
        *leaf_count += 1;
        if *leaf_count > limits.max_leaves {
            return Err(format!(
                "rule tree exceeds maximum of {} leaf conditions",
                limits.max_leaves
            ));
        }

        let field = obj
            .get("field")
            .and_then(Json::as_str)
            .ok_or_else(|| "condition field must be a string".to_string())?;
        if field.is_empty() {
            return Err("condition field name must not be empty".to_string());
        }

        let operator_str = obj
            .get("operator")
            .and_then(Json::as_str)
            .ok_or_else(|| "condition operator must be a string".to_string())?;
        let operator = Operator::from_str(operator_str)
            .ok_or_else(|| format!("unknown operator '{operator_str}'"))?;

        let value = obj
            .get("value")
            .cloned()
            .map(Value::from)
            .unwrap_or(Value::Null);

        Ok(RuleNode::Condition(Condition {
            field: field.to_string(),
            operator,
            value,
        }))
    } else {
        Err("rule node is neither a group (combinator/rules) nor a condition (field/operator)"
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_and_group() {
        let json = r#"{"combinator":"and","rules":[{"field":"age","operator":">=","value":18}]}"#;
        let rule = parse_rule(json).unwrap();
        assert_eq!(rule.referenced_fields(), vec!["age"]);
    }

    #[test]
    fn rejects_unknown_operator() {
        let json = r#"{"combinator":"and","rules":[{"field":"age","operator":"~=","value":18}]}"#;
        assert!(parse_rule(json).is_err());
    }

    #[test]
    fn rejects_unknown_combinator() {
        let json = r#"{"combinator":"xor","rules":[]}"#;
        assert!(parse_rule(json).is_err());
    }

    #[test]
    fn rejects_empty_field_name() {
        let json = r#"{"combinator":"and","rules":[{"field":"","operator":"=","value":1}]}"#;
        assert!(parse_rule(json).is_err());
    }

    #[test]
    fn rejects_depth_beyond_bound() {
        let limits = ParseLimits {
            max_depth: 2,
            max_leaves: 1000,
        };
        let json = r#"{"combinator":"and","rules":[{"combinator":"and","rules":[{"combinator":"and","rules":[{"field":"a","operator":"=","value":1}]}]}]}"#;
        assert!(parse_rule_with_limits(json, limits).is_err());
    }

    #[test]
    fn rejects_leaf_count_beyond_bound() {
        let limits = ParseLimits {
            max_depth: 32,
            max_leaves: 2,
        };
        let json = r#"{"combinator":"and","rules":[{"field":"a","operator":"=","value":1},{"field":"b","operator":"=","value":1},{"field":"c","operator":"=","value":1}]}"#;
        assert!(parse_rule_with_limits(json, limits).is_err());
    }

    #[test]
    fn round_trips_through_serialize() {
        let json = r#"{"combinator":"or","rules":[{"field":"status","operator":"=","value":"active"},{"field":"score","operator":">","value":"80"}]}"#;
        let rule = parse_rule(json).unwrap();
        let reserialized = rule.to_json().to_string();
        let reparsed = parse_rule(&reserialized).unwrap();
        assert_eq!(rule.referenced_fields(), reparsed.referenced_fields());
    }

    #[test]
    fn empty_nested_group_is_allowed() {
        let json = r#"{"combinator":"and","rules":[{"combinator":"or","rules":[]}]}"#;
        assert!(parse_rule(json).is_ok());
    }
}
