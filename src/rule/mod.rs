//! Rule model: a tree of combinators and leaf conditions, plus the
//! canonical-JSON parser.
//!
//! Rules are pure data. Parsing never evaluates, and the tree is immutable
//! once built — evaluation (see [`crate::evaluator`]) is a separate,
//! read-only traversal.

mod parser;

pub use parser::{parse_rule, ParseLimits};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Boolean combinator for a group node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
}

/// The closed set of comparison operators a leaf condition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "notContains")]
    NotContains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notIn")]
    NotIn,
    #[serde(rename = "isEmpty")]
    IsEmpty,
    #[serde(rename = "isNotEmpty")]
    IsNotEmpty,
    #[serde(rename = "between")]
    Between,
}

impl Operator {
    /// Parse from the wire string. Used by the hand-rolled JSON parser so
    /// unknown operators can be rejected with a precise message rather
    /// than a generic serde error.
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "=" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "contains" => Operator::Contains,
            "notContains" => Operator::NotContains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "isEmpty" => Operator::IsEmpty,
            "isNotEmpty" => Operator::IsNotEmpty,
            "between" => Operator::Between,
            _ => return None,
        })
    }
}

/// A node in the rule tree: either a combinator group or a leaf condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(Group),
    Condition(Condition),
}

/// An internal node: a combinator over an ordered list of children.
/// An empty `rules` list evaluates to `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub combinator: Combinator,
    pub rules: Vec<RuleNode>,
}

/// A leaf predicate over a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// A parsed, immutable rule tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub root: RuleNode,
}

impl Rule {
    /// Collect every `field` referenced by a leaf condition, in traversal
    /// order and without duplicates. No evaluation is performed.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        collect_fields(&self.root, &mut seen, &mut out);
        out
    }

    /// Serialize back to the canonical JSON form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("rule tree is always representable as JSON")
    }
}

fn collect_fields(node: &RuleNode, seen: &mut std::collections::HashSet<String>, out: &mut Vec<String>) {
    match node {
        RuleNode::Condition(cond) => {
            if seen.insert(cond.field.clone()) {
                out.push(cond.field.clone());
            }
        }
        RuleNode::Group(group) => {
            for child in &group.rules {
                collect_fields(child, seen, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_has_no_fields() {
        let rule = Rule {
            root: RuleNode::Group(Group {
                combinator: Combinator::And,
                rules: vec![],
            }),
        };
        assert!(rule.referenced_fields().is_empty());
    }

    #[test]
    fn referenced_fields_deduplicates_and_preserves_order() {
        let rule = Rule {
            root: RuleNode::Group(Group {
                combinator: Combinator::And,
                rules: vec![
                    RuleNode::Condition(Condition {
                        field: "age".to_string(),
                        operator: Operator::Gte,
                        value: Value::Number(18.into()),
                    }),
                    RuleNode::Condition(Condition {
                        field: "status".to_string(),
                        operator: Operator::Eq,
                        value: Value::String("active".to_string()),
                    }),
                    RuleNode::Condition(Condition {
                        field: "age".to_string(),
                        operator: Operator::Lt,
                        value: Value::Number(65.into()),
                    }),
                ],
            }),
        };
        assert_eq!(rule.referenced_fields(), vec!["age", "status"]);
    }
}
