//! Request-time cache (C10): memoization scoped to a single resolution
//! (raw data-service responses) or a single filter operation (parsed
//! rules). Neither is process-wide state — both are owned by the caller
//! and dropped when the operation completes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use dashmap::DashMap;

use crate::rule::Rule;
use crate::value::Value;

fn hash_of(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Memoizes raw data-service responses within one resolution. Keyed by
/// `(endpoint, query-hash, sorted-variables)` so identical calls made
/// from independent parallel groups collapse to one outbound request.
#[derive(Default)]
pub struct RequestCache {
    entries: DashMap<String, serde_json::Value>,
}

impl RequestCache {
    pub fn new() -> Self {
        RequestCache { entries: DashMap::new() }
    }

    fn key(endpoint: &str, query: &str, variables: &std::collections::HashMap<String, Value>) -> String {
        let mut sorted: Vec<(&String, String)> = variables.iter().map(|(k, v)| (k, v.to_string())).collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let query_hash = hash_of(query);
        format!("{endpoint}::{query_hash}::{sorted:?}")
    }

    pub fn get(
        &self,
        endpoint: &str,
        query: &str,
        variables: &std::collections::HashMap<String, Value>,
    ) -> Option<serde_json::Value> {
        self.entries.get(&Self::key(endpoint, query, variables)).map(|v| v.clone())
    }

    pub fn insert(
        &self,
        endpoint: &str,
        query: &str,
        variables: &std::collections::HashMap<String, Value>,
        response: serde_json::Value,
    ) {
        self.entries.insert(Self::key(endpoint, query, variables), response);
    }
}

/// Memoizes parsed rules for the lifetime of one filter operation, keyed
/// by the canonical JSON's hash.
#[derive(Default)]
pub struct RuleCache {
    entries: DashMap<u64, std::sync::Arc<Rule>>,
}

impl RuleCache {
    pub fn new() -> Self {
        RuleCache { entries: DashMap::new() }
    }

    pub fn get_or_parse(&self, canonical_json: &str) -> Result<std::sync::Arc<Rule>, String> {
        let key = hash_of(canonical_json);
        if let Some(cached) = self.entries.get(&key) {
            return Ok(cached.clone());
        }
        let rule = std::sync::Arc::new(crate::rule::parse_rule(canonical_json)?);
        self.entries.insert(key, rule.clone());
        Ok(rule)
    }
}
