//! `CUSTOM` calculators: implementations supplied by the embedding
//! application rather than by this crate.
//!
//! The source system discovers custom calculators by class name at
//! startup; Rust has no equivalent runtime class loading, so the
//! embedder registers implementations by `classRef` before any resolution
//! runs. [`CustomCalculatorRegistry`] then doubles as the process-lifetime
//! instance cache the spec calls for: the same `classRef` always resolves
//! to the same registered `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::value::Value;

use super::context::CalcContext;
use super::error::CalculatorError;

/// A calculator implementation supplied by the embedding application.
pub trait CustomCalculator: Send + Sync {
    fn validate_parameters(&self, parameters: &HashMap<String, Value>) -> Result<(), CalculatorError>;

    fn calculate(
        &self,
        parameters: &HashMap<String, Value>,
        context: &CalcContext,
    ) -> Result<Value, CalculatorError>;
}

/// Process-wide registry of custom calculator instances, keyed by
/// `classRef`.
#[derive(Default)]
pub struct CustomCalculatorRegistry {
    instances: DashMap<String, Arc<dyn CustomCalculator>>,
}

impl CustomCalculatorRegistry {
    pub fn new() -> Self {
        CustomCalculatorRegistry { instances: DashMap::new() }
    }

    pub fn register(&self, class_ref: impl Into<String>, calculator: Arc<dyn CustomCalculator>) {
        self.instances.insert(class_ref.into(), calculator);
    }

    pub fn get(&self, class_ref: &str) -> Option<Arc<dyn CustomCalculator>> {
        self.instances.get(class_ref).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCalculator {
        calls: AtomicUsize,
    }

    impl CustomCalculator for CountingCalculator {
        fn validate_parameters(&self, _parameters: &HashMap<String, Value>) -> Result<(), CalculatorError> {
            Ok(())
        }

        fn calculate(&self, _parameters: &HashMap<String, Value>, _context: &CalcContext) -> Result<Value, CalculatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Number(self.calls.load(Ordering::SeqCst).into()))
        }
    }

    #[test]
    fn repeated_load_of_same_class_ref_returns_same_instance() {
        let registry = CustomCalculatorRegistry::new();
        registry.register("com.example.Counter", Arc::new(CountingCalculator { calls: AtomicUsize::new(0) }));

        let first = registry.get("com.example.Counter").unwrap();
        let second = registry.get("com.example.Counter").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unregistered_class_ref_is_absent() {
        let registry = CustomCalculatorRegistry::new();
        assert!(registry.get("com.example.Missing").is_none());
    }
}
