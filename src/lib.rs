//! # Rules Engine
//!
//! A rules engine that evaluates declarative boolean predicates against a
//! mix of caller-supplied, externally fetched, and calculated fields.
//!
//! ## Pipeline
//!
//! ```text
//! Rule JSON
//!     ↓
//! [Rule Model / Parser (C1)]         → Rule (bounded depth/leaf count)
//!     ↓
//! [Dependency Analyzer (C6)]         → ResolutionPlan (levels, chains, calc order)
//!     ↓
//! [Field Resolver (C7)]              → field values
//!     ├── [Data-Service Clients (C4)] → raw responses
//!     ├── [Reflective Mapper (C3)]    → mapped scalars
//!     └── [Field Calculators (C5)]    → derived scalars
//!     ↓
//! [Rule Evaluator (C2)]              → matched: bool (+ optional trace)
//! ```
//!
//! The [`filter`](crate::filter) module drives this pipeline over a
//! population of entities; [`resolver`](crate::resolver) drives it for a
//! single entity's `ExecutionContext`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rules_engine::{rule::parse_rule, evaluator::evaluate};
//! use std::collections::HashMap;
//!
//! let rule = parse_rule(r#"{"combinator":"and","rules":[
//!     {"field":"age","operator":">=","value":18}
//! ]}"#)?;
//!
//! let mut values = HashMap::new();
//! values.insert("age".to_string(), rules_engine::value::Value::number(21));
//!
//! let result = evaluate(&rule, &values);
//! assert!(result.result);
//! ```

pub mod value;
pub mod error;

pub mod rule; // Module C1: rule tree types + bounded JSON parser
pub mod evaluator; // Module C2: rule evaluation + coercion + trace

pub mod mapper; // Module C3: path grammar + reflective accessor
pub mod dataservice; // Module C4: GraphQL/REST clients, retry, auth
pub mod calculator; // Module C5: expression interpreter, builtins, custom loader
pub mod dependency; // Module C6: DAG construction, cycle detection, plan builder
pub mod resolver; // Module C7: plan executor
pub mod filter; // Module C8: entity population filtering

pub mod field; // Field/entity-type configuration data model (§3)
pub mod registry; // Module C9: read-side registry contract
pub mod cache; // Module C10: request-scoped and rule-parse memoization

pub mod config; // Configuration system (§4.12)

pub use error::{FieldError, RulesEngineError};
pub use evaluator::{evaluate, evaluate_with_trace, EvaluationResult};
pub use field::{EntityType, FieldConfig};
pub use filter::{filter, FilterOptions, FilterResult};
pub use registry::{InMemoryRegistry, Registry};
pub use resolver::{resolve, ExecutionContext, ResolutionResult};
pub use rule::{parse_rule, Rule};
pub use value::Value;
