//! Dependency analyzer (C6): graph construction, cycle detection, and
//! resolution-plan construction over a set of field configurations.

mod dag;
mod error;
mod plan;

pub use dag::{classify, NodeKind};
pub use error::CyclicDependencyError;
pub use plan::{
    build_plan, fields_referenced_by, AnalyzerConfig, Batch, ChainStep, ParallelExecutionGroup,
    ResolutionPlan, SequentialExecutionChain,
};
