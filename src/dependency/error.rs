use serde::{Deserialize, Serialize};
use std::fmt;

/// A cycle found while building a dependency graph. `path` begins and
/// ends with the same field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicDependencyError {
    pub path: Vec<String>,
}

impl CyclicDependencyError {
    pub fn new(path: Vec<String>) -> Self {
        CyclicDependencyError { path }
    }
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cyclic dependency: {}", self.path.join(" -> "))
    }
}

impl std::error::Error for CyclicDependencyError {}
