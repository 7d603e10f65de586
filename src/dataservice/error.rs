use serde::{Deserialize, Serialize};
use std::fmt;

/// A failure calling out to a data service, after retries are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataServiceError {
    pub endpoint: String,
    pub status: Option<u16>,
    pub cause: String,
}

impl DataServiceError {
    pub fn new(endpoint: impl Into<String>, status: Option<u16>, cause: impl Into<String>) -> Self {
        DataServiceError {
            endpoint: endpoint.into(),
            status,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for DataServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "data service '{}' failed with status {status}: {}", self.endpoint, self.cause),
            None => write!(f, "data service '{}' failed: {}", self.endpoint, self.cause),
        }
    }
}

impl std::error::Error for DataServiceError {}
