//! Data-service clients (C4): one `execute`/`validate` interface over the
//! two supported wire protocols, with shared retry/backoff and
//! concurrency bounds across both.

mod auth;
mod error;
mod graphql;
mod retry;
mod rest;

pub use error::DataServiceError;
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::field::DataServiceConfig;
use crate::value::Value;

/// One client interface over both GraphQL and REST configs.
#[async_trait]
pub trait DataServiceClient: Send + Sync {
    async fn execute(
        &self,
        config: &DataServiceConfig,
        variables: &HashMap<String, Value>,
    ) -> Result<serde_json::Value, DataServiceError>;

    async fn validate(&self, config: &DataServiceConfig) -> Result<(), DataServiceError>;
}

/// HTTP-backed implementation shared by both protocols, bounding global
/// and per-endpoint concurrency and applying the standard retry policy.
pub struct HttpDataServiceClient {
    client: Client,
    retry: RetryPolicy,
    global_permits: Arc<Semaphore>,
    per_endpoint_limit: usize,
    per_endpoint_permits: DashMap<String, Arc<Semaphore>>,
}

impl HttpDataServiceClient {
    pub fn new(retry: RetryPolicy, global_concurrency: usize, per_endpoint_concurrency: usize) -> Self {
        HttpDataServiceClient {
            client: Client::new(),
            retry,
            global_permits: Arc::new(Semaphore::new(global_concurrency.max(1))),
            per_endpoint_limit: per_endpoint_concurrency.max(1),
            per_endpoint_permits: DashMap::new(),
        }
    }

    fn endpoint_semaphore(&self, endpoint: &str) -> Arc<Semaphore> {
        self.per_endpoint_permits
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_endpoint_limit)))
            .clone()
    }
}

impl Default for HttpDataServiceClient {
    fn default() -> Self {
        HttpDataServiceClient::new(RetryPolicy::default(), 64, 16)
    }
}

#[async_trait]
impl DataServiceClient for HttpDataServiceClient {
    async fn execute(
        &self,
        config: &DataServiceConfig,
        variables: &HashMap<String, Value>,
    ) -> Result<serde_json::Value, DataServiceError> {
        let endpoint_sem = self.endpoint_semaphore(config.endpoint());
        let _global = self.global_permits.acquire().await.expect("semaphore not closed");
        let _endpoint = endpoint_sem.acquire().await.expect("semaphore not closed");

        match config {
            DataServiceConfig::GraphQl { endpoint, query, operation_name, auth, timeout_ms } => {
                graphql::execute(
                    &self.client,
                    endpoint,
                    query,
                    operation_name.as_deref(),
                    variables,
                    auth,
                    *timeout_ms,
                    &self.retry,
                )
                .await
            }
            DataServiceConfig::Rest { endpoint, method, query_params, headers, body, auth, timeout_ms } => {
                rest::execute(
                    &self.client,
                    endpoint,
                    *method,
                    query_params,
                    headers,
                    body.as_ref(),
                    auth,
                    *timeout_ms,
                    variables,
                    &self.retry,
                )
                .await
            }
        }
    }

    async fn validate(&self, config: &DataServiceConfig) -> Result<(), DataServiceError> {
        match config {
            DataServiceConfig::GraphQl { endpoint, auth, .. } => {
                graphql::validate(&self.client, endpoint, auth).await
            }
            DataServiceConfig::Rest { endpoint, auth, .. } => {
                rest::validate(&self.client, endpoint, auth).await
            }
        }
    }
}
