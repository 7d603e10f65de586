use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use crate::field::AuthConfig;
use crate::value::Value;

use super::auth::apply_auth;
use super::error::DataServiceError;
use super::retry::{is_retryable_status, RetryPolicy};

/// Post a GraphQL request and return the `data` object, or a
/// [`DataServiceError`] if the transport fails, the response carries a
/// non-empty `errors` array, or no `data` key is present.
pub async fn execute(
    client: &Client,
    endpoint: &str,
    query: &str,
    operation_name: Option<&str>,
    variables: &HashMap<String, Value>,
    auth: &AuthConfig,
    timeout_ms: u64,
    retry: &RetryPolicy,
) -> Result<serde_json::Value, DataServiceError> {
    let body = json!({
        "query": query,
        "operationName": operation_name,
        "variables": variables,
    });

    let attempt = || async {
        let mut builder = client
            .post(endpoint)
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body);
        builder = apply_auth(builder, auth);

        let response = builder.send().await.map_err(|e| {
            DataServiceError::new(endpoint, None, format!("transport error: {e}"))
        })?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DataServiceError::new(endpoint, Some(status), "non-success HTTP status"));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            DataServiceError::new(endpoint, Some(status), format!("invalid JSON body: {e}"))
        })?;

        let errors = payload.get("errors").and_then(|e| e.as_array());
        if let Some(errors) = errors {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| e.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error").to_string())
                    .collect();
                return Err(DataServiceError::new(endpoint, Some(status), messages.join("; ")));
            }
        }

        payload
            .get("data")
            .cloned()
            .ok_or_else(|| DataServiceError::new(endpoint, Some(status), "response missing 'data'"))
    };

    retry
        .execute(attempt, |e| e.status.map(is_retryable_status).unwrap_or(true))
        .await
}

/// A minimal introspection query, used only to confirm the endpoint is
/// reachable and speaks GraphQL.
pub async fn validate(client: &Client, endpoint: &str, auth: &AuthConfig) -> Result<(), DataServiceError> {
    let body = json!({ "query": "{ __schema { queryType { name } } }" });
    let mut builder = client.post(endpoint).timeout(Duration::from_secs(1)).json(&body);
    builder = apply_auth(builder, auth);
    let response = builder
        .send()
        .await
        .map_err(|e| DataServiceError::new(endpoint, None, format!("transport error: {e}")))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DataServiceError::new(endpoint, Some(response.status().as_u16()), "introspection failed"))
    }
}
