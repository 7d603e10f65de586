use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::json;

use crate::field::{AuthConfig, HttpMethod};
use crate::value::Value;

use super::auth::apply_auth;
use super::error::DataServiceError;
use super::retry::{is_retryable_status, RetryPolicy};

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

fn is_idempotent(method: HttpMethod) -> bool {
    matches!(method, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete)
}

/// Substitute `{name}` placeholders in `template` from `variables`,
/// returning the rendered URL and the set of variable names consumed.
fn render_url(template: &str, variables: &HashMap<String, Value>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut used = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];
        let Some(end) = rest.find('}') else {
            out.push('{');
            out.push_str(rest);
            rest = "";
            break;
        };
        let name = &rest[..end];
        if let Some(value) = variables.get(name) {
            out.push_str(&value.to_string());
            used.push(name.to_string());
        } else {
            out.push('{');
            out.push_str(name);
            out.push('}');
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    (out, used)
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    client: &Client,
    endpoint: &str,
    method: HttpMethod,
    static_query_params: &HashMap<String, String>,
    static_headers: &HashMap<String, String>,
    static_body: Option<&serde_json::Value>,
    auth: &AuthConfig,
    timeout_ms: u64,
    variables: &HashMap<String, Value>,
    retry: &RetryPolicy,
) -> Result<serde_json::Value, DataServiceError> {
    let (url, used) = render_url(endpoint, variables);
    let remaining: HashMap<&String, &Value> =
        variables.iter().filter(|(k, _)| !used.contains(*k)).collect();

    let attempt = || async {
        let mut builder = client
            .request(to_reqwest_method(method), &url)
            .timeout(Duration::from_millis(timeout_ms));

        for (k, v) in static_query_params {
            builder = builder.query(&[(k, v)]);
        }
        for (k, v) in static_headers {
            builder = builder.header(k, v);
        }
        builder = apply_auth(builder, auth);

        if is_idempotent(method) {
            let params: Vec<(String, String)> =
                remaining.iter().map(|(k, v)| ((*k).clone(), v.to_string())).collect();
            if !params.is_empty() {
                builder = builder.query(&params);
            }
        } else {
            let mut body = static_body.cloned().unwrap_or_else(|| json!({}));
            if let Some(obj) = body.as_object_mut() {
                for (k, v) in &remaining {
                    obj.insert((*k).clone(), serde_json::to_value(v).unwrap_or(serde_json::Value::Null));
                }
            }
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DataServiceError::new(&url, None, format!("transport error: {e}")))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DataServiceError::new(&url, Some(status), "non-success HTTP status"));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| DataServiceError::new(&url, Some(status), format!("invalid JSON body: {e}")))
    };

    retry
        .execute(attempt, |e| e.status.map(is_retryable_status).unwrap_or(true))
        .await
}

/// `HEAD`, falling back to `GET` if the server rejects `HEAD` outright.
pub async fn validate(client: &Client, endpoint: &str, auth: &AuthConfig) -> Result<(), DataServiceError> {
    let mut builder = client.head(endpoint).timeout(Duration::from_secs(1));
    builder = apply_auth(builder, auth);
    let head_result = builder.send().await;

    let response = match head_result {
        Ok(r) if r.status().is_success() => return Ok(()),
        _ => {
            let mut get_builder = client.get(endpoint).timeout(Duration::from_secs(1));
            get_builder = apply_auth(get_builder, auth);
            get_builder
                .send()
                .await
                .map_err(|e| DataServiceError::new(endpoint, None, format!("transport error: {e}")))?
        }
    };

    if response.status().is_success() {
        Ok(())
    } else {
        Err(DataServiceError::new(endpoint, Some(response.status().as_u16()), "validation request failed"))
    }
}
