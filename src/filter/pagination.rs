//! ID-page fetching for [`super::filter`] when the caller supplies no
//! explicit `entityIds` set.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataservice::DataServiceClient;
use crate::error::RulesEngineError;
use crate::field::EntityType;
use crate::mapper::{self, ConversionTarget};
use crate::value::Value;

/// Page coordinates and whether another page follows, echoed back on
/// [`super::FilterResult`] so callers can walk a population.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u64,
    pub size: u64,
    pub has_more: bool,
}

/// Fetch one page of entity IDs from `entity_type`'s data service.
///
/// The response is expected to expose an `ids` list and, optionally, a
/// `hasMore` flag; a missing `hasMore` is treated as `false` (the last
/// page), matching the conservative default used elsewhere in the crate
/// for absent optional signals.
pub async fn fetch_id_page(
    entity_type: &EntityType,
    page: u64,
    size: u64,
    client: &Arc<dyn DataServiceClient>,
) -> Result<(Vec<String>, PaginationInfo), RulesEngineError> {
    let mut variables = HashMap::new();
    variables.insert("page".to_string(), Value::number(page));
    variables.insert("size".to_string(), Value::number(size));

    let response = client.execute(&entity_type.data_service_config, &variables).await?;

    let ids = mapper::map_json::<serde_json::Value>(&response, "ids[*]", ConversionTarget::Raw)
        .map_err(RulesEngineError::from)?
        .as_list()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let has_more = mapper::map_json::<serde_json::Value>(&response, "hasMore", ConversionTarget::Boolean)
        .ok()
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok((ids, PaginationInfo { page, size, has_more }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::dataservice::DataServiceError;
    use crate::field::{AuthConfig, DataServiceConfig, HttpMethod};

    struct StubClient {
        response: serde_json::Value,
    }

    #[async_trait]
    impl DataServiceClient for StubClient {
        async fn execute(
            &self,
            _config: &DataServiceConfig,
            _variables: &HashMap<String, Value>,
        ) -> Result<serde_json::Value, DataServiceError> {
            Ok(self.response.clone())
        }

        async fn validate(&self, _config: &DataServiceConfig) -> Result<(), DataServiceError> {
            Ok(())
        }
    }

    fn entity_type() -> EntityType {
        EntityType {
            type_name: "customer".to_string(),
            data_service_config: DataServiceConfig::Rest {
                endpoint: "https://entities/customers".to_string(),
                method: HttpMethod::Get,
                query_params: HashMap::new(),
                headers: HashMap::new(),
                body: None,
                auth: AuthConfig::None,
                timeout_ms: 30_000,
            },
            field_mappings: HashMap::new(),
            parent_type_name: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn reads_ids_and_has_more() {
        let client: Arc<dyn DataServiceClient> = Arc::new(StubClient {
            response: json!({"ids": ["1", "2", "3"], "hasMore": true}),
        });
        let (ids, pagination) = fetch_id_page(&entity_type(), 0, 3, &client).await.unwrap();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(pagination.has_more);
    }

    #[tokio::test]
    async fn missing_has_more_defaults_to_false() {
        let client: Arc<dyn DataServiceClient> = Arc::new(StubClient { response: json!({"ids": ["1"]}) });
        let (_, pagination) = fetch_id_page(&entity_type(), 0, 10, &client).await.unwrap();
        assert!(!pagination.has_more);
    }
}
