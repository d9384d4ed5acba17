//! # GraphQL Query Client
//!
//! HTTP client for the platform core's GraphQL endpoint, implementing
//! [`PlatformQueryService`].

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

use super::query::{
    ColdQueuedAction, DeltaFileStats, FlowErrorState, PlatformQueryService, PropertyEntry,
    StorageUsage,
};
use crate::error::{MonitorError, MonitorResult};

const DATA_SOURCE_ERRORS_EXCEEDED: &str =
    "query { dataSourceErrorsExceeded { name currErrors maxErrors } }";
const CONTENT_STORAGE_USAGE: &str = "query { contentStorageUsage { usedBytes totalBytes } }";
const COUNT_UNACKNOWLEDGED_ERRORS: &str = "query { countUnacknowledgedErrors }";
const DELTA_FILE_STATS: &str = "query { deltaFileStats { totalCount inFlightCount inFlightBytes } }";
const PROPERTIES: &str = "query { properties { key value } }";
const COLD_QUEUED_ACTIONS: &str = "query { coldQueuedActions { action count } }";
const DISTINCT_COLD_QUEUED_ACTIONS: &str = "query { distinctColdQueuedActions }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GraphqlQueryService {
    client: Client,
    url: String,
}

impl GraphqlQueryService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> MonitorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("platform-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Run `document` and deserialize the top-level `field` of its data
    async fn query<T>(&self, document: &str, field: &str) -> MonitorResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": document }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, field, "GraphQL request failed");
            return Err(MonitorError::Query(format!("HTTP {status}: {error_text}")));
        }

        let body: GraphqlResponse = response.json().await?;
        extract_field(body, field)
    }
}

fn extract_field<T: DeserializeOwned>(body: GraphqlResponse, field: &str) -> MonitorResult<T> {
    if !body.errors.is_empty() {
        let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(MonitorError::Query(format!(
            "{field} failed: {}",
            messages.join("; ")
        )));
    }

    let value = body
        .data
        .and_then(|mut data| data.get_mut(field).map(Value::take))
        .ok_or_else(|| MonitorError::Query(format!("response has no data for {field}")))?;

    debug!(field, "GraphQL query completed");
    serde_json::from_value(value)
        .map_err(|e| MonitorError::Query(format!("failed to parse {field}: {e}")))
}

#[async_trait]
impl PlatformQueryService for GraphqlQueryService {
    async fn data_sources_errors_exceeded(&self) -> MonitorResult<Vec<FlowErrorState>> {
        self.query(DATA_SOURCE_ERRORS_EXCEEDED, "dataSourceErrorsExceeded")
            .await
    }

    async fn content_storage_usage(&self) -> MonitorResult<StorageUsage> {
        self.query(CONTENT_STORAGE_USAGE, "contentStorageUsage").await
    }

    async fn unacknowledged_error_count(&self) -> MonitorResult<u64> {
        self.query(COUNT_UNACKNOWLEDGED_ERRORS, "countUnacknowledgedErrors")
            .await
    }

    async fn delta_file_stats(&self) -> MonitorResult<DeltaFileStats> {
        self.query(DELTA_FILE_STATS, "deltaFileStats").await
    }

    async fn properties(&self) -> MonitorResult<Vec<PropertyEntry>> {
        self.query(PROPERTIES, "properties").await
    }

    async fn cold_queued_count(&self, limit: u64) -> MonitorResult<u64> {
        let document = format!("query {{ coldQueuedCount(limit: {limit}) }}");
        self.query(&document, "coldQueuedCount").await
    }

    async fn cold_queued_action_counts(&self) -> MonitorResult<BTreeMap<String, u64>> {
        let actions: Vec<ColdQueuedAction> =
            self.query(COLD_QUEUED_ACTIONS, "coldQueuedActions").await?;
        Ok(actions
            .into_iter()
            .map(|entry| (entry.action, entry.count))
            .collect())
    }

    async fn distinct_cold_queued_actions(&self) -> MonitorResult<Vec<String>> {
        self.query(DISTINCT_COLD_QUEUED_ACTIONS, "distinctColdQueuedActions")
            .await
    }
}
