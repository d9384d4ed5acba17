//! Platform query contract and the facts it returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MonitorResult;

/// A data source whose error count has reached its configured limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowErrorState {
    pub name: String,
    pub curr_errors: u64,
    pub max_errors: u64,
}

/// Content storage capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl StorageUsage {
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }

    /// Whole-number percentage in use; 0 when the capacity is unknown
    pub fn percent_used(&self) -> u64 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.used_bytes as u128 * 100) / self.total_bytes as u128) as u64
    }
}

/// Work item totals published to live subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaFileStats {
    pub total_count: u64,
    pub in_flight_count: u64,
    pub in_flight_bytes: u64,
}

/// One runtime property as stored by the platform, e.g. `ingress.enabled` = `"false"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub key: String,
    pub value: Option<String>,
}

impl PropertyEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Cold queued work items waiting on one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdQueuedAction {
    pub action: String,
    pub count: u64,
}

#[async_trait]
pub trait PlatformQueryService: Send + Sync {
    async fn data_sources_errors_exceeded(&self) -> MonitorResult<Vec<FlowErrorState>>;

    async fn content_storage_usage(&self) -> MonitorResult<StorageUsage>;

    async fn unacknowledged_error_count(&self) -> MonitorResult<u64>;

    async fn delta_file_stats(&self) -> MonitorResult<DeltaFileStats>;

    /// Current runtime properties; keys that were never set may be absent
    async fn properties(&self) -> MonitorResult<Vec<PropertyEntry>>;

    /// Total cold queued items, counting no further than `limit`
    async fn cold_queued_count(&self, limit: u64) -> MonitorResult<u64>;

    /// Cold queued items per action name
    async fn cold_queued_action_counts(&self) -> MonitorResult<BTreeMap<String, u64>>;

    /// Names of the actions that have anything cold queued, without counting
    async fn distinct_cold_queued_actions(&self) -> MonitorResult<Vec<String>>;
}
