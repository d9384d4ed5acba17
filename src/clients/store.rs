//! Key-value store and message bus contracts.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::error::MonitorResult;

/// Subset of key-value operations the checks and the orchestrator rely on
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> MonitorResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> MonitorResult<()>;

    /// Number of members in the sorted set at `key` (0 when absent)
    async fn zcount(&self, key: &str) -> MonitorResult<u64>;

    /// Keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> MonitorResult<Vec<String>>;

    async fn hgetall(&self, key: &str) -> MonitorResult<HashMap<String, String>>;
}

/// One message received from a pattern subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

impl BusMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Messages delivered by a live subscription; the stream ends when the connection drops
pub type BusStream = BoxStream<'static, BusMessage>;

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> MonitorResult<()>;

    async fn psubscribe(&self, pattern: &str) -> MonitorResult<BusStream>;
}
