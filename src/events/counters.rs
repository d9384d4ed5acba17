//! Periodic counter events (`errorCount`, `deltaFileStats`, `notificationCount`).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::hub::EventHub;
use super::notifications::NotificationService;
use crate::clients::PlatformQueryService;
use crate::constants::events;
use crate::error::MonitorResult;

/// One value published on every counter interval
#[async_trait]
pub trait CounterSource: Send + Sync {
    fn event_type(&self) -> &str;

    /// Event payload, already serialized
    async fn current_value(&self) -> MonitorResult<String>;
}

pub struct ErrorCountSource {
    query: Arc<dyn PlatformQueryService>,
}

impl ErrorCountSource {
    pub fn new(query: Arc<dyn PlatformQueryService>) -> Self {
        Self { query }
    }
}

#[async_trait]
impl CounterSource for ErrorCountSource {
    fn event_type(&self) -> &str {
        events::ERROR_COUNT
    }

    async fn current_value(&self) -> MonitorResult<String> {
        Ok(self.query.unacknowledged_error_count().await?.to_string())
    }
}

pub struct DeltaFileStatsSource {
    query: Arc<dyn PlatformQueryService>,
}

impl DeltaFileStatsSource {
    pub fn new(query: Arc<dyn PlatformQueryService>) -> Self {
        Self { query }
    }
}

#[async_trait]
impl CounterSource for DeltaFileStatsSource {
    fn event_type(&self) -> &str {
        events::DELTA_FILE_STATS
    }

    async fn current_value(&self) -> MonitorResult<String> {
        let stats = self.query.delta_file_stats().await?;
        Ok(serde_json::to_string(&stats)?)
    }
}

pub struct NotificationCountSource {
    notifications: Arc<dyn NotificationService>,
}

impl NotificationCountSource {
    pub fn new(notifications: Arc<dyn NotificationService>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl CounterSource for NotificationCountSource {
    fn event_type(&self) -> &str {
        events::NOTIFICATION_COUNT
    }

    async fn current_value(&self) -> MonitorResult<String> {
        Ok(self.notifications.notification_count().to_string())
    }
}

/// Publishes every source through the hub on a fixed interval
pub struct CounterPublisher {
    hub: Arc<EventHub>,
    sources: Vec<Arc<dyn CounterSource>>,
    interval: Duration,
}

impl CounterPublisher {
    pub fn new(hub: Arc<EventHub>, interval: Duration) -> Self {
        Self {
            hub,
            sources: Vec::new(),
            interval,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn CounterSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Publish each source once; a failing source is skipped. Returns the number published.
    pub async fn publish_once(&self) -> usize {
        let mut published = 0;
        for source in &self.sources {
            let event_type = source.event_type();
            let payload = match source.current_value().await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(event_type, error = %e, "Failed to read counter");
                    continue;
                }
            };
            match self.hub.publish(event_type, &payload).await {
                Ok(()) => published += 1,
                Err(e) => warn!(event_type, error = %e, "Failed to publish counter"),
            }
        }
        debug!(published, total = self.sources.len(), "Counters published");
        published
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.publish_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}
