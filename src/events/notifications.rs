//! User-facing notifications raised by checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::hub::EventHub;
use crate::constants::events;
use crate::error::MonitorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub summary: String,
    pub content: Option<String>,
    pub severity: NotificationSeverity,
    pub source: String,
    pub created: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        severity: NotificationSeverity,
        source: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            summary: summary.into(),
            content: None,
            severity,
            source: source.into(),
            created: Utc::now(),
        }
    }

    pub fn info(source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Info, source, summary)
    }

    pub fn warn(source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Warn, source, summary)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn create_event(&self, notification: Notification) -> MonitorResult<()>;

    /// Notifications created since startup
    fn notification_count(&self) -> u64;
}

/// Publishes notifications as `notification` events through the hub
#[derive(Debug)]
pub struct BusNotificationService {
    hub: Arc<EventHub>,
    created: AtomicU64,
}

impl BusNotificationService {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            hub,
            created: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl NotificationService for BusNotificationService {
    async fn create_event(&self, notification: Notification) -> MonitorResult<()> {
        let payload = serde_json::to_string(&notification)?;
        self.hub.publish(events::NOTIFICATION, &payload).await?;
        self.created.fetch_add(1, Ordering::Relaxed);
        info!(
            severity = ?notification.severity,
            source = %notification.source,
            summary = %notification.summary,
            "Notification created"
        );
        Ok(())
    }

    fn notification_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::BusMessage;
    use crate::config::HubConfig;
    use crate::test_helpers::InMemoryStore;

    #[tokio::test]
    async fn test_notifications_are_published_and_counted() {
        let bus = Arc::new(InMemoryStore::new());
        let hub = EventHub::new(bus.clone(), HubConfig::default());
        let service = BusNotificationService::new(hub);

        service
            .create_event(Notification::warn("monitor", "Disk low").with_content("details"))
            .await
            .unwrap();

        assert_eq!(service.notification_count(), 1);
        let published: Vec<BusMessage> = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channel, "org.deltafi.ui.sse.notification");

        let notification: Notification = serde_json::from_str(&published[0].payload).unwrap();
        assert_eq!(notification.severity, NotificationSeverity::Warn);
        assert_eq!(notification.content.as_deref(), Some("details"));
    }

    #[tokio::test]
    async fn test_failed_publish_is_not_counted() {
        let bus = Arc::new(InMemoryStore::new());
        bus.set_failing(true);
        let service = BusNotificationService::new(EventHub::new(bus, HubConfig::default()));

        assert!(service
            .create_event(Notification::info("monitor", "hello"))
            .await
            .is_err());
        assert_eq!(service.notification_count(), 0);
    }
}
