//! Last published status, shared between the orchestrator and status readers.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use super::types::{AggregateStatus, HealthSnapshot};
use crate::clients::KeyValueStore;
use crate::error::MonitorResult;

#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    current: Arc<RwLock<Option<AggregateStatus>>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, status: AggregateStatus) {
        *self.current.write() = Some(status);
    }

    /// `Unknown` until the first tick has been published
    pub fn snapshot(&self) -> HealthSnapshot {
        match self.current.read().as_ref() {
            Some(status) => HealthSnapshot::Reported(status.clone()),
            None => HealthSnapshot::Unknown,
        }
    }

    pub fn to_json(&self) -> MonitorResult<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.current.read().as_ref().map(AggregateStatus::timestamp)
    }

    /// True when nothing has been published within `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_updated() {
            Some(updated) => Utc::now()
                .signed_duration_since(updated)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Read the status another instance persisted under `key`
    pub async fn read_persisted(
        store: &dyn KeyValueStore,
        key: &str,
    ) -> MonitorResult<HealthSnapshot> {
        match store.get(key).await? {
            Some(payload) => Ok(HealthSnapshot::Reported(serde_json::from_str(&payload)?)),
            None => Ok(HealthSnapshot::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::types::{CheckResult, Severity};
    use crate::test_helpers::InMemoryStore;

    fn status(severity: Severity) -> AggregateStatus {
        AggregateStatus::reduce(vec![CheckResult::new("Check", severity, Vec::new())], Utc::now())
            .unwrap()
    }

    #[test]
    fn test_unknown_before_first_store() {
        let cache = StatusCache::new();
        assert_eq!(cache.snapshot(), HealthSnapshot::Unknown);
        assert!(cache.is_stale(Duration::from_secs(60)));
        assert!(cache.to_json().unwrap().contains("\"state\":\"Unknown\""));
    }

    #[test]
    fn test_store_replaces_snapshot() {
        let cache = StatusCache::new();
        cache.store(status(Severity::Warn));
        cache.store(status(Severity::Error));

        assert_eq!(cache.snapshot().severity(), Some(Severity::Error));
        assert!(!cache.is_stale(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_read_persisted() {
        let store = InMemoryStore::new();
        assert_eq!(
            StatusCache::read_persisted(&store, "status").await.unwrap(),
            HealthSnapshot::Unknown
        );

        let published = status(Severity::Warn);
        store
            .set("status", &serde_json::to_string(&published).unwrap())
            .await
            .unwrap();
        assert_eq!(
            StatusCache::read_persisted(&store, "status").await.unwrap(),
            HealthSnapshot::Reported(published)
        );
    }
}
