//! # Action Queue Check
//!
//! Warns when a known action queue is deeper than the queue size threshold, or when the
//! store holds queues nobody is consuming any more (orphans).
//!
//! A queue is *known* while some worker has written a heartbeat for it within the recency
//! window. Every key in the store is a candidate orphan unless it is known, explicitly
//! ignored, or starts with an excluded prefix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::parse_timestamp;
use crate::clients::KeyValueStore;
use crate::config::{ChecksConfig, PropertiesConfig};
use crate::constants::HEARTBEAT_HASH;
use crate::error::CheckError;
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder, Severity};
use crate::metrics::{Metric, MetricsSink};
use crate::properties::PropertySource;

const DESCRIPTION: &str = "Action Queue Check";
const QUEUE_SIZE_METRIC: &str = "gauge.action_queue.queue_size";
const METRIC_SOURCE: &str = "monitor";

/// Keys that are never reported as orphans
#[derive(Debug, Clone, Default)]
pub struct OrphanPolicy {
    ignored: HashSet<String>,
    excluded_prefixes: Vec<String>,
}

impl OrphanPolicy {
    pub fn new<I, P>(ignored: I, excluded_prefixes: P) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
            excluded_prefixes: excluded_prefixes
                .into_iter()
                .map(Into::into)
                // `gauge.node*` and `gauge.node` mean the same thing
                .map(|prefix: String| prefix.trim_end_matches('*').to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &ChecksConfig) -> Self {
        Self::new(
            config.ignored_queues.iter().cloned(),
            config.excluded_queue_prefixes.iter().cloned(),
        )
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.ignored.contains(name)
            || self
                .excluded_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// `observed − known − ignored − excluded prefixes`
pub fn find_orphans(
    observed: &BTreeSet<String>,
    known: &BTreeSet<String>,
    policy: &OrphanPolicy,
) -> BTreeSet<String> {
    observed
        .iter()
        .filter(|name| !known.contains(*name) && !policy.is_excluded(name))
        .cloned()
        .collect()
}

/// Queues whose heartbeat is younger than `recency`; unparseable heartbeats are skipped
pub fn recent_queues(
    heartbeats: &HashMap<String, String>,
    now: DateTime<Utc>,
    recency: Duration,
) -> BTreeSet<String> {
    heartbeats
        .iter()
        .filter_map(|(queue, heartbeat)| {
            let Some(heartbeat) = parse_timestamp(heartbeat) else {
                debug!(queue = %queue, heartbeat = %heartbeat, "Skipping unparseable queue heartbeat");
                return None;
            };
            let age = now.signed_duration_since(heartbeat);
            (age.to_std().map(|age| age < recency).unwrap_or(true)).then(|| queue.clone())
        })
        .collect()
}

pub struct ActionQueueCheck {
    store: Arc<dyn KeyValueStore>,
    properties: Arc<dyn PropertySource>,
    metrics: Arc<dyn MetricsSink>,
    policy: OrphanPolicy,
    recency: Duration,
    fallback_threshold: u64,
}

impl ActionQueueCheck {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        properties: Arc<dyn PropertySource>,
        metrics: Arc<dyn MetricsSink>,
        checks: &ChecksConfig,
        defaults: &PropertiesConfig,
    ) -> Self {
        Self {
            store,
            properties,
            metrics,
            policy: OrphanPolicy::from_config(checks),
            recency: checks.queue_recency(),
            fallback_threshold: defaults.fallback_queue_size_threshold,
        }
    }

    pub fn with_policy(mut self, policy: OrphanPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl StatusCheck for ActionQueueCheck {
    type State = ();

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        let threshold = self
            .properties
            .current()
            .queue_size_threshold_or(self.fallback_threshold);

        let heartbeats = self.store.hgetall(HEARTBEAT_HASH).await?;
        let known = recent_queues(&heartbeats, Utc::now(), self.recency);

        let mut depths = BTreeMap::new();
        for queue in &known {
            depths.insert(queue.as_str(), self.store.zcount(queue).await?);
        }
        let observed: BTreeSet<String> = self.store.keys("*").await?.into_iter().collect();

        // gauges only once every query has succeeded
        for (queue, depth) in &depths {
            self.metrics.record(
                Metric::gauge(METRIC_SOURCE, QUEUE_SIZE_METRIC, *depth as f64)
                    .with_tag("queue_name", *queue),
            );
        }
        let oversized: BTreeMap<&str, u64> = depths
            .into_iter()
            .filter(|(_, depth)| *depth > threshold)
            .collect();
        let orphans = find_orphans(&observed, &known, &self.policy);

        let mut builder = ResultBuilder::new();
        if !oversized.is_empty() {
            builder
                .severity(Severity::Warn)
                .add_header(format!("Action queues over the size threshold ({threshold})"));
            for (queue, depth) in &oversized {
                builder.add_line(format!("- {queue}: {depth}"));
            }
        }
        if !orphans.is_empty() {
            builder
                .severity(Severity::Warn)
                .add_header("Orphan queues with no recent heartbeat");
            for queue in &orphans {
                builder.add_line(format!("- {queue}"));
            }
        }

        debug!(
            known = known.len(),
            oversized = oversized.len(),
            orphans = orphans.len(),
            "Action queue check completed"
        );
        Ok((builder.build(DESCRIPTION), ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{DynamicProperties, SharedProperties};
    use crate::test_helpers::{InMemoryStore, RecordingMetricsSink};

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_orphan_set_difference() {
        let policy = OrphanPolicy::new(["z"], ["gauge.node"]);
        let orphans = find_orphans(
            &names(&["a", "b", "c", "z", "gauge.node1"]),
            &names(&["a", "b"]),
            &policy,
        );
        assert_eq!(orphans, names(&["c"]));
    }

    #[test]
    fn test_glob_style_prefix() {
        let policy = OrphanPolicy::new(Vec::<String>::new(), ["gauge.node*"]);
        assert!(policy.is_excluded("gauge.node.cpu"));
        assert!(!policy.is_excluded("gauge"));
    }

    #[test]
    fn test_recent_queues_filters_stale_and_invalid() {
        let now = Utc::now();
        let heartbeats = HashMap::from([
            ("fresh".to_string(), (now - chrono::Duration::seconds(10)).to_rfc3339()),
            ("stale".to_string(), (now - chrono::Duration::seconds(120)).to_rfc3339()),
            ("broken".to_string(), "not a date".to_string()),
        ]);
        assert_eq!(
            recent_queues(&heartbeats, now, Duration::from_secs(60)),
            names(&["fresh"])
        );
    }

    fn check(store: Arc<InMemoryStore>, threshold: Option<u64>) -> (ActionQueueCheck, Arc<RecordingMetricsSink>) {
        let metrics = Arc::new(RecordingMetricsSink::new());
        let properties = SharedProperties::new(DynamicProperties {
            queue_size_threshold: threshold,
            ..DynamicProperties::default()
        });
        let check = ActionQueueCheck::new(
            store,
            Arc::new(properties),
            metrics.clone(),
            &ChecksConfig::default(),
            &PropertiesConfig::default(),
        );
        (check, metrics)
    }

    #[tokio::test]
    async fn test_healthy_queues() {
        let store = Arc::new(InMemoryStore::new());
        store.heartbeat_now("transform");
        store.set_queue_depth("transform", 3);

        let (check, metrics) = check(store, Some(5));
        let (result, ()) = check.run(()).await.unwrap();

        assert_eq!(result.severity(), Severity::Ok);
        assert!(result.message_lines().is_empty());

        let recorded = metrics.metrics();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].name, "gauge.action_queue.queue_size");
        assert_eq!(recorded[0].tag("queue_name"), Some("transform"));
        assert_eq!(recorded[0].value, 3.0);
    }

    #[tokio::test]
    async fn test_oversized_queue_warns() {
        let store = Arc::new(InMemoryStore::new());
        store.heartbeat_now("transform");
        store.set_queue_depth("transform", 50);

        let (check, _) = check(store, Some(10));
        let (result, ()) = check.run(()).await.unwrap();

        assert_eq!(result.severity(), Severity::Warn);
        assert!(result.message_lines().contains(&"- transform: 50".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_threshold_applies() {
        let store = Arc::new(InMemoryStore::new());
        store.heartbeat_now("egress");
        store.set_queue_depth("egress", 11);

        let (check, _) = check(store, None);
        let (result, ()) = check.run(()).await.unwrap();
        assert_eq!(result.severity(), Severity::Warn);
    }

    #[tokio::test]
    async fn test_orphan_queue_warns() {
        let store = Arc::new(InMemoryStore::new());
        store.heartbeat_now("transform");
        store.set_queue_depth("transform", 0);
        store.set_queue_depth("retired-action", 4);

        let (check, _) = check(store, Some(10));
        let (result, ()) = check.run(()).await.unwrap();

        assert_eq!(result.severity(), Severity::Warn);
        assert!(result.message_lines().contains(&"- retired-action".to_string()));
        // the heartbeat hash itself is on the default ignore list
        assert!(!result
            .message_lines()
            .iter()
            .any(|line| line.contains("org.deltafi.action-queue.heartbeat")));
    }

    #[tokio::test]
    async fn test_stale_action_class_queue_is_an_orphan() {
        let store = Arc::new(InMemoryStore::new());
        store.heartbeat_now("org.deltafi.core.action.compress.Compress");
        store.set_queue_depth("org.deltafi.core.action.compress.Compress", 0);
        store.set_queue_depth("org.deltafi.core.action.split.Split", 7);
        store.hset("org.deltafi.action-queue.long-running-tasks", "x:y:z", "[]");
        store.set_queue_depth("gauge.node.cpu", 1);
        KeyValueStore::set(store.as_ref(), "org.deltafi.cold.queue.count", "0")
            .await
            .unwrap();

        let (check, _) = check(store, Some(10));
        let (result, ()) = check.run(()).await.unwrap();

        assert_eq!(result.severity(), Severity::Warn);
        assert_eq!(
            result.message_lines(),
            &[
                "##### Orphan queues with no recent heartbeat".to_string(),
                "- org.deltafi.core.action.split.Split".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_key_listing_records_no_gauges() {
        let store = Arc::new(FailingKeysStore::default());
        store.inner.heartbeat_now("transform");
        store.inner.set_queue_depth("transform", 3);

        let metrics = Arc::new(RecordingMetricsSink::new());
        let check = ActionQueueCheck::new(
            store,
            Arc::new(SharedProperties::default()),
            metrics.clone(),
            &ChecksConfig::default(),
            &PropertiesConfig::default(),
        );

        assert!(check.run(()).await.is_err());
        assert!(metrics.metrics().is_empty());
    }

    /// Answers every query except the key listing
    #[derive(Default)]
    struct FailingKeysStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl KeyValueStore for FailingKeysStore {
        async fn get(&self, key: &str) -> crate::error::MonitorResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> crate::error::MonitorResult<()> {
            self.inner.set(key, value).await
        }

        async fn zcount(&self, key: &str) -> crate::error::MonitorResult<u64> {
            self.inner.zcount(key).await
        }

        async fn keys(&self, _pattern: &str) -> crate::error::MonitorResult<Vec<String>> {
            Err(crate::error::MonitorError::Store("KEYS timed out".to_string()))
        }

        async fn hgetall(&self, key: &str) -> crate::error::MonitorResult<HashMap<String, String>> {
            self.inner.hgetall(key).await
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(InMemoryStore::new());
        store.set_failing(true);
        let (check, _) = check(store, Some(10));
        assert!(check.run(()).await.is_err());
    }
}
