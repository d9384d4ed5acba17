//! In-memory stand-ins for the external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::clients::{
    Alert, AlertSource, BusMessage, BusStream, ClusterApi, DeltaFileStats, FlowErrorState,
    KeyValueStore, MessageBus, PlatformQueryService, PodState, PropertyEntry, ResourceKind,
    StorageUsage,
};
use crate::constants::HEARTBEAT_HASH;
use crate::error::{MonitorError, MonitorResult};

/// `*` matches everything, a trailing `*` matches a prefix, anything else is exact
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

#[derive(Debug, Default)]
struct StoreData {
    strings: BTreeMap<String, String>,
    sorted_sets: BTreeMap<String, u64>,
    hashes: BTreeMap<String, HashMap<String, String>>,
}

/// Key-value store and message bus kept entirely in memory
///
/// Published messages are recorded and delivered to every live pattern subscription.
/// `set_failing(true)` makes every operation return an error.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Mutex<StoreData>,
    published: Mutex<Vec<BusMessage>>,
    subscriptions: Mutex<Vec<(String, mpsc::UnboundedSender<BusMessage>)>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> MonitorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MonitorError::Store("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.data.lock().strings.get(key).cloned()
    }

    /// Create or resize a queue (sorted set) to `depth` members
    pub fn set_queue_depth(&self, queue: &str, depth: u64) {
        self.data.lock().sorted_sets.insert(queue.to_string(), depth);
    }

    pub fn hset(&self, hash: &str, field: &str, value: &str) {
        self.data
            .lock()
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn heartbeat_at(&self, queue: &str, at: DateTime<Utc>) {
        self.hset(HEARTBEAT_HASH, queue, &at.to_rfc3339());
    }

    pub fn heartbeat_now(&self, queue: &str) {
        self.heartbeat_at(queue, Utc::now());
    }

    /// Every message published so far, in order
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.lock().clone()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|message| message.channel == channel)
            .map(|message| message.payload.clone())
            .collect()
    }

    /// End every live subscription stream, as a dropped connection would
    pub fn disconnect_subscribers(&self) {
        self.subscriptions.lock().clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> MonitorResult<Option<String>> {
        self.check_available()?;
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: &str) -> MonitorResult<()> {
        self.check_available()?;
        self.data
            .lock()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn zcount(&self, key: &str) -> MonitorResult<u64> {
        self.check_available()?;
        Ok(self.data.lock().sorted_sets.get(key).copied().unwrap_or(0))
    }

    async fn keys(&self, pattern: &str) -> MonitorResult<Vec<String>> {
        self.check_available()?;
        let data = self.data.lock();
        Ok(data
            .strings
            .keys()
            .chain(data.sorted_sets.keys())
            .chain(data.hashes.keys())
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn hgetall(&self, key: &str) -> MonitorResult<HashMap<String, String>> {
        self.check_available()?;
        Ok(self.data.lock().hashes.get(key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MessageBus for InMemoryStore {
    async fn publish(&self, channel: &str, payload: &str) -> MonitorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::Bus("bus unavailable".to_string()));
        }
        let message = BusMessage::new(channel, payload);
        self.published.lock().push(message.clone());
        self.subscriptions.lock().retain(|(pattern, sender)| {
            !glob_match(pattern, channel) || sender.send(message.clone()).is_ok()
        });
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> MonitorResult<BusStream> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::Bus("bus unavailable".to_string()));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions.lock().push((pattern.to_string(), sender));
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        });
        Ok(stream.boxed())
    }
}

#[derive(Debug, Default)]
struct ClusterData {
    names: HashMap<ResourceKind, Vec<String>>,
    config_maps: HashMap<String, BTreeMap<String, String>>,
    pods: Vec<PodState>,
}

/// Cluster whose resources are set directly by the test
#[derive(Debug, Default)]
pub struct ScriptedClusterApi {
    data: Mutex<ClusterData>,
    failing: AtomicBool,
}

impl ScriptedClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_names(&self, kind: ResourceKind, names: &[&str]) {
        self.data
            .lock()
            .names
            .insert(kind, names.iter().map(|name| name.to_string()).collect());
    }

    pub fn set_config_map(&self, name: &str, data: BTreeMap<String, String>) {
        self.data.lock().config_maps.insert(name.to_string(), data);
    }

    pub fn set_pods(&self, pods: Vec<PodState>) {
        self.data.lock().pods = pods;
    }

    fn check_available(&self) -> MonitorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MonitorError::Cluster("cluster unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterApi for ScriptedClusterApi {
    async fn list_names(&self, kind: ResourceKind) -> MonitorResult<Vec<String>> {
        self.check_available()?;
        Ok(self.data.lock().names.get(&kind).cloned().unwrap_or_default())
    }

    async fn config_map_data(&self, name: &str) -> MonitorResult<Option<BTreeMap<String, String>>> {
        self.check_available()?;
        Ok(self.data.lock().config_maps.get(name).cloned())
    }

    async fn pod_states(&self) -> MonitorResult<Vec<PodState>> {
        self.check_available()?;
        Ok(self.data.lock().pods.clone())
    }
}

#[derive(Debug)]
struct QueryData {
    exceeded: Vec<FlowErrorState>,
    storage: StorageUsage,
    unacknowledged_errors: u64,
    stats: DeltaFileStats,
    properties: Vec<PropertyEntry>,
    cold_queued: BTreeMap<String, u64>,
    cold_queued_total: Option<u64>,
}

impl Default for QueryData {
    fn default() -> Self {
        Self {
            exceeded: Vec::new(),
            storage: StorageUsage {
                used_bytes: 0,
                total_bytes: 1_000_000_000_000,
            },
            unacknowledged_errors: 0,
            stats: DeltaFileStats::default(),
            properties: Vec::new(),
            cold_queued: BTreeMap::new(),
            cold_queued_total: None,
        }
    }
}

/// Query service returning whatever the test configured
///
/// `set_failing` fails every query; `set_storage_failing` only the storage query.
/// The cold queued total defaults to the sum of the per-action counts, capped at the
/// requested limit.
#[derive(Debug, Default)]
pub struct ScriptedQueryService {
    data: Mutex<QueryData>,
    failing: AtomicBool,
    storage_failing: AtomicBool,
    cold_total_queries: AtomicU64,
}

impl ScriptedQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_storage_failing(&self, failing: bool) {
        self.storage_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_exceeded_flows(&self, flows: Vec<FlowErrorState>) {
        self.data.lock().exceeded = flows;
    }

    pub fn set_storage_usage(&self, usage: StorageUsage) {
        self.data.lock().storage = usage;
    }

    pub fn set_unacknowledged_errors(&self, count: u64) {
        self.data.lock().unacknowledged_errors = count;
    }

    pub fn set_delta_file_stats(&self, stats: DeltaFileStats) {
        self.data.lock().stats = stats;
    }

    pub fn set_properties(&self, properties: Vec<PropertyEntry>) {
        self.data.lock().properties = properties;
    }

    pub fn set_cold_queued(&self, counts: &[(&str, u64)]) {
        self.data.lock().cold_queued = counts
            .iter()
            .map(|(action, count)| (action.to_string(), *count))
            .collect();
    }

    pub fn set_cold_queued_total(&self, total: Option<u64>) {
        self.data.lock().cold_queued_total = total;
    }

    /// How many times the cold queued total was counted
    pub fn cold_total_queries(&self) -> u64 {
        self.cold_total_queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> MonitorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MonitorError::Query("query service unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PlatformQueryService for ScriptedQueryService {
    async fn data_sources_errors_exceeded(&self) -> MonitorResult<Vec<FlowErrorState>> {
        self.check_available()?;
        Ok(self.data.lock().exceeded.clone())
    }

    async fn content_storage_usage(&self) -> MonitorResult<StorageUsage> {
        self.check_available()?;
        if self.storage_failing.load(Ordering::SeqCst) {
            return Err(MonitorError::Query("storage metrics unavailable".to_string()));
        }
        Ok(self.data.lock().storage)
    }

    async fn unacknowledged_error_count(&self) -> MonitorResult<u64> {
        self.check_available()?;
        Ok(self.data.lock().unacknowledged_errors)
    }

    async fn delta_file_stats(&self) -> MonitorResult<DeltaFileStats> {
        self.check_available()?;
        Ok(self.data.lock().stats)
    }

    async fn properties(&self) -> MonitorResult<Vec<PropertyEntry>> {
        self.check_available()?;
        Ok(self.data.lock().properties.clone())
    }

    async fn cold_queued_count(&self, limit: u64) -> MonitorResult<u64> {
        self.check_available()?;
        self.cold_total_queries.fetch_add(1, Ordering::SeqCst);
        let data = self.data.lock();
        let total = data
            .cold_queued_total
            .unwrap_or_else(|| data.cold_queued.values().sum());
        Ok(total.min(limit))
    }

    async fn cold_queued_action_counts(&self) -> MonitorResult<BTreeMap<String, u64>> {
        self.check_available()?;
        Ok(self.data.lock().cold_queued.clone())
    }

    async fn distinct_cold_queued_actions(&self) -> MonitorResult<Vec<String>> {
        self.check_available()?;
        Ok(self.data.lock().cold_queued.keys().cloned().collect())
    }
}

/// Alert source returning the alerts set by the test
#[derive(Debug, Default)]
pub struct ScriptedAlertSource {
    alerts: Mutex<Vec<Alert>>,
    failing: AtomicBool,
}

impl ScriptedAlertSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alerts(&self, alerts: Vec<Alert>) {
        *self.alerts.lock() = alerts;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertSource for ScriptedAlertSource {
    async fn active_alerts(&self) -> MonitorResult<Vec<Alert>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::Query("alerting service unavailable".to_string()));
        }
        Ok(self.alerts.lock().clone())
    }
}
