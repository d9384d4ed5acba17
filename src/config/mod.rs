//! # Monitor Configuration
//!
//! Static configuration for the orchestrator, the event hub, the individual checks and the
//! external collaborators, plus the initial values of the dynamic properties that checks read
//! on every tick.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_monitor::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().orchestrator.interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    defaults, COLD_QUEUE_COUNT_KEY, HEARTBEAT_HASH, LEADER_MEMBER_PREFIX,
    LONG_RUNNING_TASKS_HASH, MONITOR_STATUS_KEY, SSE_CHANNEL_PREFIX,
};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub orchestrator: OrchestratorConfig,
    pub hub: HubConfig,
    pub checks: ChecksConfig,
    pub properties: PropertiesConfig,
    pub counters: CountersConfig,
    pub clients: ClientsConfig,
}

impl MonitorConfig {
    /// Reject values that would make the background loops misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        if self.orchestrator.interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestrator.interval_seconds",
                0,
                "tick interval must be at least one second",
            ));
        }
        if self.orchestrator.check_timeout_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "orchestrator.check_timeout_seconds",
                0,
                "omit the value to disable per-check timeouts",
            ));
        }
        if self.hub.channel_prefix.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "hub.channel_prefix",
                &self.hub.channel_prefix,
                "channel prefix cannot be empty",
            ));
        }
        if self.hub.reconnect_initial_backoff_ms == 0
            || self.hub.reconnect_initial_backoff_ms > self.hub.reconnect_max_backoff_ms
        {
            return Err(ConfigurationError::invalid_value(
                "hub.reconnect_initial_backoff_ms",
                self.hub.reconnect_initial_backoff_ms,
                "must be non-zero and not exceed hub.reconnect_max_backoff_ms",
            ));
        }
        if self.hub.subscriber_buffer == 0 {
            return Err(ConfigurationError::invalid_value(
                "hub.subscriber_buffer",
                0,
                "subscriber buffer must hold at least one frame",
            ));
        }
        if self.properties.content_storage_percent_threshold > 100 {
            return Err(ConfigurationError::invalid_value(
                "properties.content_storage_percent_threshold",
                self.properties.content_storage_percent_threshold,
                "percent threshold must be between 0 and 100",
            ));
        }
        if self.properties.refresh_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "properties.refresh_interval_seconds",
                0,
                "refresh interval must be at least one second",
            ));
        }
        if self.counters.interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "counters.interval_seconds",
                0,
                "publish interval must be at least one second",
            ));
        }
        Ok(())
    }
}

/// Health check orchestrator settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Target wall-clock time between tick starts
    pub interval_seconds: u64,
    /// Upper bound for a single check; `None` lets a hung check stall its tick
    pub check_timeout_seconds: Option<u64>,
    /// Key the aggregate status is written to for late readers
    pub status_key: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: defaults::TICK_INTERVAL_SECONDS,
            check_timeout_seconds: None,
            status_key: MONITOR_STATUS_KEY.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_seconds.map(Duration::from_secs)
    }
}

/// Event distribution hub settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    pub channel_prefix: String,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
    /// Frames buffered per subscriber before writes to it start failing
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_prefix: SSE_CHANNEL_PREFIX.to_string(),
            reconnect_initial_backoff_ms: defaults::RECONNECT_INITIAL_BACKOFF_MS,
            reconnect_max_backoff_ms: defaults::RECONNECT_MAX_BACKOFF_MS,
            subscriber_buffer: defaults::SUBSCRIBER_BUFFER,
        }
    }
}

impl HubConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_backoff_ms)
    }
}

/// Settings consumed by the individual checks
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// A long running task is active while its last heartbeat is younger than this
    pub activity_window_seconds: u64,
    /// A queue heartbeat younger than this marks the queue as known
    pub queue_recency_seconds: u64,
    /// Queue names never reported as orphans
    pub ignored_queues: Vec<String>,
    /// Key prefixes never reported as orphans
    pub excluded_queue_prefixes: Vec<String>,
    pub namespace: String,
    pub status_checks_config_map: String,
    pub ui_base_path: String,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            activity_window_seconds: defaults::ACTIVITY_WINDOW_SECONDS,
            queue_recency_seconds: defaults::QUEUE_RECENCY_SECONDS,
            // action queues are named after their action class (`org.deltafi.core.action.*`),
            // so only the platform's own bookkeeping keys are listed here
            ignored_queues: vec![
                HEARTBEAT_HASH.to_string(),
                LONG_RUNNING_TASKS_HASH.to_string(),
                MONITOR_STATUS_KEY.to_string(),
                COLD_QUEUE_COUNT_KEY.to_string(),
            ],
            excluded_queue_prefixes: vec![
                "gauge.node".to_string(),
                LEADER_MEMBER_PREFIX.to_string(),
            ],
            namespace: defaults::NAMESPACE.to_string(),
            status_checks_config_map: defaults::STATUS_CHECKS_CONFIG_MAP.to_string(),
            ui_base_path: defaults::UI_BASE_PATH.to_string(),
        }
    }
}

impl ChecksConfig {
    pub fn activity_window(&self) -> Duration {
        Duration::from_secs(self.activity_window_seconds)
    }

    pub fn queue_recency(&self) -> Duration {
        Duration::from_secs(self.queue_recency_seconds)
    }
}

/// Initial values for the runtime-adjustable properties
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PropertiesConfig {
    /// Dynamic queue size threshold; `None` falls back to `fallback_queue_size_threshold`
    pub queue_size_threshold: Option<u64>,
    pub fallback_queue_size_threshold: u64,
    pub content_storage_percent_threshold: u8,
    pub ingress_disk_space_requirement_bytes: u64,
    pub ingress_enabled: bool,
    /// A cold queue at least this deep that is not shrinking raises a warning
    pub cold_queue_minimum_growing: u64,
    /// A cold queue deeper than this always raises a warning
    pub cold_queue_warning_threshold: u64,
    /// How often the dynamic values are re-read from the query service
    pub refresh_interval_seconds: u64,
}

impl Default for PropertiesConfig {
    fn default() -> Self {
        Self {
            queue_size_threshold: None,
            fallback_queue_size_threshold: defaults::QUEUE_SIZE_THRESHOLD,
            content_storage_percent_threshold: defaults::CONTENT_STORAGE_PERCENT_THRESHOLD,
            ingress_disk_space_requirement_bytes: defaults::INGRESS_DISK_SPACE_REQUIREMENT_BYTES,
            ingress_enabled: true,
            cold_queue_minimum_growing: defaults::COLD_QUEUE_MINIMUM_GROWING,
            cold_queue_warning_threshold: defaults::COLD_QUEUE_WARNING_THRESHOLD,
            refresh_interval_seconds: defaults::PROPERTY_REFRESH_SECONDS,
        }
    }
}

impl PropertiesConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

/// Periodic counter publisher settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CountersConfig {
    pub interval_seconds: u64,
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            interval_seconds: defaults::TICK_INTERVAL_SECONDS,
        }
    }
}

impl CountersConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Connection settings for external collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub redis_url: String,
    pub graphql_url: String,
    /// Base URL of the alerting service; the alert check is skipped when empty
    pub grafana_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            graphql_url: "http://deltafi-core-service/api/v2/graphql".to_string(),
            grafana_url: defaults::GRAFANA_URL.to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl ClientsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
