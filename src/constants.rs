//! Shared key names, channel names and default values.

/// Hash of action queue heartbeats: field = queue name, value = RFC 3339 timestamp.
pub const HEARTBEAT_HASH: &str = "org.deltafi.action-queue.heartbeat";

/// Hash of long running tasks: field = `<class>:<action>:<did>`, value = `[start, heartbeat]`.
pub const LONG_RUNNING_TASKS_HASH: &str = "org.deltafi.action-queue.long-running-tasks";

/// Key holding the last published aggregate status.
pub const MONITOR_STATUS_KEY: &str = "org.deltafi.monitor.status";

/// Last total of cold queued work items, shared with every platform instance.
pub const COLD_QUEUE_COUNT_KEY: &str = "org.deltafi.cold.queue.count";

/// Prefix of the cluster membership keys written by each core instance.
pub const LEADER_MEMBER_PREFIX: &str = "org.deltafi.leader.member.";

/// Channel prefix shared by the event hub and every publisher.
pub const SSE_CHANNEL_PREFIX: &str = "org.deltafi.ui.sse";

pub mod events {
    pub const STATUS: &str = "status";
    pub const ERROR_COUNT: &str = "errorCount";
    pub const DELTA_FILE_STATS: &str = "deltaFileStats";
    pub const NOTIFICATION_COUNT: &str = "notificationCount";
    pub const NOTIFICATION: &str = "notification";
}

pub mod defaults {
    pub const TICK_INTERVAL_SECONDS: u64 = 5;
    pub const MIN_SLEEP_SECONDS: u64 = 1;
    pub const ACTIVITY_WINDOW_SECONDS: u64 = 30;
    pub const QUEUE_RECENCY_SECONDS: u64 = 60;
    pub const QUEUE_SIZE_THRESHOLD: u64 = 10;
    pub const COLD_QUEUE_MINIMUM_GROWING: u64 = 500;
    pub const COLD_QUEUE_WARNING_THRESHOLD: u64 = 200_000;
    pub const PROPERTY_REFRESH_SECONDS: u64 = 30;
    pub const CONTENT_STORAGE_PERCENT_THRESHOLD: u8 = 90;
    pub const INGRESS_DISK_SPACE_REQUIREMENT_BYTES: u64 = 1_000_000_000;
    pub const RECONNECT_INITIAL_BACKOFF_MS: u64 = 500;
    pub const RECONNECT_MAX_BACKOFF_MS: u64 = 30_000;
    pub const SUBSCRIBER_BUFFER: usize = 64;
    pub const NAMESPACE: &str = "deltafi";
    pub const STATUS_CHECKS_CONFIG_MAP: &str = "deltafi-status-checks";
    pub const UI_BASE_PATH: &str = "/deltafile/viewer";
    pub const GRAFANA_URL: &str = "http://deltafi-grafana";
}

/// Severity lookup table: index = severity code.
pub const STATE_TABLE: [(&str, &str); 3] = [
    ("Healthy", "green"),
    ("Degraded", "yellow"),
    ("Unhealthy", "red"),
];

pub const UNKNOWN_STATE: &str = "Unknown";
pub const UNKNOWN_COLOR: &str = "gray";

/// Message recorded for a check that failed instead of returning a result.
pub const CHECK_EXCEPTION_MESSAGE: &str = "Exception occurred while running check";
