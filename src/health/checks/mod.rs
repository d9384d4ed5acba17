//! # Built-in Status Checks
//!
//! | Check | State | Raises |
//! |-------|-------|--------|
//! | [`ActionQueueCheck`] | none | WARN for queues over threshold or orphaned |
//! | [`LongRunningTaskCheck`] | none | never (informational) |
//! | [`IngressStatusCheck`] | [`NotificationState`] | WARN while any ingress is disabled |
//! | [`K8sResourcesCheck`] | none | WARN for bad pods, ERROR for missing resources |
//! | [`StorageUsageCheck`] | none | WARN when content storage is nearly full |
//! | [`ColdQueueCheck`] | [`ColdQueueState`] | WARN while cold queues are large or growing |
//! | [`AlertCheck`] | [`FiringAlerts`] | never; notifies when alerts fire and clear |

pub mod action_queue;
pub mod alerts;
pub mod cold_queue;
pub mod ingress_status;
pub mod k8s_resources;
pub mod long_running;
pub mod storage_usage;

pub use action_queue::{find_orphans, recent_queues, ActionQueueCheck, OrphanPolicy};
pub use alerts::{AlertCheck, FiringAlerts};
pub use cold_queue::{ColdQueueCheck, ColdQueueState, QueueHistory};
pub use ingress_status::{IngressStatusCheck, NotificationState};
pub use k8s_resources::K8sResourcesCheck;
pub use long_running::{group_active, LongRunningTask, LongRunningTaskCheck};
pub use storage_usage::StorageUsageCheck;

use chrono::{DateTime, NaiveDateTime, Utc};

/// `1234567` -> `1,234,567`
pub(crate) fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Parse an ISO-8601 timestamp with offset, tolerating the seconds-free form
/// (`2025-01-01T10:15Z`) some writers emit
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    value
        .strip_suffix('Z')
        .and_then(|naive| NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M").ok())
        .map(|naive| naive.and_utc())
}
