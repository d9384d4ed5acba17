//! # Dynamic Properties
//!
//! Runtime-adjustable thresholds and switches read by checks on every tick.
//!
//! The platform keeps these as string key/value pairs. [`PropertyRefresher`] re-reads them
//! from the query service on a fixed interval and publishes the parsed values into a
//! [`SharedProperties`]. A key that is unset or unparseable falls back to the configured
//! value, and a failed read keeps whatever was loaded last.
//!
//! ```rust
//! use platform_monitor::clients::PropertyEntry;
//! use platform_monitor::config::PropertiesConfig;
//! use platform_monitor::properties::{keys, PropertyRefresher, PropertySource, SharedProperties};
//! use platform_monitor::test_helpers::ScriptedQueryService;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let query = Arc::new(ScriptedQueryService::new());
//! query.set_properties(vec![PropertyEntry::new(keys::INGRESS_ENABLED, "false")]);
//!
//! let shared = SharedProperties::default();
//! let refresher = PropertyRefresher::new(query, shared.clone(), &PropertiesConfig::default());
//! refresher.refresh_once().await.unwrap();
//! assert!(!shared.current().ingress_enabled);
//! # });
//! ```

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::{PlatformQueryService, PropertyEntry};
use crate::config::PropertiesConfig;
use crate::error::MonitorResult;

pub mod keys {
    pub const ACTION_QUEUE_SIZE_THRESHOLD: &str = "checks.actionQueueSizeThreshold";
    pub const CONTENT_STORAGE_PERCENT_THRESHOLD: &str = "checks.contentStoragePercentThreshold";
    pub const COLD_QUEUE_MINIMUM_GROWING: &str = "checks.coldQueueMinimumGrowing";
    pub const COLD_QUEUE_WARNING_THRESHOLD: &str = "checks.coldQueueWarningThreshold";
    pub const INGRESS_DISK_SPACE_REQUIREMENT_MB: &str = "ingress.diskSpaceRequirementInMb";
    pub const INGRESS_ENABLED: &str = "ingress.enabled";
}

const BYTES_PER_MB: u64 = 1_000_000;

/// Point-in-time copy of the dynamic properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicProperties {
    pub queue_size_threshold: Option<u64>,
    pub content_storage_percent_threshold: u8,
    pub ingress_disk_space_requirement_bytes: u64,
    pub ingress_enabled: bool,
    pub cold_queue_minimum_growing: u64,
    pub cold_queue_warning_threshold: u64,
}

impl DynamicProperties {
    pub fn queue_size_threshold_or(&self, fallback: u64) -> u64 {
        self.queue_size_threshold.unwrap_or(fallback)
    }

    /// `defaults` overlaid with every entry that parses
    pub fn from_entries(defaults: &DynamicProperties, entries: &[PropertyEntry]) -> Self {
        let mut properties = defaults.clone();
        for entry in entries {
            let Some(value) = entry.value.as_deref().map(str::trim) else {
                continue;
            };
            if properties.apply(&entry.key, value).is_none() {
                warn!(key = %entry.key, value, "Ignoring unparseable property value");
            }
        }
        properties
    }

    /// `None` when `value` does not parse for a known key; unknown keys are accepted and ignored
    fn apply(&mut self, key: &str, value: &str) -> Option<()> {
        match key {
            keys::ACTION_QUEUE_SIZE_THRESHOLD => {
                self.queue_size_threshold = Some(value.parse().ok()?);
            }
            keys::CONTENT_STORAGE_PERCENT_THRESHOLD => {
                let percent: u8 = value.parse().ok()?;
                if percent > 100 {
                    return None;
                }
                self.content_storage_percent_threshold = percent;
            }
            keys::COLD_QUEUE_MINIMUM_GROWING => {
                self.cold_queue_minimum_growing = value.parse().ok()?;
            }
            keys::COLD_QUEUE_WARNING_THRESHOLD => {
                self.cold_queue_warning_threshold = value.parse().ok()?;
            }
            keys::INGRESS_DISK_SPACE_REQUIREMENT_MB => {
                let megabytes: u64 = value.parse().ok()?;
                self.ingress_disk_space_requirement_bytes = megabytes.checked_mul(BYTES_PER_MB)?;
            }
            keys::INGRESS_ENABLED => {
                self.ingress_enabled = value.to_ascii_lowercase().parse().ok()?;
            }
            _ => {}
        }
        Some(())
    }
}

impl From<&PropertiesConfig> for DynamicProperties {
    fn from(config: &PropertiesConfig) -> Self {
        Self {
            queue_size_threshold: config.queue_size_threshold,
            content_storage_percent_threshold: config.content_storage_percent_threshold,
            ingress_disk_space_requirement_bytes: config.ingress_disk_space_requirement_bytes,
            ingress_enabled: config.ingress_enabled,
            cold_queue_minimum_growing: config.cold_queue_minimum_growing,
            cold_queue_warning_threshold: config.cold_queue_warning_threshold,
        }
    }
}

impl Default for DynamicProperties {
    fn default() -> Self {
        Self::from(&PropertiesConfig::default())
    }
}

pub trait PropertySource: Send + Sync {
    fn current(&self) -> DynamicProperties;
}

/// In-process property holder that can be updated while checks are running
#[derive(Debug, Clone, Default)]
pub struct SharedProperties {
    inner: Arc<RwLock<DynamicProperties>>,
}

impl SharedProperties {
    pub fn new(initial: DynamicProperties) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn update(&self, change: impl FnOnce(&mut DynamicProperties)) {
        change(&mut *self.inner.write());
    }

    pub fn replace(&self, properties: DynamicProperties) -> bool {
        let mut current = self.inner.write();
        if *current == properties {
            return false;
        }
        *current = properties;
        true
    }
}

impl PropertySource for SharedProperties {
    fn current(&self) -> DynamicProperties {
        self.inner.read().clone()
    }
}

/// Keeps a [`SharedProperties`] in step with the platform's stored properties
pub struct PropertyRefresher {
    query: Arc<dyn PlatformQueryService>,
    target: SharedProperties,
    defaults: DynamicProperties,
    interval: Duration,
}

impl PropertyRefresher {
    pub fn new(
        query: Arc<dyn PlatformQueryService>,
        target: SharedProperties,
        config: &PropertiesConfig,
    ) -> Self {
        Self {
            query,
            target,
            defaults: DynamicProperties::from(config),
            interval: config.refresh_interval(),
        }
    }

    /// Read the stored properties once; the target is left unchanged on failure
    pub async fn refresh_once(&self) -> MonitorResult<DynamicProperties> {
        let entries = self.query.properties().await?;
        let properties = DynamicProperties::from_entries(&self.defaults, &entries);
        if self.target.replace(properties.clone()) {
            info!(
                queue_size_threshold = ?properties.queue_size_threshold,
                ingress_enabled = properties.ingress_enabled,
                "Dynamic properties changed"
            );
        } else {
            debug!(entries = entries.len(), "Dynamic properties unchanged");
        }
        Ok(properties)
    }

    /// Refresh every interval, starting one interval from now; pair with an initial
    /// [`refresh_once`](Self::refresh_once) at startup
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.interval).await;
                if let Err(e) = self.refresh_once().await {
                    warn!(error = %e, "Failed to refresh dynamic properties, keeping previous values");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedQueryService;

    #[test]
    fn test_threshold_fallback() {
        let mut properties = DynamicProperties::default();
        assert_eq!(properties.queue_size_threshold_or(10), 10);
        properties.queue_size_threshold = Some(3);
        assert_eq!(properties.queue_size_threshold_or(10), 3);
    }

    #[test]
    fn test_updates_visible_to_clones() {
        let shared = SharedProperties::default();
        let reader = shared.clone();
        shared.update(|p| p.ingress_enabled = false);
        assert!(!reader.current().ingress_enabled);
    }

    #[test]
    fn test_entries_override_defaults() {
        let defaults = DynamicProperties::default();
        let properties = DynamicProperties::from_entries(
            &defaults,
            &[
                PropertyEntry::new(keys::ACTION_QUEUE_SIZE_THRESHOLD, "250"),
                PropertyEntry::new(keys::INGRESS_ENABLED, "FALSE"),
                PropertyEntry::new(keys::INGRESS_DISK_SPACE_REQUIREMENT_MB, "5000"),
                PropertyEntry::new(keys::COLD_QUEUE_WARNING_THRESHOLD, "1000"),
                PropertyEntry::new("delete.ageOffDays", "13"),
            ],
        );

        assert_eq!(properties.queue_size_threshold, Some(250));
        assert!(!properties.ingress_enabled);
        assert_eq!(properties.ingress_disk_space_requirement_bytes, 5_000_000_000);
        assert_eq!(properties.cold_queue_warning_threshold, 1_000);
        assert_eq!(
            properties.content_storage_percent_threshold,
            defaults.content_storage_percent_threshold
        );
    }

    #[test]
    fn test_unset_and_invalid_entries_fall_back() {
        let defaults = DynamicProperties::default();
        let properties = DynamicProperties::from_entries(
            &defaults,
            &[
                PropertyEntry {
                    key: keys::ACTION_QUEUE_SIZE_THRESHOLD.to_string(),
                    value: None,
                },
                PropertyEntry::new(keys::CONTENT_STORAGE_PERCENT_THRESHOLD, "150"),
                PropertyEntry::new(keys::INGRESS_ENABLED, "maybe"),
            ],
        );
        assert_eq!(properties, defaults);
    }

    #[tokio::test]
    async fn test_refresh_publishes_to_readers() {
        let query = Arc::new(ScriptedQueryService::new());
        let shared = SharedProperties::default();
        let refresher =
            PropertyRefresher::new(query.clone(), shared.clone(), &PropertiesConfig::default());

        query.set_properties(vec![PropertyEntry::new(keys::INGRESS_ENABLED, "false")]);
        refresher.refresh_once().await.unwrap();
        assert!(!shared.current().ingress_enabled);

        // removing the stored value restores the configured default
        query.set_properties(Vec::new());
        refresher.refresh_once().await.unwrap();
        assert!(shared.current().ingress_enabled);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_values() {
        let query = Arc::new(ScriptedQueryService::new());
        let shared = SharedProperties::default();
        let refresher =
            PropertyRefresher::new(query.clone(), shared.clone(), &PropertiesConfig::default());

        query.set_properties(vec![PropertyEntry::new(keys::ACTION_QUEUE_SIZE_THRESHOLD, "3")]);
        refresher.refresh_once().await.unwrap();

        query.set_failing(true);
        assert!(refresher.refresh_once().await.is_err());
        assert_eq!(shared.current().queue_size_threshold, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_refresher_polls_each_interval() {
        let query = Arc::new(ScriptedQueryService::new());
        let shared = SharedProperties::default();
        let task =
            PropertyRefresher::new(query.clone(), shared.clone(), &PropertiesConfig::default())
                .spawn();

        query.set_properties(vec![PropertyEntry::new(keys::INGRESS_ENABLED, "false")]);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(shared.current().ingress_enabled);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(!shared.current().ingress_enabled);
        task.abort();
    }
}
