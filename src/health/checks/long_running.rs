//! # Long Running Task Check
//!
//! Lists tasks that have been executing for a long time and are still alive. Workers record
//! each long task under `<class>:<action>:<did>` with a JSON `[start, heartbeat]` pair and
//! refresh the heartbeat while they work. A task counts as active while its heartbeat is
//! younger than the activity window. The check is informational and always reports `OK`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::parse_timestamp;
use crate::clients::KeyValueStore;
use crate::config::ChecksConfig;
use crate::constants::LONG_RUNNING_TASKS_HASH;
use crate::error::CheckError;
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder};

const BASE_DESCRIPTION: &str = "Long Running Tasks Check";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRunningTask {
    /// `<class>:<action>`
    pub action_name: String,
    pub did: String,
    pub start_time: DateTime<Utc>,
    pub heartbeat_time: DateTime<Utc>,
}

impl LongRunningTask {
    /// Parse one hash entry; `None` for malformed keys or values
    pub fn parse(key: &str, value: &str) -> Option<Self> {
        let (action_name, did) = key.rsplit_once(':')?;
        if action_name.is_empty() || did.is_empty() {
            return None;
        }

        let times: Vec<String> = serde_json::from_str(value).ok()?;
        let [start, heartbeat] = times.as_slice() else {
            return None;
        };

        Some(Self {
            action_name: action_name.to_string(),
            did: did.to_string(),
            start_time: parse_timestamp(start)?,
            heartbeat_time: parse_timestamp(heartbeat)?,
        })
    }

    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.heartbeat_time)
            .to_std()
            .map(|age| age < window)
            .unwrap_or(true)
    }

    /// Seconds between start and the latest heartbeat
    pub fn elapsed_seconds(&self) -> i64 {
        self.heartbeat_time
            .signed_duration_since(self.start_time)
            .num_seconds()
    }
}

/// Active tasks grouped by action, each group ordered by did
pub fn group_active(
    entries: &HashMap<String, String>,
    now: DateTime<Utc>,
    window: Duration,
) -> BTreeMap<String, Vec<LongRunningTask>> {
    let mut groups: BTreeMap<String, Vec<LongRunningTask>> = BTreeMap::new();
    for (key, value) in entries {
        let Some(task) = LongRunningTask::parse(key, value) else {
            debug!(key = %key, "Skipping malformed long running task entry");
            continue;
        };
        if task.is_active(now, window) {
            groups.entry(task.action_name.clone()).or_default().push(task);
        }
    }
    for tasks in groups.values_mut() {
        tasks.sort_by(|a, b| a.did.cmp(&b.did));
    }
    groups
}

pub struct LongRunningTaskCheck {
    store: Arc<dyn KeyValueStore>,
    activity_window: Duration,
    ui_base_path: String,
}

impl LongRunningTaskCheck {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &ChecksConfig) -> Self {
        Self {
            store,
            activity_window: config.activity_window(),
            ui_base_path: config.ui_base_path.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StatusCheck for LongRunningTaskCheck {
    type State = ();

    fn description(&self) -> &str {
        BASE_DESCRIPTION
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        let entries = self.store.hgetall(LONG_RUNNING_TASKS_HASH).await?;
        let groups = group_active(&entries, Utc::now(), self.activity_window);
        let count: usize = groups.values().map(Vec::len).sum();

        let mut builder = ResultBuilder::new();
        for (action, tasks) in &groups {
            builder.add_header(action);
            for task in tasks {
                builder.add_line(format!(
                    "- [{did}]({base}/{did}) {elapsed}s",
                    did = task.did,
                    base = self.ui_base_path,
                    elapsed = task.elapsed_seconds()
                ));
            }
        }

        let description = if count > 0 {
            format!("{BASE_DESCRIPTION} ({count})")
        } else {
            BASE_DESCRIPTION.to_string()
        };
        Ok((builder.build(description), ()))
    }
}
