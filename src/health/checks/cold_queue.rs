//! # Cold Queue Check
//!
//! Watches work that is parked in cold queues waiting for an action to catch up.
//!
//! While the totals are small enough to count per action, the check keeps the last
//! [`HISTORY_SIZE`] samples for every action and warns when a queue is over the warning
//! threshold, or is at least the minimum growing size and not below its recent average.
//! Once the totals are too large to group, it only lists the affected actions and always
//! warns.
//!
//! The total is also written to [`COLD_QUEUE_COUNT_KEY`] for the other platform instances.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use super::group_thousands;
use crate::clients::{KeyValueStore, PlatformQueryService};
use crate::constants::COLD_QUEUE_COUNT_KEY;
use crate::error::CheckError;
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder, Severity};
use crate::properties::PropertySource;

const DESCRIPTION: &str = "Cold Queued Actions Check";

/// Largest total that is still grouped by action
pub const MAX_COLD_QUEUE_FOR_GROUPING: u64 = 250_000;

/// Above this many in-flight items the total is not counted at all
pub const MAX_IN_FLIGHT_COUNT: u64 = 3 * MAX_COLD_QUEUE_FOR_GROUPING;

/// One minute of samples at the default tick interval
pub const HISTORY_SIZE: usize = 12;

/// Recent cold queue depths of one action, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueHistory {
    counts: VecDeque<u64>,
}

impl QueueHistory {
    pub fn push(&mut self, count: u64) {
        self.counts.push_back(count);
        while self.counts.len() > HISTORY_SIZE {
            self.counts.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn latest(&self) -> u64 {
        self.counts.back().copied().unwrap_or(0)
    }

    /// Integer mean of every sample but the latest; 0 with fewer than two samples
    pub fn average(&self) -> u64 {
        if self.counts.len() < 2 {
            return 0;
        }
        let older = self.counts.len() - 1;
        self.counts.iter().take(older).sum::<u64>() / older as u64
    }

    pub fn is_warning(&self, minimum_growing: u64, warning_threshold: u64) -> bool {
        let latest = self.latest();
        if latest > warning_threshold {
            return true;
        }
        let average = self.average();
        average > 0 && latest >= minimum_growing && latest >= average
    }

    fn previous(&self) -> u64 {
        self.counts
            .len()
            .checked_sub(2)
            .and_then(|index| self.counts.get(index).copied())
            .unwrap_or(0)
    }

    fn message(&self, action: &str) -> String {
        format!(
            "- {action}: __{}__ (was {})",
            group_thousands(self.latest()),
            group_thousands(self.previous())
        )
    }
}

/// Per-action history carried between runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColdQueueState {
    pub history: BTreeMap<String, QueueHistory>,
}

impl ColdQueueState {
    /// Append the current counts; actions that are no longer cold queued are dropped
    fn advance(self, current: &BTreeMap<String, u64>) -> Self {
        let mut previous = self.history;
        let history = current
            .iter()
            .map(|(action, count)| {
                let mut history = previous.remove(action).unwrap_or_default();
                history.push(*count);
                (action.clone(), history)
            })
            .collect();
        Self { history }
    }
}

pub struct ColdQueueCheck {
    query: Arc<dyn PlatformQueryService>,
    store: Arc<dyn KeyValueStore>,
    properties: Arc<dyn PropertySource>,
}

impl ColdQueueCheck {
    pub fn new(
        query: Arc<dyn PlatformQueryService>,
        store: Arc<dyn KeyValueStore>,
        properties: Arc<dyn PropertySource>,
    ) -> Self {
        Self {
            query,
            store,
            properties,
        }
    }

    async fn share_total(&self, total: u64) {
        if let Err(e) = self
            .store
            .set(COLD_QUEUE_COUNT_KEY, &total.to_string())
            .await
        {
            warn!(error = %e, "Failed to store cold queue count");
        }
    }

    async fn total_only(
        &self,
        total: Option<u64>,
        in_flight: u64,
    ) -> Result<CheckResult, CheckError> {
        let actions = self.query.distinct_cold_queued_actions().await?;

        let mut builder = ResultBuilder::new();
        builder
            .severity(Severity::Warn)
            .add_header("Actions with cold queues:");
        for action in &actions {
            builder.add_line(format!("- {action}"));
        }
        builder.add_line("");
        match total {
            Some(total) => builder.add_line(format!(
                "There are at least {} entries cold queued",
                group_thousands(total)
            )),
            None => builder.add_line(format!(
                "Cold queue count not computed due to {} DeltaFiles in flight",
                group_thousands(in_flight)
            )),
        };
        Ok(builder.build(DESCRIPTION))
    }

    async fn with_history(
        &self,
        total: u64,
        previous: ColdQueueState,
    ) -> Result<(CheckResult, ColdQueueState), CheckError> {
        let counts = self.query.cold_queued_action_counts().await?;
        if counts.is_empty() {
            return Ok((
                ResultBuilder::new().build(DESCRIPTION),
                ColdQueueState::default(),
            ));
        }

        let properties = self.properties.current();
        let state = previous.advance(&counts);

        let mut builder = ResultBuilder::new();
        builder.add_header("Actions with cold queues:");
        for (action, history) in &state.history {
            builder.add_line(history.message(action));
            if history.is_warning(
                properties.cold_queue_minimum_growing,
                properties.cold_queue_warning_threshold,
            ) {
                builder.severity(Severity::Warn);
            }
        }
        builder
            .add_line("")
            .add_line(format!("Total cold queued: {}", group_thousands(total)));
        Ok((builder.build(DESCRIPTION), state))
    }
}

#[async_trait]
impl StatusCheck for ColdQueueCheck {
    type State = ColdQueueState;

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(
        &self,
        previous: ColdQueueState,
    ) -> Result<(CheckResult, ColdQueueState), CheckError> {
        // counting gets slow with many items in flight, so check that first
        let in_flight = self.query.delta_file_stats().await?.in_flight_count;
        let total = if in_flight < MAX_IN_FLIGHT_COUNT {
            Some(self.query.cold_queued_count(MAX_COLD_QUEUE_FOR_GROUPING).await?)
        } else {
            None
        };

        if let Some(total) = total {
            self.share_total(total).await;
        }
        debug!(in_flight, total = ?total, "Cold queue totals read");

        match total {
            Some(total) if total < MAX_COLD_QUEUE_FOR_GROUPING => {
                self.with_history(total, previous).await
            }
            _ => {
                let result = self.total_only(total, in_flight).await?;
                Ok((result, ColdQueueState::default()))
            }
        }
    }
}
