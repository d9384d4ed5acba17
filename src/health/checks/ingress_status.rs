//! # Ingress Status Check
//!
//! Reports every reason ingress is currently refused and raises notifications when that
//! changes:
//!
//! - the `ingress_enabled` property is off (reported every tick, never notified)
//! - content storage has less free space than the ingress requirement
//! - data sources whose error count exceeded their limit
//!
//! Storage and per-flow notifications are edge-triggered: one when a condition starts, one
//! when it clears, nothing while it persists. The previous conditions live in
//! [`NotificationState`], which the registry threads between runs.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::group_thousands;
use crate::clients::{FlowErrorState, PlatformQueryService, StorageUsage};
use crate::error::{CheckError, MonitorResult};
use crate::events::{Notification, NotificationService};
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder, Severity};
use crate::properties::PropertySource;

const DESCRIPTION: &str = "Ingress Status Check";
const NOTIFICATION_SOURCE: &str = "ingress";

/// Conditions observed by the previous run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub ingress_disabled_by_storage: bool,
    pub disabled_flows: BTreeSet<String>,
}

pub struct IngressStatusCheck {
    properties: Arc<dyn PropertySource>,
    query: Arc<dyn PlatformQueryService>,
    notifications: Arc<dyn NotificationService>,
}

impl IngressStatusCheck {
    pub fn new(
        properties: Arc<dyn PropertySource>,
        query: Arc<dyn PlatformQueryService>,
        notifications: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            properties,
            query,
            notifications,
        }
    }

    async fn notify(&self, notification: Notification) {
        let summary = notification.summary.clone();
        if let Err(e) = self.notifications.create_event(notification).await {
            warn!(summary = %summary, error = %e, "Failed to create ingress notification");
        }
    }

    async fn check_storage(
        &self,
        usage: MonitorResult<StorageUsage>,
        required: u64,
        previous: bool,
        builder: &mut ResultBuilder,
    ) -> bool {
        let usage = match usage {
            Ok(usage) => usage,
            Err(e) => {
                builder
                    .severity(Severity::Warn)
                    .add_header("Failed to get storage usage information")
                    .add_line(e.to_string());
                // unknown usage leaves the previous condition in place
                return previous;
            }
        };

        let remaining = usage.remaining_bytes();
        if remaining > required {
            if previous {
                self.notify(Notification::info(NOTIFICATION_SOURCE, "Ingress is re-enabled"))
                    .await;
            }
            return false;
        }

        let required_line = format!(
            "Required bytes in content storage: {} ({})",
            group_thousands(required),
            human_bytes(required)
        );
        let remaining_line = format!(
            "Remaining bytes in content storage: {} ({})",
            group_thousands(remaining),
            human_bytes(remaining)
        );

        if !previous {
            let content = format!("- {remaining_line}\n- {required_line}");
            self.notify(
                Notification::warn(
                    NOTIFICATION_SOURCE,
                    "Disabling ingress due to depleted content storage",
                )
                .with_content(content),
            )
            .await;
        }

        builder
            .severity(Severity::Warn)
            .add_header("Ingress is disabled due to lack of content storage")
            .add_line(required_line)
            .add_line(remaining_line);
        true
    }

    async fn check_flows(
        &self,
        exceeded: &[FlowErrorState],
        previous: &BTreeSet<String>,
        builder: &mut ResultBuilder,
    ) -> BTreeSet<String> {
        let current: BTreeSet<String> = exceeded.iter().map(|flow| flow.name.clone()).collect();

        for flow in exceeded {
            if !previous.contains(&flow.name) {
                self.notify(
                    Notification::warn(
                        NOTIFICATION_SOURCE,
                        format!(
                            "Alert: Disabling ingress to flow {} due to too many errors",
                            flow.name
                        ),
                    )
                    .with_content(format!(
                        "- Current errors for flow: {}\n- Maximum errors allowed: {}",
                        flow.curr_errors, flow.max_errors
                    )),
                )
                .await;
            }
        }

        for name in previous.difference(&current) {
            self.notify(Notification::info(
                NOTIFICATION_SOURCE,
                format!("Ingress is re-enabled for flow {name}"),
            ))
            .await;
        }

        if !exceeded.is_empty() {
            builder
                .severity(Severity::Warn)
                .add_header("Ingress is disabled for flows with too many errors")
                .add_line("Acknowledge or resolve errors on these flows to continue:");
            for flow in exceeded {
                builder.add_line(format!(
                    "- {}: {} errors, {} allowed",
                    flow.name, flow.curr_errors, flow.max_errors
                ));
            }
        }

        current
    }
}

#[async_trait]
impl StatusCheck for IngressStatusCheck {
    type State = NotificationState;

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(
        &self,
        previous: NotificationState,
    ) -> Result<(CheckResult, NotificationState), CheckError> {
        let properties = self.properties.current();

        // collect every fact before emitting any notification, so a failed query leaves
        // the stored state and the notifications consistent
        let exceeded = self.query.data_sources_errors_exceeded().await?;
        let usage = self.query.content_storage_usage().await;

        let mut builder = ResultBuilder::new();
        if !properties.ingress_enabled {
            builder
                .severity(Severity::Warn)
                .add_header("Ingress is disabled")
                .add_line("Reenable the system property 'ingressEnabled' to restart ingress.");
        }

        let ingress_disabled_by_storage = self
            .check_storage(
                usage,
                properties.ingress_disk_space_requirement_bytes,
                previous.ingress_disabled_by_storage,
                &mut builder,
            )
            .await;
        let disabled_flows = self
            .check_flows(&exceeded, &previous.disabled_flows, &mut builder)
            .await;

        let next = NotificationState {
            ingress_disabled_by_storage,
            disabled_flows,
        };
        if next != previous {
            debug!(
                storage = next.ingress_disabled_by_storage,
                flows = next.disabled_flows.len(),
                "Ingress conditions changed"
            );
        }
        Ok((builder.build(DESCRIPTION), next))
    }
}

/// Decimal units with one fraction digit: `1.2 MB`
fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 6] = ["k", "M", "G", "T", "P", "E"];
    if value < 1000 {
        return format!("{value} B");
    }
    let mut scaled = value as f64;
    let mut unit = 0;
    while scaled >= 1000.0 && unit < UNITS.len() {
        scaled /= 1000.0;
        unit += 1;
    }
    format!("{scaled:.1} {}B", UNITS[unit - 1])
}
