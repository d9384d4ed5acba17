//! # Alert Check
//!
//! Turns firing alerts into notifications. An alert notifies once when it starts firing and
//! once more when it stops; the names seen by the previous run are the threaded state. The
//! check result itself is always OK.
//!
//! A failed alert query fails the run, so the previous alert set is kept and nothing is
//! reported as cleared just because the alerting service was unreachable.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{Alert, AlertSource};
use crate::error::CheckError;
use crate::events::{Notification, NotificationService, NotificationSeverity};
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder};

const DESCRIPTION: &str = "Grafana Alert Check";
const NOTIFICATION_SOURCE: &str = "Grafana";

/// Names of the alerts firing at the previous run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiringAlerts {
    pub names: BTreeSet<String>,
}

/// Alert `severity` label to notification severity; unlabelled alerts are warnings
pub fn notification_severity(label: Option<&str>) -> NotificationSeverity {
    match label.map(str::to_ascii_lowercase).as_deref() {
        Some("critical" | "error" | "high") => NotificationSeverity::Error,
        Some("info" | "informational" | "low" | "none") => NotificationSeverity::Info,
        Some("success" | "ok" | "resolved") => NotificationSeverity::Success,
        _ => NotificationSeverity::Warn,
    }
}

pub struct AlertCheck {
    alerts: Arc<dyn AlertSource>,
    notifications: Arc<dyn NotificationService>,
}

impl AlertCheck {
    pub fn new(alerts: Arc<dyn AlertSource>, notifications: Arc<dyn NotificationService>) -> Self {
        Self {
            alerts,
            notifications,
        }
    }

    async fn notify(&self, notification: Notification) {
        let summary = notification.summary.clone();
        if let Err(e) = self.notifications.create_event(notification).await {
            warn!(summary = %summary, error = %e, "Failed to create alert notification");
        }
    }

    fn fired(alert: &Alert) -> Notification {
        let notification = Notification::new(
            notification_severity(alert.severity_label()),
            NOTIFICATION_SOURCE,
            format!("Alert: {}", alert.name()),
        );
        let content = alert.content();
        if content.is_empty() {
            notification
        } else {
            notification.with_content(content)
        }
    }

    fn cleared(name: &str) -> Notification {
        Notification::new(
            NotificationSeverity::Success,
            NOTIFICATION_SOURCE,
            format!("Alert cleared: {name}"),
        )
    }
}

#[async_trait]
impl StatusCheck for AlertCheck {
    type State = FiringAlerts;

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(&self, previous: FiringAlerts) -> Result<(CheckResult, FiringAlerts), CheckError> {
        let alerts = self.alerts.active_alerts().await?;

        let mut names = BTreeSet::new();
        for alert in &alerts {
            // the same rule can fire for several label sets; notify once per name
            if names.insert(alert.name().to_string()) && !previous.names.contains(alert.name()) {
                self.notify(Self::fired(alert)).await;
            }
        }
        for name in previous.names.difference(&names) {
            self.notify(Self::cleared(name)).await;
        }

        debug!(firing = names.len(), "Alert check completed");
        Ok((ResultBuilder::new().build(DESCRIPTION), FiringAlerts { names }))
    }
}
