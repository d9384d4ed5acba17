//! # Alerting Service Client
//!
//! Reads the currently firing alerts from Grafana's built-in alertmanager. Only active,
//! unsilenced and uninhibited alerts are returned.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{MonitorError, MonitorResult};

const ALERT_API: &str =
    "/api/alertmanager/grafana/api/v2/alerts?active=true&silenced=false&inhibited=false";

/// Labels that describe the rule rather than the alert, left out of notification content
const RULE_LABELS: [&str; 5] = [
    "__alert_rule_uid__",
    "ref_id",
    "alertname",
    "datasource_uid",
    "grafana_folder",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAnnotations {
    pub summary: Option<String>,
}

/// One firing alert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub annotations: AlertAnnotations,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Alert {
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            annotations: AlertAnnotations::default(),
            labels: labels
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        self.labels
            .get("alertname")
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    pub fn severity_label(&self) -> Option<&str> {
        self.labels.get("severity").map(String::as_str)
    }

    /// `- *Label*: value` for every label that is not rule metadata
    pub fn content(&self) -> String {
        self.labels
            .iter()
            .filter(|(key, _)| !RULE_LABELS.contains(&key.as_str()))
            .map(|(key, value)| format!("- *{}*: {value}", capitalize(key)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn active_alerts(&self) -> MonitorResult<Vec<Alert>>;
}

#[derive(Debug, Clone)]
pub struct GrafanaAlertClient {
    client: Client,
    url: String,
}

impl GrafanaAlertClient {
    pub fn new(base_url: &str, timeout: Duration) -> MonitorResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-metrics-role", HeaderValue::from_static("Admin"));
        headers.insert("x-user-name", HeaderValue::from_static("admin"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{ALERT_API}", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AlertSource for GrafanaAlertClient {
    async fn active_alerts(&self) -> MonitorResult<Vec<Alert>> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Alert request failed");
            return Err(MonitorError::Query(format!(
                "alerts HTTP {status}: {error_text}"
            )));
        }

        let alerts: Vec<Alert> = response
            .json()
            .await
            .map_err(|e| MonitorError::Query(format!("failed to parse alerts: {e}")))?;
        debug!(count = alerts.len(), "Fetched active alerts");
        Ok(alerts)
    }
}
