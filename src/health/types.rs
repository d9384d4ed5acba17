//! # Health Status Types
//!
//! Result of a single check, the aggregate status reduced from all of them, and the snapshot
//! handed to readers (which is `Unknown` until the first tick completes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Reverse;
use std::fmt;

use crate::constants::{STATE_TABLE, UNKNOWN_COLOR, UNKNOWN_STATE};
use crate::error::{MonitorError, MonitorResult};

/// Ordinal health level of a check or of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    Ok = 0,
    Warn = 1,
    Error = 2,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Ok, Severity::Warn, Severity::Error];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Severity::Ok),
            1 => Some(Severity::Warn),
            2 => Some(Severity::Error),
            _ => None,
        }
    }

    /// Human state label from the fixed lookup table
    pub fn state(self) -> &'static str {
        STATE_TABLE[self as usize].0
    }

    /// Display color from the fixed lookup table
    pub fn color(self) -> &'static str {
        STATE_TABLE[self as usize].1
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => write!(f, "OK"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Severity::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid severity code {code}")))
    }
}

/// Outcome of one check for one tick
///
/// Serialized as `{description, code, message, timestamp}` where `message` is the
/// newline-joined message lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    description: String,
    #[serde(rename = "code")]
    severity: Severity,
    #[serde(
        rename = "message",
        serialize_with = "join_lines",
        deserialize_with = "split_lines"
    )]
    message_lines: Vec<String>,
    timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(description: impl Into<String>, severity: Severity, message_lines: Vec<String>) -> Self {
        Self::at(description, severity, message_lines, Utc::now())
    }

    pub fn at(
        description: impl Into<String>,
        severity: Severity,
        message_lines: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            description: description.into(),
            severity,
            message_lines,
            timestamp,
        }
    }

    pub fn ok(description: impl Into<String>) -> Self {
        Self::new(description, Severity::Ok, Vec::new())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message_lines(&self) -> &[String] {
        &self.message_lines
    }

    pub fn message(&self) -> String {
        self.message_lines.join("\n")
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

fn join_lines<S: Serializer>(lines: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&lines.join("\n"))
}

fn split_lines<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let message = String::deserialize(deserializer)?;
    if message.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(message.split('\n').map(str::to_string).collect())
    }
}

/// Accumulates message lines and the worst severity seen while a check runs
#[derive(Debug, Clone, Default)]
pub struct ResultBuilder {
    severity: Severity,
    lines: Vec<String>,
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the severity; never lowers it
    pub fn severity(&mut self, severity: Severity) -> &mut Self {
        self.severity = self.severity.max(severity);
        self
    }

    pub fn add_header(&mut self, header: impl AsRef<str>) -> &mut Self {
        if !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.lines.push(format!("##### {}", header.as_ref()));
        self
    }

    pub fn add_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    pub fn current_severity(&self) -> Severity {
        self.severity
    }

    pub fn build(self, description: impl Into<String>) -> CheckResult {
        CheckResult::new(description, self.severity, self.lines)
    }
}

/// System-wide status produced by one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatus {
    severity: Severity,
    state: String,
    color: String,
    checks: Vec<CheckResult>,
    timestamp: DateTime<Utc>,
}

impl AggregateStatus {
    /// Reduce one tick's results: max severity, table lookup, stable sort by
    /// severity descending then description ascending
    pub fn reduce(mut checks: Vec<CheckResult>, timestamp: DateTime<Utc>) -> MonitorResult<Self> {
        if let Some(position) = checks
            .iter()
            .position(|check| check.description.trim().is_empty())
        {
            return Err(MonitorError::Reduction(format!(
                "check result at position {position} has no description"
            )));
        }

        let severity = checks
            .iter()
            .map(CheckResult::severity)
            .max()
            .unwrap_or(Severity::Ok);

        checks.sort_by(|a, b| {
            (Reverse(a.severity), &a.description).cmp(&(Reverse(b.severity), &b.description))
        });

        Ok(Self {
            severity,
            state: severity.state().to_string(),
            color: severity.color().to_string(),
            checks,
            timestamp,
        })
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// What a status reader sees: nothing yet, or the last published aggregate
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HealthSnapshot {
    #[default]
    Unknown,
    Reported(AggregateStatus),
}

impl HealthSnapshot {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            HealthSnapshot::Unknown => None,
            HealthSnapshot::Reported(status) => Some(status.severity()),
        }
    }

    pub fn state(&self) -> &str {
        match self {
            HealthSnapshot::Unknown => UNKNOWN_STATE,
            HealthSnapshot::Reported(status) => status.state(),
        }
    }

    pub fn status(&self) -> Option<&AggregateStatus> {
        match self {
            HealthSnapshot::Unknown => None,
            HealthSnapshot::Reported(status) => Some(status),
        }
    }
}

#[derive(Serialize)]
struct UnknownStatusView {
    severity: Option<Severity>,
    state: &'static str,
    color: &'static str,
    checks: [CheckResult; 0],
    timestamp: Option<DateTime<Utc>>,
}

impl Serialize for HealthSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HealthSnapshot::Reported(status) => status.serialize(serializer),
            HealthSnapshot::Unknown => UnknownStatusView {
                severity: None,
                state: UNKNOWN_STATE,
                color: UNKNOWN_COLOR,
                checks: [],
                timestamp: None,
            }
            .serialize(serializer),
        }
    }
}
