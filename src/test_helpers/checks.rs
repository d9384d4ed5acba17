//! Scripted checks for orchestrator tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::CheckError;
use crate::health::{CheckResult, Severity, StatusCheck};

/// Returns the same result every run, optionally after a delay
///
/// Every run start is recorded so tests can observe tick scheduling.
#[derive(Debug, Clone)]
pub struct StaticCheck {
    description: String,
    severity: Severity,
    lines: Vec<String>,
    delay: Option<Duration>,
    starts: Arc<Mutex<Vec<Instant>>>,
}

impl StaticCheck {
    pub fn new(description: &str, severity: Severity, lines: &[&str]) -> Self {
        Self {
            description: description.to_string(),
            severity,
            lines: lines.iter().map(|line| line.to_string()).collect(),
            delay: None,
            starts: Arc::default(),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared log of run start times; clone it before registering the check
    pub fn starts(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.starts)
    }
}

#[async_trait]
impl StatusCheck for StaticCheck {
    type State = ();

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        self.starts.lock().push(Instant::now());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok((
            CheckResult::new(self.description.as_str(), self.severity, self.lines.clone()),
            (),
        ))
    }
}

/// Always returns an error
#[derive(Debug, Clone)]
pub struct FailingCheck {
    description: String,
    message: String,
}

impl FailingCheck {
    pub fn new(description: &str, message: &str) -> Self {
        Self {
            description: description.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl StatusCheck for FailingCheck {
    type State = ();

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        Err(CheckError::failed(self.message.clone()))
    }
}

/// Always panics
#[derive(Debug, Clone)]
pub struct PanickingCheck {
    description: String,
}

impl PanickingCheck {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
        }
    }
}

#[async_trait]
impl StatusCheck for PanickingCheck {
    type State = ();

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        panic!("{} exploded", self.description);
    }
}
