//! # Health Check Orchestrator
//!
//! Background loop that runs every registered check concurrently, reduces the results into
//! one [`AggregateStatus`] and publishes it.
//!
//! ## One tick
//!
//! 1. Every check runs in its own task. A check that returns an error, panics or exceeds
//!    the optional per-check timeout is recorded as an `ERROR` result; the others are
//!    unaffected.
//! 2. The results are reduced (worst severity, fixed state/color table, stable ordering).
//! 3. The status is serialized once, then written to the in-process cache, persisted to the
//!    store and published as a `status` event. A failed persist or publish is logged and
//!    does not roll back the cache.
//!
//! ## Scheduling
//!
//! Tick starts aim for the configured interval: after a tick that took `t`, the loop sleeps
//! `max(interval - t, 1s)`. A tick that fails as a whole is logged and followed by a full
//! interval. The loop only stops when its task is aborted.

use chrono::Utc;
use futures::future::join_all;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::caches::StatusCache;
use super::check::{CheckRegistry, RegisteredCheck};
use super::types::{AggregateStatus, CheckResult, HealthSnapshot, Severity};
use crate::clients::KeyValueStore;
use crate::config::OrchestratorConfig;
use crate::constants::{defaults, events, CHECK_EXCEPTION_MESSAGE};
use crate::error::MonitorResult;
use crate::events::EventHub;
use crate::metrics;

pub struct HealthCheckOrchestrator {
    checks: Vec<Arc<dyn RegisteredCheck>>,
    cache: StatusCache,
    store: Arc<dyn KeyValueStore>,
    hub: Arc<EventHub>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for HealthCheckOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckOrchestrator")
            .field("checks", &self.checks.len())
            .field("config", &self.config)
            .finish()
    }
}

impl HealthCheckOrchestrator {
    pub fn new(
        registry: CheckRegistry,
        store: Arc<dyn KeyValueStore>,
        hub: Arc<EventHub>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            checks: registry.into_checks(),
            cache: StatusCache::new(),
            store,
            hub,
            config,
        }
    }

    /// Handle readers use to get the latest status
    pub fn cache(&self) -> StatusCache {
        self.cache.clone()
    }

    pub fn current(&self) -> HealthSnapshot {
        self.cache.snapshot()
    }

    /// Start the tick loop on the runtime
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            checks = self.checks.len(),
            interval_seconds = self.config.interval_seconds,
            "Starting health check orchestrator"
        );
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self: Arc<Self>) {
        let interval = self.config.interval();
        loop {
            let started = Instant::now();
            let orchestrator = Arc::clone(&self);
            // run the tick in its own task so a panic outside the checks cannot end the loop
            let pause = match tokio::spawn(async move { orchestrator.tick().await }).await {
                Ok(Ok(status)) => {
                    debug!(state = status.state(), "Health check tick completed");
                    next_sleep(interval, started.elapsed())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Health check tick failed");
                    interval
                }
                Err(join_error) => {
                    error!(error = %join_error, "Health check tick aborted");
                    interval
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Run every check once, reduce, and publish
    #[instrument(skip(self), fields(checks = self.checks.len()))]
    pub async fn tick(&self) -> MonitorResult<AggregateStatus> {
        let started = Instant::now();
        let results = self.run_checks().await;
        let status = AggregateStatus::reduce(results, Utc::now())?;
        self.publish(&status).await?;

        let state = KeyValue::new("state", status.state().to_string());
        metrics::health_ticks_total().add(1, &[state]);
        metrics::health_tick_duration().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        Ok(status)
    }

    /// Results in registration order, one per check
    pub async fn run_checks(&self) -> Vec<CheckResult> {
        let timeout = self.config.check_timeout();
        let handles: Vec<JoinHandle<CheckResult>> = self
            .checks
            .iter()
            .map(|check| {
                let check = Arc::clone(check);
                tokio::spawn(async move { execute_check(check.as_ref(), timeout).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(&self.checks)
            .map(|(joined, check)| match joined {
                Ok(result) => result,
                Err(join_error) => {
                    error!(check = check.description(), error = %join_error, "Check panicked");
                    failure_result(check.description(), &join_error.to_string())
                }
            })
            .collect()
    }

    async fn publish(&self, status: &AggregateStatus) -> MonitorResult<()> {
        let payload = serde_json::to_string(status)?;
        self.cache.store(status.clone());

        if let Err(e) = self.store.set(&self.config.status_key, &payload).await {
            warn!(key = %self.config.status_key, error = %e, "Failed to persist status");
        }
        if let Err(e) = self.hub.publish(events::STATUS, &payload).await {
            warn!(error = %e, "Failed to publish status event");
        }
        Ok(())
    }
}

async fn execute_check(check: &dyn RegisteredCheck, timeout: Option<Duration>) -> CheckResult {
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, check.execute()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(check = check.description(), timeout_seconds = limit.as_secs(), "Check timed out");
                return failure_result(
                    check.description(),
                    &format!("Check timed out after {}s", limit.as_secs()),
                );
            }
        },
        None => check.execute().await,
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!(check = check.description(), error = %e, "Check failed");
            failure_result(check.description(), &e.to_string())
        }
    }
}

fn failure_result(description: &str, detail: &str) -> CheckResult {
    metrics::check_failures_total().add(1, &[KeyValue::new("check", description.to_string())]);
    CheckResult::new(
        description,
        Severity::Error,
        vec![CHECK_EXCEPTION_MESSAGE.to_string(), detail.to_string()],
    )
}

/// Sleep before the next tick: `max(interval - elapsed, 1s)`
pub fn next_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval
        .saturating_sub(elapsed)
        .max(Duration::from_secs(defaults::MIN_SLEEP_SECONDS))
}
