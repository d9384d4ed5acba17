//! # Check Contract
//!
//! A [`StatusCheck`] inspects one aspect of the platform and returns a [`CheckResult`].
//! Checks that need memory between ticks declare a `State` type; the registry keeps the
//! value returned by the previous run and hands it back on the next one. Stateless checks
//! use `()`.
//!
//! When a run fails the stored state is left untouched, so edge-triggered checks re-evaluate
//! the same transition on the next tick.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::types::CheckResult;
use crate::error::CheckError;

#[async_trait]
pub trait StatusCheck: Send + Sync + 'static {
    /// State threaded from one run to the next
    type State: Clone + Default + Send + Sync + 'static;

    /// Human label, also used to order results with equal severity
    fn description(&self) -> &str;

    async fn run(&self, previous: Self::State) -> Result<(CheckResult, Self::State), CheckError>;
}

/// Type-erased check with its persisted state
#[async_trait]
pub(crate) trait RegisteredCheck: Send + Sync {
    fn description(&self) -> &str;

    async fn execute(&self) -> Result<CheckResult, CheckError>;
}

struct CheckSlot<C: StatusCheck> {
    check: C,
    state: Mutex<C::State>,
}

#[async_trait]
impl<C: StatusCheck> RegisteredCheck for CheckSlot<C> {
    fn description(&self) -> &str {
        self.check.description()
    }

    async fn execute(&self) -> Result<CheckResult, CheckError> {
        let previous = self.state.lock().clone();
        let (result, next) = self.check.run(previous).await?;
        *self.state.lock() = next;
        Ok(result)
    }
}

/// Ordered set of checks the orchestrator runs on every tick
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn RegisteredCheck>>,
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.descriptions())
            .finish()
    }
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: StatusCheck>(&mut self, check: C) -> &mut Self {
        self.checks.push(Arc::new(CheckSlot {
            check,
            state: Mutex::new(C::State::default()),
        }));
        self
    }

    pub fn with<C: StatusCheck>(mut self, check: C) -> Self {
        self.register(check);
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.checks
            .iter()
            .map(|check| check.description().to_string())
            .collect()
    }

    pub(crate) fn into_checks(self) -> Vec<Arc<dyn RegisteredCheck>> {
        self.checks
    }
}
