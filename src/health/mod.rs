//! # Health Monitoring
//!
//! Periodic evaluation of platform health.
//!
//! ## Architecture
//!
//! ```text
//! HealthCheckOrchestrator (background task, one tick per interval)
//!     ├─ runs every StatusCheck concurrently ──► CheckResult per check
//!     ├─ AggregateStatus::reduce ──────────────► severity, state, color, ordered checks
//!     └─ publish ──► StatusCache (in-process readers)
//!                ├─► key-value store (late readers, other instances)
//!                └─► EventHub "status" event (live subscribers)
//! ```
//!
//! Readers never trigger checks; they read the cache, which reports `Unknown` until the
//! first tick completes.

pub mod caches;
pub mod check;
pub mod checks;
pub mod orchestrator;
pub mod types;

pub use caches::StatusCache;
pub use check::{CheckRegistry, StatusCheck};
pub use orchestrator::{next_sleep, HealthCheckOrchestrator};
pub use types::{AggregateStatus, CheckResult, HealthSnapshot, ResultBuilder, Severity};
