#![allow(clippy::doc_markdown)] // Allow technical terms like Valkey, GraphQL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Platform Monitor
//!
//! Health check orchestration and live event distribution for a fleet of platform services.
//!
//! ## Overview
//!
//! The monitor periodically runs a set of status checks against the platform's
//! collaborators (key-value store, cluster API, platform query service), reduces their
//! results into one aggregate health status and publishes it three ways: an in-process
//! cache, a persisted key, and a `status` event. A separate hub relays every event
//! published on the shared bus to the live subscribers connected to this instance.
//!
//! ## Module Organization
//!
//! - [`health`] - Check contract, built-in checks, reduction and the orchestrator loop
//! - [`events`] - Event hub, frame format, notifications and periodic counters
//! - [`clients`] - Collaborator traits and their Redis, Kubernetes and GraphQL adapters
//! - [`config`] - Layered configuration (file, environment) with validation
//! - [`properties`] - Runtime-adjustable thresholds read on every tick
//! - [`metrics`] - OpenTelemetry instruments and the check metrics port
//! - [`logging`] - Structured logging setup
//! - [`error`] - Error types
//! - [`test_helpers`] - In-memory collaborators for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use platform_monitor::config::MonitorConfig;
//! use platform_monitor::events::EventHub;
//! use platform_monitor::health::{CheckRegistry, HealthCheckOrchestrator};
//! use platform_monitor::health::checks::LongRunningTaskCheck;
//! use platform_monitor::test_helpers::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::default();
//! let store = Arc::new(InMemoryStore::new());
//! let (hub, _subscription) = EventHub::start(store.clone(), config.hub.clone());
//!
//! let registry = CheckRegistry::new()
//!     .with(LongRunningTaskCheck::new(store.clone(), &config.checks));
//! let orchestrator = Arc::new(HealthCheckOrchestrator::new(
//!     registry,
//!     store,
//!     hub,
//!     config.orchestrator.clone(),
//! ));
//!
//! let status = orchestrator.tick().await?;
//! println!("{}", status.state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod properties;
pub mod test_helpers;

pub use config::{ConfigManager, MonitorConfig};
pub use error::{CheckError, MonitorError, MonitorResult, SinkError};
pub use events::{EventFrame, EventHub, SubscriberHandle};
pub use health::{
    AggregateStatus, CheckRegistry, CheckResult, HealthCheckOrchestrator, HealthSnapshot,
    Severity, StatusCheck,
};
