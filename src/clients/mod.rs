//! # External Collaborators
//!
//! Traits for everything the monitor talks to outside the process, and the production
//! adapters behind them:
//!
//! - [`KeyValueStore`] / [`MessageBus`]: queue depths, heartbeats, status persistence and
//!   pub/sub ([`RedisStore`])
//! - [`ClusterApi`]: workload and pod inspection ([`KubeClusterApi`])
//! - [`PlatformQueryService`]: platform-level facts such as storage usage, flow error
//!   limits, cold queue counts and runtime properties ([`GraphqlQueryService`])
//! - [`AlertSource`]: currently firing alerts ([`GrafanaAlertClient`])
//!
//! Checks only ever see the traits, so tests substitute the in-memory fakes from
//! [`crate::test_helpers`].

pub mod alerts;
pub mod cluster;
pub mod graphql;
pub mod kube_cluster;
pub mod query;
pub mod redis_store;
pub mod store;

pub use alerts::{Alert, AlertAnnotations, AlertSource, GrafanaAlertClient};
pub use cluster::{ClusterApi, ContainerState, PodState, ResourceKind};
pub use graphql::GraphqlQueryService;
pub use kube_cluster::KubeClusterApi;
pub use query::{
    ColdQueuedAction, DeltaFileStats, FlowErrorState, PlatformQueryService, PropertyEntry,
    StorageUsage,
};
pub use redis_store::RedisStore;
pub use store::{BusMessage, BusStream, KeyValueStore, MessageBus};
