//! Cluster inspection contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MonitorResult;

/// Workload kinds whose expected instances are listed in the status checks config map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    Ingress,
    Service,
    StatefulSet,
    PersistentVolumeClaim,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Deployment,
        ResourceKind::Ingress,
        ResourceKind::Service,
        ResourceKind::StatefulSet,
        ResourceKind::PersistentVolumeClaim,
    ];

    /// Config map key holding the expected names for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Service => "Service",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployments",
            ResourceKind::Ingress => "Ingresses",
            ResourceKind::Service => "Services",
            ResourceKind::StatefulSet => "StatefulSets",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaims",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of one container in a pod
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    pub name: String,
    pub started: bool,
    pub ready: bool,
    /// Set when the container has terminated
    pub terminated_reason: Option<String>,
}

impl ContainerState {
    /// Running and ready, or finished successfully
    pub fn is_healthy(&self) -> bool {
        (self.started && self.ready) || self.terminated_reason.as_deref() == Some("Completed")
    }
}

/// Observed state of one pod
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodState {
    pub name: String,
    pub containers: Vec<ContainerState>,
}

impl PodState {
    pub fn unhealthy_containers(&self) -> impl Iterator<Item = &ContainerState> {
        self.containers.iter().filter(|container| !container.is_healthy())
    }

    pub fn is_healthy(&self) -> bool {
        self.unhealthy_containers().next().is_none()
    }
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Names of the existing resources of `kind` in the monitored namespace
    async fn list_names(&self, kind: ResourceKind) -> MonitorResult<Vec<String>>;

    /// Data of a config map, `None` when it does not exist
    async fn config_map_data(&self, name: &str) -> MonitorResult<Option<BTreeMap<String, String>>>;

    async fn pod_states(&self) -> MonitorResult<Vec<PodState>>;
}
