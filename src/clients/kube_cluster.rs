//! Kubernetes adapter for [`ClusterApi`].

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::debug;

use super::cluster::{ClusterApi, ContainerState, PodState, ResourceKind};
use crate::error::MonitorResult;

/// Namespaced view of the cluster the platform runs in
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
}

impl std::fmt::Debug for KubeClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterApi")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl KubeClusterApi {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Use the in-cluster service account or the local kubeconfig
    pub async fn try_default(namespace: impl Into<String>) -> MonitorResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn names<K>(&self) -> MonitorResult<Vec<String>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let list = self.api::<K>().list(&ListParams::default()).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_names(&self, kind: ResourceKind) -> MonitorResult<Vec<String>> {
        let names = match kind {
            ResourceKind::Deployment => self.names::<Deployment>().await?,
            ResourceKind::Ingress => self.names::<Ingress>().await?,
            ResourceKind::Service => self.names::<Service>().await?,
            ResourceKind::StatefulSet => self.names::<StatefulSet>().await?,
            ResourceKind::PersistentVolumeClaim => self.names::<PersistentVolumeClaim>().await?,
        };
        debug!(kind = %kind, count = names.len(), namespace = %self.namespace, "Listed resources");
        Ok(names)
    }

    async fn config_map_data(&self, name: &str) -> MonitorResult<Option<BTreeMap<String, String>>> {
        let config_map = self.api::<ConfigMap>().get_opt(name).await?;
        Ok(config_map.map(|map| map.data.unwrap_or_default()))
    }

    async fn pod_states(&self) -> MonitorResult<Vec<PodState>> {
        let pods = self.api::<Pod>().list(&ListParams::default()).await?;
        Ok(pods.items.iter().map(pod_state).collect())
    }
}

fn pod_state(pod: &Pod) -> PodState {
    let containers = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|status| ContainerState {
                    name: status.name.clone(),
                    started: status.started.unwrap_or(false),
                    ready: status.ready,
                    terminated_reason: status
                        .state
                        .as_ref()
                        .and_then(|state| state.terminated.as_ref())
                        .and_then(|terminated| terminated.reason.clone()),
                })
                .collect()
        })
        .unwrap_or_default();

    PodState {
        name: pod.name_any(),
        containers,
    }
}
