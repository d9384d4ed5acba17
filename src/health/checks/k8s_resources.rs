//! # Kubernetes Resource Check
//!
//! Compares the cluster against the installer's expectations. Pods with a container that is
//! neither running-and-ready nor completed raise `WARN`. The status checks config map lists
//! the expected names per workload kind as YAML sequences; a missing map is a `WARN`, while
//! a missing or unparseable list, or an expected resource that does not exist, is an `ERROR`.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::clients::{ClusterApi, PodState, ResourceKind};
use crate::config::ChecksConfig;
use crate::error::CheckError;
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder, Severity};

const DESCRIPTION: &str = "Kubernetes Resource Check";

pub struct K8sResourcesCheck {
    cluster: Arc<dyn ClusterApi>,
    config_map: String,
}

impl K8sResourcesCheck {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: &ChecksConfig) -> Self {
        Self {
            cluster,
            config_map: config.status_checks_config_map.clone(),
        }
    }

    fn check_pods(pods: &[PodState], builder: &mut ResultBuilder) {
        let bad: Vec<&PodState> = pods.iter().filter(|pod| !pod.is_healthy()).collect();
        if bad.is_empty() {
            return;
        }

        builder.severity(Severity::Warn).add_header("Pods with issues");
        for pod in &bad {
            builder.add_line(format!("- {}", pod.name));
        }
        builder.add_header("Recommendation").add_line("Check the logs:");
        for pod in &bad {
            builder.add_line(format!("\t$ kubectl logs {}", pod.name));
        }
    }

    async fn check_missing_resources(&self, builder: &mut ResultBuilder) -> Result<(), CheckError> {
        let Some(expectations) = self.cluster.config_map_data(&self.config_map).await? else {
            builder
                .severity(Severity::Warn)
                .add_header(format!("Missing the {} ConfigMap", self.config_map));
            add_installer_hint(builder);
            return Ok(());
        };

        let mut any_missing = false;
        for kind in ResourceKind::ALL {
            let expected = match expected_names(&expectations, kind) {
                Ok(expected) => expected,
                Err(header) => {
                    builder.severity(Severity::Error).add_header(header);
                    any_missing = true;
                    continue;
                }
            };

            let actual: BTreeSet<String> =
                self.cluster.list_names(kind).await?.into_iter().collect();
            let missing: Vec<&String> = expected.difference(&actual).collect();
            if !missing.is_empty() {
                builder
                    .severity(Severity::Error)
                    .add_header(format!("Missing {}", kind.plural()));
                for name in missing {
                    builder.add_line(format!("- {name}"));
                }
                any_missing = true;
            }
        }

        if any_missing {
            builder.add_header("Recommendation");
            add_installer_hint(builder);
        }
        Ok(())
    }
}

fn add_installer_hint(builder: &mut ResultBuilder) {
    builder
        .add_line("Run the installer:")
        .add_line("\t$ deltafi install");
}

/// Expected names for `kind`, or the header describing why they are unavailable
fn expected_names(
    expectations: &BTreeMap<String, String>,
    kind: ResourceKind,
) -> Result<BTreeSet<String>, String> {
    let yaml = expectations
        .get(kind.as_str())
        .ok_or_else(|| format!("Missing expected list for {kind}"))?;
    let names: Option<BTreeSet<String>> = serde_yaml::from_str(yaml)
        .map_err(|_| format!("Invalid expected list for {kind}"))?;
    // an empty value parses as null
    Ok(names.unwrap_or_default())
}

#[async_trait]
impl StatusCheck for K8sResourcesCheck {
    type State = ();

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        let mut builder = ResultBuilder::new();
        let pods = self.cluster.pod_states().await?;
        Self::check_pods(&pods, &mut builder);
        self.check_missing_resources(&mut builder).await?;
        Ok((builder.build(DESCRIPTION), ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ContainerState;
    use crate::test_helpers::ScriptedClusterApi;

    fn full_expectations() -> BTreeMap<String, String> {
        ResourceKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), "[]".to_string()))
            .collect()
    }

    fn pod(name: &str, ready: bool) -> PodState {
        PodState {
            name: name.to_string(),
            containers: vec![ContainerState {
                name: "main".to_string(),
                started: true,
                ready,
                terminated_reason: None,
            }],
        }
    }

    async fn run(cluster: ScriptedClusterApi) -> CheckResult {
        let check = K8sResourcesCheck::new(Arc::new(cluster), &ChecksConfig::default());
        check.run(()).await.unwrap().0
    }

    #[tokio::test]
    async fn test_everything_present() {
        let cluster = ScriptedClusterApi::new();
        let mut expectations = full_expectations();
        expectations.insert("Deployment".to_string(), "- core\n- egress\n".to_string());
        cluster.set_config_map("deltafi-status-checks", expectations);
        cluster.set_names(ResourceKind::Deployment, &["core", "egress", "extra"]);
        cluster.set_pods(vec![pod("core-1", true)]);

        let result = run(cluster).await;
        assert_eq!(result.severity(), Severity::Ok);
        assert!(result.message_lines().is_empty());
    }

    #[tokio::test]
    async fn test_bad_pod_warns() {
        let cluster = ScriptedClusterApi::new();
        cluster.set_config_map("deltafi-status-checks", full_expectations());
        cluster.set_pods(vec![pod("core-1", true), pod("egress-1", false)]);

        let result = run(cluster).await;
        assert_eq!(result.severity(), Severity::Warn);
        assert!(result.message_lines().contains(&"- egress-1".to_string()));
        assert!(result
            .message_lines()
            .contains(&"\t$ kubectl logs egress-1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_config_map_warns() {
        let result = run(ScriptedClusterApi::new()).await;
        assert_eq!(result.severity(), Severity::Warn);
        assert_eq!(
            result.message_lines()[0],
            "##### Missing the deltafi-status-checks ConfigMap"
        );
        assert!(result.message_lines().contains(&"\t$ deltafi install".to_string()));
    }

    #[tokio::test]
    async fn test_missing_resource_is_error() {
        let cluster = ScriptedClusterApi::new();
        let mut expectations = full_expectations();
        expectations.insert("Service".to_string(), "[core-service, ui-service]".to_string());
        cluster.set_config_map("deltafi-status-checks", expectations);
        cluster.set_names(ResourceKind::Service, &["core-service"]);

        let result = run(cluster).await;
        assert_eq!(result.severity(), Severity::Error);
        assert!(result.message_lines().contains(&"##### Missing Services".to_string()));
        assert!(result.message_lines().contains(&"- ui-service".to_string()));
        assert!(result.message_lines().contains(&"##### Recommendation".to_string()));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_lists_are_errors() {
        let cluster = ScriptedClusterApi::new();
        let mut expectations = full_expectations();
        expectations.remove("Ingress");
        expectations.insert("StatefulSet".to_string(), "{not: [a list".to_string());
        cluster.set_config_map("deltafi-status-checks", expectations);

        let result = run(cluster).await;
        assert_eq!(result.severity(), Severity::Error);
        assert!(result
            .message_lines()
            .contains(&"##### Missing expected list for Ingress".to_string()));
        assert!(result
            .message_lines()
            .contains(&"##### Invalid expected list for StatefulSet".to_string()));
    }

    #[tokio::test]
    async fn test_cluster_failure_fails_the_check() {
        let cluster = ScriptedClusterApi::new();
        cluster.set_failing(true);
        let check = K8sResourcesCheck::new(Arc::new(cluster), &ChecksConfig::default());
        assert!(check.run(()).await.is_err());
    }
}
