use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use duck_core::engine::{
    DeploymentStatus, HealthState, K8sEngine, PodRecord, SteadyState, Topology, TopologyEdge,
    TopologyNode,
};

/// kube-rs implementation of the runtime's Kubernetes contract.
pub struct KubeEngine {
    client: Client,
}

impl KubeEngine {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(kubeconfig: Option<&str>) -> anyhow::Result<Self> {
        let client = crate::client::create_client(kubeconfig).await?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn pod_labels(pod: &Pod) -> BTreeMap<String, String> {
    pod.metadata.labels.clone().unwrap_or_default()
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

#[async_trait]
impl K8sEngine for KubeEngine {
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> anyhow::Result<Vec<PodRecord>> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        let pod_list = self.pods(namespace).list(&lp).await?;
        pod_list
            .items
            .into_iter()
            .map(|pod| {
                let name = pod.metadata.name.clone().unwrap_or_default();
                let manifest = serde_json::to_value(&pod)?;
                Ok(PodRecord { name, manifest })
            })
            .collect()
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        tracing::info!(pod = name, namespace, "pod deleted");
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, manifest: &Value) -> anyhow::Result<()> {
        let pod: Pod = serde_json::from_value(manifest.clone())?;
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods(namespace)
            .create(&PostParams::default(), &pod)
            .await?;
        tracing::info!(pod = %name, namespace, "pod created");
        Ok(())
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> anyhow::Result<String> {
        let params = AttachParams::default().stdout(true).stderr(true);
        let mut attached = self.pods(namespace).exec(pod, command.to_vec(), &params).await?;

        let status = attached.take_status();

        let mut stdout = String::new();
        if let Some(mut out) = attached.stdout() {
            out.read_to_string(&mut stdout).await?;
        }
        let mut stderr = String::new();
        if let Some(mut err) = attached.stderr() {
            err.read_to_string(&mut stderr).await?;
        }

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    anyhow::bail!(
                        "exec in {pod}: {} (stderr: {})",
                        status.message.unwrap_or_default(),
                        stderr.trim()
                    );
                }
            }
        }
        attached.join().await?;
        Ok(stdout)
    }

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<DeploymentStatus> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployments.get(name).await?;
        Ok(DeploymentStatus {
            spec_replicas: deployment
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(0),
            ready_replicas: deployment
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
        })
    }

    async fn pod_phase(&self, namespace: &str, name: &str) -> anyhow::Result<String> {
        let pod = self.pods(namespace).get(name).await?;
        Ok(pod
            .status
            .and_then(|s| s.phase)
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn steady_state(&self, namespace: &str) -> anyhow::Result<SteadyState> {
        let pod_list = self.pods(namespace).list(&ListParams::default()).await?;
        let total = pod_list.items.len();
        let running = pod_list.items.iter().filter(|p| is_running(p)).count();
        let ratio = if total > 0 {
            running as f64 / total as f64
        } else {
            1.0
        };
        Ok(SteadyState {
            namespace: namespace.to_string(),
            pods_total: total,
            pods_running: running,
            pods_healthy_ratio: ratio,
        })
    }

    async fn topology(&self, namespace: &str) -> anyhow::Result<Topology> {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        for deployment in deployments.list(&ListParams::default()).await?.items {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            let status = deployment.status.as_ref();
            let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
            let desired = status.and_then(|s| s.replicas).unwrap_or(0);
            nodes.push(TopologyNode {
                id: format!("deploy/{name}"),
                name,
                resource_type: "deployment".to_string(),
                namespace: Some(namespace.to_string()),
                labels: deployment.metadata.labels.clone().unwrap_or_default(),
                health: if ready == desired {
                    HealthState::Healthy
                } else {
                    HealthState::Degraded
                },
            });
        }

        // ReplicaSet ownership links pods back to their deployments.
        let replica_sets: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let mut rs_to_deployment: BTreeMap<String, String> = BTreeMap::new();
        for rs in replica_sets.list(&ListParams::default()).await?.items {
            let rs_name = rs.metadata.name.clone().unwrap_or_default();
            if let Some(owners) = &rs.metadata.owner_references {
                for owner in owners {
                    if owner.kind == "Deployment" {
                        rs_to_deployment.insert(rs_name.clone(), owner.name.clone());
                    }
                }
            }
        }

        for pod in self.pods(namespace).list(&ListParams::default()).await?.items {
            let name = pod.metadata.name.clone().unwrap_or_default();
            let pod_id = format!("pod/{name}");
            let health = match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
                Some("Running") => HealthState::Healthy,
                Some("Failed") => HealthState::Unhealthy,
                _ => HealthState::Unknown,
            };
            nodes.push(TopologyNode {
                id: pod_id.clone(),
                name,
                resource_type: "pod".to_string(),
                namespace: Some(namespace.to_string()),
                labels: pod_labels(&pod),
                health,
            });

            if let Some(owners) = &pod.metadata.owner_references {
                for owner in owners {
                    if owner.kind == "ReplicaSet" {
                        if let Some(deployment) = rs_to_deployment.get(&owner.name) {
                            edges.push(TopologyEdge {
                                source: format!("deploy/{deployment}"),
                                target: pod_id.clone(),
                                relation: "manages".to_string(),
                            });
                        }
                    }
                }
            }
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        for service in services.list(&ListParams::default()).await?.items {
            let name = service.metadata.name.clone().unwrap_or_default();
            nodes.push(TopologyNode {
                id: format!("svc/{name}"),
                name,
                resource_type: "service".to_string(),
                namespace: Some(namespace.to_string()),
                labels: service.metadata.labels.clone().unwrap_or_default(),
                health: HealthState::Healthy,
            });
        }

        Ok(Topology { nodes, edges })
    }
}
