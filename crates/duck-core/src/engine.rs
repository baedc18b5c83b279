//! Collaborator contracts for the infrastructure engines. Concrete
//! implementations live in satellite crates; the runtime and its tests
//! only ever see these traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A pod as seen by the runtime: its name plus the full manifest needed
/// to recreate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub manifest: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub spec_replicas: i32,
    pub ready_replicas: i32,
}

/// Baseline readings for a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SteadyState {
    pub namespace: String,
    pub pods_total: usize,
    pub pods_running: usize,
    pub pods_healthy_ratio: f64,
}

impl SteadyState {
    pub fn to_value(&self) -> Value {
        json!({
            "namespace": self.namespace,
            "pods_total": self.pods_total,
            "pods_running": self.pods_running,
            "pods_healthy_ratio": self.pods_healthy_ratio,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub health: HealthState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

/// Kubernetes operations the runtime depends on.
#[async_trait]
pub trait K8sEngine: Send + Sync {
    /// Pods in a namespace, optionally filtered by a label selector.
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> anyhow::Result<Vec<PodRecord>>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()>;

    /// Create a pod from a previously captured manifest.
    async fn create_pod(&self, namespace: &str, manifest: &Value) -> anyhow::Result<()>;

    /// Run a command inside a pod's default container, returning stdout.
    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> anyhow::Result<String>;

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<DeploymentStatus>;

    async fn pod_phase(&self, namespace: &str, name: &str) -> anyhow::Result<String>;

    async fn steady_state(&self, namespace: &str) -> anyhow::Result<SteadyState>;

    async fn topology(&self, namespace: &str) -> anyhow::Result<Topology>;
}

/// AWS operations the runtime depends on.
#[async_trait]
pub trait AwsEngine: Send + Sync {
    async fn stop_instances(&self, instance_ids: &[String]) -> anyhow::Result<()>;

    async fn start_instances(&self, instance_ids: &[String]) -> anyhow::Result<()>;

    async fn instance_state(&self, instance_id: &str) -> anyhow::Result<String>;

    async fn failover_db_cluster(&self, cluster_id: &str) -> anyhow::Result<()>;

    /// Gateway currently routing the destination CIDR, if any route exists.
    async fn route_gateway(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
    ) -> anyhow::Result<Option<String>>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Replace an existing route with a blackhole for the CIDR.
    async fn replace_route_with_blackhole(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
    ) -> anyhow::Result<()>;

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str)
        -> anyhow::Result<()>;
}
