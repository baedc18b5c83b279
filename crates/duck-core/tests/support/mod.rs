#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use duck_core::engine::{
    AwsEngine, DeploymentStatus, K8sEngine, PodRecord, SteadyState, Topology,
};
use serde_json::{json, Value};

#[derive(Clone)]
pub struct MockPod {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

pub fn pod(name: &str, labels: &[(&str, &str)]) -> MockPod {
    MockPod {
        name: name.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// `count` pods labelled `app=<app>` named `<app>-0..`.
pub fn pods_for_app(app: &str, count: usize) -> Vec<MockPod> {
    (0..count)
        .map(|i| pod(&format!("{app}-{i}"), &[("app", app)]))
        .collect()
}

#[derive(Default)]
pub struct K8sCalls {
    pub deleted: Vec<String>,
    pub created: Vec<Value>,
    pub execs: Vec<(String, Vec<String>)>,
    pub list_calls: usize,
}

pub struct MockK8s {
    pods: Mutex<Vec<MockPod>>,
    pub calls: Mutex<K8sCalls>,
    pub fail_delete_on: Option<String>,
    pub fail_exec_on: Option<String>,
    pub steady_delay: Option<Duration>,
    pub deployments: Mutex<HashMap<String, DeploymentStatus>>,
    pub pod_phases: Mutex<HashMap<String, String>>,
}

impl MockK8s {
    pub fn new(pods: Vec<MockPod>) -> Self {
        Self {
            pods: Mutex::new(pods),
            calls: Mutex::new(K8sCalls::default()),
            fail_delete_on: None,
            fail_exec_on: None,
            steady_delay: None,
            deployments: Mutex::new(HashMap::new()),
            pod_phases: Mutex::new(HashMap::new()),
        }
    }
}

fn selector_matches(labels: &BTreeMap<String, String>, selector: Option<&str>) -> bool {
    match selector {
        None | Some("") => true,
        Some(sel) => sel.split(',').all(|pair| match pair.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => false,
        }),
    }
}

#[async_trait]
impl K8sEngine for MockK8s {
    async fn list_pods(
        &self,
        _namespace: &str,
        label_selector: Option<&str>,
    ) -> anyhow::Result<Vec<PodRecord>> {
        self.calls.lock().unwrap().list_calls += 1;
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|p| selector_matches(&p.labels, label_selector))
            .map(|p| PodRecord {
                name: p.name.clone(),
                manifest: json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": p.name,
                        "labels": p.labels,
                        "resourceVersion": "8080",
                        "uid": "11111111-2222-3333-4444-555555555555",
                    },
                    "spec": {"containers": [{"name": "main", "image": "busybox"}]},
                    "status": {"phase": "Running"},
                }),
            })
            .collect())
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> anyhow::Result<()> {
        if self.fail_delete_on.as_deref() == Some(name) {
            anyhow::bail!("pod {name} is protected by the apiserver");
        }
        self.calls.lock().unwrap().deleted.push(name.to_string());
        self.pods.lock().unwrap().retain(|p| p.name != name);
        Ok(())
    }

    async fn create_pod(&self, _namespace: &str, manifest: &Value) -> anyhow::Result<()> {
        self.calls.lock().unwrap().created.push(manifest.clone());
        Ok(())
    }

    async fn exec_in_pod(
        &self,
        _namespace: &str,
        pod: &str,
        command: &[String],
    ) -> anyhow::Result<String> {
        if self.fail_exec_on.as_deref() == Some(pod) {
            anyhow::bail!("exec refused in {pod}");
        }
        self.calls
            .lock()
            .unwrap()
            .execs
            .push((pod.to_string(), command.to_vec()));
        Ok(String::new())
    }

    async fn deployment_status(
        &self,
        _namespace: &str,
        name: &str,
    ) -> anyhow::Result<DeploymentStatus> {
        self.deployments
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("deployment {name} not found"))
    }

    async fn pod_phase(&self, _namespace: &str, name: &str) -> anyhow::Result<String> {
        self.pod_phases
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("pod {name} not found"))
    }

    async fn steady_state(&self, namespace: &str) -> anyhow::Result<SteadyState> {
        if let Some(delay) = self.steady_delay {
            tokio::time::sleep(delay).await;
        }
        let total = self.pods.lock().unwrap().len();
        Ok(SteadyState {
            namespace: namespace.to_string(),
            pods_total: total,
            pods_running: total,
            pods_healthy_ratio: 1.0,
        })
    }

    async fn topology(&self, _namespace: &str) -> anyhow::Result<Topology> {
        Ok(Topology::default())
    }
}

#[derive(Default)]
pub struct AwsCalls {
    pub stopped: Vec<Vec<String>>,
    pub started: Vec<Vec<String>>,
    pub failovers: Vec<String>,
    pub created_routes: Vec<(String, String, Option<String>)>,
    pub replaced_routes: Vec<(String, String)>,
    pub deleted_routes: Vec<(String, String)>,
}

pub struct MockAws {
    pub calls: Mutex<AwsCalls>,
    pub existing_gateway: Option<String>,
    pub fail_stop: bool,
}

impl MockAws {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(AwsCalls::default()),
            existing_gateway: None,
            fail_stop: false,
        }
    }
}

#[async_trait]
impl AwsEngine for MockAws {
    async fn stop_instances(&self, instance_ids: &[String]) -> anyhow::Result<()> {
        if self.fail_stop {
            anyhow::bail!("ec2 stop throttled");
        }
        self.calls.lock().unwrap().stopped.push(instance_ids.to_vec());
        Ok(())
    }

    async fn start_instances(&self, instance_ids: &[String]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().started.push(instance_ids.to_vec());
        Ok(())
    }

    async fn instance_state(&self, _instance_id: &str) -> anyhow::Result<String> {
        Ok("running".to_string())
    }

    async fn failover_db_cluster(&self, cluster_id: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .failovers
            .push(cluster_id.to_string());
        Ok(())
    }

    async fn route_gateway(
        &self,
        _route_table_id: &str,
        _destination_cidr: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(self.existing_gateway.clone())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: Option<&str>,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().created_routes.push((
            route_table_id.to_string(),
            destination_cidr.to_string(),
            gateway_id.map(str::to_string),
        ));
        Ok(())
    }

    async fn replace_route_with_blackhole(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .replaced_routes
            .push((route_table_id.to_string(), destination_cidr.to_string()));
        Ok(())
    }

    async fn delete_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .deleted_routes
            .push((route_table_id.to_string(), destination_cidr.to_string()));
        Ok(())
    }
}
