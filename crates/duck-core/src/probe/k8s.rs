use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::engine::K8sEngine;
use crate::error::{ChaosError, ChaosResult};
use crate::probe::{Probe, ProbeKind, ProbeMode, ProbeResult};

/// Checks Kubernetes resource state: deployment readiness or pod phase.
pub struct K8sProbe {
    name: String,
    mode: ProbeMode,
    engine: Arc<dyn K8sEngine>,
    namespace: String,
    resource_kind: String,
    resource_name: String,
    expected_value: Option<String>,
}

pub struct K8sProbeConfig {
    pub name: String,
    pub mode: ProbeMode,
    pub engine: Arc<dyn K8sEngine>,
    pub namespace: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub expected_value: Option<String>,
}

impl K8sProbe {
    pub fn new(cfg: K8sProbeConfig) -> Self {
        let namespace = if cfg.namespace.is_empty() {
            "default".to_string()
        } else {
            cfg.namespace
        };
        Self {
            name: cfg.name,
            mode: cfg.mode,
            engine: cfg.engine,
            namespace,
            resource_kind: cfg.resource_kind,
            resource_name: cfg.resource_name,
            expected_value: cfg.expected_value.filter(|v| !v.is_empty()),
        }
    }

    async fn check_deployment(&self) -> ChaosResult<ProbeResult> {
        let status = self
            .engine
            .deployment_status(&self.namespace, &self.resource_name)
            .await
            .map_err(|e| ChaosError::adapter(format!("get deployment {}", self.resource_name), e))?;

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeKind::K8s,
            mode: self.mode,
            passed: status.ready_replicas == status.spec_replicas,
            detail: json!({
                "deployment": self.resource_name,
                "namespace": self.namespace,
                "desired_replicas": status.spec_replicas,
                "ready_replicas": status.ready_replicas,
            }),
            error: None,
            executed_at: Utc::now(),
        })
    }

    async fn check_pod(&self) -> ChaosResult<ProbeResult> {
        let phase = self
            .engine
            .pod_phase(&self.namespace, &self.resource_name)
            .await
            .map_err(|e| ChaosError::adapter(format!("get pod {}", self.resource_name), e))?;
        let expected = self.expected_value.as_deref().unwrap_or("Running");

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeKind::K8s,
            mode: self.mode,
            passed: phase == expected,
            detail: json!({
                "pod": self.resource_name,
                "namespace": self.namespace,
                "phase": phase,
                "expected_phase": expected,
            }),
            error: None,
            executed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Probe for K8sProbe {
    async fn execute(&self) -> ChaosResult<ProbeResult> {
        match self.resource_kind.as_str() {
            "deployment" => self.check_deployment().await,
            "pod" => self.check_pod().await,
            other => Err(ChaosError::Config(format!(
                "unsupported resource kind: {other}"
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> ProbeKind {
        ProbeKind::K8s
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value;

    use crate::engine::{DeploymentStatus, PodRecord, SteadyState, Topology};
    use crate::probe::safe_execute;

    #[derive(Default)]
    struct StubEngine {
        deployments: Mutex<HashMap<String, DeploymentStatus>>,
        pod_phases: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl K8sEngine for StubEngine {
        async fn list_pods(
            &self,
            _namespace: &str,
            _label_selector: Option<&str>,
        ) -> anyhow::Result<Vec<PodRecord>> {
            Ok(Vec::new())
        }

        async fn delete_pod(&self, _namespace: &str, _name: &str) -> anyhow::Result<()> {
            anyhow::bail!("not supported by stub")
        }

        async fn create_pod(&self, _namespace: &str, _manifest: &Value) -> anyhow::Result<()> {
            anyhow::bail!("not supported by stub")
        }

        async fn exec_in_pod(
            &self,
            _namespace: &str,
            _pod: &str,
            _command: &[String],
        ) -> anyhow::Result<String> {
            anyhow::bail!("not supported by stub")
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
            Ok(SteadyState {
                namespace: namespace.to_string(),
                pods_total: 0,
                pods_running: 0,
                pods_healthy_ratio: 1.0,
            })
        }

        async fn topology(&self, _namespace: &str) -> anyhow::Result<Topology> {
            Ok(Topology::default())
        }
    }

    fn probe_for(
        engine: Arc<StubEngine>,
        resource_kind: &str,
        resource_name: &str,
        expected_value: Option<&str>,
    ) -> K8sProbe {
        K8sProbe::new(K8sProbeConfig {
            name: "resource-check".into(),
            mode: ProbeMode::Sot,
            engine,
            namespace: String::new(),
            resource_kind: resource_kind.into(),
            resource_name: resource_name.into(),
            expected_value: expected_value.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn deployment_passes_only_when_ready_matches_spec() {
        let engine = Arc::new(StubEngine::default());
        engine.deployments.lock().unwrap().insert(
            "web".to_string(),
            DeploymentStatus {
                spec_replicas: 3,
                ready_replicas: 3,
            },
        );

        let probe = probe_for(Arc::clone(&engine), "deployment", "web", None);
        let result = probe.execute().await.unwrap();
        assert!(result.passed);
        assert_eq!(result.detail["desired_replicas"], 3);
        assert_eq!(result.detail["ready_replicas"], 3);
        // Empty namespace falls back to "default".
        assert_eq!(result.detail["namespace"], "default");

        engine.deployments.lock().unwrap().insert(
            "web".to_string(),
            DeploymentStatus {
                spec_replicas: 3,
                ready_replicas: 2,
            },
        );
        let result = probe.execute().await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.detail["ready_replicas"], 2);
    }

    #[tokio::test]
    async fn pod_phase_is_compared_against_expected() {
        let engine = Arc::new(StubEngine::default());
        engine
            .pod_phases
            .lock()
            .unwrap()
            .insert("web-0".to_string(), "Running".to_string());

        // Default expectation is Running.
        let probe = probe_for(Arc::clone(&engine), "pod", "web-0", None);
        let result = probe.execute().await.unwrap();
        assert!(result.passed);
        assert_eq!(result.detail["phase"], "Running");
        assert_eq!(result.detail["expected_phase"], "Running");

        let probe = probe_for(Arc::clone(&engine), "pod", "web-0", Some("Pending"));
        let result = probe.execute().await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.detail["expected_phase"], "Pending");
    }

    #[tokio::test]
    async fn engine_errors_surface_through_safe_execute() {
        let engine = Arc::new(StubEngine::default());
        let probe = probe_for(engine, "deployment", "missing", None);

        let result = safe_execute(&probe).await;
        assert!(!result.passed);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("deployment missing not found"));
    }

    #[tokio::test]
    async fn unsupported_resource_kind_is_a_config_error() {
        let engine = Arc::new(StubEngine::default());
        let probe = probe_for(engine, "service", "web", None);

        let err = probe.execute().await.unwrap_err();
        assert!(matches!(err, ChaosError::Config(_)));
        assert!(err.to_string().contains("unsupported resource kind"));

        let result = safe_execute(&probe).await;
        assert!(!result.passed);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("unsupported resource kind: service"));
    }
}
