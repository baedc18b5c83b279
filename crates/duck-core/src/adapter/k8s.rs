use std::sync::Arc;

use serde_json::{json, Value};

use crate::adapter::{ChaosOutcome, InjectFailure, InjectResult};
use crate::engine::{K8sEngine, PodRecord};
use crate::error::ChaosError;
use crate::safety::{validate_blast_radius, EmergencyStop, UndoFn};

/// Kubernetes fault injection. Each invocation is self-contained; the
/// adapter holds no cross-experiment state.
pub struct K8sAdapter {
    engine: Arc<dyn K8sEngine>,
    stop: Arc<EmergencyStop>,
}

impl K8sAdapter {
    pub fn new(engine: Arc<dyn K8sEngine>, stop: Arc<EmergencyStop>) -> Self {
        Self { engine, stop }
    }

    /// Delete every pod matching the selector, saving each manifest so the
    /// undo can recreate them. Admission-checked against the namespace's
    /// total pod count.
    pub async fn pod_delete(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        max_blast_radius: f64,
        dry_run: bool,
    ) -> InjectResult {
        self.stop.check()?;

        let matched = self
            .engine
            .list_pods(namespace, label_selector)
            .await
            .map_err(|e| ChaosError::adapter("list pods", e))?;
        let all = self
            .engine
            .list_pods(namespace, None)
            .await
            .map_err(|e| ChaosError::adapter("list all pods", e))?;

        validate_blast_radius(matched.len(), all.len(), max_blast_radius)?;

        let pod_names: Vec<String> = matched.iter().map(|p| p.name.clone()).collect();
        if dry_run {
            return Ok(ChaosOutcome::plan(json!({
                "action": "pod_delete",
                "pods": pod_names,
                "dry_run": true,
            })));
        }

        let mut deleted: Vec<PodRecord> = Vec::with_capacity(matched.len());
        for pod in matched {
            if let Err(e) = self.engine.delete_pod(namespace, &pod.name).await {
                tracing::error!(
                    pod = %pod.name,
                    deleted = deleted.len(),
                    error = %e,
                    "pod delete failed part-way"
                );
                let error = ChaosError::adapter(format!("delete pod {}", pod.name), e);
                let partial = if deleted.is_empty() {
                    None
                } else {
                    let names: Vec<String> = deleted.iter().map(|p| p.name.clone()).collect();
                    let effect = json!({
                        "action": "pod_delete",
                        "pods": names,
                        "partial_failure": pod.name,
                    });
                    let undo = recreate_pods_undo(
                        Arc::clone(&self.engine),
                        namespace.to_string(),
                        deleted,
                    );
                    Some(ChaosOutcome::with_undo(effect, undo))
                };
                return Err(InjectFailure { error, partial });
            }
            deleted.push(pod);
        }
        tracing::info!(count = deleted.len(), namespace, "pods deleted");

        let effect = json!({ "action": "pod_delete", "pods": pod_names });
        let undo = recreate_pods_undo(Arc::clone(&self.engine), namespace.to_string(), deleted);
        Ok(ChaosOutcome::with_undo(effect, undo))
    }

    pub async fn network_latency(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        latency_ms: i64,
        dry_run: bool,
    ) -> InjectResult {
        let netem = vec!["delay".to_string(), format!("{latency_ms}ms")];
        let extra = json!({ "latency_ms": latency_ms });
        self.netem_inject(
            namespace,
            label_selector,
            "network_latency",
            netem,
            extra,
            dry_run,
        )
        .await
    }

    pub async fn network_loss(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        loss_percent: i64,
        dry_run: bool,
    ) -> InjectResult {
        let netem = vec!["loss".to_string(), format!("{loss_percent}%")];
        let extra = json!({ "loss_percent": loss_percent });
        self.netem_inject(
            namespace,
            label_selector,
            "network_loss",
            netem,
            extra,
            dry_run,
        )
        .await
    }

    /// Shared tc/netem path: add a qdisc on every matched pod's default
    /// interface; the undo removes it again.
    async fn netem_inject(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        action: &str,
        netem_args: Vec<String>,
        extra: Value,
        dry_run: bool,
    ) -> InjectResult {
        self.stop.check()?;

        let pods = self
            .engine
            .list_pods(namespace, label_selector)
            .await
            .map_err(|e| ChaosError::adapter("list pods", e))?;
        let pod_names: Vec<String> = pods.iter().map(|p| p.name.clone()).collect();

        let mut effect = json!({ "action": action, "pods": pod_names.clone() });
        merge_into(&mut effect, &extra);
        if dry_run {
            effect["dry_run"] = json!(true);
            return Ok(ChaosOutcome::plan(effect));
        }

        let mut add_cmd = vec![
            "tc".to_string(),
            "qdisc".to_string(),
            "add".to_string(),
            "dev".to_string(),
            "eth0".to_string(),
            "root".to_string(),
            "netem".to_string(),
        ];
        add_cmd.extend(netem_args);

        let mut injected: Vec<String> = Vec::with_capacity(pod_names.len());
        for name in &pod_names {
            if let Err(e) = self.engine.exec_in_pod(namespace, name, &add_cmd).await {
                let error = ChaosError::adapter(format!("inject {action} on {name}"), e);
                let partial = if injected.is_empty() {
                    None
                } else {
                    let mut partial_effect = json!({
                        "action": action,
                        "pods": injected.clone(),
                        "partial_failure": name,
                    });
                    merge_into(&mut partial_effect, &extra);
                    let undo = remove_qdisc_undo(
                        Arc::clone(&self.engine),
                        namespace.to_string(),
                        injected,
                        action.to_string(),
                    );
                    Some(ChaosOutcome::with_undo(partial_effect, undo))
                };
                return Err(InjectFailure { error, partial });
            }
            injected.push(name.clone());
        }
        tracing::info!(action, pods = injected.len(), namespace, "netem qdisc added");

        let undo = remove_qdisc_undo(
            Arc::clone(&self.engine),
            namespace.to_string(),
            injected,
            action.to_string(),
        );
        Ok(ChaosOutcome::with_undo(effect, undo))
    }

    pub async fn cpu_stress(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cores: i64,
        duration_secs: u64,
        dry_run: bool,
    ) -> InjectResult {
        let cmd = vec![
            "stress-ng".to_string(),
            "--cpu".to_string(),
            cores.to_string(),
            "--timeout".to_string(),
            format!("{duration_secs}s"),
            "--quiet".to_string(),
        ];
        let extra = json!({ "cores": cores });
        self.stress_inject(namespace, label_selector, "cpu_stress", cmd, extra, dry_run)
            .await
    }

    pub async fn memory_stress(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        memory_bytes: &str,
        duration_secs: u64,
        dry_run: bool,
    ) -> InjectResult {
        let cmd = vec![
            "stress-ng".to_string(),
            "--vm".to_string(),
            "1".to_string(),
            "--vm-bytes".to_string(),
            memory_bytes.to_string(),
            "--timeout".to_string(),
            format!("{duration_secs}s"),
            "--quiet".to_string(),
        ];
        let extra = json!({ "memory_bytes": memory_bytes });
        self.stress_inject(
            namespace,
            label_selector,
            "memory_stress",
            cmd,
            extra,
            dry_run,
        )
        .await
    }

    /// Shared stress-ng path; the undo pkills stress-ng in every pod that
    /// was successfully targeted.
    async fn stress_inject(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        action: &str,
        stress_cmd: Vec<String>,
        extra: Value,
        dry_run: bool,
    ) -> InjectResult {
        self.stop.check()?;

        let pods = self
            .engine
            .list_pods(namespace, label_selector)
            .await
            .map_err(|e| ChaosError::adapter("list pods", e))?;
        let pod_names: Vec<String> = pods.iter().map(|p| p.name.clone()).collect();

        let mut effect = json!({ "action": action, "pods": pod_names.clone() });
        merge_into(&mut effect, &extra);
        if dry_run {
            effect["dry_run"] = json!(true);
            return Ok(ChaosOutcome::plan(effect));
        }

        let mut stressed: Vec<String> = Vec::with_capacity(pod_names.len());
        for name in &pod_names {
            if let Err(e) = self.engine.exec_in_pod(namespace, name, &stress_cmd).await {
                let error = ChaosError::adapter(format!("{action} on {name}"), e);
                let partial = if stressed.is_empty() {
                    None
                } else {
                    let mut partial_effect = json!({
                        "action": action,
                        "pods": stressed.clone(),
                        "partial_failure": name,
                    });
                    merge_into(&mut partial_effect, &extra);
                    let undo = kill_stress_undo(
                        Arc::clone(&self.engine),
                        namespace.to_string(),
                        stressed,
                    );
                    Some(ChaosOutcome::with_undo(partial_effect, undo))
                };
                return Err(InjectFailure { error, partial });
            }
            stressed.push(name.clone());
        }
        tracing::info!(action, pods = stressed.len(), namespace, "stress-ng started");

        let undo = kill_stress_undo(Arc::clone(&self.engine), namespace.to_string(), stressed);
        Ok(ChaosOutcome::with_undo(effect, undo))
    }
}

fn merge_into(effect: &mut Value, extra: &Value) {
    if let (Some(target), Some(source)) = (effect.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
}

/// Strip server-populated fields so a saved manifest can be re-created.
fn sanitize_pod_manifest(manifest: &mut Value) {
    if let Some(metadata) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("resourceVersion");
        metadata.remove("uid");
        metadata.remove("creationTimestamp");
    }
    if let Some(obj) = manifest.as_object_mut() {
        obj.remove("status");
    }
}

fn recreate_pods_undo(
    engine: Arc<dyn K8sEngine>,
    namespace: String,
    deleted: Vec<PodRecord>,
) -> UndoFn {
    Box::new(move || {
        Box::pin(async move {
            let mut recreated = 0usize;
            for mut pod in deleted {
                sanitize_pod_manifest(&mut pod.manifest);
                match engine.create_pod(&namespace, &pod.manifest).await {
                    Ok(()) => recreated += 1,
                    Err(e) => {
                        tracing::error!(pod = %pod.name, error = %e, "pod recreate failed");
                    }
                }
            }
            tracing::info!(recreated, namespace = %namespace, "pods recreated");
            Ok(json!({ "recreated": recreated }))
        })
    })
}

fn remove_qdisc_undo(
    engine: Arc<dyn K8sEngine>,
    namespace: String,
    pods: Vec<String>,
    action: String,
) -> UndoFn {
    Box::new(move || {
        Box::pin(async move {
            let del_cmd: Vec<String> = ["tc", "qdisc", "del", "dev", "eth0", "root"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut removed = 0usize;
            for pod in &pods {
                match engine.exec_in_pod(&namespace, pod, &del_cmd).await {
                    Ok(_) => removed += 1,
                    Err(e) => {
                        tracing::error!(pod = %pod, error = %e, "qdisc removal failed");
                    }
                }
            }
            tracing::info!(action = %action, removed, namespace = %namespace, "netem qdisc removed");
            Ok(json!({ "removed_qdisc": removed }))
        })
    })
}

fn kill_stress_undo(engine: Arc<dyn K8sEngine>, namespace: String, pods: Vec<String>) -> UndoFn {
    Box::new(move || {
        Box::pin(async move {
            let kill_cmd: Vec<String> = ["pkill", "-f", "stress-ng"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut killed = 0usize;
            for pod in &pods {
                match engine.exec_in_pod(&namespace, pod, &kill_cmd).await {
                    Ok(_) => killed += 1,
                    Err(e) => {
                        tracing::error!(pod = %pod, error = %e, "stress-ng kill failed");
                    }
                }
            }
            tracing::info!(killed, namespace = %namespace, "stress-ng stopped");
            Ok(json!({ "killed_stress": killed }))
        })
    })
}
