use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{ChaosError, ChaosResult};
use crate::store::ExperimentStore;

const MAX_SNAPSHOTS: usize = 1000;

/// Pre-mutation state capture, keyed by experiment id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Snapshot {
    K8s {
        namespace: String,
        resources: Value,
        captured_at: DateTime<Utc>,
    },
    Aws {
        resource_type: String,
        resource_id: String,
        state: Value,
        captured_at: DateTime<Utc>,
    },
}

/// Drift detected between a snapshot and current state. Restore never
/// mutates infrastructure; it only reports.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DriftReport {
    pub experiment_id: String,
    pub actions: Vec<DriftAction>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DriftAction {
    PodMissing {
        name: String,
    },
    StateDrift {
        instance_id: String,
        snapshot_state: String,
        current_state: String,
    },
}

/// Bounded in-memory snapshot store with best-effort persistence.
///
/// Writers take the lock exclusively for the brief insert/evict window;
/// readers share it. At capacity a new capture evicts an arbitrary
/// existing entry: snapshots are recovery aids, not authority.
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    store: Option<Arc<dyn ExperimentStore>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_store(store: Arc<dyn ExperimentStore>) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            store: Some(store),
        }
    }

    pub async fn capture_k8s(
        &self,
        experiment_id: &str,
        namespace: &str,
        resources: Value,
    ) -> Snapshot {
        let snapshot = Snapshot::K8s {
            namespace: namespace.to_string(),
            resources,
            captured_at: Utc::now(),
        };
        self.insert(experiment_id, snapshot.clone()).await;
        snapshot
    }

    pub async fn capture_aws(
        &self,
        experiment_id: &str,
        resource_type: &str,
        resource_id: &str,
        state: Value,
    ) -> Snapshot {
        let snapshot = Snapshot::Aws {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            state,
            captured_at: Utc::now(),
        };
        self.insert(experiment_id, snapshot.clone()).await;
        snapshot
    }

    async fn insert(&self, experiment_id: &str, snapshot: Snapshot) {
        {
            let mut snapshots = self.snapshots.write().await;
            if snapshots.len() >= MAX_SNAPSHOTS && !snapshots.contains_key(experiment_id) {
                if let Some(victim) = snapshots.keys().next().cloned() {
                    tracing::warn!(evicted = %victim, "snapshot store at capacity");
                    snapshots.remove(&victim);
                }
            }
            snapshots.insert(experiment_id.to_string(), snapshot.clone());
        }

        // Persistence failures never fail the capture.
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let id = experiment_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = store.insert_snapshot(&id, &snapshot).await {
                    tracing::warn!(experiment_id = %id, error = %e, "snapshot persistence skipped");
                }
            });
        }
    }

    pub async fn get(&self, experiment_id: &str) -> Option<Snapshot> {
        self.snapshots.read().await.get(experiment_id).cloned()
    }

    pub async fn delete(&self, experiment_id: &str) {
        self.snapshots.write().await.remove(experiment_id);
    }

    pub async fn list(&self) -> HashMap<String, Snapshot> {
        self.snapshots.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }

    /// Diff the stored snapshot against caller-fetched current state.
    ///
    /// K8s snapshots compare pod-name sets and report pods that existed at
    /// capture time but are gone now. EC2 snapshots compare the instance
    /// state string.
    pub async fn restore_from_snapshot(
        &self,
        experiment_id: &str,
        current_state: &Value,
    ) -> ChaosResult<DriftReport> {
        let snapshot = self
            .get(experiment_id)
            .await
            .ok_or_else(|| ChaosError::SnapshotNotFound(experiment_id.to_string()))?;

        let actions = match &snapshot {
            Snapshot::K8s {
                namespace,
                resources,
                ..
            } => diff_k8s(namespace, resources, current_state),
            Snapshot::Aws {
                resource_type,
                resource_id,
                state,
                ..
            } => diff_aws(resource_type, resource_id, state, current_state),
        };

        Ok(DriftReport {
            experiment_id: experiment_id.to_string(),
            actions,
        })
    }
}

fn pod_names(state: &Value) -> HashSet<String> {
    state
        .get("pods")
        .and_then(Value::as_array)
        .map(|pods| {
            pods.iter()
                .filter_map(|p| p.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn diff_k8s(namespace: &str, resources: &Value, current: &Value) -> Vec<DriftAction> {
    let snapshot_pods = pod_names(resources);
    if snapshot_pods.is_empty() {
        return Vec::new();
    }
    let current_pods = pod_names(current);

    let mut missing: Vec<&String> = snapshot_pods.difference(&current_pods).collect();
    missing.sort();
    missing
        .into_iter()
        .map(|name| {
            tracing::info!(pod = %name, namespace, "pod from snapshot is missing");
            DriftAction::PodMissing { name: name.clone() }
        })
        .collect()
}

fn diff_aws(
    resource_type: &str,
    resource_id: &str,
    state: &Value,
    current: &Value,
) -> Vec<DriftAction> {
    if resource_type != "ec2" {
        return Vec::new();
    }
    let snapshot_state = state.get("state").and_then(Value::as_str).unwrap_or("");
    let current_state = current.get("state").and_then(Value::as_str).unwrap_or("");
    if snapshot_state.is_empty() || current_state.is_empty() || snapshot_state == current_state {
        return Vec::new();
    }
    vec![DriftAction::StateDrift {
        instance_id: resource_id.to_string(),
        snapshot_state: snapshot_state.to_string(),
        current_state: current_state.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn capture_get_delete_round_trip() {
        let store = SnapshotStore::new();
        let snap = store
            .capture_k8s("exp-1", "default", json!({"pods": [{"name": "web-0"}]}))
            .await;
        assert_eq!(store.get("exp-1").await.as_ref(), Some(&snap));
        assert_eq!(store.len().await, 1);

        store.delete("exp-1").await;
        assert!(store.get("exp-1").await.is_none());
    }

    #[tokio::test]
    async fn k8s_drift_reports_missing_pods() {
        let store = SnapshotStore::new();
        store
            .capture_k8s(
                "exp-1",
                "default",
                json!({"pods": [{"name": "web-0"}, {"name": "web-1"}, {"name": "web-2"}]}),
            )
            .await;

        let report = store
            .restore_from_snapshot("exp-1", &json!({"pods": [{"name": "web-1"}]}))
            .await
            .unwrap();
        assert_eq!(
            report.actions,
            vec![
                DriftAction::PodMissing {
                    name: "web-0".into()
                },
                DriftAction::PodMissing {
                    name: "web-2".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn aws_drift_reports_state_change() {
        let store = SnapshotStore::new();
        store
            .capture_aws("exp-2", "ec2", "i-0abc", json!({"state": "running"}))
            .await;

        let report = store
            .restore_from_snapshot("exp-2", &json!({"state": "stopped"}))
            .await
            .unwrap();
        assert_eq!(
            report.actions,
            vec![DriftAction::StateDrift {
                instance_id: "i-0abc".into(),
                snapshot_state: "running".into(),
                current_state: "stopped".into(),
            }]
        );

        let unchanged = store
            .restore_from_snapshot("exp-2", &json!({"state": "running"}))
            .await
            .unwrap();
        assert!(unchanged.actions.is_empty());
    }

    #[tokio::test]
    async fn restore_without_snapshot_errors() {
        let store = SnapshotStore::new();
        let err = store
            .restore_from_snapshot("ghost", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChaosError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn capacity_evicts_an_existing_entry() {
        let store = SnapshotStore::new();
        for i in 0..MAX_SNAPSHOTS {
            store
                .capture_aws(&format!("exp-{i}"), "ec2", "i-0", json!({"state": "running"}))
                .await;
        }
        assert_eq!(store.len().await, MAX_SNAPSHOTS);

        store
            .capture_aws("exp-overflow", "ec2", "i-0", json!({"state": "running"}))
            .await;
        assert_eq!(store.len().await, MAX_SNAPSHOTS);
        assert!(store.get("exp-overflow").await.is_some());
    }
}
