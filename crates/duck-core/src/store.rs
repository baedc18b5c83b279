use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::experiment::ExperimentResult;
use crate::safety::Snapshot;

/// AI analysis verdict persisted alongside experiments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub experiment_id: String,
    pub severity: String,
    pub root_cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resilience_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator. Failures are logged by callers and never
/// abort an experiment.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn upsert_experiment(&self, result: &ExperimentResult) -> anyhow::Result<()>;

    async fn insert_snapshot(
        &self,
        experiment_id: &str,
        snapshot: &Snapshot,
    ) -> anyhow::Result<()>;

    async fn insert_analysis(&self, record: &AnalysisRecord) -> anyhow::Result<()>;

    async fn get_experiment(&self, experiment_id: &str)
        -> anyhow::Result<Option<ExperimentResult>>;

    async fn list_experiments(&self) -> anyhow::Result<Vec<ExperimentResult>>;

    async fn list_analyses_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<AnalysisRecord>>;
}

#[derive(Default)]
struct MemoryInner {
    experiments: HashMap<String, ExperimentResult>,
    snapshots: Vec<(String, Snapshot)>,
    analyses: Vec<AnalysisRecord>,
}

/// In-process store for tests and store-less deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshots.len()
    }
}

#[async_trait]
impl ExperimentStore for MemoryStore {
    async fn upsert_experiment(&self, result: &ExperimentResult) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .experiments
            .insert(result.experiment_id.clone(), result.clone());
        Ok(())
    }

    async fn insert_snapshot(
        &self,
        experiment_id: &str,
        snapshot: &Snapshot,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .snapshots
            .push((experiment_id.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        inner.analyses.push(record.clone());
        Ok(())
    }

    async fn get_experiment(
        &self,
        experiment_id: &str,
    ) -> anyhow::Result<Option<ExperimentResult>> {
        let inner = self.inner.read().await;
        Ok(inner.experiments.get(experiment_id).cloned())
    }

    async fn list_experiments(&self) -> anyhow::Result<Vec<ExperimentResult>> {
        let inner = self.inner.read().await;
        Ok(inner.experiments.values().cloned().collect())
    }

    async fn list_analyses_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<AnalysisRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .analyses
            .iter()
            .filter(|a| a.created_at >= since)
            .filter(|a| namespace.is_none() || a.namespace.as_deref() == namespace)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentConfig;

    fn config() -> ExperimentConfig {
        serde_json::from_value(serde_json::json!({
            "name": "mem-store",
            "chaos_type": "pod_delete",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_overwrites_and_get_round_trips() {
        let store = MemoryStore::new();
        let mut result = ExperimentResult::new("exp-1", config());
        store.upsert_experiment(&result).await.unwrap();

        result.hypothesis = Some("pods reschedule within 30s".into());
        store.upsert_experiment(&result).await.unwrap();

        let fetched = store.get_experiment("exp-1").await.unwrap().unwrap();
        assert_eq!(
            fetched.hypothesis.as_deref(),
            Some("pods reschedule within 30s")
        );
        assert_eq!(store.list_experiments().await.unwrap().len(), 1);
        assert!(store.get_experiment("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analyses_filter_by_time_and_namespace() {
        let store = MemoryStore::new();
        let old = AnalysisRecord {
            experiment_id: "exp-1".into(),
            severity: "low".into(),
            root_cause: "pod churn".into(),
            confidence: 0.8,
            recommendations: vec![],
            resilience_score: Some(0.9),
            namespace: Some("default".into()),
            created_at: Utc::now() - chrono::Duration::hours(2),
        };
        let recent = AnalysisRecord {
            namespace: Some("payments".into()),
            created_at: Utc::now(),
            ..old.clone()
        };
        store.insert_analysis(&old).await.unwrap();
        store.insert_analysis(&recent).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let all = store.list_analyses_since(since, None).await.unwrap();
        assert_eq!(all.len(), 1);

        let by_ns = store
            .list_analyses_since(since, Some("default"))
            .await
            .unwrap();
        assert!(by_ns.is_empty());
    }
}
