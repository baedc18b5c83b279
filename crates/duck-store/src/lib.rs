//! Postgres-backed persistence for experiments, snapshots, and analysis
//! results. The runtime treats every operation here as best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use duck_core::experiment::ExperimentResult;
use duck_core::safety::Snapshot;
use duck_core::store::{AnalysisRecord, ExperimentStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables when they do not exist yet.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS experiments (
                id           TEXT PRIMARY KEY,
                status       TEXT NOT NULL,
                phase        TEXT NOT NULL,
                started_at   TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                data         JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id            BIGSERIAL PRIMARY KEY,
                experiment_id TEXT NOT NULL,
                data          JSONB NOT NULL,
                captured_at   TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_results (
                id               BIGSERIAL PRIMARY KEY,
                experiment_id    TEXT NOT NULL,
                severity         TEXT NOT NULL,
                root_cause       TEXT NOT NULL,
                confidence       DOUBLE PRECISION NOT NULL,
                recommendations  JSONB NOT NULL,
                resilience_score DOUBLE PRECISION,
                namespace        TEXT,
                created_at       TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ExperimentStore for PostgresStore {
    async fn upsert_experiment(&self, result: &ExperimentResult) -> anyhow::Result<()> {
        let data = serde_json::to_value(result)?;
        sqlx::query(
            r#"
            INSERT INTO experiments (id, status, phase, started_at, completed_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                phase = EXCLUDED.phase,
                completed_at = EXCLUDED.completed_at,
                data = EXCLUDED.data
            "#,
        )
        .bind(&result.experiment_id)
        .bind(result.status.as_str())
        .bind(result.phase.as_str())
        .bind(result.started_at)
        .bind(result.completed_at)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_snapshot(
        &self,
        experiment_id: &str,
        snapshot: &Snapshot,
    ) -> anyhow::Result<()> {
        let data = serde_json::to_value(snapshot)?;
        sqlx::query("INSERT INTO snapshots (experiment_id, data) VALUES ($1, $2)")
            .bind(experiment_id)
            .bind(&data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        let recommendations = serde_json::to_value(&record.recommendations)?;
        sqlx::query(
            r#"
            INSERT INTO analysis_results
                (experiment_id, severity, root_cause, confidence,
                 recommendations, resilience_score, namespace, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.experiment_id)
        .bind(&record.severity)
        .bind(&record.root_cause)
        .bind(record.confidence)
        .bind(&recommendations)
        .bind(record.resilience_score)
        .bind(&record.namespace)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_experiment(
        &self,
        experiment_id: &str,
    ) -> anyhow::Result<Option<ExperimentResult>> {
        let row = sqlx::query("SELECT data FROM experiments WHERE id = $1")
            .bind(experiment_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: Value = row.try_get("data")?;
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_experiments(&self) -> anyhow::Result<Vec<ExperimentResult>> {
        let rows =
            sqlx::query("SELECT data FROM experiments ORDER BY started_at DESC NULLS LAST")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| {
                let data: Value = row.try_get("data")?;
                Ok(serde_json::from_value(data)?)
            })
            .collect()
    }

    async fn list_analyses_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<AnalysisRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT experiment_id, severity, root_cause, confidence,
                   recommendations, resilience_score, namespace, created_at
            FROM analysis_results
            WHERE created_at >= $1
              AND ($2::text IS NULL OR namespace = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(since)
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let recommendations: Value = row.try_get("recommendations")?;
                Ok(AnalysisRecord {
                    experiment_id: row.try_get("experiment_id")?,
                    severity: row.try_get("severity")?,
                    root_cause: row.try_get("root_cause")?,
                    confidence: row.try_get("confidence")?,
                    recommendations: serde_json::from_value(recommendations)?,
                    resilience_score: row.try_get("resilience_score")?,
                    namespace: row.try_get("namespace")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
