//! Client for the ChaosDuck AI analysis microservice.
//!
//! Every call here is best-effort from the runtime's point of view: the
//! runner logs failures and drops the corresponding insight.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use duck_core::ai::AiService;
use duck_core::experiment::ChaosKind;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DuckAiClient {
    base_url: String,
    client: reqwest::Client,
}

impl DuckAiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_json(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("AI service returned {status}: {text}");
        }
        Ok(response.json().await?)
    }

    /// Full post-experiment analysis: severity, root cause, confidence,
    /// recommendations.
    pub async fn analyze(&self, experiment: &Value) -> anyhow::Result<Value> {
        self.post_json("/analyze", experiment.clone()).await
    }

    /// Resilience score over a history of experiment outcomes.
    pub async fn resilience_score(&self, experiments: &Value) -> anyhow::Result<Value> {
        self.post_json("/resilience-score", json!({ "experiments": experiments }))
            .await
    }

    /// Narrative report for a finished experiment.
    pub async fn report(&self, experiment: &Value) -> anyhow::Result<Value> {
        self.post_json("/report", experiment.clone()).await
    }

    /// Experiment suggestions derived from infrastructure topology.
    pub async fn generate_experiments(&self, topology: &Value) -> anyhow::Result<Value> {
        self.post_json("/generate-experiments", json!({ "topology": topology }))
            .await
    }

    /// Translate a natural-language description into an experiment config.
    pub async fn nl_experiment(&self, description: &str) -> anyhow::Result<Value> {
        self.post_json("/nl-experiment", json!({ "description": description }))
            .await
    }
}

#[async_trait]
impl AiService for DuckAiClient {
    async fn review_steady_state(&self, steady_state: &Value) -> anyhow::Result<Value> {
        self.post_json("/review-steady-state", json!({ "steady_state": steady_state }))
            .await
    }

    async fn hypotheses(
        &self,
        topology: &Value,
        target: &str,
        chaos_kind: ChaosKind,
    ) -> anyhow::Result<Value> {
        self.post_json(
            "/hypotheses",
            json!({
                "topology": topology,
                "target": target,
                "chaos_type": chaos_kind.as_str(),
            }),
        )
        .await
    }

    async fn compare_observations(
        &self,
        steady_state: &Value,
        observations: &Value,
        hypothesis: Option<&str>,
    ) -> anyhow::Result<Value> {
        self.post_json(
            "/compare-observations",
            json!({
                "steady_state": steady_state,
                "observations": observations,
                "hypothesis": hypothesis,
            }),
        )
        .await
    }

    async fn verify_recovery(
        &self,
        original_state: &Value,
        current_state: &Value,
    ) -> anyhow::Result<Value> {
        self.post_json(
            "/verify-recovery",
            json!({
                "original_state": original_state,
                "current_state": current_state,
            }),
        )
        .await
    }
}
