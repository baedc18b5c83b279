use async_trait::async_trait;
use serde_json::Value;

use crate::experiment::ChaosKind;

/// AI augmentation calls used by the runner. Every call is best-effort:
/// the runner logs failures and omits the corresponding insight, never
/// letting an AI error reach the experiment's terminal status.
#[async_trait]
pub trait AiService: Send + Sync {
    async fn review_steady_state(&self, steady_state: &Value) -> anyhow::Result<Value>;

    async fn hypotheses(
        &self,
        topology: &Value,
        target: &str,
        chaos_kind: ChaosKind,
    ) -> anyhow::Result<Value>;

    async fn compare_observations(
        &self,
        steady_state: &Value,
        observations: &Value,
        hypothesis: Option<&str>,
    ) -> anyhow::Result<Value>;

    async fn verify_recovery(
        &self,
        original_state: &Value,
        current_state: &Value,
    ) -> anyhow::Result<Value>;
}
