use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ChaosError, ChaosResult};
use crate::probe::{Probe, ProbeKind, ProbeMode, ProbeResult};

/// Evaluates an instant PromQL query against a threshold.
pub struct PromProbe {
    name: String,
    mode: ProbeMode,
    endpoint: String,
    query: String,
    comparator: String,
    threshold: f64,
    client: reqwest::Client,
}

pub struct PromProbeConfig {
    pub name: String,
    pub mode: ProbeMode,
    pub endpoint: String,
    pub query: String,
    pub comparator: String,
    pub threshold: f64,
    pub timeout: Duration,
}

impl Default for PromProbeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ProbeMode::Sot,
            endpoint: String::new(),
            query: String::new(),
            comparator: ">".to_string(),
            threshold: 0.0,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Deserialize)]
struct PromResponse {
    data: PromData,
}

#[derive(Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromSample>,
}

#[derive(Deserialize)]
struct PromSample {
    /// Instant-query value: `[timestamp, "<scalar as string>"]`.
    value: (f64, String),
}

impl PromProbe {
    pub fn new(cfg: PromProbeConfig) -> ChaosResult<Self> {
        let comparator = if cfg.comparator.is_empty() {
            ">".to_string()
        } else {
            cfg.comparator
        };
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ChaosError::Config(format!("prometheus client: {e}")))?;
        Ok(Self {
            name: cfg.name,
            mode: cfg.mode,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            query: cfg.query,
            comparator,
            threshold: cfg.threshold,
            client,
        })
    }

    fn compare(&self, value: f64) -> bool {
        match self.comparator.as_str() {
            ">" => value > self.threshold,
            ">=" => value >= self.threshold,
            "<" => value < self.threshold,
            "<=" => value <= self.threshold,
            "==" => value == self.threshold,
            "!=" => value != self.threshold,
            _ => false,
        }
    }
}

#[async_trait]
impl Probe for PromProbe {
    async fn execute(&self) -> ChaosResult<ProbeResult> {
        let url = format!("{}/api/v1/query", self.endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("query", self.query.as_str())])
            .send()
            .await
            .map_err(|e| ChaosError::adapter(format!("prometheus probe {}", self.name), e))?;

        if !response.status().is_success() {
            return Err(ChaosError::adapter(
                format!("prometheus probe {}", self.name),
                anyhow::anyhow!("prometheus returned {}", response.status()),
            ));
        }

        let body: PromResponse = response
            .json()
            .await
            .map_err(|e| ChaosError::adapter(format!("prometheus probe {}", self.name), e))?;

        let Some(sample) = body.data.result.first() else {
            return Ok(ProbeResult {
                probe_name: self.name.clone(),
                probe_type: ProbeKind::Prometheus,
                mode: self.mode,
                passed: false,
                detail: json!({ "query": self.query, "error": "No results returned" }),
                error: None,
                executed_at: Utc::now(),
            });
        };

        let value: f64 = sample.value.1.parse().map_err(|e| {
            ChaosError::adapter(
                format!("prometheus probe {}", self.name),
                anyhow::anyhow!("parse value {:?}: {e}", sample.value.1),
            )
        })?;

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeKind::Prometheus,
            mode: self.mode,
            passed: self.compare(value),
            detail: json!({
                "query": self.query,
                "value": value,
                "comparator": self.comparator,
                "threshold": self.threshold,
                "result_count": body.data.result.len(),
            }),
            error: None,
            executed_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> ProbeKind {
        ProbeKind::Prometheus
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }
}
