//! Health-check probes executed at fixed points of the experiment
//! lifecycle. The runner dispatches purely on [`ProbeMode`]; everything
//! variant-specific stays behind the [`Probe`] trait.

mod cmd;
mod http;
mod k8s;
mod prometheus;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChaosResult;

pub use cmd::{CmdProbe, CmdProbeConfig};
pub use http::{HttpProbe, HttpProbeConfig};
pub use k8s::{K8sProbe, K8sProbeConfig};
pub use prometheus::{PromProbe, PromProbeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Http,
    Cmd,
    K8s,
    Prometheus,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Cmd => "cmd",
            Self::K8s => "k8s",
            Self::Prometheus => "prometheus",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a probe fires within the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Before injection (start of test). A failure aborts the experiment.
    Sot,
    /// Immediately after injection.
    OnChaos,
    /// Polled by the health-check loop while chaos is live.
    Continuous,
    /// After observation (end of test).
    Eot,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sot => "sot",
            Self::OnChaos => "on_chaos",
            Self::Continuous => "continuous",
            Self::Eot => "eot",
        };
        f.write_str(s)
    }
}

/// Outcome of a single probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_name: String,
    pub probe_type: ProbeKind,
    pub mode: ProbeMode,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn execute(&self) -> ChaosResult<ProbeResult>;
    fn name(&self) -> &str;
    fn kind(&self) -> ProbeKind;
    fn mode(&self) -> ProbeMode;
}

/// Run a probe, converting any error into a not-passed result with the
/// error recorded. Never propagates.
pub async fn safe_execute(probe: &dyn Probe) -> ProbeResult {
    match probe.execute().await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(probe = probe.name(), error = %e, "probe errored");
            ProbeResult {
                probe_name: probe.name().to_string(),
                probe_type: probe.kind(),
                mode: probe.mode(),
                passed: false,
                detail: Value::Null,
                error: Some(e.to_string()),
                executed_at: Utc::now(),
            }
        }
    }
}
