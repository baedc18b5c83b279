use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChaosError;
use crate::probe::{ProbeKind, ProbeMode, ProbeResult};
use crate::safety::RollbackOutcome;

/// Fault kinds the control plane can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosKind {
    PodDelete,
    NetworkLatency,
    NetworkLoss,
    CpuStress,
    MemoryStress,
    Ec2Stop,
    RdsFailover,
    RouteBlackhole,
}

impl ChaosKind {
    pub const ALL: [ChaosKind; 8] = [
        ChaosKind::PodDelete,
        ChaosKind::NetworkLatency,
        ChaosKind::NetworkLoss,
        ChaosKind::CpuStress,
        ChaosKind::MemoryStress,
        ChaosKind::Ec2Stop,
        ChaosKind::RdsFailover,
        ChaosKind::RouteBlackhole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PodDelete => "pod_delete",
            Self::NetworkLatency => "network_latency",
            Self::NetworkLoss => "network_loss",
            Self::CpuStress => "cpu_stress",
            Self::MemoryStress => "memory_stress",
            Self::Ec2Stop => "ec2_stop",
            Self::RdsFailover => "rds_failover",
            Self::RouteBlackhole => "route_blackhole",
        }
    }
}

impl fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChaosKind {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ChaosError::UnknownChaosKind(s.to_string()))
    }
}

/// Lifecycle phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SteadyState,
    Hypothesis,
    Inject,
    Observe,
    Rollback,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SteadyState => "steady_state",
            Self::Hypothesis => "hypothesis",
            Self::Inject => "inject",
            Self::Observe => "observe",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experiment status. Moves forward only: pending -> running -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
    EmergencyStopped,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::EmergencyStopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::EmergencyStopped => "emergency_stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe settings within an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub mode: ProbeMode,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

/// Safety boundaries for an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub require_confirmation: bool,
    #[serde(default = "default_max_blast_radius")]
    pub max_blast_radius: f64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_pattern: Option<String>,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    #[serde(default = "default_failure_threshold")]
    pub health_check_failure_threshold: u32,
}

fn default_timeout_seconds() -> u64 {
    30
}
fn default_max_blast_radius() -> f64 {
    0.3
}
fn default_health_check_interval() -> u64 {
    10
}
fn default_failure_threshold() -> u32 {
    3
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            require_confirmation: false,
            max_blast_radius: default_max_blast_radius(),
            dry_run: false,
            namespace_pattern: None,
            health_check_interval: default_health_check_interval(),
            health_check_failure_threshold: default_failure_threshold(),
        }
    }
}

impl SafetyConfig {
    /// Reject values outside the documented ranges. The runner also clamps
    /// at execution time, so this is only for surfacing bad input early.
    pub fn validate(&self) -> Result<(), ChaosError> {
        if !(1..=120).contains(&self.timeout_seconds) {
            return Err(ChaosError::Config(format!(
                "timeout_seconds must be 1-120, got {}",
                self.timeout_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.max_blast_radius) {
            return Err(ChaosError::Config(format!(
                "max_blast_radius must be within [0, 1], got {}",
                self.max_blast_radius
            )));
        }
        if !(1..=60).contains(&self.health_check_interval) {
            return Err(ChaosError::Config(format!(
                "health_check_interval must be 1-60, got {}",
                self.health_check_interval
            )));
        }
        if !(1..=10).contains(&self.health_check_failure_threshold) {
            return Err(ChaosError::Config(format!(
                "health_check_failure_threshold must be 1-10, got {}",
                self.health_check_failure_threshold
            )));
        }
        Ok(())
    }
}

/// Immutable description of one chaos experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(rename = "chaos_type")]
    pub chaos_kind: ChaosKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub ai_enabled: bool,
}

impl ExperimentConfig {
    /// Comma-separated `k=v` selector, or None when no labels are set.
    pub fn label_selector(&self) -> Option<String> {
        if self.target_labels.is_empty() {
            return None;
        }
        Some(
            self.target_labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// Full experiment outcome, mutated as phases progress and sealed at a
/// terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub config: ExperimentConfig,
    pub status: Status,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steady_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_result: Option<Vec<RollbackOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_results: Vec<ProbeResult>,
}

impl ExperimentResult {
    pub fn new(experiment_id: impl Into<String>, config: ExperimentConfig) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            config,
            status: Status::Pending,
            phase: Phase::SteadyState,
            started_at: None,
            completed_at: None,
            steady_state: None,
            hypothesis: None,
            injection_result: None,
            observations: None,
            rollback_result: None,
            error: None,
            ai_insights: None,
            probe_results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaos_kind_round_trips_through_str() {
        for kind in ChaosKind::ALL {
            assert_eq!(kind.as_str().parse::<ChaosKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_chaos_kind_is_rejected() {
        let err = "pod_reboot".parse::<ChaosKind>().unwrap_err();
        assert!(matches!(err, ChaosError::UnknownChaosKind(_)));
        assert!(err.to_string().contains("pod_reboot"));
    }

    #[test]
    fn safety_defaults_match_documented_values() {
        let safety = SafetyConfig::default();
        assert_eq!(safety.timeout_seconds, 30);
        assert_eq!(safety.max_blast_radius, 0.3);
        assert_eq!(safety.health_check_interval, 10);
        assert_eq!(safety.health_check_failure_threshold, 3);
        assert!(!safety.require_confirmation);
        assert!(!safety.dry_run);
        safety.validate().unwrap();
    }

    #[test]
    fn safety_validate_rejects_out_of_range() {
        let mut safety = SafetyConfig {
            timeout_seconds: 0,
            ..SafetyConfig::default()
        };
        assert!(safety.validate().is_err());

        safety.timeout_seconds = 30;
        safety.max_blast_radius = 1.5;
        assert!(safety.validate().is_err());

        safety.max_blast_radius = 0.3;
        safety.health_check_failure_threshold = 11;
        assert!(safety.validate().is_err());
    }

    #[test]
    fn label_selector_joins_sorted_pairs() {
        let mut config: ExperimentConfig = serde_json::from_value(serde_json::json!({
            "name": "web-latency",
            "chaos_type": "network_latency",
        }))
        .unwrap();
        assert_eq!(config.label_selector(), None);

        config
            .target_labels
            .insert("tier".to_string(), "web".to_string());
        config
            .target_labels
            .insert("app".to_string(), "nginx".to_string());
        assert_eq!(config.label_selector().as_deref(), Some("app=nginx,tier=web"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ExperimentConfig = serde_json::from_value(serde_json::json!({
            "name": "kill-nginx",
            "chaos_type": "pod_delete",
            "target_namespace": "default",
            "target_labels": {"app": "nginx"},
        }))
        .unwrap();
        assert_eq!(config.chaos_kind, ChaosKind::PodDelete);
        assert_eq!(config.safety.timeout_seconds, 30);
        assert!(config.probes.is_empty());
        assert!(!config.ai_enabled);
    }

    #[test]
    fn statuses_classify_terminal() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Running.is_terminal());
        for status in [
            Status::Completed,
            Status::Failed,
            Status::RolledBack,
            Status::EmergencyStopped,
        ] {
            assert!(status.is_terminal());
        }
    }
}
