use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::process::Command;

use crate::error::{ChaosError, ChaosResult};
use crate::probe::{Probe, ProbeKind, ProbeMode, ProbeResult};

const MAX_STORED_OUTPUT: usize = 500;

/// Runs a shell command and checks exit code and, optionally, that stdout
/// contains a substring. A timed-out command is a failed result, not an
/// error.
pub struct CmdProbe {
    name: String,
    mode: ProbeMode,
    command: String,
    expected_exit_code: i32,
    output_contains: Option<String>,
    timeout: Duration,
}

pub struct CmdProbeConfig {
    pub name: String,
    pub mode: ProbeMode,
    pub command: String,
    pub expected_exit_code: i32,
    pub output_contains: Option<String>,
    pub timeout: Duration,
}

impl Default for CmdProbeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ProbeMode::Sot,
            command: String::new(),
            expected_exit_code: 0,
            output_contains: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl CmdProbe {
    pub fn new(cfg: CmdProbeConfig) -> Self {
        Self {
            name: cfg.name,
            mode: cfg.mode,
            command: cfg.command,
            expected_exit_code: cfg.expected_exit_code,
            output_contains: cfg.output_contains.filter(|s| !s.is_empty()),
            timeout: cfg.timeout,
        }
    }
}

#[async_trait]
impl Probe for CmdProbe {
    async fn execute(&self) -> ChaosResult<ProbeResult> {
        let run = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => {
                result.map_err(|e| ChaosError::adapter(format!("cmd probe {}", self.name), e))?
            }
            Err(_) => {
                return Ok(ProbeResult {
                    probe_name: self.name.clone(),
                    probe_type: ProbeKind::Cmd,
                    mode: self.mode,
                    passed: false,
                    detail: json!({ "command": self.command }),
                    error: Some(format!("command timed out after {:?}", self.timeout)),
                    executed_at: Utc::now(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let exit_ok = exit_code == self.expected_exit_code;

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let output_ok = match (&self.output_contains, exit_ok) {
            (Some(needle), true) => stdout.contains(needle.as_str()),
            _ => true,
        };
        stdout.truncate(MAX_STORED_OUTPUT);

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeKind::Cmd,
            mode: self.mode,
            passed: exit_ok && output_ok,
            detail: json!({
                "command": self.command,
                "exit_code": exit_code,
                "expected_exit_code": self.expected_exit_code,
                "stdout": stdout,
                "output_match": output_ok,
            }),
            error: None,
            executed_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> ProbeKind {
        ProbeKind::Cmd
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }
}
