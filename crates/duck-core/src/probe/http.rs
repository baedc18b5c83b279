use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::json;

use crate::error::{ChaosError, ChaosResult};
use crate::probe::{Probe, ProbeKind, ProbeMode, ProbeResult};

/// Passes when the endpoint answers with the expected status code and,
/// if a body pattern is configured, the body matches it.
#[derive(Debug)]
pub struct HttpProbe {
    name: String,
    mode: ProbeMode,
    url: String,
    method: reqwest::Method,
    expected_status: u16,
    body_pattern: Option<Regex>,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

pub struct HttpProbeConfig {
    pub name: String,
    pub mode: ProbeMode,
    pub url: String,
    pub method: String,
    pub expected_status: u16,
    pub timeout: Duration,
    pub body_pattern: Option<String>,
    pub headers: HashMap<String, String>,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ProbeMode::Sot,
            url: String::new(),
            method: "GET".to_string(),
            expected_status: 200,
            timeout: Duration::from_secs(5),
            body_pattern: None,
            headers: HashMap::new(),
        }
    }
}

impl HttpProbe {
    pub fn new(cfg: HttpProbeConfig) -> ChaosResult<Self> {
        let method = reqwest::Method::from_str(&cfg.method)
            .map_err(|_| ChaosError::Config(format!("invalid HTTP method: {}", cfg.method)))?;
        let body_pattern = cfg
            .body_pattern
            .filter(|p| !p.is_empty())
            .map(|p| {
                Regex::new(&p)
                    .map_err(|e| ChaosError::Config(format!("invalid body pattern: {e}")))
            })
            .transpose()?;
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ChaosError::Config(format!("http client: {e}")))?;

        Ok(Self {
            name: cfg.name,
            mode: cfg.mode,
            url: cfg.url,
            method,
            expected_status: cfg.expected_status,
            body_pattern,
            headers: cfg.headers,
            client,
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn execute(&self) -> ChaosResult<ProbeResult> {
        let mut request = self.client.request(self.method.clone(), &self.url);
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ChaosError::adapter(format!("HTTP probe {}", self.name), e))?;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        let status_ok = status == self.expected_status;

        let body_ok = match (&self.body_pattern, status_ok) {
            (Some(pattern), true) => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| ChaosError::adapter(format!("HTTP probe {}", self.name), e))?;
                pattern.is_match(&body)
            }
            _ => true,
        };

        Ok(ProbeResult {
            probe_name: self.name.clone(),
            probe_type: ProbeKind::Http,
            mode: self.mode,
            passed: status_ok && body_ok,
            detail: json!({
                "url": self.url,
                "status_code": status,
                "expected_status": self.expected_status,
                "body_match": body_ok,
                "response_time_ms": elapsed.as_millis() as u64,
            }),
            error: None,
            executed_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> ProbeKind {
        ProbeKind::Http
    }
    fn mode(&self) -> ProbeMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_body_pattern_is_rejected() {
        let err = HttpProbe::new(HttpProbeConfig {
            name: "bad".into(),
            url: "http://localhost/healthz".into(),
            body_pattern: Some("(unclosed".into()),
            ..HttpProbeConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("body pattern"));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let err = HttpProbe::new(HttpProbeConfig {
            name: "bad".into(),
            url: "http://localhost/healthz".into(),
            method: "FE TCH".into(),
            ..HttpProbeConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ChaosError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_as_error() {
        let probe = HttpProbe::new(HttpProbeConfig {
            name: "dead".into(),
            // Reserved TEST-NET address; nothing listens there.
            url: "http://192.0.2.1:9/healthz".into(),
            timeout: Duration::from_millis(200),
            ..HttpProbeConfig::default()
        })
        .unwrap();

        let result = crate::probe::safe_execute(&probe).await;
        assert!(!result.passed);
        assert!(result.error.is_some());
    }
}
