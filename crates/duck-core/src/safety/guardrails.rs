use std::future::Future;
use std::time::Duration;

use globset::Glob;

use crate::error::{ChaosError, ChaosResult};

const DEFAULT_NAMESPACE_PATTERN: &str = "prod*";
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 120;

/// Admission check on the fraction of a resource pool an experiment may
/// touch. An empty pool always passes.
pub fn validate_blast_radius(affected: usize, total: usize, max_ratio: f64) -> ChaosResult<()> {
    if total == 0 {
        return Ok(());
    }
    let ratio = affected as f64 / total as f64;
    if ratio > max_ratio {
        tracing::warn!(
            affected,
            total,
            ratio = format_args!("{:.1}%", ratio * 100.0),
            max = format_args!("{:.1}%", max_ratio * 100.0),
            "blast radius exceeds limit"
        );
        return Err(ChaosError::BlastRadiusExceeded {
            affected,
            total,
            max_ratio,
        });
    }
    Ok(())
}

/// Namespaces matching the production glob pattern require an explicit
/// confirmation flag. An empty pattern falls back to `prod*`.
pub fn require_confirmation(namespace: &str, pattern: &str, confirmed: bool) -> ChaosResult<()> {
    let pattern = if pattern.is_empty() {
        DEFAULT_NAMESPACE_PATTERN
    } else {
        pattern
    };
    let matched = Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(namespace))
        .unwrap_or(false);
    if matched && !confirmed {
        return Err(ChaosError::NamespaceConfirmation(namespace.to_string()));
    }
    Ok(())
}

/// Run a fallible future under a wall-clock limit clamped to [1, 120]
/// seconds. On expiry the future is dropped (cancelling any pending I/O)
/// and `Timeout` is returned; otherwise the future's own result passes
/// through.
pub async fn with_timeout<T, F>(seconds: u64, fut: F) -> ChaosResult<T>
where
    F: Future<Output = ChaosResult<T>>,
{
    let seconds = seconds.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(ChaosError::Timeout),
    }
}

/// Clamp an experiment timeout to the allowed range.
pub fn clamp_timeout(seconds: u64) -> u64 {
    seconds.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}
