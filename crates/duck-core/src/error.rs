use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("emergency stop is active")]
    EmergencyStop,

    #[error("blast radius exceeded: {affected}/{total} pods over limit {max_ratio}")]
    BlastRadiusExceeded {
        affected: usize,
        total: usize,
        max_ratio: f64,
    },

    #[error("production namespace {0} requires confirmation")]
    NamespaceConfirmation(String),

    #[error("operation timed out")]
    Timeout,

    #[error("experiment cancelled")]
    Cancelled,

    #[error("unknown chaos kind: {0}")]
    UnknownChaosKind(String),

    #[error("{0} engine not available")]
    EngineUnavailable(&'static str),

    #[error("AI service unavailable: {0}")]
    AiUnavailable(#[source] anyhow::Error),

    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("no snapshot for experiment {0}")]
    SnapshotNotFound(String),

    #[error("{operation} failed: {source}")]
    Adapter {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("probe failure: {0}")]
    Probe(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ChaosError {
    /// Wrap an engine error with the operation that was being attempted.
    pub fn adapter(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Adapter {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

pub type ChaosResult<T> = Result<T, ChaosError>;
