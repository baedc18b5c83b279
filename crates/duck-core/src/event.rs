use async_trait::async_trait;

use crate::experiment::ExperimentResult;

/// Observer of experiment progress. The runner emits a snapshot of the
/// result after every phase or status transition; the stream is ordered
/// and the last event's status is terminal.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, result: ExperimentResult);
}

/// Forwards result snapshots to an unbounded channel.
pub struct ChannelResultSink {
    tx: tokio::sync::mpsc::UnboundedSender<ExperimentResult>,
}

impl ChannelResultSink {
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<ExperimentResult>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResultSink for ChannelResultSink {
    async fn emit(&self, result: ExperimentResult) {
        let _ = self.tx.send(result);
    }
}

/// Logs each transition through tracing.
pub struct TracingResultSink;

#[async_trait]
impl ResultSink for TracingResultSink {
    async fn emit(&self, result: ExperimentResult) {
        tracing::info!(
            experiment_id = %result.experiment_id,
            phase = %result.phase,
            status = %result.status,
            "experiment transition"
        );
    }
}
