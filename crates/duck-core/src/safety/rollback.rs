use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Future produced by invoking an undo.
pub type UndoFuture = BoxFuture<'static, Result<Value, anyhow::Error>>;

/// A deferred undo operation. Captures whatever it needs (pod specs,
/// instance ids, route metadata) to reverse one applied mutation.
pub type UndoFn = Box<dyn FnOnce() -> UndoFuture + Send>;

struct RollbackEntry {
    description: String,
    undo: UndoFn,
}

/// Outcome of draining one rollback entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackOutcome {
    pub description: String,
    pub status: RollbackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Success,
    Failed,
}

/// Per-experiment LIFO stacks of undo operations.
///
/// The map is guarded by one mutex; `rollback` detaches an experiment's
/// stack under the lock and executes the undos outside it, so a stack is
/// drained at most once and concurrent drains of different experiments do
/// not serialize on each other's undo I/O.
#[derive(Default)]
pub struct RollbackStack {
    stacks: Mutex<HashMap<String, Vec<RollbackEntry>>>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, experiment_id: &str, description: impl Into<String>, undo: UndoFn) {
        let description = description.into();
        let mut stacks = self.stacks.lock().expect("rollback stack lock poisoned");
        let stack = stacks.entry(experiment_id.to_string()).or_default();
        stack.push(RollbackEntry { description, undo });
        tracing::debug!(
            experiment_id,
            depth = stack.len(),
            "rollback entry pushed"
        );
    }

    pub fn size(&self, experiment_id: &str) -> usize {
        let stacks = self.stacks.lock().expect("rollback stack lock poisoned");
        stacks.get(experiment_id).map_or(0, Vec::len)
    }

    /// Experiment ids with at least one pending undo.
    pub fn active_experiments(&self) -> Vec<String> {
        let stacks = self.stacks.lock().expect("rollback stack lock poisoned");
        stacks
            .iter()
            .filter(|(_, stack)| !stack.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drain an experiment's stack newest-to-oldest. Every entry executes,
    /// even after earlier failures; each failure is recorded in its own
    /// outcome. Draining an absent or already-drained id is a no-op.
    pub async fn rollback(&self, experiment_id: &str) -> Vec<RollbackOutcome> {
        let stack = {
            let mut stacks = self.stacks.lock().expect("rollback stack lock poisoned");
            stacks.remove(experiment_id).unwrap_or_default()
        };

        let mut outcomes = Vec::with_capacity(stack.len());
        for entry in stack.into_iter().rev() {
            match (entry.undo)().await {
                Ok(result) => {
                    tracing::info!(experiment_id, description = %entry.description, "undo succeeded");
                    outcomes.push(RollbackOutcome {
                        description: entry.description,
                        status: RollbackStatus::Success,
                        result: Some(result),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!(experiment_id, description = %entry.description, error = %e, "undo failed");
                    outcomes.push(RollbackOutcome {
                        description: entry.description,
                        status: RollbackStatus::Failed,
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        outcomes
    }

    /// Drain every experiment's stack. Used by the emergency stop path.
    pub async fn rollback_all(&self) -> HashMap<String, Vec<RollbackOutcome>> {
        let ids: Vec<String> = {
            let stacks = self.stacks.lock().expect("rollback stack lock poisoned");
            stacks.keys().cloned().collect()
        };

        let mut all = HashMap::with_capacity(ids.len());
        for id in ids {
            let outcomes = self.rollback(&id).await;
            all.insert(id, outcomes);
        }
        all
    }
}
