//! Fault-injection adapters. Every operation checks the emergency stop
//! before mutating, honours dry-run, and pairs its effect with an undo
//! that reverses exactly what was applied.

mod aws;
mod k8s;

use serde_json::Value;

use crate::error::ChaosError;
use crate::safety::UndoFn;

pub use aws::AwsAdapter;
pub use k8s::K8sAdapter;

/// Result of one successful (or dry-run) injection: the effect report
/// plus an undo covering everything that was mutated. Dry runs and
/// irreversible-by-design operations carry no undo.
pub struct ChaosOutcome {
    pub effect: Value,
    pub undo: Option<UndoFn>,
}

impl ChaosOutcome {
    /// Plan-only outcome: nothing was mutated, nothing to undo.
    pub fn plan(effect: Value) -> Self {
        Self { effect, undo: None }
    }

    pub fn with_undo(effect: Value, undo: UndoFn) -> Self {
        Self {
            effect,
            undo: Some(undo),
        }
    }
}

/// Injection failure. When some sub-steps completed before the failure,
/// `partial` carries their effect and an undo for exactly those steps;
/// a failure before any mutation carries no partial outcome.
pub struct InjectFailure {
    pub error: ChaosError,
    pub partial: Option<ChaosOutcome>,
}

impl From<ChaosError> for InjectFailure {
    fn from(error: ChaosError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

pub type InjectResult = Result<ChaosOutcome, InjectFailure>;
