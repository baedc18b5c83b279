//! Safety-first building blocks: the emergency stop gate, per-experiment
//! rollback stacks, snapshotting with drift detection, admission
//! guardrails, and the health-check auto-rollback loop.

mod emergency;
pub mod guardrails;
mod healthcheck;
mod rollback;
mod snapshot;

pub use emergency::EmergencyStop;
pub use guardrails::{clamp_timeout, require_confirmation, validate_blast_radius, with_timeout};
pub use healthcheck::{FailureHook, HealthCheckLoop};
pub use rollback::{RollbackOutcome, RollbackStack, RollbackStatus, UndoFn, UndoFuture};
pub use snapshot::{DriftAction, DriftReport, Snapshot, SnapshotStore};
