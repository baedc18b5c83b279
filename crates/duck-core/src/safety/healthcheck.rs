use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::probe::{safe_execute, Probe};
use crate::safety::RollbackStack;

/// Invoked instead of the default rollback when the failure threshold is
/// reached.
pub type FailureHook = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct LoopState {
    running: bool,
    cancel: Option<CancellationToken>,
}

/// Background poller that watches an experiment's continuous probes and
/// triggers rollback after a run of consecutive failed ticks.
///
/// One task per loop; probes within a tick run sequentially, so probe
/// passes never overlap.
pub struct HealthCheckLoop {
    experiment_id: String,
    probes: Vec<Arc<dyn Probe>>,
    interval: Duration,
    failure_threshold: u32,
    rollback: Arc<RollbackStack>,
    on_failure: Option<FailureHook>,
    state: Mutex<LoopState>,
}

impl HealthCheckLoop {
    pub fn new(
        experiment_id: impl Into<String>,
        probes: Vec<Arc<dyn Probe>>,
        interval: Duration,
        failure_threshold: u32,
        rollback: Arc<RollbackStack>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            probes,
            interval,
            failure_threshold: failure_threshold.max(1),
            rollback,
            on_failure: None,
            state: Mutex::new(LoopState {
                running: false,
                cancel: None,
            }),
        }
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Begin polling. A no-op while already running.
    pub fn start(self: &Arc<Self>) {
        let token = {
            let mut state = self.state.lock().expect("health loop lock poisoned");
            if state.running {
                return;
            }
            state.running = true;
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            token
        };

        tracing::info!(
            experiment_id = %self.experiment_id,
            interval = ?self.interval,
            threshold = self.failure_threshold,
            "health check loop started"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(token).await });
    }

    /// Halt polling. A no-op while stopped.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("health loop lock poisoned");
        if !state.running {
            return;
        }
        state.running = false;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        tracing::info!(experiment_id = %self.experiment_id, "health check loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().expect("health loop lock poisoned").running
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // probe pass happens one interval after start.
        timer.tick().await;

        let mut consecutive_failures: u32 = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = timer.tick() => {}
            }

            if self.check_probes().await {
                consecutive_failures = 0;
                continue;
            }

            consecutive_failures += 1;
            tracing::warn!(
                experiment_id = %self.experiment_id,
                failures = consecutive_failures,
                threshold = self.failure_threshold,
                "health check tick failed"
            );

            if consecutive_failures >= self.failure_threshold {
                tracing::error!(
                    experiment_id = %self.experiment_id,
                    "failure threshold reached, triggering rollback"
                );
                match &self.on_failure {
                    Some(hook) => hook().await,
                    None => {
                        self.rollback.rollback(&self.experiment_id).await;
                    }
                }
                self.stop();
                return;
            }
        }
    }

    /// One tick: all probes must pass. Probe errors count as failures.
    async fn check_probes(&self) -> bool {
        if self.probes.is_empty() {
            return true;
        }
        for probe in &self.probes {
            let result = safe_execute(probe.as_ref()).await;
            if !result.passed {
                return false;
            }
        }
        true
    }
}
