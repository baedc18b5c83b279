use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
};

use crate::experiment::{ChaosKind, Status};
use crate::probe::ProbeKind;

/// Prometheus instruments for the orchestration runtime.
pub struct RunnerMetrics {
    registry: Registry,
    experiments_total: IntCounterVec,
    experiment_duration_seconds: Histogram,
    active_experiments: IntGauge,
    probe_results_total: IntCounterVec,
    rollback_total: IntCounterVec,
}

impl RunnerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let experiments_total = IntCounterVec::new(
            Opts::new("chaosduck_experiments_total", "Chaos experiments run"),
            &["chaos_type", "status"],
        )?;
        let experiment_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chaosduck_experiment_duration_seconds",
                "Experiment wall time in seconds",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        let active_experiments = IntGauge::new(
            "chaosduck_active_experiments",
            "Currently running experiments",
        )?;
        let probe_results_total = IntCounterVec::new(
            Opts::new("chaosduck_probe_results", "Probe execution results"),
            &["probe_type", "passed"],
        )?;
        let rollback_total = IntCounterVec::new(
            Opts::new("chaosduck_rollback_total", "Rollback drains"),
            &["status"],
        )?;

        registry.register(Box::new(experiments_total.clone()))?;
        registry.register(Box::new(experiment_duration_seconds.clone()))?;
        registry.register(Box::new(active_experiments.clone()))?;
        registry.register(Box::new(probe_results_total.clone()))?;
        registry.register(Box::new(rollback_total.clone()))?;

        Ok(Self {
            registry,
            experiments_total,
            experiment_duration_seconds,
            active_experiments,
            probe_results_total,
            rollback_total,
        })
    }

    /// Registry for exposition by whatever serves /metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_experiment_start(&self) {
        self.active_experiments.inc();
    }

    pub fn record_experiment_end(&self, kind: ChaosKind, status: Status, duration_secs: f64) {
        self.active_experiments.dec();
        self.experiments_total
            .with_label_values(&[kind.as_str(), status.as_str()])
            .inc();
        self.experiment_duration_seconds.observe(duration_secs);
    }

    pub fn record_probe(&self, kind: ProbeKind, passed: bool) {
        self.probe_results_total
            .with_label_values(&[kind.as_str(), if passed { "true" } else { "false" }])
            .inc();
    }

    pub fn record_rollback(&self, all_succeeded: bool) {
        self.rollback_total
            .with_label_values(&[if all_succeeded { "success" } else { "failed" }])
            .inc();
    }
}
