use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapter::{AwsAdapter, InjectFailure, InjectResult, K8sAdapter};
use crate::ai::AiService;
use crate::engine::{AwsEngine, K8sEngine};
use crate::error::{ChaosError, ChaosResult};
use crate::event::ResultSink;
use crate::experiment::{ChaosKind, ExperimentConfig, ExperimentResult, Phase, Status};
use crate::metrics::RunnerMetrics;
use crate::params::{int_param, required_string_param, string_list_param, string_param};
use crate::probe::{
    safe_execute, CmdProbe, CmdProbeConfig, HttpProbe, HttpProbeConfig, K8sProbe, K8sProbeConfig,
    Probe, ProbeKind, ProbeMode, PromProbe, PromProbeConfig,
};
use crate::safety::{
    clamp_timeout, require_confirmation, with_timeout, EmergencyStop, FailureHook,
    HealthCheckLoop, RollbackOutcome, RollbackStack, RollbackStatus, SnapshotStore,
};
use crate::store::ExperimentStore;

/// Orchestrates the five-phase experiment lifecycle:
/// steady_state -> hypothesis -> inject -> observe -> rollback.
///
/// One call to [`Runner::run`] drives one experiment; many may run
/// concurrently on the same runner. Every path that seals a non-completed
/// terminal status drains the experiment's rollback stack first.
pub struct Runner {
    k8s: Option<Arc<dyn K8sEngine>>,
    aws: Option<Arc<dyn AwsEngine>>,
    stop: Arc<EmergencyStop>,
    rollback: Arc<RollbackStack>,
    snapshots: Arc<SnapshotStore>,
    ai: Option<Arc<dyn AiService>>,
    store: Option<Arc<dyn ExperimentStore>>,
    metrics: Option<Arc<RunnerMetrics>>,
    sinks: Vec<Arc<dyn ResultSink>>,
    experiments: RwLock<HashMap<String, ExperimentResult>>,
    health_loops: StdMutex<HashMap<String, Arc<HealthCheckLoop>>>,
}

impl Runner {
    pub fn new(
        stop: Arc<EmergencyStop>,
        rollback: Arc<RollbackStack>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            k8s: None,
            aws: None,
            stop,
            rollback,
            snapshots,
            ai: None,
            store: None,
            metrics: None,
            sinks: Vec::new(),
            experiments: RwLock::new(HashMap::new()),
            health_loops: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_k8s(mut self, engine: Arc<dyn K8sEngine>) -> Self {
        self.k8s = Some(engine);
        self
    }

    pub fn with_aws(mut self, engine: Arc<dyn AwsEngine>) -> Self {
        self.aws = Some(engine);
        self
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiService>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ExperimentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RunnerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn add_result_sink(&mut self, sink: Arc<dyn ResultSink>) {
        self.sinks.push(sink);
    }

    pub fn rollback_stack(&self) -> &Arc<RollbackStack> {
        &self.rollback
    }

    pub fn snapshot_store(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    /// Short opaque id, unique for the life of the process.
    pub fn next_experiment_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    /// Run one experiment to its terminal status.
    pub async fn run(&self, config: ExperimentConfig) -> ExperimentResult {
        self.run_with_id(Self::next_experiment_id(), config, CancellationToken::new())
            .await
    }

    /// Run with a caller-supplied id and cancellation token. Cancelling
    /// the token fails the experiment and still drains its rollback stack.
    pub async fn run_with_id(
        &self,
        experiment_id: String,
        config: ExperimentConfig,
        token: CancellationToken,
    ) -> ExperimentResult {
        let mut result = ExperimentResult::new(experiment_id.clone(), config);

        if self.stop.check().is_err() {
            let now = chrono::Utc::now();
            result.status = Status::EmergencyStopped;
            result.error = Some(ChaosError::EmergencyStop.to_string());
            result.started_at = Some(now);
            result.completed_at = Some(now);
            self.update_and_emit(&result).await;
            return result;
        }

        result.status = Status::Running;
        result.started_at = Some(chrono::Utc::now());
        if let Some(m) = &self.metrics {
            m.record_experiment_start();
        }
        self.update_and_emit(&result).await;

        let timeout_secs = clamp_timeout(result.config.safety.timeout_seconds);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        let auto_rolled_back = Arc::new(AtomicBool::new(false));
        let auto_outcomes: Arc<StdMutex<Vec<RollbackOutcome>>> =
            Arc::new(StdMutex::new(Vec::new()));

        let phases = self.run_phases(
            &mut result,
            timeout_secs,
            deadline,
            &auto_rolled_back,
            &auto_outcomes,
        );
        let outcome = tokio::select! {
            _ = token.cancelled() => Err(ChaosError::Cancelled),
            r = with_timeout(timeout_secs, phases) => r,
        };

        // Rollback phase runs on a fresh scope: the drain is never subject
        // to the experiment timeout or the caller's cancellation.
        result.phase = Phase::Rollback;
        self.update_and_emit(&result).await;

        if let Some(hc) = self
            .health_loops
            .lock()
            .expect("health loop registry lock poisoned")
            .remove(&experiment_id)
        {
            hc.stop();
        }

        let mut outcomes = {
            let mut slot = auto_outcomes.lock().expect("auto rollback lock poisoned");
            std::mem::take(&mut *slot)
        };
        let drained = self.rollback.rollback(&experiment_id).await;
        outcomes.extend(drained);
        if !outcomes.is_empty() {
            if let Some(m) = &self.metrics {
                m.record_rollback(outcomes.iter().all(|o| o.status == RollbackStatus::Success));
            }
            result.rollback_result = Some(outcomes);
        }

        match outcome {
            Ok(()) => {
                if self.stop.is_triggered() {
                    result.status = Status::EmergencyStopped;
                    result.error = Some(ChaosError::EmergencyStop.to_string());
                } else if auto_rolled_back.load(Ordering::SeqCst) {
                    result.status = Status::RolledBack;
                } else {
                    result.status = Status::Completed;
                }
            }
            Err(e) => {
                result.status = if matches!(e, ChaosError::EmergencyStop) {
                    Status::EmergencyStopped
                } else {
                    Status::Failed
                };
                result.error = Some(e.to_string());
            }
        }

        if result.status == Status::Completed && result.config.ai_enabled {
            self.verify_recovery(&mut result).await;
        }

        result.completed_at = Some(chrono::Utc::now());
        if let Some(m) = &self.metrics {
            let duration = result
                .started_at
                .zip(result.completed_at)
                .map(|(s, c)| (c - s).num_milliseconds() as f64 / 1000.0)
                .unwrap_or_default();
            m.record_experiment_end(result.config.chaos_kind, result.status, duration);
        }
        self.update_and_emit(&result).await;
        result
    }

    async fn run_phases(
        &self,
        result: &mut ExperimentResult,
        timeout_secs: u64,
        deadline: tokio::time::Instant,
        auto_rolled_back: &Arc<AtomicBool>,
        auto_outcomes: &Arc<StdMutex<Vec<RollbackOutcome>>>,
    ) -> ChaosResult<()> {
        let cfg = result.config.clone();
        let probes = self.build_probes(&cfg);
        let mut insights = serde_json::Map::new();

        // Phase 1: steady state
        self.stop.check()?;
        if let (Some(ns), Some(k8s)) = (cfg.target_namespace.as_deref(), self.k8s.as_ref()) {
            match k8s.steady_state(ns).await {
                Ok(steady) => {
                    result.steady_state = Some(steady.to_value());
                    let resources = match k8s.list_pods(ns, None).await {
                        Ok(pods) => json!({
                            "pods": pods
                                .iter()
                                .map(|p| json!({ "name": p.name }))
                                .collect::<Vec<_>>(),
                        }),
                        Err(e) => {
                            tracing::warn!(error = %e, "pod inventory for snapshot failed");
                            steady.to_value()
                        }
                    };
                    self.snapshots
                        .capture_k8s(&result.experiment_id, ns, resources)
                        .await;
                }
                Err(e) => tracing::warn!(error = %e, "steady state capture failed"),
            }
        }

        for probe in probes.iter().filter(|p| p.mode() == ProbeMode::Sot) {
            let pr = safe_execute(probe.as_ref()).await;
            if let Some(m) = &self.metrics {
                m.record_probe(pr.probe_type, pr.passed);
            }
            let passed = pr.passed;
            let name = pr.probe_name.clone();
            result.probe_results.push(pr);
            if !passed {
                return Err(ChaosError::Probe(format!(
                    "start-of-test probe {name} failed"
                )));
            }
        }

        if cfg.ai_enabled {
            if let (Some(ai), Some(steady)) = (&self.ai, &result.steady_state) {
                match ai.review_steady_state(steady).await {
                    Ok(v) => {
                        insights.insert("steady_state_review".to_string(), v);
                    }
                    Err(e) => tracing::warn!(error = %e, "AI steady state review failed"),
                }
            }
        }

        // Phase 2: hypothesis
        self.stop.check()?;
        result.phase = Phase::Hypothesis;
        self.update_and_emit(result).await;

        if cfg.ai_enabled {
            if let Some(ai) = &self.ai {
                let topology = result.steady_state.clone().unwrap_or(Value::Null);
                match ai.hypotheses(&topology, &cfg.name, cfg.chaos_kind).await {
                    Ok(v) => {
                        if let Some(h) = v.get("hypothesis").and_then(Value::as_str) {
                            result.hypothesis = Some(h.to_string());
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "AI hypothesis generation failed"),
                }
            }
        }

        if let Some(ns) = &cfg.target_namespace {
            require_confirmation(
                ns,
                cfg.safety.namespace_pattern.as_deref().unwrap_or(""),
                cfg.safety.require_confirmation,
            )?;
        }

        // Phase 3: inject
        self.stop.check()?;
        result.phase = Phase::Inject;
        self.update_and_emit(result).await;

        match self.dispatch(&cfg, timeout_secs).await {
            Ok(outcome) => {
                result.injection_result = Some(outcome.effect);
                if let Some(undo) = outcome.undo {
                    self.rollback
                        .push(&result.experiment_id, cfg.chaos_kind.as_str(), undo);
                }
            }
            Err(failure) => {
                if let Some(partial) = failure.partial {
                    result.injection_result = Some(partial.effect);
                    if let Some(undo) = partial.undo {
                        self.rollback
                            .push(&result.experiment_id, cfg.chaos_kind.as_str(), undo);
                    }
                }
                return Err(failure.error);
            }
        }

        for probe in probes.iter().filter(|p| p.mode() == ProbeMode::OnChaos) {
            let pr = safe_execute(probe.as_ref()).await;
            if let Some(m) = &self.metrics {
                m.record_probe(pr.probe_type, pr.passed);
            }
            result.probe_results.push(pr);
        }

        let continuous: Vec<Arc<dyn Probe>> = probes
            .iter()
            .filter(|p| p.mode() == ProbeMode::Continuous)
            .cloned()
            .collect();
        let armed_loop = if continuous.is_empty() {
            None
        } else {
            Some(self.start_health_loop(
                &result.experiment_id,
                continuous,
                &cfg,
                auto_rolled_back,
                auto_outcomes,
            ))
        };

        // Phase 4: observe
        self.stop.check()?;
        result.phase = Phase::Observe;
        self.update_and_emit(result).await;

        // Let the fault soak under the health loop's watch. Ends early
        // when the loop stops itself (auto-rollback), and leaves room
        // before the deadline to observe and drain.
        if let Some(hc) = &armed_loop {
            let margin = Duration::from_secs(2);
            while hc.is_running() && tokio::time::Instant::now() + margin < deadline {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        if let (Some(ns), Some(k8s)) = (cfg.target_namespace.as_deref(), self.k8s.as_ref()) {
            match k8s.steady_state(ns).await {
                Ok(observed) => result.observations = Some(observed.to_value()),
                Err(e) => tracing::warn!(error = %e, "observation capture failed"),
            }
        }

        for probe in probes.iter().filter(|p| p.mode() == ProbeMode::Eot) {
            let pr = safe_execute(probe.as_ref()).await;
            if let Some(m) = &self.metrics {
                m.record_probe(pr.probe_type, pr.passed);
            }
            result.probe_results.push(pr);
        }

        if cfg.ai_enabled {
            if let (Some(ai), Some(observations)) = (&self.ai, &result.observations) {
                let steady = result.steady_state.clone().unwrap_or(Value::Null);
                match ai
                    .compare_observations(&steady, observations, result.hypothesis.as_deref())
                    .await
                {
                    Ok(v) => {
                        insights.insert("observation_analysis".to_string(), v);
                    }
                    Err(e) => tracing::warn!(error = %e, "AI observation analysis failed"),
                }
            }
        }

        if !result.probe_results.is_empty() {
            let summary: Vec<Value> = result
                .probe_results
                .iter()
                .map(|p| {
                    json!({
                        "probe": p.probe_name,
                        "type": p.probe_type,
                        "passed": p.passed,
                    })
                })
                .collect();
            let observations = result.observations.get_or_insert_with(|| json!({}));
            if let Some(map) = observations.as_object_mut() {
                map.insert("probe_results".to_string(), Value::Array(summary));
            }
        }

        if !insights.is_empty() {
            result.ai_insights = Some(Value::Object(insights));
        }

        Ok(())
    }

    fn start_health_loop(
        &self,
        experiment_id: &str,
        probes: Vec<Arc<dyn Probe>>,
        cfg: &ExperimentConfig,
        auto_rolled_back: &Arc<AtomicBool>,
        auto_outcomes: &Arc<StdMutex<Vec<RollbackOutcome>>>,
    ) -> Arc<HealthCheckLoop> {
        let interval = Duration::from_secs(cfg.safety.health_check_interval.clamp(1, 60));
        let threshold = cfg.safety.health_check_failure_threshold.clamp(1, 10);

        let hook: FailureHook = {
            let rollback = Arc::clone(&self.rollback);
            let id = experiment_id.to_string();
            let flag = Arc::clone(auto_rolled_back);
            let slot = Arc::clone(auto_outcomes);
            Box::new(move || {
                let rollback = Arc::clone(&rollback);
                let id = id.clone();
                let flag = Arc::clone(&flag);
                let slot = Arc::clone(&slot);
                Box::pin(async move {
                    let outcomes = rollback.rollback(&id).await;
                    flag.store(true, Ordering::SeqCst);
                    slot.lock()
                        .expect("auto rollback lock poisoned")
                        .extend(outcomes);
                })
            })
        };

        let hc = Arc::new(
            HealthCheckLoop::new(
                experiment_id.to_string(),
                probes,
                interval,
                threshold,
                Arc::clone(&self.rollback),
            )
            .with_failure_hook(hook),
        );
        hc.start();
        self.health_loops
            .lock()
            .expect("health loop registry lock poisoned")
            .insert(experiment_id.to_string(), Arc::clone(&hc));
        hc
    }

    /// Route to the adapter operation for the configured chaos kind,
    /// validating parameters and engine availability first.
    async fn dispatch(&self, cfg: &ExperimentConfig, timeout_secs: u64) -> InjectResult {
        let namespace = cfg.target_namespace.as_deref().unwrap_or("default");
        let selector = cfg.label_selector();
        let dry_run = cfg.safety.dry_run;

        match cfg.chaos_kind {
            ChaosKind::PodDelete => {
                self.k8s_adapter()?
                    .pod_delete(
                        namespace,
                        selector.as_deref(),
                        cfg.safety.max_blast_radius,
                        dry_run,
                    )
                    .await
            }
            ChaosKind::NetworkLatency => {
                let latency_ms = int_param(&cfg.parameters, "latency_ms", 100, 1, 60000)?;
                self.k8s_adapter()?
                    .network_latency(namespace, selector.as_deref(), latency_ms, dry_run)
                    .await
            }
            ChaosKind::NetworkLoss => {
                let loss_percent = int_param(&cfg.parameters, "loss_percent", 10, 1, 100)?;
                self.k8s_adapter()?
                    .network_loss(namespace, selector.as_deref(), loss_percent, dry_run)
                    .await
            }
            ChaosKind::CpuStress => {
                let cores = int_param(&cfg.parameters, "cores", 1, 1, 64)?;
                self.k8s_adapter()?
                    .cpu_stress(namespace, selector.as_deref(), cores, timeout_secs, dry_run)
                    .await
            }
            ChaosKind::MemoryStress => {
                let memory_bytes = string_param(&cfg.parameters, "memory_bytes", "256M");
                self.k8s_adapter()?
                    .memory_stress(
                        namespace,
                        selector.as_deref(),
                        &memory_bytes,
                        timeout_secs,
                        dry_run,
                    )
                    .await
            }
            ChaosKind::Ec2Stop => {
                let instance_ids = string_list_param(&cfg.parameters, "instance_ids");
                if instance_ids.is_empty() {
                    return Err(ChaosError::Config("instance_ids is required".into()).into());
                }
                self.aws_adapter()?.ec2_stop(instance_ids, dry_run).await
            }
            ChaosKind::RdsFailover => {
                let cluster_id = required_string_param(&cfg.parameters, "db_cluster_id")?;
                self.aws_adapter()?.rds_failover(&cluster_id, dry_run).await
            }
            ChaosKind::RouteBlackhole => {
                let route_table_id = required_string_param(&cfg.parameters, "route_table_id")?;
                let destination_cidr =
                    required_string_param(&cfg.parameters, "destination_cidr")?;
                self.aws_adapter()?
                    .route_blackhole(&route_table_id, &destination_cidr, dry_run)
                    .await
            }
        }
    }

    fn k8s_adapter(&self) -> Result<K8sAdapter, InjectFailure> {
        match &self.k8s {
            Some(engine) => Ok(K8sAdapter::new(Arc::clone(engine), Arc::clone(&self.stop))),
            None => Err(ChaosError::EngineUnavailable("kubernetes").into()),
        }
    }

    fn aws_adapter(&self) -> Result<AwsAdapter, InjectFailure> {
        match &self.aws {
            Some(engine) => Ok(AwsAdapter::new(Arc::clone(engine), Arc::clone(&self.stop))),
            None => Err(ChaosError::EngineUnavailable("aws").into()),
        }
    }

    /// Instantiate probes from the experiment config. A probe that cannot
    /// be built (bad regex, missing engine) is logged and skipped.
    fn build_probes(&self, cfg: &ExperimentConfig) -> Vec<Arc<dyn Probe>> {
        let mut probes: Vec<Arc<dyn Probe>> = Vec::with_capacity(cfg.probes.len());
        for spec in &cfg.probes {
            let props = &spec.properties;
            let built: Option<Arc<dyn Probe>> = match spec.kind {
                ProbeKind::Http => {
                    let headers = props
                        .get("headers")
                        .and_then(Value::as_object)
                        .map(|h| {
                            h.iter()
                                .filter_map(|(k, v)| {
                                    v.as_str().map(|s| (k.clone(), s.to_string()))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let http = HttpProbe::new(HttpProbeConfig {
                        name: spec.name.clone(),
                        mode: spec.mode,
                        url: prop_str(props, "url", ""),
                        method: prop_str(props, "method", "GET"),
                        expected_status: prop_u64(props, "expected_status", 200) as u16,
                        timeout: Duration::from_secs(prop_u64(props, "timeout_seconds", 5)),
                        body_pattern: non_empty(prop_str(props, "body_pattern", "")),
                        headers,
                    });
                    match http {
                        Ok(p) => Some(Arc::new(p)),
                        Err(e) => {
                            tracing::warn!(probe = %spec.name, error = %e, "HTTP probe skipped");
                            None
                        }
                    }
                }
                ProbeKind::Cmd => Some(Arc::new(CmdProbe::new(CmdProbeConfig {
                    name: spec.name.clone(),
                    mode: spec.mode,
                    command: prop_str(props, "command", ""),
                    expected_exit_code: prop_u64(props, "expected_exit_code", 0) as i32,
                    output_contains: non_empty(prop_str(props, "output_contains", "")),
                    timeout: Duration::from_secs(prop_u64(props, "timeout_seconds", 10)),
                }))),
                ProbeKind::K8s => match &self.k8s {
                    Some(engine) => Some(Arc::new(K8sProbe::new(K8sProbeConfig {
                        name: spec.name.clone(),
                        mode: spec.mode,
                        engine: Arc::clone(engine),
                        namespace: prop_str(props, "namespace", ""),
                        resource_kind: prop_str(props, "resource_kind", ""),
                        resource_name: prop_str(props, "resource_name", ""),
                        expected_value: non_empty(prop_str(props, "expected_value", "")),
                    }))),
                    None => {
                        tracing::warn!(probe = %spec.name, "K8s probe skipped: no engine");
                        None
                    }
                },
                ProbeKind::Prometheus => {
                    let prom = PromProbe::new(PromProbeConfig {
                        name: spec.name.clone(),
                        mode: spec.mode,
                        endpoint: prop_str(props, "endpoint", ""),
                        query: prop_str(props, "query", ""),
                        comparator: prop_str(props, "comparator", ">"),
                        threshold: props
                            .get("threshold")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0),
                        timeout: Duration::from_secs(prop_u64(props, "timeout_seconds", 5)),
                    });
                    match prom {
                        Ok(p) => Some(Arc::new(p)),
                        Err(e) => {
                            tracing::warn!(probe = %spec.name, error = %e, "prometheus probe skipped");
                            None
                        }
                    }
                }
            };
            if let Some(p) = built {
                probes.push(p);
            }
        }
        probes
    }

    async fn verify_recovery(&self, result: &mut ExperimentResult) {
        let (Some(ai), Some(k8s)) = (&self.ai, &self.k8s) else {
            return;
        };
        let (Some(ns), Some(original)) = (
            result.config.target_namespace.as_deref(),
            result.steady_state.clone(),
        ) else {
            return;
        };
        let post = match k8s.steady_state(ns).await {
            Ok(s) => s.to_value(),
            Err(e) => {
                tracing::warn!(error = %e, "post-rollback state capture failed");
                return;
            }
        };
        match ai.verify_recovery(&original, &post).await {
            Ok(v) => {
                let insights = result
                    .ai_insights
                    .get_or_insert_with(|| Value::Object(serde_json::Map::new()));
                if let Some(map) = insights.as_object_mut() {
                    map.insert("recovery_verification".to_string(), v);
                }
            }
            Err(e) => tracing::warn!(error = %e, "AI recovery verification failed"),
        }
    }

    async fn update_and_emit(&self, result: &ExperimentResult) {
        {
            let mut experiments = self.experiments.write().await;
            experiments.insert(result.experiment_id.clone(), result.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_experiment(result).await {
                tracing::warn!(
                    experiment_id = %result.experiment_id,
                    error = %e,
                    "experiment persistence skipped"
                );
            }
        }
        for sink in &self.sinks {
            sink.emit(result.clone()).await;
        }
    }

    pub async fn get_experiment(&self, experiment_id: &str) -> ChaosResult<ExperimentResult> {
        self.experiments
            .read()
            .await
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| ChaosError::ExperimentNotFound(experiment_id.to_string()))
    }

    pub async fn list_experiments(&self) -> Vec<ExperimentResult> {
        self.experiments.read().await.values().cloned().collect()
    }

    /// Drain one experiment's stack on demand, sealing a still-open
    /// experiment as rolled back.
    pub async fn rollback_experiment(
        &self,
        experiment_id: &str,
    ) -> ChaosResult<Vec<RollbackOutcome>> {
        let known = self.experiments.read().await.contains_key(experiment_id);
        if !known {
            return Err(ChaosError::ExperimentNotFound(experiment_id.to_string()));
        }

        if let Some(hc) = self
            .health_loops
            .lock()
            .expect("health loop registry lock poisoned")
            .remove(experiment_id)
        {
            hc.stop();
        }

        let outcomes = self.rollback.rollback(experiment_id).await;
        if !outcomes.is_empty() {
            if let Some(m) = &self.metrics {
                m.record_rollback(outcomes.iter().all(|o| o.status == RollbackStatus::Success));
            }
        }

        let updated = {
            let mut experiments = self.experiments.write().await;
            experiments.get_mut(experiment_id).map(|result| {
                if !result.status.is_terminal() {
                    result.status = Status::RolledBack;
                    result.completed_at = Some(chrono::Utc::now());
                }
                if !outcomes.is_empty() {
                    result
                        .rollback_result
                        .get_or_insert_with(Vec::new)
                        .extend(outcomes.clone());
                }
                result.clone()
            })
        };
        if let Some(result) = updated {
            if let Some(store) = &self.store {
                if let Err(e) = store.upsert_experiment(&result).await {
                    tracing::warn!(error = %e, "experiment persistence skipped");
                }
            }
            for sink in &self.sinks {
                sink.emit(result.clone()).await;
            }
        }

        Ok(outcomes)
    }

    /// Set the global gate, halt every health loop, and drain every
    /// experiment's stack. In-flight operations complete; their next
    /// mutation attempt fails fast.
    pub async fn trigger_emergency_stop(
        &self,
    ) -> HashMap<String, Vec<RollbackOutcome>> {
        self.stop.trigger();
        let loops: Vec<Arc<HealthCheckLoop>> = {
            let mut registry = self
                .health_loops
                .lock()
                .expect("health loop registry lock poisoned");
            registry.drain().map(|(_, hc)| hc).collect()
        };
        for hc in loops {
            hc.stop();
        }
        self.rollback.rollback_all().await
    }

    pub fn reset_emergency_stop(&self) {
        self.stop.reset();
    }
}

fn prop_str(props: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    props
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn prop_u64(props: &serde_json::Map<String, Value>, key: &str, default: u64) -> u64 {
    match props.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as u64))
            .unwrap_or(default),
        _ => default,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
