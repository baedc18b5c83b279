use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use duck_ai::DuckAiClient;
use duck_core::event::TracingResultSink;
use duck_core::experiment::Status;
use duck_core::metrics::RunnerMetrics;
use duck_core::runner::Runner;
use duck_core::safety::{EmergencyStop, RollbackStack, SnapshotStore};
use duck_core::store::ExperimentStore;
use duck_k8s::KubeEngine;
use duck_store::PostgresStore;

use super::ExperimentFile;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the experiment YAML config file
    pub config: PathBuf,

    /// Path to a kubeconfig; defaults to in-cluster or ~/.kube/config
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Base URL of the AI analysis service
    #[arg(long)]
    pub ai_url: Option<String>,

    /// Postgres URL for experiment persistence
    #[arg(long)]
    pub database_url: Option<String>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let file = ExperimentFile::from_file(&args.config)?;
    tracing::info!(experiments = file.experiments.len(), "loaded configuration");

    let stop = Arc::new(EmergencyStop::new());
    let rollback = Arc::new(RollbackStack::new());

    let store: Option<Arc<dyn ExperimentStore>> = match &args.database_url {
        Some(url) => match PostgresStore::connect(url).await {
            Ok(store) => {
                if let Err(e) = store.init_schema().await {
                    tracing::warn!(error = %e, "schema init failed, persistence disabled");
                    None
                } else {
                    Some(Arc::new(store))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "database unreachable, persistence disabled");
                None
            }
        },
        None => None,
    };

    let snapshots = Arc::new(match &store {
        Some(store) => SnapshotStore::with_store(Arc::clone(store)),
        None => SnapshotStore::new(),
    });

    let mut runner = Runner::new(stop, rollback, snapshots);

    match KubeEngine::connect(args.kubeconfig.as_deref()).await {
        Ok(engine) => runner = runner.with_k8s(Arc::new(engine)),
        Err(e) => tracing::warn!(error = %e, "no Kubernetes cluster reachable"),
    }

    if let Some(url) = &args.ai_url {
        match DuckAiClient::new(url.clone()) {
            Ok(client) => runner = runner.with_ai(Arc::new(client)),
            Err(e) => tracing::warn!(error = %e, "AI client unavailable"),
        }
    }

    if let Some(store) = store {
        runner = runner.with_store(store);
    }

    if let Ok(metrics) = RunnerMetrics::new() {
        runner = runner.with_metrics(Arc::new(metrics));
    }

    runner.add_result_sink(Arc::new(TracingResultSink));

    let mut failed = 0usize;
    for config in file.experiments {
        let name = config.name.clone();
        tracing::info!(experiment = %name, chaos_type = %config.chaos_kind, "starting experiment");

        let result = runner.run(config).await;
        println!("{}", serde_json::to_string_pretty(&result)?);

        if result.status != Status::Completed {
            failed += 1;
            tracing::error!(
                experiment = %name,
                status = %result.status,
                error = result.error.as_deref().unwrap_or(""),
                "experiment did not complete"
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} experiment(s) did not complete");
    }
    Ok(())
}
