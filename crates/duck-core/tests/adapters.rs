mod support;

use std::sync::Arc;

use duck_core::adapter::{AwsAdapter, K8sAdapter};
use duck_core::error::ChaosError;
use duck_core::safety::EmergencyStop;

use support::{pods_for_app, MockAws, MockK8s};

fn k8s_adapter(engine: Arc<MockK8s>) -> (K8sAdapter, Arc<EmergencyStop>) {
    let stop = Arc::new(EmergencyStop::new());
    (K8sAdapter::new(engine, Arc::clone(&stop)), stop)
}

fn aws_adapter(engine: Arc<MockAws>) -> (AwsAdapter, Arc<EmergencyStop>) {
    let stop = Arc::new(EmergencyStop::new());
    (AwsAdapter::new(engine, Arc::clone(&stop)), stop)
}

#[tokio::test]
async fn pod_delete_saves_specs_and_undo_recreates() {
    let mut pods = pods_for_app("nginx", 4);
    pods.extend(pods_for_app("redis", 6));
    let engine = Arc::new(MockK8s::new(pods));
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let outcome = adapter
        .pod_delete("default", Some("app=nginx"), 0.5, false)
        .await
        .map_err(|f| f.error)
        .unwrap();

    assert_eq!(outcome.effect["action"], "pod_delete");
    assert_eq!(outcome.effect["pods"].as_array().unwrap().len(), 4);
    assert_eq!(engine.calls.lock().unwrap().deleted.len(), 4);

    let undo = outcome.undo.unwrap();
    let result = undo().await.unwrap();
    assert_eq!(result["recreated"], 4);

    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.created.len(), 4);
    for manifest in &calls.created {
        assert!(manifest["metadata"].get("resourceVersion").is_none());
        assert!(manifest["metadata"].get("uid").is_none());
        assert!(manifest.get("status").is_none());
    }
}

#[tokio::test]
async fn pod_delete_rejects_excessive_blast_radius() {
    let mut pods = pods_for_app("nginx", 4);
    pods.extend(pods_for_app("redis", 6));
    let engine = Arc::new(MockK8s::new(pods));
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let failure = adapter
        .pod_delete("default", Some("app=nginx"), 0.3, false)
        .await
        .err()
        .unwrap();

    assert!(failure.error.to_string().contains("blast radius"));
    assert!(failure.partial.is_none());
    assert!(engine.calls.lock().unwrap().deleted.is_empty());
}

#[tokio::test]
async fn pod_delete_dry_run_plans_without_mutating() {
    let engine = Arc::new(MockK8s::new(pods_for_app("nginx", 2)));
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let outcome = adapter
        .pod_delete("default", Some("app=nginx"), 1.0, true)
        .await
        .map_err(|f| f.error)
        .unwrap();

    assert_eq!(outcome.effect["dry_run"], true);
    assert!(outcome.undo.is_none());
    assert!(engine.calls.lock().unwrap().deleted.is_empty());
}

#[tokio::test]
async fn pod_delete_partial_failure_covers_only_completed_steps() {
    let mut engine = MockK8s::new(pods_for_app("nginx", 3));
    engine.fail_delete_on = Some("nginx-1".to_string());
    let engine = Arc::new(engine);
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let failure = adapter
        .pod_delete("default", Some("app=nginx"), 1.0, false)
        .await
        .err()
        .unwrap();

    assert!(failure.error.to_string().contains("delete pod nginx-1"));
    let partial = failure.partial.unwrap();
    assert_eq!(partial.effect["partial_failure"], "nginx-1");
    assert_eq!(partial.effect["pods"].as_array().unwrap().len(), 1);

    let undo = partial.undo.unwrap();
    let result = undo().await.unwrap();
    assert_eq!(result["recreated"], 1);
    assert_eq!(
        engine.calls.lock().unwrap().created[0]["metadata"]["name"],
        "nginx-0"
    );
}

#[tokio::test]
async fn pod_delete_failure_before_any_mutation_has_no_undo() {
    let mut engine = MockK8s::new(pods_for_app("nginx", 2));
    engine.fail_delete_on = Some("nginx-0".to_string());
    let engine = Arc::new(engine);
    let (adapter, _) = k8s_adapter(engine);

    let failure = adapter
        .pod_delete("default", Some("app=nginx"), 1.0, false)
        .await
        .err()
        .unwrap();
    assert!(failure.partial.is_none());
}

#[tokio::test]
async fn emergency_stop_blocks_mutation_before_any_engine_call() {
    let engine = Arc::new(MockK8s::new(pods_for_app("nginx", 3)));
    let (adapter, stop) = k8s_adapter(Arc::clone(&engine));
    stop.trigger();

    let failure = adapter
        .pod_delete("default", Some("app=nginx"), 1.0, false)
        .await
        .err()
        .unwrap();

    assert!(matches!(failure.error, ChaosError::EmergencyStop));
    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.list_calls, 0);
    assert!(calls.deleted.is_empty());
}

#[tokio::test]
async fn network_latency_adds_netem_and_undo_removes_it() {
    let engine = Arc::new(MockK8s::new(pods_for_app("api", 2)));
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let outcome = adapter
        .network_latency("default", Some("app=api"), 250, false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(outcome.effect["latency_ms"], 250);

    {
        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.execs.len(), 2);
        let (_, cmd) = &calls.execs[0];
        assert!(cmd.contains(&"netem".to_string()));
        assert!(cmd.contains(&"delay".to_string()));
        assert!(cmd.contains(&"250ms".to_string()));
    }

    let result = outcome.undo.unwrap()().await.unwrap();
    assert_eq!(result["removed_qdisc"], 2);
    let calls = engine.calls.lock().unwrap();
    let (_, last_cmd) = calls.execs.last().unwrap();
    assert!(last_cmd.contains(&"del".to_string()));
}

#[tokio::test]
async fn network_loss_partial_failure_undoes_injected_pods() {
    let mut engine = MockK8s::new(pods_for_app("api", 3));
    engine.fail_exec_on = Some("api-1".to_string());
    let engine = Arc::new(engine);
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let failure = adapter
        .network_loss("default", Some("app=api"), 30, false)
        .await
        .err()
        .unwrap();

    let partial = failure.partial.unwrap();
    assert_eq!(partial.effect["pods"].as_array().unwrap().len(), 1);
    partial.undo.unwrap()().await.unwrap();

    let calls = engine.calls.lock().unwrap();
    // One successful add on api-0, then its removal.
    assert_eq!(calls.execs.len(), 2);
    assert_eq!(calls.execs[1].0, "api-0");
}

#[tokio::test]
async fn cpu_stress_undo_kills_stress_ng() {
    let engine = Arc::new(MockK8s::new(pods_for_app("worker", 1)));
    let (adapter, _) = k8s_adapter(Arc::clone(&engine));

    let outcome = adapter
        .cpu_stress("default", Some("app=worker"), 2, 30, false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(outcome.effect["cores"], 2);

    {
        let calls = engine.calls.lock().unwrap();
        let (_, cmd) = &calls.execs[0];
        assert_eq!(cmd[0], "stress-ng");
        assert!(cmd.contains(&"--timeout".to_string()));
        assert!(cmd.contains(&"30s".to_string()));
    }

    outcome.undo.unwrap()().await.unwrap();
    let calls = engine.calls.lock().unwrap();
    let (_, kill_cmd) = calls.execs.last().unwrap();
    assert_eq!(kill_cmd[0], "pkill");
    assert!(kill_cmd.contains(&"stress-ng".to_string()));
}

#[tokio::test]
async fn ec2_stop_undo_restarts_instances() {
    let engine = Arc::new(MockAws::new());
    let (adapter, _) = aws_adapter(Arc::clone(&engine));
    let ids = vec!["i-0aa".to_string(), "i-0bb".to_string()];

    let outcome = adapter
        .ec2_stop(ids.clone(), false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(engine.calls.lock().unwrap().stopped, vec![ids.clone()]);

    let result = outcome.undo.unwrap()().await.unwrap();
    assert_eq!(result["started"].as_array().unwrap().len(), 2);
    assert_eq!(engine.calls.lock().unwrap().started, vec![ids]);
}

#[tokio::test]
async fn rds_failover_undo_is_a_self_healing_marker() {
    let engine = Arc::new(MockAws::new());
    let (adapter, _) = aws_adapter(Arc::clone(&engine));

    let outcome = adapter
        .rds_failover("aurora-main", false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(
        engine.calls.lock().unwrap().failovers,
        vec!["aurora-main".to_string()]
    );

    let result = outcome.undo.unwrap()().await.unwrap();
    assert!(result["note"].as_str().unwrap().contains("self-healing"));
}

#[tokio::test]
async fn route_blackhole_replaces_existing_route_and_restores_it() {
    let mut engine = MockAws::new();
    engine.existing_gateway = Some("igw-123".to_string());
    let engine = Arc::new(engine);
    let (adapter, _) = aws_adapter(Arc::clone(&engine));

    let outcome = adapter
        .route_blackhole("rtb-9", "10.0.0.0/16", false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(
        engine.calls.lock().unwrap().replaced_routes,
        vec![("rtb-9".to_string(), "10.0.0.0/16".to_string())]
    );

    outcome.undo.unwrap()().await.unwrap();
    let calls = engine.calls.lock().unwrap();
    assert_eq!(
        calls.deleted_routes,
        vec![("rtb-9".to_string(), "10.0.0.0/16".to_string())]
    );
    assert_eq!(
        calls.created_routes,
        vec![(
            "rtb-9".to_string(),
            "10.0.0.0/16".to_string(),
            Some("igw-123".to_string())
        )]
    );
}

#[tokio::test]
async fn route_blackhole_without_existing_route_creates_then_deletes() {
    let engine = Arc::new(MockAws::new());
    let (adapter, _) = aws_adapter(Arc::clone(&engine));

    let outcome = adapter
        .route_blackhole("rtb-9", "10.0.0.0/16", false)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(
        engine.calls.lock().unwrap().created_routes,
        vec![("rtb-9".to_string(), "10.0.0.0/16".to_string(), None)]
    );

    outcome.undo.unwrap()().await.unwrap();
    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.deleted_routes.len(), 1);
    // No original gateway, so nothing is recreated.
    assert_eq!(calls.created_routes.len(), 1);
}

#[tokio::test]
async fn aws_dry_run_never_touches_the_engine() {
    let engine = Arc::new(MockAws::new());
    let (adapter, _) = aws_adapter(Arc::clone(&engine));

    let outcome = adapter
        .ec2_stop(vec!["i-0aa".to_string()], true)
        .await
        .map_err(|f| f.error)
        .unwrap();
    assert_eq!(outcome.effect["dry_run"], true);
    assert!(outcome.undo.is_none());
    assert!(engine.calls.lock().unwrap().stopped.is_empty());
}
