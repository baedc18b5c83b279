use std::sync::Arc;

use serde_json::json;

use crate::adapter::{ChaosOutcome, InjectResult};
use crate::engine::AwsEngine;
use crate::error::ChaosError;
use crate::safety::{EmergencyStop, UndoFn};

/// AWS fault injection: EC2 stop, RDS failover, VPC route blackhole.
pub struct AwsAdapter {
    engine: Arc<dyn AwsEngine>,
    stop: Arc<EmergencyStop>,
}

impl AwsAdapter {
    pub fn new(engine: Arc<dyn AwsEngine>, stop: Arc<EmergencyStop>) -> Self {
        Self { engine, stop }
    }

    pub async fn ec2_stop(&self, instance_ids: Vec<String>, dry_run: bool) -> InjectResult {
        self.stop.check()?;

        if dry_run {
            return Ok(ChaosOutcome::plan(json!({
                "action": "ec2_stop",
                "instance_ids": instance_ids,
                "dry_run": true,
            })));
        }

        self.engine
            .stop_instances(&instance_ids)
            .await
            .map_err(|e| ChaosError::adapter("stop EC2 instances", e))?;
        tracing::info!(?instance_ids, "EC2 instances stopped");

        let effect = json!({ "action": "ec2_stop", "instance_ids": instance_ids.clone() });
        let engine = Arc::clone(&self.engine);
        let undo: UndoFn = Box::new(move || {
            Box::pin(async move {
                engine.start_instances(&instance_ids).await?;
                tracing::info!(?instance_ids, "EC2 instances started");
                Ok(json!({ "started": instance_ids }))
            })
        });
        Ok(ChaosOutcome::with_undo(effect, undo))
    }

    pub async fn rds_failover(&self, db_cluster_id: &str, dry_run: bool) -> InjectResult {
        self.stop.check()?;

        if dry_run {
            return Ok(ChaosOutcome::plan(json!({
                "action": "rds_failover",
                "db_cluster_id": db_cluster_id,
                "dry_run": true,
            })));
        }

        self.engine
            .failover_db_cluster(db_cluster_id)
            .await
            .map_err(|e| ChaosError::adapter("failover RDS cluster", e))?;
        tracing::info!(db_cluster_id, "RDS failover triggered");

        let effect = json!({ "action": "rds_failover", "db_cluster_id": db_cluster_id });
        // Failover converges on its own; the undo only records that.
        let undo: UndoFn = Box::new(move || {
            Box::pin(async move { Ok(json!({ "note": "RDS failover is self-healing" })) })
        });
        Ok(ChaosOutcome::with_undo(effect, undo))
    }

    /// Blackhole traffic for a CIDR in a route table. The original
    /// gateway, when one exists, is captured first so the undo can put the
    /// route back.
    pub async fn route_blackhole(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        dry_run: bool,
    ) -> InjectResult {
        self.stop.check()?;

        if dry_run {
            return Ok(ChaosOutcome::plan(json!({
                "action": "route_blackhole",
                "route_table_id": route_table_id,
                "destination_cidr": destination_cidr,
                "dry_run": true,
            })));
        }

        let original_gateway = self
            .engine
            .route_gateway(route_table_id, destination_cidr)
            .await
            .map_err(|e| ChaosError::adapter("describe route table", e))?;

        if original_gateway.is_some() {
            self.engine
                .replace_route_with_blackhole(route_table_id, destination_cidr)
                .await
                .map_err(|e| ChaosError::adapter("replace route with blackhole", e))?;
        } else {
            self.engine
                .create_route(route_table_id, destination_cidr, None)
                .await
                .map_err(|e| ChaosError::adapter("create blackhole route", e))?;
        }
        tracing::info!(route_table_id, destination_cidr, "blackhole route in place");

        let effect = json!({
            "action": "route_blackhole",
            "route_table_id": route_table_id,
            "destination_cidr": destination_cidr,
        });
        let engine = Arc::clone(&self.engine);
        let rt = route_table_id.to_string();
        let cidr = destination_cidr.to_string();
        let undo: UndoFn = Box::new(move || {
            Box::pin(async move {
                engine.delete_route(&rt, &cidr).await?;
                if let Some(gateway) = &original_gateway {
                    engine.create_route(&rt, &cidr, Some(gateway)).await?;
                }
                tracing::info!(route_table_id = %rt, destination_cidr = %cidr, "route restored");
                Ok(json!({ "restored": cidr }))
            })
        });
        Ok(ChaosOutcome::with_undo(effect, undo))
    }
}
