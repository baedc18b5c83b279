use clap::Args;

use duck_core::experiment::ChaosKind;

#[derive(Args)]
pub struct KindsArgs {}

pub async fn execute(_args: KindsArgs) -> anyhow::Result<()> {
    println!("{:<18} {:<12} PARAMETERS", "KIND", "TARGET");
    for kind in ChaosKind::ALL {
        let (target, params) = match kind {
            ChaosKind::PodDelete => ("kubernetes", "(none; pods selected by target_labels)"),
            ChaosKind::NetworkLatency => ("kubernetes", "latency_ms: int in [1, 60000]"),
            ChaosKind::NetworkLoss => ("kubernetes", "loss_percent: int in [1, 100]"),
            ChaosKind::CpuStress => ("kubernetes", "cores: int in [1, 64]"),
            ChaosKind::MemoryStress => ("kubernetes", "memory_bytes: string, e.g. \"256M\""),
            ChaosKind::Ec2Stop => ("aws", "instance_ids: [string]"),
            ChaosKind::RdsFailover => ("aws", "db_cluster_id: string"),
            ChaosKind::RouteBlackhole => {
                ("aws", "route_table_id: string, destination_cidr: string")
            }
        };
        println!("{:<18} {:<12} {params}", kind.as_str(), target);
    }
    Ok(())
}
