use std::path::PathBuf;

use clap::Args;

use duck_core::experiment::ChaosKind;
use duck_core::params::{required_string_param, string_list_param};

use super::ExperimentFile;

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to config file to validate
    pub config: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    println!("Validating {}...", args.config.display());

    let file = ExperimentFile::from_file(&args.config)?;
    println!("  YAML parsing: OK");
    println!("  Experiments found: {}", file.experiments.len());

    let mut errors = Vec::new();

    for (i, experiment) in file.experiments.iter().enumerate() {
        println!("\n  Experiment #{}: '{}'", i + 1, experiment.name);
        println!("    Chaos type: {}", experiment.chaos_kind);
        println!("    Probes: {}", experiment.probes.len());

        if experiment.name.is_empty() {
            errors.push(format!("experiment #{}: name is empty", i + 1));
        }

        match experiment.safety.validate() {
            Ok(()) => println!("    Safety config: OK"),
            Err(e) => {
                println!("    Safety config: INVALID - {e}");
                errors.push(format!("experiment '{}': {e}", experiment.name));
            }
        }

        let param_check = match experiment.chaos_kind {
            ChaosKind::Ec2Stop => {
                if string_list_param(&experiment.parameters, "instance_ids").is_empty() {
                    Err("instance_ids is required".to_string())
                } else {
                    Ok(())
                }
            }
            ChaosKind::RdsFailover => {
                required_string_param(&experiment.parameters, "db_cluster_id")
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            ChaosKind::RouteBlackhole => {
                required_string_param(&experiment.parameters, "route_table_id")
                    .and_then(|_| required_string_param(&experiment.parameters, "destination_cidr"))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            _ => Ok(()),
        };
        match param_check {
            Ok(()) => println!("    Parameters: OK"),
            Err(e) => {
                println!("    Parameters: INVALID - {e}");
                errors.push(format!("experiment '{}': {e}", experiment.name));
            }
        }
    }

    println!();
    if errors.is_empty() {
        println!("Validation PASSED");
    } else {
        println!("Validation FAILED with {} error(s):", errors.len());
        for err in &errors {
            eprintln!("  - {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
