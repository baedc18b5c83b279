use clap::Subcommand;
use serde::Deserialize;

use duck_core::experiment::ExperimentConfig;

pub mod kinds;
pub mod run;
pub mod validate;

#[derive(Subcommand)]
pub enum Commands {
    /// Run chaos experiments from a config file
    Run(run::RunArgs),
    /// Validate a config file without executing
    Validate(validate::ValidateArgs),
    /// List supported chaos kinds and their parameters
    Kinds(kinds::KindsArgs),
}

/// Top-level config file structure.
#[derive(Debug, Deserialize)]
pub struct ExperimentFile {
    pub experiments: Vec<ExperimentConfig>,
}

impl ExperimentFile {
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
