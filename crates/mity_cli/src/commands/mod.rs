//! CLI command definitions.
//!
//! This module defines the command structure for the mITyFactory CLI.
//! Each subcommand loads a synthesis config and drives the IaC core.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mity_iac::{SynthesisConfig, SynthesisRun};

pub mod graph;
pub mod synth;
pub mod validate;

/// mITyFactory - multi-environment infrastructure synthesis
#[derive(Parser)]
#[command(name = "mity")]
#[command(version, about = "mITyFactory - multi-environment infrastructure synthesis")]
#[command(long_about = r#"
Synthesizes one resource graph per environment from a shared composition
template and emits compliant declarative artifacts.

WORKFLOWS:
  synth     → Synthesize and write artifacts for every environment
  validate  → Check naming and tagging invariants across the run
  graph     → Show one environment's resource order and edges

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Validation failure
  5 - IaC composition error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize artifacts for every environment
    Synth(synth::SynthArgs),

    /// Validate naming and tagging invariants
    Validate(validate::ValidateArgs),

    /// Print an environment's resource graph
    Graph(graph::GraphArgs),
}

/// Load a config file or directory and synthesize every environment in it.
pub(crate) fn load_run(config: &Path) -> Result<SynthesisRun> {
    let loaded = SynthesisConfig::load(config)
        .with_context(|| format!("Failed to load configuration from {}", config.display()))?;
    let run = SynthesisRun::synthesize(&loaded.environments, loaded.defaults)?;
    Ok(run)
}
