//! Validate command - Check naming and tagging invariants.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use mity_iac::IacError;

use super::load_run;

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file (.yaml, .json, .toml) or config directory
    #[arg(short, long)]
    pub config: PathBuf,

    /// Print violations as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("Validating {}", args.config.display());

    let run = load_run(&args.config)?;
    let result = run.validate();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("📋 Validating {} environment(s)...", run.environments().len());
        for env in run.environments() {
            println!(
                "   {} ({}): {} resource(s)",
                env.context.name,
                env.context.class,
                env.graph.len()
            );
        }
        println!();
    }

    if result.passed() {
        if !args.json {
            println!("✅ All naming and tagging invariants hold");
        }
        Ok(())
    } else {
        if !args.json {
            println!("❌ {} violation(s):", result.violations.len());
            println!("{}", result.report());
        }
        Err(IacError::NonCompliant(result).into())
    }
}
