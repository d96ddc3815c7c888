//! Synth command - Synthesize infrastructure artifacts.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use mity_iac::{EmitOptions, Encoding, IacError};

use super::load_run;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

impl From<Format> for Encoding {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => Encoding::Json,
            Format::Yaml => Encoding::Yaml,
        }
    }
}

#[derive(Args)]
pub struct SynthArgs {
    /// Config file (.yaml, .json, .toml) or config directory
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory to write artifacts to
    #[arg(short, long, default_value = "out")]
    pub out: PathBuf,

    /// Only write artifacts for these environments (repeatable)
    #[arg(short, long = "env")]
    pub envs: Vec<String>,

    /// Artifact encoding
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Write a single artifact for the whole run
    #[arg(long)]
    pub combined: bool,

    /// Omit explicit DependsOn ordering hints
    #[arg(long)]
    pub no_depends_on: bool,
}

impl SynthArgs {
    fn emit_options(&self) -> EmitOptions {
        let mut options = EmitOptions {
            encoding: self.format.into(),
            environments: self.envs.clone(),
            ..EmitOptions::default()
        };
        if self.combined {
            options = options.combined();
        }
        if self.no_depends_on {
            options = options.without_depends_on();
        }
        options
    }
}

pub fn execute(args: SynthArgs) -> Result<()> {
    info!("Synthesizing from {}", args.config.display());

    let run = load_run(&args.config)?;

    // Validation spans every environment, even when only some are written
    let validation = run.validate();
    if !validation.passed() {
        println!("❌ {} violation(s):", validation.violations.len());
        println!("{}", validation.report());
        return Err(IacError::NonCompliant(validation).into());
    }

    let artifacts = run.emit(&args.emit_options())?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory {}", args.out.display()))?;
    for artifact in &artifacts {
        let path = args.out.join(&artifact.file_name);
        fs::write(&path, &artifact.content).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("   ✅ {}", path.display());
    }

    println!();
    println!(
        "✅ Synthesized {} environment(s) into {} artifact(s)",
        run.environments().len(),
        artifacts.len()
    );
    Ok(())
}
