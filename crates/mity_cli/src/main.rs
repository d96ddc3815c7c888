//! mITyFactory CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Validation failure
//! - 5: IaC composition error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mity_iac::IacError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const IAC_ERROR: u8 = 5;
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mity=debug,warn"
    } else if cli.quiet {
        "warn"
    } else {
        "mity=info,warn"
    };

    // Logging may already be initialized; continue either way
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .try_init();

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Graph(args) => commands::graph::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<IacError>() {
        Some(IacError::NonCompliant(_)) => ExitCodes::VALIDATION_FAILURE,
        Some(err) if err.is_composition() => ExitCodes::IAC_ERROR,
        Some(err) if err.is_config() => ExitCodes::INVALID_ARGS,
        Some(IacError::EnvironmentNotFound(_) | IacError::Yaml(_) | IacError::Json(_) | IacError::Toml(_)) => {
            ExitCodes::INVALID_ARGS
        }
        _ => ExitCodes::GENERAL_ERROR,
    }
}
