//! Graph command - Print an environment's resource graph.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::load_run;

#[derive(Args)]
pub struct GraphArgs {
    /// Config file (.yaml, .json, .toml) or config directory
    #[arg(short, long)]
    pub config: PathBuf,

    /// Environment to show
    #[arg(short, long)]
    pub env: String,

    /// Print the sealed graph as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: GraphArgs) -> Result<()> {
    let run = load_run(&args.config)?;
    let graph = run.graph(&args.env)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(graph)?);
        return Ok(());
    }

    println!("🏗️  {} ({} resource(s))", graph.environment(), graph.len());
    for (position, node) in graph.nodes().iter().enumerate() {
        let marker = if node.production_only { " [production-only]" } else { "" };
        println!(
            "{:>4}. {} <{}> {}{}",
            position + 1,
            node.logical_id,
            node.kind,
            node.physical_name,
            marker
        );
        if !node.depends_on.is_empty() {
            println!("        ← {}", node.depends_on.join(", "));
        }
    }

    if !graph.outputs().is_empty() {
        println!();
        println!("Outputs:");
        for output in graph.outputs() {
            println!("   {} = {} (export {})", output.name, output.value, output.export_name);
        }
    }
    Ok(())
}
