//! `aod-rewrite` CLI

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod rewrite;

#[derive(Parser)]
#[command(name = "aod-rewrite")]
#[command(about = "Deduplicate and reindex the BC tables of an AOD store")]
#[command(version)]
struct Cli {
    /// Input store (directory of DF_ batches)
    input: PathBuf,

    /// Output store; created if missing
    output: PathBuf,

    /// Rewrite configuration (JSON). Defaults to the standard AOD layout.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file for the rewrite report (pretty JSON). Defaults to stdout.
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the report
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    rewrite::cmd_rewrite(&cli.input, &cli.output, cli.config.as_ref(), cli.report.as_ref())
}
