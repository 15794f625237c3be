//! `aod-rewrite`: whole-store BC deduplication and foreign-key reindexing.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use ns_aod::{RewriteConfig, RewriteReport, rewrite_store};

/// Load a JSON config, or the defaults when no path is given.
pub fn load_config(path: Option<&PathBuf>) -> Result<RewriteConfig> {
    let Some(path) = path else {
        return Ok(RewriteConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RewriteConfig::from_json_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

pub fn cmd_rewrite(
    input: &Path,
    output: &Path,
    config: Option<&PathBuf>,
    report: Option<&PathBuf>,
) -> Result<()> {
    let config = load_config(config)?;
    tracing::info!(input = %input.display(), output = %output.display(), "rewriting store");

    let summary = rewrite_store(input, output, &config)
        .with_context(|| format!("failed to rewrite {} into {}", input.display(), output.display()))?;
    log_summary(&summary);
    write_report(report, &summary)
}

fn log_summary(report: &RewriteReport) {
    let tables: usize = report.batches.iter().map(|b| b.tables.len()).sum();
    tracing::info!(
        batches = report.batches.len(),
        tables,
        carried_over = report.carried_over.len(),
        "rewrite finished"
    );
    if report.degraded_batches() > 0 || report.degraded_tables() > 0 {
        tracing::warn!(
            batches = report.degraded_batches(),
            tables = report.degraded_tables(),
            "some entries were copied unchanged"
        );
    }
    if !report.failed_copies.is_empty() {
        tracing::error!(entries = ?report.failed_copies, "entries could not be copied");
    }
}

fn write_report(output: Option<&PathBuf>, report: &RewriteReport) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    if let Some(path) = output {
        std::fs::write(path, text)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    } else {
        println!("{text}");
    }
    Ok(())
}
