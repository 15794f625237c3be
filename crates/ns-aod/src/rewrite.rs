//! Whole-store rewrite: batches one after another, tables one after another.
//!
//! Only failures to open the input store or create the output store (including
//! an output that overlaps the input) are returned as errors. Everything below
//! that is handled locally: a batch that cannot be reindexed is copied
//! unchanged, and so is a table that cannot be rewritten. The
//! [`RewriteReport`] (and the log) records what happened.

use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use serde::Serialize;

use crate::config::RewriteConfig;
use crate::error::{AodError, Result};
use crate::key_index::KeyIndex;
use crate::rebuild::{rebuild_dimension, rebuild_flags};
use crate::reindex::{ReindexStats, reindex_payload};
use crate::role::{TableRole, resolve_roles};
use crate::store::{
    BatchDir, Store, StoreEntry, TableFile, clone_entry, read_schema, read_table, write_table,
};

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableAction {
    /// Dimension or flags table deduplicated and sorted.
    Rebuilt,
    /// Payload table reindexed and resorted.
    Reindexed,
    /// Copied unchanged because it has no role in the rewrite.
    Passthrough,
    /// Copied unchanged because rewriting it failed.
    Degraded,
}

/// Per-table entry of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub name: String,
    /// Action taken.
    pub action: TableAction,
    /// Rows read (`None` when the table was not decoded).
    pub rows_in: Option<usize>,
    /// Rows written (`None` for byte copies).
    pub rows_out: Option<usize>,
    /// Reindex diagnostics for payload tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reindex: Option<ReindexStats>,
    /// Why the table was degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    fn copied(name: &str, action: TableAction, error: Option<String>) -> Self {
        Self { name: name.to_string(), action, rows_in: None, rows_out: None, reindex: None, error }
    }
}

/// Per-batch entry of a [`RewriteReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Batch directory name.
    pub name: String,
    /// Dimension table rows before deduplication.
    pub dimension_rows: usize,
    /// Distinct keys (dimension rows after deduplication).
    pub unique_keys: usize,
    /// `true` when the dimension keys were already unique and ascending.
    pub already_canonical: bool,
    /// Tables, in processing order.
    pub tables: Vec<TableReport>,
    /// Non-tabular entries copied unchanged.
    pub carried_over: Vec<String>,
    /// Set when the whole batch was copied unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Result of a [`rewrite_store`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    /// Batches, in name order.
    pub batches: Vec<BatchReport>,
    /// Top-level non-batch entries copied unchanged.
    pub carried_over: Vec<String>,
    /// Entries that could not even be copied.
    pub failed_copies: Vec<String>,
}

impl RewriteReport {
    /// Batches copied unchanged as a whole.
    pub fn degraded_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.degraded.is_some()).count()
    }

    /// Tables copied unchanged because rewriting them failed.
    pub fn degraded_tables(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|b| &b.tables)
            .filter(|t| t.action == TableAction::Degraded)
            .count()
    }
}

/// Rewrite every batch of the store at `input` into a new store at `output`.
pub fn rewrite_store(input: &Path, output: &Path, config: &RewriteConfig) -> Result<RewriteReport> {
    config.validate()?;
    let src = Store::open(input)?;
    src.ensure_disjoint(output)?;
    let dst = Store::create(output)?;
    log::info!("rewriting store {} -> {}", input.display(), output.display());

    let mut report = RewriteReport::default();
    for entry in src.entries(&config.batch_prefix)? {
        match entry {
            StoreEntry::Batch(batch) => {
                let out_dir = dst.root().join(&batch.name);
                report.batches.push(rewrite_batch(&batch, &out_dir, config));
            }
            StoreEntry::Other { name, path } => match clone_entry(&path, &dst.root().join(&name)) {
                Ok(_) => report.carried_over.push(name),
                Err(e) => {
                    log::error!("failed to copy '{name}': {e}");
                    report.failed_copies.push(name);
                }
            },
        }
    }

    log::info!(
        "rewrote {} batches ({} degraded, {} degraded tables)",
        report.batches.len(),
        report.degraded_batches(),
        report.degraded_tables()
    );
    Ok(report)
}

/// Rewrite one batch into `out_dir`; on batch-level failure, copy it unchanged.
pub fn rewrite_batch(batch: &BatchDir, out_dir: &Path, config: &RewriteConfig) -> BatchReport {
    let mut report = BatchReport { name: batch.name.clone(), ..Default::default() };
    if let Err(e) = try_rewrite_batch(batch, out_dir, config, &mut report) {
        log::error!("batch '{}': {e}; copying the batch unchanged", batch.name);
        report = BatchReport {
            name: batch.name.clone(),
            degraded: Some(e.to_string()),
            ..Default::default()
        };
        if let Err(e) = clone_entry(&batch.path, out_dir) {
            log::error!("batch '{}': passthrough copy failed: {e}", batch.name);
        }
    }
    report
}

/// One table file together with its resolved role.
struct RoledTable<'a> {
    file: &'a TableFile,
    role: TableRole,
}

fn try_rewrite_batch(
    batch: &BatchDir,
    out_dir: &Path,
    config: &RewriteConfig,
    report: &mut BatchReport,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let contents = batch.contents(&config.table_extension)?;

    // Roles are resolved once, from schemas only. Unreadable files pass through.
    let mut readable = Vec::with_capacity(contents.tables.len());
    let mut unreadable = Vec::new();
    for file in &contents.tables {
        match read_schema(&file.path) {
            Ok(schema) => readable.push((file, schema)),
            Err(e) => unreadable.push((file, e)),
        }
    }
    let named: Vec<(String, &Schema)> =
        readable.iter().map(|(f, s)| (f.name.clone(), s.as_ref())).collect();
    let tables: Vec<RoledTable<'_>> = readable
        .iter()
        .zip(resolve_roles(&named, config))
        .map(|((file, _), role)| RoledTable { file: *file, role })
        .collect();

    let dimension = tables
        .iter()
        .find(|t| t.role == TableRole::Dimension)
        .ok_or_else(|| AodError::MissingDimensionTable(batch.name.clone()))?;

    let dim = read_table(&dimension.file.path)?;
    let index = KeyIndex::from_table(&dimension.file.name, &dim.data, &config.key_column)?;
    if index.is_empty() {
        return Err(AodError::EmptyDimensionTable(dimension.file.name.clone()));
    }
    report.dimension_rows = index.len();
    report.unique_keys = index.unique_len();
    report.already_canonical = index.is_identity();

    let rebuilt = rebuild_dimension(&config.kinds, &dimension.file.name, &dim.data, &index)?;
    write_table(&out_path(out_dir, dimension.file), &rebuilt, &dim.compression)?;
    report.tables.push(TableReport {
        name: dimension.file.name.clone(),
        action: TableAction::Rebuilt,
        rows_in: Some(dim.data.num_rows()),
        rows_out: Some(rebuilt.num_rows()),
        reindex: None,
        error: None,
    });
    drop(dim);

    for table in &tables {
        let file = table.file;
        let entry = match table.role {
            TableRole::Dimension => continue,
            TableRole::Flags => rewrite_flags(file, out_dir, config, &index),
            TableRole::Payload { fk_column } => {
                rewrite_payload(file, fk_column, out_dir, config, &index)
            }
            TableRole::Passthrough => {
                log::debug!("table '{}' has no foreign key; copied unchanged", file.name);
                copy_table(file, out_dir, TableAction::Passthrough, None)
            }
        };
        report.tables.push(entry);
    }

    for (file, e) in unreadable {
        log::error!("table '{}' unreadable: {e}; copied unchanged", file.name);
        report.tables.push(copy_table(file, out_dir, TableAction::Degraded, Some(e.to_string())));
    }

    for (name, path) in &contents.others {
        clone_entry(path, &out_dir.join(name))?;
        report.carried_over.push(name.clone());
    }
    Ok(())
}

fn rewrite_flags(
    file: &TableFile,
    out_dir: &Path,
    config: &RewriteConfig,
    index: &KeyIndex,
) -> TableReport {
    let result = read_table(&file.path).and_then(|flags| {
        let rebuilt = rebuild_flags(&config.kinds, &file.name, &flags.data, index)?;
        write_table(&out_path(out_dir, file), &rebuilt, &flags.compression)?;
        Ok((flags.data.num_rows(), rebuilt.num_rows()))
    });
    match result {
        Ok((rows_in, rows_out)) => TableReport {
            name: file.name.clone(),
            action: TableAction::Rebuilt,
            rows_in: Some(rows_in),
            rows_out: Some(rows_out),
            reindex: None,
            error: None,
        },
        Err(e) => degrade(file, out_dir, e),
    }
}

fn rewrite_payload(
    file: &TableFile,
    fk_column: usize,
    out_dir: &Path,
    config: &RewriteConfig,
    index: &KeyIndex,
) -> TableReport {
    let result = read_table(&file.path).and_then(|payload| {
        let out = reindex_payload(&config.kinds, &file.name, &payload.data, fk_column, index)?;
        write_table(&out_path(out_dir, file), &out.table, &payload.compression)?;
        Ok(out.stats)
    });
    match result {
        Ok(stats) => TableReport {
            name: file.name.clone(),
            action: TableAction::Reindexed,
            rows_in: Some(stats.rows),
            rows_out: Some(stats.rows),
            reindex: Some(stats),
            error: None,
        },
        Err(e) => degrade(file, out_dir, e),
    }
}

fn degrade(file: &TableFile, out_dir: &Path, e: AodError) -> TableReport {
    log::error!("table '{}': {e}; copied unchanged", file.name);
    copy_table(file, out_dir, TableAction::Degraded, Some(e.to_string()))
}

fn copy_table(
    file: &TableFile,
    out_dir: &Path,
    action: TableAction,
    error: Option<String>,
) -> TableReport {
    let dst = out_path(out_dir, file);
    match clone_entry(&file.path, &dst) {
        Ok(_) => TableReport::copied(&file.name, action, error),
        Err(e) => {
            log::error!("table '{}': copy to {} failed: {e}", file.name, dst.display());
            TableReport::copied(&file.name, TableAction::Degraded, Some(e.to_string()))
        }
    }
}

fn out_path(out_dir: &Path, file: &TableFile) -> PathBuf {
    out_dir.join(file.path.file_name().unwrap_or(file.name.as_ref()))
}
