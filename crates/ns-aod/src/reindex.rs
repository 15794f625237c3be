//! Foreign-key reindexing and stable resorting of payload tables.
//!
//! Each payload row's old dimension ordinal is mapped through the batch's
//! [`KeyIndex`]. Rows are then stably sorted by the new ordinal, with rows
//! whose key cannot be resolved placed first, and streamed through a
//! [`RowBinder`] that overwrites only the foreign-key value.

use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::binder::{BindMode, RowBinder, resolve_columns};
use crate::error::{AodError, Result};
use crate::key_index::KeyIndex;
use crate::kind::{ColumnKind, KindSet, read_int};
use crate::prescan::prescan;

/// Foreign-key value written for rows whose key could not be resolved.
pub const UNRESOLVED_KEY: i128 = -1;

/// New dense dimension ordinal of a payload row.
///
/// `Unresolved` orders before every resolved key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NewKey {
    /// Old value outside the dimension table (or null).
    Unresolved,
    /// New dense ordinal.
    Resolved(usize),
}

impl NewKey {
    /// Value written to the foreign-key column.
    pub fn value(self) -> i128 {
        match self {
            NewKey::Unresolved => UNRESOLVED_KEY,
            NewKey::Resolved(n) => n as i128,
        }
    }
}

/// Map old foreign-key values (in row order) to new keys.
pub fn classify(old: &[Option<i128>], index: &KeyIndex) -> Vec<NewKey> {
    old.iter()
        .map(|v| v.and_then(|v| index.resolve(v)).map_or(NewKey::Unresolved, NewKey::Resolved))
        .collect()
}

/// Row order sorted by new key; rows sharing a key keep their original order.
pub fn sort_order(keys: &[NewKey]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_key(|&i| keys[i]);
    order
}

/// Per-table diagnostics of a reindex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexStats {
    /// Rows in (and out of) the table.
    pub rows: usize,
    /// Rows whose foreign-key value changed.
    pub changed: usize,
    /// Rows written with [`UNRESOLVED_KEY`].
    pub unresolved: usize,
    /// Variable-length counts clamped to their prescanned capacity.
    pub clamped: usize,
}

/// A rewritten payload table.
#[derive(Debug, Clone)]
pub struct Reindexed {
    /// Rewritten table: same schema and row count, rows in new-key order.
    pub table: RecordBatch,
    /// Diagnostics.
    pub stats: ReindexStats,
}

/// Rewrite one payload table against the batch's key index.
///
/// Any unsupported column (the foreign key included) fails the whole table
/// with [`AodError::UnsupportedColumnType`]; the caller passes it through.
pub fn reindex_payload(
    kinds: &KindSet,
    name: &str,
    table: &RecordBatch,
    fk_column: usize,
    index: &KeyIndex,
) -> Result<Reindexed> {
    let columns = resolve_columns(kinds, name, &table.schema(), BindMode::Strict)?;
    let capacities = prescan(table, &columns);
    let mut binder = RowBinder::bind(name, table, &columns, Some(fk_column), &capacities)?;

    let fk_kind = match columns.iter().find(|(i, _)| *i == fk_column) {
        Some((_, ColumnKind::Scalar(k))) => *k,
        _ => {
            return Err(AodError::UnsupportedColumnType {
                table: name.to_string(),
                column: table.schema().field(fk_column).name().clone(),
                data_type: "foreign key not bound".to_string(),
            });
        }
    };

    let fk = table.column(fk_column);
    let old: Vec<Option<i128>> =
        (0..table.num_rows()).map(|row| read_int(fk.as_ref(), fk_kind, row)).collect();
    let keys = classify(&old, index);

    let mut stats = ReindexStats { rows: table.num_rows(), ..Default::default() };
    for row in sort_order(&keys) {
        let value = keys[row].value();
        if old[row] != Some(value) {
            stats.changed += 1;
        }
        if keys[row] == NewKey::Unresolved {
            stats.unresolved += 1;
        }
        binder.copy_row(row, Some(value));
    }
    stats.clamped = binder.clamped_counts();
    let table = binder.finish()?;

    log::info!("table '{name}': {} of {} foreign keys changed", stats.changed, stats.rows);
    if stats.unresolved > 0 {
        log::warn!(
            "table '{name}': {} rows reference no dimension row; kept first with key {UNRESOLVED_KEY}",
            stats.unresolved
        );
    }
    if stats.clamped > 0 {
        log::error!(
            "table '{name}': {} array lengths exceeded their prescanned capacity and were clamped",
            stats.clamped
        );
    }
    Ok(Reindexed { table, stats })
}
