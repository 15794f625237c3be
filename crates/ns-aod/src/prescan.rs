//! Read-only pass bounding the row length of variable-length columns.
//!
//! Destination array columns declare their capacity before the first row is
//! written, so every count column is scanned once up front.

use std::collections::BTreeMap;

use arrow::array::AsArray;
use arrow::record_batch::RecordBatch;

use crate::kind::{ColumnKind, ScalarKind, read_int};

/// Longest row of the variable-length column `data` sized by `count`.
///
/// A row's length is its count value. Rows with a null count fall back to the
/// number of elements stored in `data`; negative counts contribute 0.
pub fn scan_row_lengths(
    table: &RecordBatch,
    data: usize,
    count: usize,
    count_kind: ScalarKind,
) -> usize {
    let counts = table.column(count);
    let lists = table.columns().get(data).and_then(|c| c.as_list_opt::<i32>());
    (0..table.num_rows())
        .map(|row| match read_int(counts.as_ref(), count_kind, row) {
            Some(n) => usize::try_from(n).unwrap_or(if n < 0 { 0 } else { usize::MAX }),
            None => lists.map_or(0, |l| l.value_length(row).max(0) as usize),
        })
        .max()
        .unwrap_or(0)
}

/// Capacity for the variable-length column at schema index `data`.
///
/// The scanned maximum when non-zero; otherwise the declared domain maximum,
/// otherwise 1.
pub fn max_len(table: &RecordBatch, data: usize, kind: &ColumnKind) -> Option<usize> {
    let ColumnKind::VarArray { count, count_kind, declared_max, .. } = *kind else {
        return None;
    };
    Some(capacity(scan_row_lengths(table, data, count, count_kind), declared_max))
}

fn capacity(scanned: usize, declared_max: Option<usize>) -> usize {
    match scanned {
        0 => declared_max.filter(|&m| m > 0).unwrap_or(1),
        n => n,
    }
}

/// Capacities for every variable-length column of a table, keyed by the data
/// column's schema index.
pub fn prescan(table: &RecordBatch, kinds: &[(usize, ColumnKind)]) -> BTreeMap<usize, usize> {
    let mut out = BTreeMap::new();
    for (index, kind) in kinds {
        if let Some(len) = max_len(table, *index, kind) {
            log::debug!("prescan: column {index} max row length {len}");
            out.insert(*index, len);
        }
    }
    out
}
