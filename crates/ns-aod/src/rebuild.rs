//! Rebuild the dimension table and its flags side table from a [`KeyIndex`].
//!
//! Both tables are re-sliced to one representative original row per distinct
//! key (the first contributor), in ascending key order.

use std::collections::BTreeMap;

use arrow::record_batch::RecordBatch;

use crate::binder::{BindMode, RowBinder, resolve_columns};
use crate::error::{AodError, Result};
use crate::key_index::KeyIndex;
use crate::kind::KindSet;

/// Deduplicated, key-ordered copy of the dimension table.
pub fn rebuild_dimension(
    kinds: &KindSet,
    name: &str,
    table: &RecordBatch,
    index: &KeyIndex,
) -> Result<RecordBatch> {
    let out = reslice(kinds, name, table, &index.representatives())?;
    log::info!(
        "dimension table '{name}': {} rows -> {} unique keys",
        table.num_rows(),
        out.num_rows()
    );
    Ok(out)
}

/// Flags table re-sliced to the dimension table's representative rows.
///
/// The flags table must be positionally aligned with the original dimension
/// table; otherwise [`AodError::MisalignedFlags`].
pub fn rebuild_flags(
    kinds: &KindSet,
    name: &str,
    flags: &RecordBatch,
    index: &KeyIndex,
) -> Result<RecordBatch> {
    if flags.num_rows() != index.len() {
        return Err(AodError::MisalignedFlags {
            table: name.to_string(),
            rows: flags.num_rows(),
            expected: index.len(),
        });
    }
    reslice(kinds, name, flags, &index.representatives())
}

fn reslice(kinds: &KindSet, name: &str, table: &RecordBatch, rows: &[usize]) -> Result<RecordBatch> {
    let columns = resolve_columns(kinds, name, &table.schema(), BindMode::ScalarsOnly)?;
    let mut binder = RowBinder::bind(name, table, &columns, None, &BTreeMap::new())?;
    for &row in rows {
        binder.copy_row(row, None);
    }
    binder.finish()
}
