//! Dense, ordered index over a dimension table's key column.

use arrow::record_batch::RecordBatch;

use crate::error::{AodError, Result};
use crate::kind::{ScalarKind, read_int};

/// Key value as read from the dimension table. `None` is a null key, which
/// orders before every non-null key.
pub type KeyValue = Option<i128>;

/// Old-ordinal → new-ordinal map built from a dimension table's keys.
///
/// Row ordinals are stable-sorted by key; the first occurrence of a key wins
/// its dense slot and later duplicates map onto the same slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndex {
    index_map: Vec<usize>,
    unique_keys: Vec<KeyValue>,
    contributors: Vec<Vec<usize>>,
}

impl KeyIndex {
    /// Build from raw keys in original row order.
    pub fn build(keys: &[KeyValue]) -> Self {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        // `sort_by_key` is stable: equal keys keep ascending row order.
        order.sort_by_key(|&i| keys[i]);

        let mut index_map = vec![0usize; keys.len()];
        let mut unique_keys: Vec<KeyValue> = Vec::new();
        let mut contributors: Vec<Vec<usize>> = Vec::new();

        for old in order {
            let key = keys[old];
            if unique_keys.last() != Some(&key) {
                unique_keys.push(key);
                contributors.push(Vec::new());
            }
            let new = unique_keys.len() - 1;
            index_map[old] = new;
            contributors[new].push(old);
        }

        Self { index_map, unique_keys, contributors }
    }

    /// Build from the key column of a dimension table.
    pub fn from_table(table_name: &str, table: &RecordBatch, key_column: &str) -> Result<Self> {
        let key_error = |reason: String| AodError::KeyColumn {
            table: table_name.to_string(),
            column: key_column.to_string(),
            reason,
        };
        let schema = table.schema();
        let idx = schema.index_of(key_column).map_err(|_| key_error("is missing".into()))?;
        let kind = ScalarKind::from_data_type(schema.field(idx).data_type())
            .filter(|k| k.is_integer())
            .ok_or_else(|| {
                key_error(format!("has non-integer type {}", schema.field(idx).data_type()))
            })?;

        let column = table.column(idx);
        let keys: Vec<KeyValue> =
            (0..table.num_rows()).map(|row| read_int(column.as_ref(), kind, row)).collect();
        if keys.iter().any(Option::is_none) {
            log::warn!(
                "dimension table '{table_name}': null values in key column '{key_column}' sort first"
            );
        }
        Ok(Self::build(&keys))
    }

    /// Number of original dimension rows.
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    /// `true` when built from zero rows.
    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// Number of distinct keys (rows of the rebuilt dimension table).
    pub fn unique_len(&self) -> usize {
        self.unique_keys.len()
    }

    /// Old ordinal → new dense ordinal.
    pub fn index_map(&self) -> &[usize] {
        &self.index_map
    }

    /// Resolve an old ordinal; `None` when outside `0..len()`.
    pub fn resolve(&self, old: i128) -> Option<usize> {
        usize::try_from(old).ok().and_then(|i| self.index_map.get(i).copied())
    }

    /// Distinct keys, ascending.
    pub fn unique_keys(&self) -> &[KeyValue] {
        &self.unique_keys
    }

    /// Original ordinals that collapsed into new ordinal `new`, in row order.
    /// `None` when `new` is not below [`KeyIndex::unique_len`].
    pub fn contributors(&self, new: usize) -> Option<&[usize]> {
        self.contributors.get(new).map(Vec::as_slice)
    }

    /// First contributor of every new ordinal, in new-ordinal order.
    pub fn representatives(&self) -> Vec<usize> {
        self.contributors.iter().map(|c| c[0]).collect()
    }

    /// `true` when keys were already unique and ascending (the map is the identity).
    pub fn is_identity(&self) -> bool {
        self.index_map.iter().enumerate().all(|(old, &new)| old == new)
    }
}
