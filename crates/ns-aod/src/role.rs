//! Table roles inside a batch, resolved once from names and schemas.

use arrow::datatypes::Schema;

use crate::config::RewriteConfig;

/// What the rewriter does with one table of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// The batch's key table: deduplicated and sorted.
    Dimension,
    /// Side table aligned with the dimension table's original rows.
    Flags,
    /// Table with a foreign key into the dimension table.
    Payload {
        /// Schema index of the foreign-key column.
        fk_column: usize,
    },
    /// Cloned unchanged.
    Passthrough,
}

/// `true` when `name` is `family` itself or a versioned member `family_<suffix>`.
pub fn in_family(name: &str, family: &str) -> bool {
    name.strip_prefix(family).is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
}

impl TableRole {
    /// Role of one table, ignoring the rest of the batch.
    pub fn of_table(name: &str, schema: &Schema, config: &RewriteConfig) -> Self {
        if in_family(name, &config.flags_table) {
            return TableRole::Flags;
        }
        if in_family(name, &config.dimension_table) {
            return TableRole::Dimension;
        }
        config
            .foreign_keys
            .iter()
            .find_map(|fk| schema.index_of(fk).ok())
            .map(|fk_column| TableRole::Payload { fk_column })
            .unwrap_or(TableRole::Passthrough)
    }
}

/// Resolve the role of every table of a batch.
///
/// `tables` is `(name, schema)` in batch order. Only the first dimension and
/// the first flags table keep their role; later ones are passed through.
pub fn resolve_roles(tables: &[(String, &Schema)], config: &RewriteConfig) -> Vec<TableRole> {
    let mut seen_dimension = false;
    let mut seen_flags = false;
    tables
        .iter()
        .map(|(name, schema)| match TableRole::of_table(name, schema, config) {
            TableRole::Dimension if seen_dimension => {
                log::warn!("extra dimension table '{name}' passed through unchanged");
                TableRole::Passthrough
            }
            TableRole::Flags if seen_flags => {
                log::warn!("extra flags table '{name}' passed through unchanged");
                TableRole::Passthrough
            }
            role => {
                seen_dimension |= role == TableRole::Dimension;
                seen_flags |= role == TableRole::Flags;
                role
            }
        })
        .collect()
}
