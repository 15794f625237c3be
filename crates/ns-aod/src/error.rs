//! Error types for the AOD rewriter.

use std::path::PathBuf;

use thiserror::Error;

/// AOD rewriter error type.
///
/// Only [`AodError::StoreOpen`] and [`AodError::Config`] are fatal for a
/// rewrite run; every other variant is handled at table or batch level and
/// degrades to a passthrough copy.
#[derive(Error, Debug)]
pub enum AodError {
    /// Input store unreadable, or output store not creatable.
    #[error("cannot open store {path}: {source}")]
    StoreOpen {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A batch has no dimension table.
    #[error("batch '{0}' has no dimension table")]
    MissingDimensionTable(String),

    /// The dimension table has no rows, so no foreign key can be resolved.
    #[error("dimension table '{0}' is empty")]
    EmptyDimensionTable(String),

    /// The dimension key column is absent or not an integer column.
    #[error("dimension table '{table}': key column '{column}' {reason}")]
    KeyColumn {
        /// Dimension table name.
        table: String,
        /// Expected key column name.
        column: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A column whose Arrow type is outside the supported kind set.
    #[error("table '{table}': column '{column}' has unsupported type {data_type}")]
    UnsupportedColumnType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Display form of the Arrow data type (plus detail).
        data_type: String,
    },

    /// A variable-length column was bound without a prescanned capacity.
    #[error("column '{0}': no maximum row length supplied before binding")]
    MissingCapacity(String),

    /// A rewritten integer does not fit the destination column kind.
    #[error("column '{column}': value {value} does not fit {kind}")]
    ValueOutOfRange {
        /// Column name.
        column: String,
        /// Offending value.
        value: i128,
        /// Destination kind name.
        kind: &'static str,
    },

    /// Flags table not positionally aligned with the dimension table.
    #[error("flags table '{table}' has {rows} rows, dimension table has {expected}")]
    MisalignedFlags {
        /// Flags table name.
        table: String,
        /// Flags row count.
        rows: usize,
        /// Dimension row count.
        expected: usize,
    },

    /// Unreadable or invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Parquet read/write error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AodError>;
