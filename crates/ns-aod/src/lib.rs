//! # ns-aod
//!
//! Reindexing and deduplication engine for AOD table batches.
//!
//! A store is a directory of batches; each batch holds one dimension table
//! (ordered by a 64-bit key), an optional flags side table aligned with it,
//! and payload tables referencing dimension rows by ordinal. The rewriter
//! deduplicates and sorts the dimension keys, remaps every payload foreign key
//! to the new dense index, and stably resorts payload rows by it. Columns are
//! handled generically over a closed set of scalar kinds plus fixed-size and
//! variable-length arrays.
//!
//! ## Example
//!
//! ```no_run
//! use ns_aod::{RewriteConfig, rewrite_store};
//! use std::path::Path;
//!
//! let report = rewrite_store(Path::new("AO2D"), Path::new("AO2D_fixed"), &RewriteConfig::default())
//!     .unwrap();
//! for batch in &report.batches {
//!     println!("{}: {} -> {} keys", batch.name, batch.dimension_rows, batch.unique_keys);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binder;
pub mod config;
pub mod error;
pub mod key_index;
pub mod kind;
pub mod prescan;
pub mod rebuild;
pub mod reindex;
pub mod rewrite;
pub mod role;
pub mod store;


pub use binder::{BindMode, RowBinder, resolve_columns};
pub use config::RewriteConfig;
pub use error::{AodError, Result};
pub use key_index::{KeyIndex, KeyValue};
pub use kind::{ColumnKind, KindSet, META_KEY_COUNT, META_KEY_MAX_LEN, ScalarKind};
pub use prescan::{max_len, prescan};
pub use rebuild::{rebuild_dimension, rebuild_flags};
pub use reindex::{NewKey, ReindexStats, Reindexed, UNRESOLVED_KEY, reindex_payload};
pub use rewrite::{BatchReport, RewriteReport, TableAction, TableReport, rewrite_batch, rewrite_store};
pub use role::{TableRole, in_family, resolve_roles};
pub use store::{CompressionProfile, Store, StoreEntry, StoredTable, read_table, write_table};
