//! Directory-structured table store backed by Parquet files.
//!
//! ```text
//! <store>/
//!   DF_<id>/              batch (directory-name prefix)
//!     O2bc_001.parquet    one table per file
//!     O2bcflag.parquet
//!     O2track.parquet
//!     ...                 anything else is a non-tabular object
//!   metaData.json         top-level entries outside batches
//! ```
//!
//! Tables are read whole into a single [`RecordBatch`]. The per-column
//! compression codecs of the source file are captured so the rewritten file
//! can be written with the same settings.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::metadata::ParquetMetaData;
use parquet::file::properties::WriterProperties;
use parquet::schema::types::ColumnPath;

use crate::error::{AodError, Result};

/// Root directory of a store.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

/// Top-level entry of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEntry {
    /// Batch directory.
    Batch(BatchDir),
    /// Anything else (file or directory), carried over unchanged.
    Other {
        /// Entry name.
        name: String,
        /// Full path.
        path: PathBuf,
    },
}

/// A batch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDir {
    /// Directory name, e.g. `DF_2853`.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
}

/// A table file inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFile {
    /// Table name (file stem).
    pub name: String,
    /// Full path.
    pub path: PathBuf,
}

/// Contents of a batch directory.
#[derive(Debug, Clone, Default)]
pub struct BatchContents {
    /// Table files, by name.
    pub tables: Vec<TableFile>,
    /// Non-tabular entries, by name.
    pub others: Vec<(String, PathBuf)>,
}

impl Store {
    /// Open an existing store directory.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |source| AodError::StoreOpen { path: path.to_path_buf(), source };
        let meta = fs::metadata(path).map_err(open_err)?;
        if !meta.is_dir() {
            return Err(open_err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "store root is not a directory",
            )));
        }
        fs::read_dir(path).map_err(open_err)?;
        Ok(Self { root: path.to_path_buf() })
    }

    /// Reject a destination that is this store, lies inside it, or contains it.
    ///
    /// Paths are compared after resolving symlinks and relative components, so
    /// the destination does not have to exist yet.
    pub fn ensure_disjoint(&self, dest: &Path) -> Result<()> {
        let err = |path: &Path, source| AodError::StoreOpen { path: path.to_path_buf(), source };
        let src = resolve_path(&self.root).map_err(|e| err(&self.root, e))?;
        let dst = resolve_path(dest).map_err(|e| err(dest, e))?;
        if dst.starts_with(&src) || src.starts_with(&dst) {
            return Err(err(
                dest,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("output store overlaps input store {}", self.root.display()),
                ),
            ));
        }
        Ok(())
    }

    /// Create (or reuse) a destination store directory.
    pub fn create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .map_err(|source| AodError::StoreOpen { path: path.to_path_buf(), source })?;
        Ok(Self { root: path.to_path_buf() })
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Top-level entries in name order; directories named `batch_prefix*` are batches.
    pub fn entries(&self, batch_prefix: &str) -> Result<Vec<StoreEntry>> {
        let listing = sorted_listing(&self.root)
            .map_err(|source| AodError::StoreOpen { path: self.root.clone(), source })?;
        Ok(listing
            .into_iter()
            .map(|(name, path, is_dir)| {
                if is_dir && name.starts_with(batch_prefix) {
                    StoreEntry::Batch(BatchDir { name, path })
                } else {
                    StoreEntry::Other { name, path }
                }
            })
            .collect())
    }
}

impl BatchDir {
    /// Split the batch into table files (`*.<extension>`) and other entries.
    pub fn contents(&self, extension: &str) -> Result<BatchContents> {
        let mut contents = BatchContents::default();
        for (name, path, is_dir) in sorted_listing(&self.path)? {
            let stem = (!is_dir && path.extension().is_some_and(|e| e == extension))
                .then(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .flatten();
            match stem {
                Some(stem) => contents.tables.push(TableFile { name: stem, path }),
                None => contents.others.push((name, path)),
            }
        }
        Ok(contents)
    }
}

/// Canonical form of `path`, whose trailing components may not exist yet.
fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(base) => return Ok(missing.iter().rev().fold(base, |p: PathBuf, c| p.join(c))),
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    }
}

fn sorted_listing(dir: &Path) -> std::io::Result<Vec<(String, PathBuf, bool)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        out.push((entry.file_name().to_string_lossy().into_owned(), entry.path(), is_dir));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

// ── Compression mirroring ──────────────────────────────────────

/// Compression codecs of a source Parquet file, per leaf column.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionProfile {
    default: Compression,
    columns: Vec<(ColumnPath, Compression)>,
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self { default: Compression::UNCOMPRESSED, columns: Vec::new() }
    }
}

impl CompressionProfile {
    /// Uniform codec for every column.
    pub fn uniform(compression: Compression) -> Self {
        Self { default: compression, columns: Vec::new() }
    }

    /// Capture the codecs of the first row group. Files without row groups
    /// yield the uncompressed default.
    pub fn from_metadata(metadata: &ParquetMetaData) -> Self {
        let Some(row_group) = metadata.row_groups().first() else {
            return Self::default();
        };
        let columns: Vec<(ColumnPath, Compression)> =
            row_group.columns().iter().map(|c| (c.column_path().clone(), c.compression())).collect();
        let default = columns.first().map(|(_, c)| *c).unwrap_or(Compression::UNCOMPRESSED);
        Self { default, columns }
    }

    /// Codec of the first column (or the uniform codec).
    pub fn default_compression(&self) -> Compression {
        self.default
    }

    /// Writer properties reproducing this profile.
    pub fn writer_properties(&self) -> WriterProperties {
        let mut builder = WriterProperties::builder().set_compression(self.default);
        for (path, compression) in &self.columns {
            builder = builder.set_column_compression(path.clone(), *compression);
        }
        builder.build()
    }
}

// ── Table I/O ──────────────────────────────────────────────────

/// A table read from the store.
#[derive(Debug, Clone)]
pub struct StoredTable {
    /// All rows of the file.
    pub data: RecordBatch,
    /// Codecs of the source file.
    pub compression: CompressionProfile,
}

/// Read only the Arrow schema of a table file.
pub fn read_schema(path: &Path) -> Result<SchemaRef> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().clone())
}

/// Read a whole table file.
pub fn read_table(path: &Path) -> Result<StoredTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let compression = CompressionProfile::from_metadata(builder.metadata());
    let reader = builder.build()?;
    let batches: std::result::Result<Vec<_>, _> = reader.collect();
    let data = concat_batches(&schema, &batches?)?;
    Ok(StoredTable { data, compression })
}

/// Write a table file with the given compression profile.
pub fn write_table(path: &Path, data: &RecordBatch, compression: &CompressionProfile) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, data.schema(), Some(compression.writer_properties()))?;
    writer.write(data)?;
    writer.close()?;
    Ok(())
}

/// Copy a file or directory tree byte-for-byte. Returns bytes copied.
pub fn clone_entry(src: &Path, dst: &Path) -> Result<u64> {
    if !fs::metadata(src)?.is_dir() {
        return Ok(fs::copy(src, dst)?);
    }
    fs::create_dir_all(dst)?;
    let mut total = 0;
    for (name, path, _) in sorted_listing(src)? {
        total += clone_entry(&path, &dst.join(name))?;
    }
    Ok(total)
}
