//! Closed set of column kinds the engine knows how to copy.
//!
//! Every supported primitive is one [`ScalarKind`] variant, and the mapping to
//! concrete Arrow types lives in one exhaustive match ([`with_numeric_type!`]).
//! Which kinds a run accepts is an explicit [`KindSet`] value handed to every
//! function that binds or resolves columns.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Int8Array, Int16Array, Int32Array, Int64Array, UInt8Array,
    UInt16Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::{
    DataType, Field, Int8Type, Int16Type, Int32Type, Int64Type, Schema, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use serde::{Deserialize, Serialize};

use crate::error::{AodError, Result};

/// Field metadata key naming the count column of a variable-length array.
pub const META_KEY_COUNT: &str = "aod.count";

/// Field metadata key holding the declared maximum row length of a
/// variable-length array.
pub const META_KEY_MAX_LEN: &str = "aod.max_len";

/// Primitive scalar kind (maps to one Arrow primitive type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// `Boolean`.
    Bool,
    /// `Int8`.
    I8,
    /// `Int16`.
    I16,
    /// `Int32`.
    I32,
    /// `Int64`.
    I64,
    /// `UInt8`.
    U8,
    /// `UInt16`.
    U16,
    /// `UInt32`.
    U32,
    /// `UInt64`.
    U64,
    /// `Float32`.
    F32,
    /// `Float64`.
    F64,
}

impl ScalarKind {
    /// All kinds, in declaration order.
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::Bool,
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
        ScalarKind::F32,
        ScalarKind::F64,
    ];

    /// Map an Arrow data type to a kind. `None` for anything outside the closed set.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => ScalarKind::Bool,
            DataType::Int8 => ScalarKind::I8,
            DataType::Int16 => ScalarKind::I16,
            DataType::Int32 => ScalarKind::I32,
            DataType::Int64 => ScalarKind::I64,
            DataType::UInt8 => ScalarKind::U8,
            DataType::UInt16 => ScalarKind::U16,
            DataType::UInt32 => ScalarKind::U32,
            DataType::UInt64 => ScalarKind::U64,
            DataType::Float32 => ScalarKind::F32,
            DataType::Float64 => ScalarKind::F64,
            _ => return None,
        })
    }

    /// Arrow data type of this kind.
    pub fn data_type(self) -> DataType {
        match self {
            ScalarKind::Bool => DataType::Boolean,
            ScalarKind::I8 => DataType::Int8,
            ScalarKind::I16 => DataType::Int16,
            ScalarKind::I32 => DataType::Int32,
            ScalarKind::I64 => DataType::Int64,
            ScalarKind::U8 => DataType::UInt8,
            ScalarKind::U16 => DataType::UInt16,
            ScalarKind::U32 => DataType::UInt32,
            ScalarKind::U64 => DataType::UInt64,
            ScalarKind::F32 => DataType::Float32,
            ScalarKind::F64 => DataType::Float64,
        }
    }

    /// Short lowercase name (also the serde form).
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }

    /// Size in bytes of one element.
    pub fn byte_size(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    /// Signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        !matches!(self, ScalarKind::Bool | ScalarKind::F32 | ScalarKind::F64)
    }

    /// Signed integer (able to hold a negative sentinel).
    pub fn is_signed_integer(self) -> bool {
        matches!(self, ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Binds `$ty` to the Arrow primitive type of a numeric [`ScalarKind`] and
/// evaluates `$body`; `Bool` (not an Arrow primitive) evaluates `$bool_arm`.
///
/// Adding a kind means adding one arm here and one variant above.
macro_rules! with_numeric_type {
    ($kind:expr, |$ty:ident| $body:expr, bool => $bool_arm:expr $(,)?) => {
        match $kind {
            $crate::kind::ScalarKind::Bool => $bool_arm,
            $crate::kind::ScalarKind::I8 => {
                type $ty = arrow::datatypes::Int8Type;
                $body
            }
            $crate::kind::ScalarKind::I16 => {
                type $ty = arrow::datatypes::Int16Type;
                $body
            }
            $crate::kind::ScalarKind::I32 => {
                type $ty = arrow::datatypes::Int32Type;
                $body
            }
            $crate::kind::ScalarKind::I64 => {
                type $ty = arrow::datatypes::Int64Type;
                $body
            }
            $crate::kind::ScalarKind::U8 => {
                type $ty = arrow::datatypes::UInt8Type;
                $body
            }
            $crate::kind::ScalarKind::U16 => {
                type $ty = arrow::datatypes::UInt16Type;
                $body
            }
            $crate::kind::ScalarKind::U32 => {
                type $ty = arrow::datatypes::UInt32Type;
                $body
            }
            $crate::kind::ScalarKind::U64 => {
                type $ty = arrow::datatypes::UInt64Type;
                $body
            }
            $crate::kind::ScalarKind::F32 => {
                type $ty = arrow::datatypes::Float32Type;
                $body
            }
            $crate::kind::ScalarKind::F64 => {
                type $ty = arrow::datatypes::Float64Type;
                $body
            }
        }
    };
}

pub(crate) use with_numeric_type;

/// Set of scalar kinds accepted by a run.
///
/// Serializes as a list of kind names, e.g. `["i32", "u64", "f32"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ScalarKind>", into = "Vec<ScalarKind>")]
pub struct KindSet {
    mask: u16,
}

impl KindSet {
    /// Every [`ScalarKind`].
    pub fn all() -> Self {
        Self::from_kinds(ScalarKind::ALL)
    }

    /// No kinds at all.
    pub fn empty() -> Self {
        Self { mask: 0 }
    }

    /// Build from an explicit list of kinds.
    pub fn from_kinds(kinds: impl IntoIterator<Item = ScalarKind>) -> Self {
        Self { mask: kinds.into_iter().fold(0, |m, k| m | k.bit()) }
    }

    /// Copy of `self` with `kind` removed.
    pub fn without(self, kind: ScalarKind) -> Self {
        Self { mask: self.mask & !kind.bit() }
    }

    /// Membership test.
    pub fn contains(&self, kind: ScalarKind) -> bool {
        self.mask & kind.bit() != 0
    }

    /// Iterate members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = ScalarKind> + '_ {
        ScalarKind::ALL.into_iter().filter(|k| self.contains(*k))
    }

    /// Resolve the shape of column `index` of `schema`.
    ///
    /// Fails with [`AodError::UnsupportedColumnType`] when the column (or, for
    /// arrays, its element or count column) falls outside this set.
    pub fn resolve_column(&self, table: &str, schema: &Schema, index: usize) -> Result<ColumnKind> {
        let field = schema.field(index);
        let unsupported = |detail: &str| AodError::UnsupportedColumnType {
            table: table.to_string(),
            column: field.name().clone(),
            data_type: if detail.is_empty() {
                field.data_type().to_string()
            } else {
                format!("{} ({detail})", field.data_type())
            },
        };

        match field.data_type() {
            DataType::List(item) => {
                let elem = self.numeric_element(item).ok_or_else(|| unsupported("element"))?;
                let count_name = field
                    .metadata()
                    .get(META_KEY_COUNT)
                    .ok_or_else(|| unsupported("no count column declared"))?;
                let count = schema
                    .index_of(count_name)
                    .map_err(|_| unsupported(&format!("count column '{count_name}' missing")))?;
                let count_kind = ScalarKind::from_data_type(schema.field(count).data_type())
                    .filter(|k| k.is_integer() && self.contains(*k))
                    .ok_or_else(|| unsupported(&format!("count column '{count_name}'")))?;
                let declared_max =
                    field.metadata().get(META_KEY_MAX_LEN).and_then(|v| v.parse::<usize>().ok());
                Ok(ColumnKind::VarArray { elem, count, count_kind, declared_max })
            }
            DataType::FixedSizeList(item, len) => {
                let elem = self.numeric_element(item).ok_or_else(|| unsupported("element"))?;
                Ok(ColumnKind::FixedArray { elem, len: *len as usize })
            }
            other => ScalarKind::from_data_type(other)
                .filter(|k| self.contains(*k))
                .map(ColumnKind::Scalar)
                .ok_or_else(|| unsupported("")),
        }
    }

    fn numeric_element(&self, item: &Field) -> Option<ScalarKind> {
        ScalarKind::from_data_type(item.data_type())
            .filter(|k| *k != ScalarKind::Bool && self.contains(*k))
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Vec<ScalarKind>> for KindSet {
    fn from(kinds: Vec<ScalarKind>) -> Self {
        Self::from_kinds(kinds)
    }
}

impl From<KindSet> for Vec<ScalarKind> {
    fn from(set: KindSet) -> Self {
        set.iter().collect()
    }
}

/// Shape of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// One primitive per row.
    Scalar(ScalarKind),
    /// `len` primitives per row.
    FixedArray {
        /// Element kind.
        elem: ScalarKind,
        /// Elements per row.
        len: usize,
    },
    /// Variable-length array whose per-row length lives in a count column.
    VarArray {
        /// Element kind.
        elem: ScalarKind,
        /// Schema index of the count column.
        count: usize,
        /// Kind of the count column (always an integer).
        count_kind: ScalarKind,
        /// Declared domain maximum from field metadata, if any.
        declared_max: Option<usize>,
    },
}

impl ColumnKind {
    /// `true` for [`ColumnKind::Scalar`].
    pub fn is_scalar(&self) -> bool {
        matches!(self, ColumnKind::Scalar(_))
    }
}

// ── Integer columns as wide values ─────────────────────────────

/// Read row `row` of an integer column losslessly. `None` for null rows and
/// non-integer kinds.
pub(crate) fn read_int(array: &dyn Array, kind: ScalarKind, row: usize) -> Option<i128> {
    if array.is_null(row) {
        return None;
    }
    Some(match kind {
        ScalarKind::I8 => array.as_primitive::<Int8Type>().value(row) as i128,
        ScalarKind::I16 => array.as_primitive::<Int16Type>().value(row) as i128,
        ScalarKind::I32 => array.as_primitive::<Int32Type>().value(row) as i128,
        ScalarKind::I64 => array.as_primitive::<Int64Type>().value(row) as i128,
        ScalarKind::U8 => array.as_primitive::<UInt8Type>().value(row) as i128,
        ScalarKind::U16 => array.as_primitive::<UInt16Type>().value(row) as i128,
        ScalarKind::U32 => array.as_primitive::<UInt32Type>().value(row) as i128,
        ScalarKind::U64 => array.as_primitive::<UInt64Type>().value(row) as i128,
        ScalarKind::Bool | ScalarKind::F32 | ScalarKind::F64 => return None,
    })
}

/// Output buffer for an integer column written from wide values.
///
/// Values are narrowed to the column kind on [`IntColumnBuilder::finish`]; a
/// value that does not fit is an [`AodError::ValueOutOfRange`].
#[derive(Debug)]
pub(crate) struct IntColumnBuilder {
    kind: ScalarKind,
    values: Vec<Option<i128>>,
}

macro_rules! narrow {
    ($values:expr, $native:ty, $array:ty, $column:expr, $kind:expr) => {{
        let out = $values
            .into_iter()
            .map(|v| {
                v.map(|x| {
                    <$native>::try_from(x).map_err(|_| AodError::ValueOutOfRange {
                        column: $column.to_string(),
                        value: x,
                        kind: $kind.name(),
                    })
                })
                .transpose()
            })
            .collect::<Result<Vec<Option<$native>>>>()?;
        Arc::new(<$array>::from(out)) as ArrayRef
    }};
}

impl IntColumnBuilder {
    pub(crate) fn new(kind: ScalarKind, capacity: usize) -> Self {
        debug_assert!(kind.is_integer());
        Self { kind, values: Vec::with_capacity(capacity) }
    }

    pub(crate) fn append(&mut self, value: Option<i128>) {
        self.values.push(value);
    }

    pub(crate) fn finish(self, column: &str) -> Result<ArrayRef> {
        let kind = self.kind;
        let values = self.values;
        Ok(match kind {
            ScalarKind::I8 => narrow!(values, i8, Int8Array, column, kind),
            ScalarKind::I16 => narrow!(values, i16, Int16Array, column, kind),
            ScalarKind::I32 => narrow!(values, i32, Int32Array, column, kind),
            ScalarKind::I64 => narrow!(values, i64, Int64Array, column, kind),
            ScalarKind::U8 => narrow!(values, u8, UInt8Array, column, kind),
            ScalarKind::U16 => narrow!(values, u16, UInt16Array, column, kind),
            ScalarKind::U32 => narrow!(values, u32, UInt32Array, column, kind),
            ScalarKind::U64 => narrow!(values, u64, UInt64Array, column, kind),
            ScalarKind::Bool | ScalarKind::F32 | ScalarKind::F64 => {
                return Err(AodError::UnsupportedColumnType {
                    table: String::new(),
                    column: column.to_string(),
                    data_type: kind.data_type().to_string(),
                });
            }
        })
    }
}
