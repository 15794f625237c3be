//! Row-at-a-time column binding between a source table and its rewritten copy.
//!
//! [`RowBinder`] owns one buffer per destination column. Copying a row means
//! reading the source row into every buffer, optionally overwriting the
//! foreign-key buffer, and committing the buffers as the next destination row.
//! Rows may be visited in any order, which is how the reindex engine emits a
//! table in its new sort order.
//!
//! Buffers and output builders live inside the binder and are dropped with it,
//! whether the copy loop finishes, bails out on an unsupported column, or
//! propagates an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, ArrowPrimitiveType, AsArray, BooleanArray, BooleanBuilder,
    FixedSizeListArray, FixedSizeListBuilder, ListArray, ListBuilder, PrimitiveArray,
    PrimitiveBuilder,
};
use arrow::datatypes::{DataType, FieldRef, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{AodError, Result};
use crate::kind::{ColumnKind, IntColumnBuilder, KindSet, ScalarKind, read_int, with_numeric_type};

/// Which column shapes a table may bind, and what happens to the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Dimension and flags tables: scalar columns only. Anything else is
    /// logged and left out of the destination.
    ScalarsOnly,
    /// Payload tables: every column must bind, otherwise binding fails.
    Strict,
}

/// Resolve the columns of `schema` that will be bound under `mode`.
///
/// Returns `(schema index, kind)` pairs in schema order. In
/// [`BindMode::Strict`] the first unsupported column is an error.
pub fn resolve_columns(
    kinds: &KindSet,
    table: &str,
    schema: &Schema,
    mode: BindMode,
) -> Result<Vec<(usize, ColumnKind)>> {
    let mut out = Vec::with_capacity(schema.fields().len());
    for index in 0..schema.fields().len() {
        match (kinds.resolve_column(table, schema, index), mode) {
            (Ok(kind), BindMode::Strict) => out.push((index, kind)),
            (Ok(kind), BindMode::ScalarsOnly) if kind.is_scalar() => out.push((index, kind)),
            (Ok(_), BindMode::ScalarsOnly) => log::error!(
                "table '{table}': array column '{}' not allowed here; column skipped",
                schema.field(index).name()
            ),
            (Err(e), BindMode::Strict) => return Err(e),
            (Err(e), BindMode::ScalarsOnly) => log::error!("{e}; column skipped"),
        }
    }
    Ok(out)
}

// ── Slots ──────────────────────────────────────────────────────

/// One bound column: a source reference, a one-row buffer, and a builder.
trait ColumnSlot {
    /// Load source row `row` into the buffer.
    fn read(&mut self, row: usize);
    /// Append the buffer as the next destination row.
    fn commit(&mut self);
    /// Rows whose value was clamped while reading.
    fn clamped(&self) -> usize {
        0
    }
    /// Finish the destination column.
    fn finish(self: Box<Self>) -> Result<ArrayRef>;
}

struct PrimitiveSlot<'a, T: ArrowPrimitiveType> {
    src: &'a PrimitiveArray<T>,
    buffer: Option<T::Native>,
    out: PrimitiveBuilder<T>,
}

impl<'a, T: ArrowPrimitiveType> PrimitiveSlot<'a, T> {
    fn new(src: &'a ArrayRef, rows: usize) -> Self {
        Self { src: src.as_primitive::<T>(), buffer: None, out: PrimitiveBuilder::with_capacity(rows) }
    }
}

impl<T: ArrowPrimitiveType> ColumnSlot for PrimitiveSlot<'_, T> {
    fn read(&mut self, row: usize) {
        self.buffer = if self.src.is_null(row) { None } else { Some(self.src.value(row)) };
    }

    fn commit(&mut self) {
        self.out.append_option(self.buffer);
    }

    fn finish(mut self: Box<Self>) -> Result<ArrayRef> {
        Ok(Arc::new(self.out.finish()))
    }
}

struct BooleanSlot<'a> {
    src: &'a BooleanArray,
    buffer: Option<bool>,
    out: BooleanBuilder,
}

impl ColumnSlot for BooleanSlot<'_> {
    fn read(&mut self, row: usize) {
        self.buffer = if self.src.is_null(row) { None } else { Some(self.src.value(row)) };
    }

    fn commit(&mut self) {
        self.out.append_option(self.buffer);
    }

    fn finish(mut self: Box<Self>) -> Result<ArrayRef> {
        Ok(Arc::new(self.out.finish()))
    }
}

struct FixedArraySlot<'a, T: ArrowPrimitiveType> {
    src: &'a FixedSizeListArray,
    values: &'a PrimitiveArray<T>,
    len: usize,
    valid: bool,
    buffer: Vec<Option<T::Native>>,
    out: FixedSizeListBuilder<PrimitiveBuilder<T>>,
}

impl<'a, T: ArrowPrimitiveType> FixedArraySlot<'a, T> {
    fn new(src: &'a ArrayRef, item: &FieldRef, len: usize, rows: usize) -> Self {
        let src = src.as_fixed_size_list();
        let values = src.values().as_primitive::<T>();
        let builder = PrimitiveBuilder::<T>::with_capacity(rows * len);
        Self {
            src,
            values,
            len,
            valid: false,
            buffer: Vec::with_capacity(len),
            out: FixedSizeListBuilder::with_capacity(builder, len as i32, rows)
                .with_field(item.clone()),
        }
    }
}

impl<T: ArrowPrimitiveType> ColumnSlot for FixedArraySlot<'_, T> {
    fn read(&mut self, row: usize) {
        self.valid = !self.src.is_null(row);
        let start = self.src.value_offset(row) as usize;
        self.buffer.clear();
        self.buffer.extend((start..start + self.len).map(|i| {
            if self.values.is_null(i) { None } else { Some(self.values.value(i)) }
        }));
    }

    fn commit(&mut self) {
        for v in &self.buffer {
            self.out.values().append_option(*v);
        }
        self.out.append(self.valid);
    }

    fn finish(mut self: Box<Self>) -> Result<ArrayRef> {
        Ok(Arc::new(self.out.finish()))
    }
}

/// Data half of a variable-length array. The per-row length comes from the
/// count column, clamped to the prescanned capacity.
struct VarArraySlot<'a, T: ArrowPrimitiveType> {
    name: String,
    src: &'a ListArray,
    values: &'a PrimitiveArray<T>,
    count_src: &'a dyn Array,
    count_kind: ScalarKind,
    max_len: usize,
    valid: bool,
    clamped: usize,
    buffer: Vec<Option<T::Native>>,
    out: ListBuilder<PrimitiveBuilder<T>>,
}

impl<'a, T: ArrowPrimitiveType> VarArraySlot<'a, T> {
    fn new(
        name: &str,
        src: &'a ArrayRef,
        item: &FieldRef,
        count_src: &'a ArrayRef,
        count_kind: ScalarKind,
        max_len: usize,
        rows: usize,
    ) -> Self {
        let src = src.as_list::<i32>();
        let values = src.values().as_primitive::<T>();
        let builder = PrimitiveBuilder::<T>::with_capacity(values.len());
        Self {
            name: name.to_string(),
            src,
            values,
            count_src: count_src.as_ref(),
            count_kind,
            max_len,
            valid: false,
            clamped: 0,
            buffer: Vec::with_capacity(max_len.min(values.len())),
            out: ListBuilder::with_capacity(builder, rows).with_field(item.clone()),
        }
    }
}

impl<T: ArrowPrimitiveType> ColumnSlot for VarArraySlot<'_, T> {
    fn read(&mut self, row: usize) {
        self.valid = !self.src.is_null(row);
        let offsets = self.src.value_offsets();
        let start = offsets[row] as usize;
        let stored = offsets[row + 1] as usize - start;

        // Counts above the capacity are clamped and tallied by the count slot.
        let wanted = match read_int(self.count_src, self.count_kind, row) {
            Some(n) => usize::try_from(n.max(0)).unwrap_or(usize::MAX).min(self.max_len),
            None => {
                if stored > self.max_len {
                    log::warn!(
                        "column '{}': row {row} has a null count and {stored} stored elements, \
                         more than the prescanned maximum {}; clamped",
                        self.name,
                        self.max_len
                    );
                    self.clamped += 1;
                }
                stored.min(self.max_len)
            }
        };
        if wanted > stored {
            log::warn!(
                "column '{}': row {row} declares {wanted} elements but stores {stored}; \
                 writing the stored elements",
                self.name
            );
        } else if wanted < stored {
            log::warn!(
                "column '{}': row {row} declares {wanted} elements but stores {stored}; \
                 dropping the trailing {} elements",
                self.name,
                stored - wanted
            );
        }
        let n = wanted.min(stored);

        self.buffer.clear();
        self.buffer.extend((start..start + n).map(|i| {
            if self.values.is_null(i) { None } else { Some(self.values.value(i)) }
        }));
    }

    fn commit(&mut self) {
        for v in &self.buffer {
            self.out.values().append_option(*v);
        }
        self.out.append(self.valid);
    }

    fn clamped(&self) -> usize {
        self.clamped
    }

    fn finish(mut self: Box<Self>) -> Result<ArrayRef> {
        Ok(Arc::new(self.out.finish()))
    }
}

/// Count half of a variable-length array.
struct CountSlot<'a> {
    name: String,
    src: &'a dyn Array,
    kind: ScalarKind,
    max_len: usize,
    buffer: Option<i128>,
    clamped: usize,
    out: IntColumnBuilder,
}

impl ColumnSlot for CountSlot<'_> {
    fn read(&mut self, row: usize) {
        self.buffer = read_int(self.src, self.kind, row);
        if let Some(n) = self.buffer {
            if n > self.max_len as i128 {
                log::warn!(
                    "count column '{}': row {row} has {n} elements, more than the prescanned \
                     maximum {}; clamped (input is likely corrupt)",
                    self.name,
                    self.max_len
                );
                self.buffer = Some(self.max_len as i128);
                self.clamped += 1;
            }
        }
    }

    fn commit(&mut self) {
        self.out.append(self.buffer);
    }

    fn clamped(&self) -> usize {
        self.clamped
    }

    fn finish(self: Box<Self>) -> Result<ArrayRef> {
        let this = *self;
        this.out.finish(&this.name)
    }
}

/// Foreign-key column: copied like an integer, but its buffer can be
/// overwritten between read and commit.
struct KeySlot<'a> {
    name: String,
    src: &'a dyn Array,
    kind: ScalarKind,
    buffer: Option<i128>,
    out: IntColumnBuilder,
}

impl KeySlot<'_> {
    fn read(&mut self, row: usize) {
        self.buffer = read_int(self.src, self.kind, row);
    }

    fn overwrite(&mut self, value: i128) {
        self.buffer = Some(value);
    }

    fn commit(&mut self) {
        self.out.append(self.buffer);
    }
}

// ── Binder ─────────────────────────────────────────────────────

/// Copies rows of one source table into a new table with the same (or, in
/// [`BindMode::ScalarsOnly`], a column-projected) schema.
pub struct RowBinder<'a> {
    schema: SchemaRef,
    slots: Vec<(usize, Box<dyn ColumnSlot + 'a>)>,
    key: Option<(usize, KeySlot<'a>)>,
    rows: usize,
}

impl<'a> RowBinder<'a> {
    /// Bind `columns` (as returned by [`resolve_columns`]) of `source`.
    ///
    /// `key_column` names the schema index of the foreign-key column, which
    /// must be a signed integer. `capacities` must hold the prescanned maximum
    /// row length of every variable-length column, keyed by schema index.
    pub fn bind(
        table: &str,
        source: &'a RecordBatch,
        columns: &[(usize, ColumnKind)],
        key_column: Option<usize>,
        capacities: &BTreeMap<usize, usize>,
    ) -> Result<Self> {
        let schema = source.schema();
        let rows = source.num_rows();

        // Count columns take the largest capacity among the arrays they size.
        let mut count_caps: BTreeMap<usize, usize> = BTreeMap::new();
        for (index, kind) in columns {
            if let ColumnKind::VarArray { count, .. } = kind {
                let cap = *capacities
                    .get(index)
                    .ok_or_else(|| AodError::MissingCapacity(schema.field(*index).name().clone()))?;
                let slot = count_caps.entry(*count).or_insert(0);
                *slot = (*slot).max(cap);
            }
        }

        let mut fields = Vec::with_capacity(columns.len());
        let mut slots: Vec<(usize, Box<dyn ColumnSlot + 'a>)> = Vec::with_capacity(columns.len());
        let mut key = None;

        for (pos, &(index, kind)) in columns.iter().enumerate() {
            let field = schema.field(index);
            let name = field.name();
            let array = source.column(index);
            fields.push(field.clone());

            if key_column == Some(index) {
                let kind = match kind {
                    ColumnKind::Scalar(k) if k.is_signed_integer() => k,
                    _ => {
                        return Err(AodError::UnsupportedColumnType {
                            table: table.to_string(),
                            column: name.clone(),
                            data_type: format!(
                                "{} (foreign key must be a signed integer)",
                                field.data_type()
                            ),
                        });
                    }
                };
                let slot = KeySlot {
                    name: name.clone(),
                    src: array.as_ref(),
                    kind,
                    buffer: None,
                    out: IntColumnBuilder::new(kind, rows),
                };
                key = Some((pos, slot));
                continue;
            }

            let slot: Box<dyn ColumnSlot + 'a> = match kind {
                ColumnKind::Scalar(k) if count_caps.contains_key(&index) => Box::new(CountSlot {
                    name: name.clone(),
                    src: array.as_ref(),
                    kind: k,
                    max_len: count_caps[&index],
                    buffer: None,
                    clamped: 0,
                    out: IntColumnBuilder::new(k, rows),
                }),
                ColumnKind::Scalar(k) => with_numeric_type!(
                    k,
                    |T| Box::new(PrimitiveSlot::<T>::new(array, rows)),
                    bool => Box::new(BooleanSlot {
                        src: array.as_boolean(),
                        buffer: None,
                        out: BooleanBuilder::with_capacity(rows),
                    }),
                ),
                ColumnKind::FixedArray { elem, len } => {
                    let item = list_item(field.data_type());
                    with_numeric_type!(
                        elem,
                        |T| Box::new(FixedArraySlot::<T>::new(array, &item, len, rows)),
                        bool => return Err(unsupported_element(table, name, field.data_type())),
                    )
                }
                ColumnKind::VarArray { elem, count, count_kind, .. } => {
                    let item = list_item(field.data_type());
                    let max_len = capacities[&index];
                    let count_src = source.column(count);
                    with_numeric_type!(
                        elem,
                        |T| Box::new(VarArraySlot::<T>::new(
                            name, array, &item, count_src, count_kind, max_len, rows
                        )),
                        bool => return Err(unsupported_element(table, name, field.data_type())),
                    )
                }
            };
            slots.push((pos, slot));
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        Ok(Self { schema, slots, key, rows: 0 })
    }

    /// Destination schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// `true` when a foreign-key column is bound.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Copy source row `row` as the next destination row. When `key` is set
    /// and a foreign-key column is bound, its value replaces the source value.
    pub fn copy_row(&mut self, row: usize, key: Option<i128>) {
        for (_, slot) in &mut self.slots {
            slot.read(row);
        }
        if let Some((_, slot)) = &mut self.key {
            slot.read(row);
            if let Some(value) = key {
                slot.overwrite(value);
            }
        }

        for (_, slot) in &mut self.slots {
            slot.commit();
        }
        if let Some((_, slot)) = &mut self.key {
            slot.commit();
        }
        self.rows += 1;
    }

    /// Array rows clamped to their prescanned capacity so far.
    pub fn clamped_counts(&self) -> usize {
        self.slots.iter().map(|(_, s)| s.clamped()).sum()
    }

    /// Assemble the destination table.
    pub fn finish(self) -> Result<RecordBatch> {
        let mut arrays: Vec<Option<ArrayRef>> = vec![None; self.schema.fields().len()];
        for (pos, slot) in self.slots {
            arrays[pos] = Some(slot.finish()?);
        }
        if let Some((pos, slot)) = self.key {
            arrays[pos] = Some(slot.out.finish(&slot.name)?);
        }
        let arrays: Vec<ArrayRef> = arrays.into_iter().flatten().collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows));
        Ok(RecordBatch::try_new_with_options(self.schema, arrays, &options)?)
    }
}

fn list_item(data_type: &DataType) -> FieldRef {
    match data_type {
        DataType::List(item) | DataType::FixedSizeList(item, _) => item.clone(),
        other => unreachable!("list_item called on {other}"),
    }
}

fn unsupported_element(table: &str, column: &str, data_type: &DataType) -> AodError {
    AodError::UnsupportedColumnType {
        table: table.to_string(),
        column: column.to_string(),
        data_type: format!("{data_type} (boolean elements)"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use arrow::array::{Float32Builder, Int32Array, UInt8Array, UInt16Array};
    use arrow::datatypes::{Field, Float32Type, Int16Type, UInt8Type};

    use super::*;
    use crate::kind::{META_KEY_COUNT, ScalarKind};
    use crate::prescan::prescan;

    /// `fN: u8`, `fPt: list<f32>` sized by `fN`, `fFlag: bool`.
    fn vla_table(counts: &[u8], data: &[&[f32]]) -> RecordBatch {
        let item = Arc::new(Field::new_list_field(DataType::Float32, true));
        let pt = Field::new("fPt", DataType::List(item.clone()), false)
            .with_metadata(HashMap::from([(META_KEY_COUNT.to_string(), "fN".to_string())]));
        let schema = Arc::new(Schema::new(vec![
            Field::new("fN", DataType::UInt8, false),
            pt,
            Field::new("fFlag", DataType::Boolean, true),
        ]));

        let mut lists = ListBuilder::new(Float32Builder::new()).with_field(item);
        for row in data {
            for v in *row {
                lists.values().append_value(*v);
            }
            lists.append(true);
        }
        let flags: BooleanArray = (0..counts.len()).map(|i| Some(i % 2 == 0)).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt8Array::from(counts.to_vec())),
                Arc::new(lists.finish()),
                Arc::new(flags),
            ],
        )
        .unwrap()
    }

    fn list_row(batch: &RecordBatch, col: usize, row: usize) -> Vec<f32> {
        let list = batch.column(col).as_list::<i32>();
        list.value(row).as_primitive::<Float32Type>().values().to_vec()
    }

    #[test]
    fn test_copy_in_custom_order_preserves_schema() {
        let src = vla_table(&[1, 2], &[&[1.0], &[2.0, 3.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let caps = BTreeMap::from([(1, 2)]);
        let mut binder = RowBinder::bind("t", &src, &columns, None, &caps).unwrap();
        binder.copy_row(1, None);
        binder.copy_row(0, None);
        let out = binder.finish().unwrap();

        assert_eq!(out.schema(), src.schema());
        assert_eq!(out.column(0).as_primitive::<UInt8Type>().values().to_vec(), vec![2, 1]);
        assert_eq!(list_row(&out, 1, 0), vec![2.0, 3.0]);
        assert_eq!(list_row(&out, 1, 1), vec![1.0]);
        assert!(!out.column(2).as_boolean().value(0));
    }

    #[test]
    fn test_count_above_capacity_is_clamped() {
        let src = vla_table(&[6, 2], &[&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[7.0, 8.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let caps = BTreeMap::from([(1, 4)]);
        let mut binder = RowBinder::bind("t", &src, &columns, None, &caps).unwrap();
        binder.copy_row(0, None);
        binder.copy_row(1, None);
        assert_eq!(binder.clamped_counts(), 1);
        let out = binder.finish().unwrap();

        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.column(0).as_primitive::<UInt8Type>().values().to_vec(), vec![4, 2]);
        assert_eq!(list_row(&out, 1, 0), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(list_row(&out, 1, 1), vec![7.0, 8.0]);
    }

    #[test]
    fn test_missing_capacity_is_an_error() {
        let src = vla_table(&[1], &[&[1.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let err = RowBinder::bind("t", &src, &columns, None, &BTreeMap::new()).err().unwrap();
        assert!(matches!(err, AodError::MissingCapacity(ref c) if c == "fPt"));
    }

    #[test]
    fn test_scalars_only_skips_arrays() {
        let src = vla_table(&[1], &[&[1.0]]);
        let columns =
            resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::ScalarsOnly).unwrap();
        assert_eq!(columns.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);

        let mut binder = RowBinder::bind("t", &src, &columns, None, &BTreeMap::new()).unwrap();
        binder.copy_row(0, None);
        let out = binder.finish().unwrap();
        assert_eq!(out.num_columns(), 2);
        assert_eq!(out.schema().field(1).name(), "fFlag");
    }

    #[test]
    fn test_key_overwrite() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("fIndexBCs", DataType::Int16, false),
            Field::new("fX", DataType::UInt16, false),
        ]));
        let src = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(arrow::array::Int16Array::from(vec![7, 8])),
                Arc::new(UInt16Array::from(vec![70, 80])),
            ],
        )
        .unwrap();
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let mut binder = RowBinder::bind("t", &src, &columns, Some(0), &BTreeMap::new()).unwrap();
        assert!(binder.has_key());
        binder.copy_row(1, Some(-1));
        binder.copy_row(0, Some(0));
        let out = binder.finish().unwrap();
        assert_eq!(out.column(0).as_primitive::<Int16Type>().values().to_vec(), vec![-1, 0]);
        let x = out.column(1).as_primitive::<arrow::datatypes::UInt16Type>();
        assert_eq!(x.values().to_vec(), vec![80, 70]);
    }

    #[test]
    fn test_unsigned_key_is_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("fIndexBCs", DataType::UInt32, false)]));
        let src = RecordBatch::try_new(
            schema,
            vec![Arc::new(arrow::array::UInt32Array::from(vec![1u32]))],
        )
        .unwrap();
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let err = RowBinder::bind("t", &src, &columns, Some(0), &BTreeMap::new()).err().unwrap();
        assert!(matches!(err, AodError::UnsupportedColumnType { .. }));
    }

    #[test]
    fn test_fixed_array_copy() {
        let item = Arc::new(Field::new_list_field(DataType::Int32, true));
        let schema = Arc::new(Schema::new(vec![Field::new(
            "fCov",
            DataType::FixedSizeList(item.clone(), 2),
            false,
        )]));
        let values = Int32Array::from(vec![1, 2, 3, 4]);
        let arr = FixedSizeListArray::new(item, 2, Arc::new(values), None);
        let src = RecordBatch::try_new(schema, vec![Arc::new(arr)]).unwrap();
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        assert_eq!(columns[0].1, ColumnKind::FixedArray { elem: ScalarKind::I32, len: 2 });

        let mut binder = RowBinder::bind("t", &src, &columns, None, &BTreeMap::new()).unwrap();
        binder.copy_row(1, None);
        binder.copy_row(0, None);
        let out = binder.finish().unwrap();
        let fixed = out.column(0).as_fixed_size_list();
        let flat = fixed.values().as_primitive::<arrow::datatypes::Int32Type>();
        assert_eq!(flat.values().to_vec(), vec![3, 4, 1, 2]);
    }

    /// `fN: u8` with nulls, `fPt: list<f32>` sized by it.
    fn nullable_count_table(counts: Vec<Option<u8>>, data: &[&[f32]]) -> RecordBatch {
        let item = Arc::new(Field::new_list_field(DataType::Float32, true));
        let pt = Field::new("fPt", DataType::List(item.clone()), false)
            .with_metadata(HashMap::from([(META_KEY_COUNT.to_string(), "fN".to_string())]));
        let schema =
            Arc::new(Schema::new(vec![Field::new("fN", DataType::UInt8, true), pt]));
        let mut lists = ListBuilder::new(Float32Builder::new()).with_field(item);
        for row in data {
            lists.values().append_slice(row);
            lists.append(true);
        }
        RecordBatch::try_new(
            schema,
            vec![Arc::new(UInt8Array::from(counts)), Arc::new(lists.finish())],
        )
        .unwrap()
    }

    #[test]
    fn test_null_count_keeps_stored_elements() {
        let src = nullable_count_table(vec![None, Some(1)], &[&[1.0, 2.0, 3.0], &[4.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let caps = prescan(&src, &columns);
        assert_eq!(caps[&1], 3);

        let mut binder = RowBinder::bind("t", &src, &columns, None, &caps).unwrap();
        binder.copy_row(0, None);
        binder.copy_row(1, None);
        assert_eq!(binder.clamped_counts(), 0);
        let out = binder.finish().unwrap();

        assert!(out.column(0).is_null(0));
        assert_eq!(list_row(&out, 1, 0), vec![1.0, 2.0, 3.0]);
        assert_eq!(list_row(&out, 1, 1), vec![4.0]);
    }

    #[test]
    fn test_null_count_above_capacity_is_clamped() {
        let src = nullable_count_table(vec![None], &[&[1.0, 2.0, 3.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let caps = BTreeMap::from([(1, 2)]);
        let mut binder = RowBinder::bind("t", &src, &columns, None, &caps).unwrap();
        binder.copy_row(0, None);
        assert_eq!(binder.clamped_counts(), 1);
        let out = binder.finish().unwrap();
        assert_eq!(list_row(&out, 1, 0), vec![1.0, 2.0]);
    }

    #[test]
    fn test_count_below_stored_drops_trailing_elements() {
        let src = nullable_count_table(vec![Some(1)], &[&[1.0, 2.0]]);
        let columns = resolve_columns(&KindSet::all(), "t", &src.schema(), BindMode::Strict).unwrap();
        let caps = prescan(&src, &columns);
        let mut binder = RowBinder::bind("t", &src, &columns, None, &caps).unwrap();
        binder.copy_row(0, None);
        assert_eq!(binder.clamped_counts(), 0);
        let out = binder.finish().unwrap();
        assert_eq!(out.column(0).as_primitive::<UInt8Type>().value(0), 1);
        assert_eq!(list_row(&out, 1, 0), vec![1.0]);
    }
}
