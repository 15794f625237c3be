//! End-to-end rewrite of an on-disk store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{
    AsArray, Float32Array, Float32Builder, Int32Array, ListBuilder, UInt8Array, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Float32Type, Int32Type, Schema, UInt32Type, UInt64Type};
use arrow::record_batch::RecordBatch;
use ns_aod::{
    AodError, CompressionProfile, META_KEY_COUNT, RewriteConfig, TableAction, read_table,
    rewrite_store, write_table,
};
use parquet::basic::Compression;

fn tmp_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("ns_aod_rewrite_{}_{}_{}", std::process::id(), nanos, tag))
}

fn write(path: &Path, batch: RecordBatch) {
    write_table(path, &batch, &CompressionProfile::uniform(Compression::SNAPPY)).unwrap();
}

fn bcs(keys: &[u64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("fGlobalBC", DataType::UInt64, false),
        Field::new("fRunNumber", DataType::UInt32, false),
    ]));
    let runs: Vec<u32> = (0..keys.len() as u32).map(|i| 500 + i).collect();
    RecordBatch::try_new(
        schema,
        vec![Arc::new(UInt64Array::from(keys.to_vec())), Arc::new(UInt32Array::from(runs))],
    )
    .unwrap()
}

fn flags(values: &[u32]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("fSelection", DataType::UInt32, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(UInt32Array::from(values.to_vec()))]).unwrap()
}

fn collisions(fks: &[i32], pts: &[&[f32]]) -> RecordBatch {
    let item = Arc::new(Field::new_list_field(DataType::Float32, true));
    let pt = Field::new("fPt", DataType::List(item.clone()), false)
        .with_metadata(HashMap::from([(META_KEY_COUNT.to_string(), "fNtracks".to_string())]));
    let schema = Arc::new(Schema::new(vec![
        Field::new("fIndexBCs", DataType::Int32, false),
        Field::new("fPosZ", DataType::Float32, false),
        Field::new("fNtracks", DataType::UInt8, false),
        pt,
    ]));
    let posz: Vec<f32> = (0..fks.len()).map(|i| i as f32 * 0.5).collect();
    let counts: Vec<u8> = pts.iter().map(|r| r.len() as u8).collect();
    let mut lists = ListBuilder::new(Float32Builder::new()).with_field(item);
    for row in pts {
        lists.values().append_slice(row);
        lists.append(true);
    }
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(fks.to_vec())),
            Arc::new(Float32Array::from(posz)),
            Arc::new(UInt8Array::from(counts)),
            Arc::new(lists.finish()),
        ],
    )
    .unwrap()
}

fn origins() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("fDataframeID", DataType::UInt64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(UInt64Array::from(vec![42, 43]))]).unwrap()
}

/// `DF_1`: a full batch with duplicate BCs. `DF_2`: no dimension table.
fn build_store() -> PathBuf {
    let root = tmp_path("in");
    let df1 = root.join("DF_1");
    let df2 = root.join("DF_2");
    fs::create_dir_all(&df1).unwrap();
    fs::create_dir_all(&df2).unwrap();

    write(&df1.join("O2bc_001.parquet"), bcs(&[5, 3, 5, 1]));
    write(&df1.join("O2bcflag.parquet"), flags(&[10, 11, 12, 13]));
    write(
        &df1.join("O2collision_001.parquet"),
        collisions(&[2, 9, 0, 1], &[&[1.0], &[], &[2.0, 3.0], &[4.0, 5.0, 6.0]]),
    );
    write(&df1.join("O2origin.parquet"), origins());
    fs::write(df1.join("notes.txt"), "batch notes").unwrap();

    write(&df2.join("O2collision_001.parquet"), collisions(&[0], &[&[1.0]]));
    fs::write(root.join("metaData.json"), r#"{"DataType":"MC"}"#).unwrap();
    root
}

fn table(path: &Path) -> RecordBatch {
    read_table(path).unwrap().data
}

#[test]
fn rewrite_store_end_to_end() {
    let input = build_store();
    let output = tmp_path("out");
    let report = rewrite_store(&input, &output, &RewriteConfig::default()).unwrap();

    assert_eq!(report.carried_over, vec!["metaData.json".to_string()]);
    assert!(report.failed_copies.is_empty());
    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.degraded_batches(), 1);
    assert_eq!(report.degraded_tables(), 0);

    let df1 = &report.batches[0];
    assert_eq!(df1.name, "DF_1");
    assert_eq!(df1.dimension_rows, 4);
    assert_eq!(df1.unique_keys, 3);
    assert!(!df1.already_canonical);
    assert_eq!(df1.carried_over, vec!["notes.txt".to_string()]);
    let actions: Vec<(&str, TableAction)> =
        df1.tables.iter().map(|t| (t.name.as_str(), t.action)).collect();
    assert_eq!(
        actions,
        vec![
            ("O2bc_001", TableAction::Rebuilt),
            ("O2bcflag", TableAction::Rebuilt),
            ("O2collision_001", TableAction::Reindexed),
            ("O2origin", TableAction::Passthrough),
        ]
    );

    let out1 = output.join("DF_1");
    let bc = table(&out1.join("O2bc_001.parquet"));
    assert_eq!(bc.column(0).as_primitive::<UInt64Type>().values().to_vec(), vec![1, 3, 5]);
    assert_eq!(bc.column(1).as_primitive::<UInt32Type>().values().to_vec(), vec![503, 501, 500]);

    let fl = table(&out1.join("O2bcflag.parquet"));
    assert_eq!(fl.column(0).as_primitive::<UInt32Type>().values().to_vec(), vec![13, 11, 10]);

    // old ordinals [2,9,0,1] -> new [2,unresolved,2,1]
    let col = read_table(&out1.join("O2collision_001.parquet")).unwrap();
    assert_eq!(col.compression.default_compression(), Compression::SNAPPY);
    let col = col.data;
    assert_eq!(col.column(0).as_primitive::<Int32Type>().values().to_vec(), vec![-1, 1, 2, 2]);
    assert_eq!(col.column(1).as_primitive::<Float32Type>().values().to_vec(), vec![0.5, 1.5, 0.0, 1.0]);
    let pt = col.column(3).as_list::<i32>();
    assert!(pt.value(0).is_empty());
    assert_eq!(pt.value(1).as_primitive::<Float32Type>().values().to_vec(), vec![4.0, 5.0, 6.0]);
    assert_eq!(pt.value(2).as_primitive::<Float32Type>().values().to_vec(), vec![1.0]);
    assert_eq!(pt.value(3).as_primitive::<Float32Type>().values().to_vec(), vec![2.0, 3.0]);
    let stats = df1.tables[2].reindex.unwrap();
    assert_eq!(stats.rows, 4);
    assert_eq!(stats.unresolved, 1);

    // tables without a foreign key are byte-identical
    assert_eq!(
        fs::read(input.join("DF_1/O2origin.parquet")).unwrap(),
        fs::read(out1.join("O2origin.parquet")).unwrap()
    );
    assert_eq!(fs::read_to_string(out1.join("notes.txt")).unwrap(), "batch notes");
    assert!(output.join("metaData.json").exists());

    // a batch without a dimension table is copied as a whole
    let df2 = &report.batches[1];
    assert!(df2.degraded.as_deref().is_some_and(|e| e.contains("no dimension table")));
    assert_eq!(
        fs::read(input.join("DF_2/O2collision_001.parquet")).unwrap(),
        fs::read(output.join("DF_2/O2collision_001.parquet")).unwrap()
    );

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}

#[test]
fn rewrite_is_idempotent() {
    let input = build_store();
    let first = tmp_path("first");
    let second = tmp_path("second");
    rewrite_store(&input, &first, &RewriteConfig::default()).unwrap();
    let report = rewrite_store(&first, &second, &RewriteConfig::default()).unwrap();

    let df1 = &report.batches[0];
    assert!(df1.already_canonical);
    assert_eq!(df1.dimension_rows, df1.unique_keys);
    assert_eq!(df1.tables[2].reindex.unwrap().changed, 0);

    for name in ["O2bc_001", "O2bcflag", "O2collision_001", "O2origin"] {
        let file = format!("{name}.parquet");
        assert_eq!(
            table(&first.join("DF_1").join(&file)),
            table(&second.join("DF_1").join(&file)),
            "{name} changed on the second pass"
        );
    }

    for dir in [input, first, second] {
        let _ = fs::remove_dir_all(dir);
    }
}

#[test]
fn missing_input_store_is_fatal() {
    let err = rewrite_store(&tmp_path("missing"), &tmp_path("never"), &RewriteConfig::default())
        .unwrap_err();
    assert!(matches!(err, AodError::StoreOpen { .. }));
}

#[test]
fn misaligned_flags_are_passed_through() {
    let input = tmp_path("misaligned");
    let df = input.join("DF_7");
    fs::create_dir_all(&df).unwrap();
    write(&df.join("O2bc.parquet"), bcs(&[2, 1]));
    write(&df.join("O2bcflag.parquet"), flags(&[1, 2, 3]));
    let output = tmp_path("misaligned_out");

    let report = rewrite_store(&input, &output, &RewriteConfig::default()).unwrap();
    let flags_entry = &report.batches[0].tables[1];
    assert_eq!(flags_entry.action, TableAction::Degraded);
    assert_eq!(report.degraded_tables(), 1);
    assert_eq!(
        fs::read(df.join("O2bcflag.parquet")).unwrap(),
        fs::read(output.join("DF_7/O2bcflag.parquet")).unwrap()
    );

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}

#[test]
fn empty_dimension_table_copies_the_batch() {
    let input = tmp_path("empty_dim");
    let df = input.join("DF_3");
    fs::create_dir_all(&df).unwrap();
    write(&df.join("O2bc_001.parquet"), bcs(&[]));
    write(&df.join("O2collision_001.parquet"), collisions(&[0, 1], &[&[1.0], &[2.0]]));
    let output = tmp_path("empty_dim_out");

    let report = rewrite_store(&input, &output, &RewriteConfig::default()).unwrap();
    assert_eq!(report.degraded_batches(), 1);
    let batch = &report.batches[0];
    assert!(batch.degraded.as_deref().is_some_and(|e| e.contains("is empty")));
    assert!(batch.tables.is_empty());
    for file in ["O2bc_001.parquet", "O2collision_001.parquet"] {
        assert_eq!(
            fs::read(df.join(file)).unwrap(),
            fs::read(output.join("DF_3").join(file)).unwrap(),
            "{file} not copied unchanged"
        );
    }

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}

#[test]
fn unsigned_foreign_key_table_is_copied_unchanged() {
    let input = tmp_path("unsigned_fk");
    let df = input.join("DF_4");
    fs::create_dir_all(&df).unwrap();
    write(&df.join("O2bc.parquet"), bcs(&[2, 1]));
    let schema = Arc::new(Schema::new(vec![Field::new("fIndexBCs", DataType::UInt32, false)]));
    let payload =
        RecordBatch::try_new(schema, vec![Arc::new(UInt32Array::from(vec![1, 0]))]).unwrap();
    write(&df.join("O2zdc.parquet"), payload);
    let output = tmp_path("unsigned_fk_out");

    let report = rewrite_store(&input, &output, &RewriteConfig::default()).unwrap();
    let batch = &report.batches[0];
    assert!(batch.degraded.is_none());
    let zdc = batch.tables.iter().find(|t| t.name == "O2zdc").unwrap();
    assert_eq!(zdc.action, TableAction::Degraded);
    assert!(zdc.error.as_deref().is_some_and(|e| e.contains("signed integer")));
    assert_eq!(
        fs::read(df.join("O2zdc.parquet")).unwrap(),
        fs::read(output.join("DF_4/O2zdc.parquet")).unwrap()
    );

    let _ = fs::remove_dir_all(&input);
    let _ = fs::remove_dir_all(&output);
}

#[test]
fn output_overlapping_input_is_rejected() {
    let input = build_store();
    let origin = fs::read(input.join("DF_1/O2origin.parquet")).unwrap();

    for output in [input.clone(), input.join("rewritten")] {
        let err = rewrite_store(&input, &output, &RewriteConfig::default()).unwrap_err();
        assert!(matches!(err, AodError::StoreOpen { .. }), "{} accepted", output.display());
    }

    assert_eq!(fs::read(input.join("DF_1/O2origin.parquet")).unwrap(), origin);
    assert_eq!(fs::read_to_string(input.join("metaData.json")).unwrap(), r#"{"DataType":"MC"}"#);
    assert!(!input.join("rewritten").exists());

    let _ = fs::remove_dir_all(&input);
}
