//! Integration tests for Parquet datasets.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use arrow::array::{Int32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use common::{location, people, row, sorted_rows};
use fabric_utilities::{
    read_parquet, read_parquets, write_parquet, FabricError, ReadOptions, WriteMode,
    WriteOptions,
};

/// Tests the write modes of Parquet datasets.
///
/// - A new dataset reads back unchanged
/// - `Append` adds a file
/// - `ErrorIfExists` fails with a conflict
/// - `Ignore` writes nothing
/// - `Overwrite` replaces every file
#[tokio::test]
async fn test_write_modes() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "people");

    write_parquet(
        people(&[(1, Some("a"), 10), (2, None, 20)]),
        &dataset,
        WriteMode::ErrorIfExists,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(
        sorted_rows(&table),
        vec![row(1, Some("a"), 10), row(2, None, 20)]
    );

    write_parquet(
        people(&[(3, Some("c"), 30)]),
        &dataset,
        WriteMode::Append,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(table.num_rows(), 3);

    let error = write_parquet(
        people(&[(4, Some("d"), 40)]),
        &dataset,
        WriteMode::ErrorIfExists,
        &WriteOptions::new(),
    )
    .await
    .unwrap_err();
    assert!(error.is_conflict(), "{error}");

    let metrics = write_parquet(
        people(&[(4, Some("d"), 40)]),
        &dataset,
        WriteMode::Ignore,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    assert_eq!(metrics.num_output_rows, 0);

    write_parquet(
        people(&[(5, Some("e"), 50)]),
        &dataset,
        WriteMode::Overwrite,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(sorted_rows(&table), vec![row(5, Some("e"), 50)]);
}

/// Tests that partition directories are written and read back as columns.
#[tokio::test]
async fn test_partitioned_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "people");

    let metrics = write_parquet(
        people(&[(1, Some("a"), 10), (2, Some("b"), 20), (3, Some("a"), 30)]),
        &dataset,
        WriteMode::Overwrite,
        &WriteOptions::new().with_partition_by("name"),
    )
    .await
    .unwrap();
    assert_eq!(metrics.partition_by, Some(vec!["name".to_string()]));
    assert!(dir.path().join("people").join("name=a").is_dir());

    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(
        sorted_rows(&table),
        vec![
            row(1, Some("a"), 10),
            row(2, Some("b"), 20),
            row(3, Some("a"), 30)
        ]
    );
}

/// Tests that a failed overwrite leaves the existing files in place.
#[tokio::test]
async fn test_failed_overwrite_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "people");
    write_parquet(
        people(&[(1, Some("a"), 10)]),
        &dataset,
        WriteMode::ErrorIfExists,
        &WriteOptions::new(),
    )
    .await
    .unwrap();

    let result = write_parquet(
        people(&[(2, Some("b"), 20)]),
        &dataset,
        WriteMode::Overwrite,
        &WriteOptions::new().with_partition_by("missing"),
    )
    .await;
    assert!(result.is_err());

    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(sorted_rows(&table), vec![row(1, Some("a"), 10)]);
}

/// Tests overwriting a partitioned dataset with unpartitioned data.
///
/// - The old partition directories are removed
/// - Reading back gives only the new rows and no partition columns
#[tokio::test]
async fn test_overwrite_partitioned_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "people");
    write_parquet(
        people(&[(1, Some("a"), 10), (2, Some("b"), 20)]),
        &dataset,
        WriteMode::Overwrite,
        &WriteOptions::new().with_partition_by("name"),
    )
    .await
    .unwrap();

    write_parquet(
        people(&[(3, Some("c"), 30)]),
        &dataset,
        WriteMode::Overwrite,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    assert!(!dir.path().join("people").join("name=a").exists());

    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(table.column_names(), vec!["id", "name", "score"]);
    assert_eq!(sorted_rows(&table), vec![row(3, Some("c"), 30)]);
}

/// Tests that numeric partition values are read back as integers.
#[tokio::test]
async fn test_integer_partition_column() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "people");
    write_parquet(
        people(&[(1, Some("a"), 10), (2, Some("b"), 20), (3, Some("c"), 10)]),
        &dataset,
        WriteMode::ErrorIfExists,
        &WriteOptions::new().with_partition_by("score"),
    )
    .await
    .unwrap();
    assert!(dir.path().join("people").join("score=10").is_dir());

    let table = read_parquet(&dataset, &ReadOptions::new()).await.unwrap();
    assert_eq!(
        table.schema().field_with_name("score").unwrap().data_type(),
        &DataType::Int64
    );
    assert_eq!(
        sorted_rows(&table),
        vec![
            row(1, Some("a"), 10),
            row(2, Some("b"), 20),
            row(3, Some("c"), 10)
        ]
    );
}

/// Tests that files with different schemas are concatenated.
///
/// - Columns are the union of all files
/// - Missing columns are null
/// - Integer columns of different widths are widened
#[tokio::test]
async fn test_read_parquets_aligns_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = location(&dir, "mixed");

    write_parquet(
        people(&[(1, Some("a"), 10)]),
        &dataset,
        WriteMode::Append,
        &WriteOptions::new(),
    )
    .await
    .unwrap();
    let other = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("city", DataType::Utf8, true),
        ])),
        vec![
            Arc::new(Int32Array::from(vec![2, 3])),
            Arc::new(StringArray::from(vec!["x", "y"])),
        ],
    )
    .unwrap();
    write_parquet(other, &dataset, WriteMode::Append, &WriteOptions::new())
        .await
        .unwrap();

    let table = read_parquets(&dataset, &ReadOptions::new()).await.unwrap();
    let mut columns = table.column_names();
    columns.sort();
    assert_eq!(columns, vec!["city", "id", "name", "score"]);
    assert_eq!(
        table.schema().field_with_name("id").unwrap().data_type(),
        &DataType::Int64
    );
    assert_eq!(table.num_rows(), 3);
    let batch = table.concat().unwrap();
    assert_eq!(batch.column_by_name("name").unwrap().null_count(), 2);
    assert_eq!(batch.column_by_name("city").unwrap().null_count(), 1);
}

/// Tests reading directories without Parquet files.
#[tokio::test]
async fn test_read_parquets_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let error = read_parquets(dir.path().to_str().unwrap(), &ReadOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(error, FabricError::InvalidArgument(_)));

    let error = read_parquets(&location(&dir, "missing"), &ReadOptions::new())
        .await
        .unwrap_err();
    assert!(error.is_not_found(), "{error}");

    let options = ReadOptions::new().with_version(1);
    let error = read_parquet(&location(&dir, "x"), &options)
        .await
        .unwrap_err();
    assert!(matches!(error, FabricError::InvalidArgument(_)));
}
