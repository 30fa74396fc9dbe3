//! Shared helpers for the fabric-utilities integration tests.

use std::sync::Arc;

use arrow::array::{Array, AsArray, Int64Array, RecordBatch, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use fabric_utilities::Table;
use tempfile::TempDir;

pub type Row = (i64, Option<String>, i64);

/// Builds a batch with the columns `id`, `name` and `score`.
pub fn people(rows: &[(i64, Option<&str>, i64)]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("score", DataType::Int64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            )),
        ],
    )
    .unwrap()
}

/// Returns the `id`, `name` and `score` values of a table sorted by `id`.
pub fn sorted_rows(table: &Table) -> Vec<Row> {
    let mut rows = vec![];
    for batch in table.batches() {
        let ids = cast(batch.column_by_name("id").unwrap(), &DataType::Int64).unwrap();
        let names = cast(batch.column_by_name("name").unwrap(), &DataType::Utf8).unwrap();
        let scores = cast(batch.column_by_name("score").unwrap(), &DataType::Int64).unwrap();
        let ids = ids.as_primitive::<Int64Type>();
        let names = names.as_string::<i32>();
        let scores = scores.as_primitive::<Int64Type>();
        for i in 0..batch.num_rows() {
            let name = (!names.is_null(i)).then(|| names.value(i).to_string());
            rows.push((ids.value(i), name, scores.value(i)));
        }
    }
    rows.sort_by_key(|r| r.0);
    rows
}

pub fn row(id: i64, name: Option<&str>, score: i64) -> Row {
    (id, name.map(String::from), score)
}

/// A location inside the temporary directory that does not exist yet.
pub fn location(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}
