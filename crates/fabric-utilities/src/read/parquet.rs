use std::collections::HashSet;

use arrow::datatypes::DataType;
use datafusion::common::{Column, ScalarValue};
use datafusion::logical_expr::type_coercion::binary::comparison_coercion;
use datafusion::prelude::{cast, lit, DataFrame, Expr, ParquetReadOptions, SessionContext};
use fabric_common::error::{FabricError, FabricResult};
use log::debug;

use crate::error::ResultExt;
use crate::read::ReadOptions;
use crate::storage::{
    list_parquet_files, list_partition_columns, object_store_for, resolve_storage_options,
    StorageOptions, TableLocation,
};
use crate::table::Table;

/// Creates a session that can reach the store of the location.
fn session_for(
    location: &TableLocation,
    storage_options: Option<&StorageOptions>,
) -> FabricResult<SessionContext> {
    let ctx = SessionContext::new();
    if !location.is_local() {
        let (store, _) = object_store_for(location, storage_options)?;
        ctx.register_object_store(location.url(), store);
    }
    Ok(ctx)
}

const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Infers the type of a partition column from its directory values.
fn partition_type(values: &[String]) -> DataType {
    let numeric = !values.is_empty()
        && values.iter().all(|v| {
            v != HIVE_DEFAULT_PARTITION
                && v.chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        });
    if !numeric {
        DataType::Utf8
    } else if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Opens a Parquet file, or a directory of Parquet files, as a lazily
/// evaluated query.
///
/// Hive-style `key=value` directories below the location become partition
/// columns. A column is an integer or a float when all of its values parse
/// as one, and a string otherwise.
pub async fn scan_parquet(location: &str, options: &ReadOptions) -> FabricResult<DataFrame> {
    options.validate_files()?;
    let location = TableLocation::parse(location)?;
    let storage_options = resolve_storage_options(&location, &options.overrides()).await?;
    let ctx = session_for(&location, storage_options.as_ref())?;

    let partition_columns = list_partition_columns(&location, storage_options.as_ref())
        .await?
        .into_iter()
        .map(|column| {
            let data_type = partition_type(&column.values);
            (column.name, data_type)
        })
        .collect::<Vec<_>>();
    if !partition_columns.is_empty() {
        debug!("reading {location} with partition columns {partition_columns:?}");
    }
    let path = if location.is_parquet_file() {
        location
    } else {
        location.as_directory()
    };
    let read_options = ParquetReadOptions::default().table_partition_cols(partition_columns);
    ctx.read_parquet(path.as_str(), read_options)
        .await
        .map_read_err()
}

/// Reads a Parquet file, or a directory of Parquet files.
pub async fn read_parquet(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    let df = scan_parquet(location, options).await?;
    Table::from_dataframe(df).await
}

/// Opens every Parquet file directly under a directory and concatenates them,
/// aligning files whose schemas differ.
///
/// The result has the union of all columns in the order they first appear.
/// Columns missing from a file are null for its rows. A column whose type
/// differs between files is cast to a common type, or to strings when the
/// types have none.
pub async fn scan_parquets(location: &str, options: &ReadOptions) -> FabricResult<DataFrame> {
    options.validate_files()?;
    let location = TableLocation::parse(location)?;
    let storage_options = resolve_storage_options(&location, &options.overrides()).await?;
    let files = list_parquet_files(&location, storage_options.as_ref()).await?;
    if files.is_empty() {
        return Err(FabricError::invalid(format!(
            "no parquet files found in {location}"
        )));
    }
    let ctx = session_for(&location, storage_options.as_ref())?;
    let mut frames = Vec::with_capacity(files.len());
    for file in &files {
        let df = ctx
            .read_parquet(file.as_str(), ParquetReadOptions::default())
            .await
            .map_read_err()?;
        frames.push(df);
    }
    concat_relaxed(frames)
}

/// Reads every Parquet file directly under a directory into one table.
pub async fn read_parquets(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    let df = scan_parquets(location, options).await?;
    Table::from_dataframe(df).await
}

/// The columns of all frames in order of first appearance, with the type
/// each column is unified to.
fn unified_columns(frames: &[DataFrame]) -> Vec<(String, DataType)> {
    let mut columns: Vec<(String, DataType)> = vec![];
    for frame in frames {
        for field in frame.schema().fields() {
            match columns.iter_mut().find(|(name, _)| name == field.name()) {
                Some((_, data_type)) if data_type != field.data_type() => {
                    *data_type = comparison_coercion(data_type, field.data_type())
                        .unwrap_or(DataType::Utf8);
                }
                Some(_) => {}
                None => columns.push((field.name().clone(), field.data_type().clone())),
            }
        }
    }
    columns
}

fn concat_relaxed(frames: Vec<DataFrame>) -> FabricResult<DataFrame> {
    let columns = unified_columns(&frames);
    let mut result: Option<DataFrame> = None;
    for frame in frames {
        let present = frame
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<HashSet<_>>();
        let exprs = columns
            .iter()
            .map(|(name, data_type)| {
                let value = if present.contains(name) {
                    Expr::Column(Column::from_name(name))
                } else {
                    lit(ScalarValue::Null)
                };
                cast(value, data_type.clone()).alias(name)
            })
            .collect::<Vec<_>>();
        let aligned = frame.select(exprs).map_read_err()?;
        result = Some(match result {
            Some(acc) => acc.union(aligned).map_read_err()?,
            None => aligned,
        });
    }
    result.ok_or_else(|| FabricError::invalid("no data to concatenate"))
}
