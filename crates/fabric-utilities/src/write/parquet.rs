use std::sync::Arc;
use std::time::Instant;

use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::SessionContext;
use fabric_common::error::{FabricError, FabricResult};
use futures::TryStreamExt;
use log::{debug, info};
use object_store::ObjectMeta;

use crate::error::ResultExt;
use crate::storage::{
    object_store_for, remove_empty_directories, resolve_storage_options, TableLocation,
};
use crate::table::Frame;
use crate::write::{elapsed_ms, WriteMetrics, WriteMode, WriteOptions};

/// Writes data as Parquet files into a dataset directory.
///
/// `Overwrite` replaces every object already in the directory once the new
/// files are written, so a failed write leaves the dataset unchanged.
/// `ErrorIfExists` and `Ignore` look at any object in the directory.
/// Partition columns become Hive-style `key=value` directories.
pub async fn write_parquet(
    data: impl Into<Frame>,
    location: &str,
    mode: WriteMode,
    options: &WriteOptions,
) -> FabricResult<WriteMetrics> {
    let location = TableLocation::parse(location)?.as_directory();
    let table = data.into().collect().await?;
    let num_rows = table.num_rows();
    let storage_options = resolve_storage_options(&location, &options.overrides()).await?;
    let (store, prefix) = object_store_for(&location, storage_options.as_ref())?;

    let existing = store
        .list(Some(&prefix))
        .try_collect::<Vec<ObjectMeta>>()
        .await
        .map_write_err()?;
    match mode {
        WriteMode::ErrorIfExists if !existing.is_empty() => {
            return Err(FabricError::conflict(format!(
                "Parquet dataset already exists: {location}"
            )));
        }
        WriteMode::Ignore if !existing.is_empty() => {
            info!("Parquet dataset {location} already exists, skipping the write");
            return Ok(WriteMetrics::ignored(num_rows));
        }
        _ => {}
    }

    let start = Instant::now();
    let ctx = SessionContext::new();
    ctx.register_object_store(location.url(), Arc::clone(&store));
    let df = table.into_dataframe(&ctx)?;
    let write_options =
        DataFrameWriteOptions::new().with_partition_by(options.partition_by.clone());
    df.write_parquet(location.as_str(), write_options, None)
        .await
        .map_write_err()?;

    if mode == WriteMode::Overwrite && !existing.is_empty() {
        for meta in &existing {
            store.delete(&meta.location).await.map_write_err()?;
        }
        if let Some(path) = location.to_file_path() {
            remove_empty_directories(&path).map_err(|e| {
                FabricError::write(format!("failed to clean up {location}: {e}"))
            })?;
        }
        debug!("removed {} objects from {location}", existing.len());
    }
    info!("wrote {num_rows} rows to Parquet dataset {location} (mode {mode})");
    Ok(WriteMetrics::inserted(num_rows, elapsed_ms(start), mode.as_str())
        .with_partition_by(&options.partition_by))
}
