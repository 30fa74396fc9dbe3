use std::time::Instant;

use datafusion::prelude::SessionContext;
use deltalake::protocol::SaveMode;
use deltalake::{DeltaOps, DeltaTable, DeltaTableBuilder, DeltaTableError};
use fabric_common::error::{FabricError, FabricResult};
use log::{debug, info};

use crate::error::ResultExt;
use crate::storage::{
    register_handlers, resolve_storage_options, StorageOptions, StorageOverrides, TableLocation,
};
use crate::table::{Frame, Table};
use crate::write::merge::{normalize_columns, Columns, UpsertPlan};
use crate::write::{elapsed_ms, SchemaMode, WriteMetrics, WriteMode, WriteOptions};

/// Loads the Delta table at the location, or returns `None` when there is none.
pub(crate) async fn try_load_table(
    location: &TableLocation,
    storage_options: Option<&StorageOptions>,
) -> FabricResult<Option<DeltaTable>> {
    let mut builder = match DeltaTableBuilder::from_valid_uri(location.as_str()) {
        Ok(builder) => builder,
        Err(DeltaTableError::InvalidTableLocation(_)) => return Ok(None),
        Err(e) => return Err(e).map_write_err(),
    };
    if let Some(storage_options) = storage_options {
        builder = builder.with_storage_options(storage_options.clone());
    }
    match builder.load().await {
        Ok(table) => Ok(Some(table)),
        Err(DeltaTableError::NotATable(_)) | Err(DeltaTableError::InvalidTableLocation(_)) => {
            Ok(None)
        }
        Err(e) => Err(e).map_write_err(),
    }
}

async fn delta_ops(
    location: &TableLocation,
    existing: Option<DeltaTable>,
    storage_options: Option<StorageOptions>,
) -> FabricResult<DeltaOps> {
    match (existing, storage_options) {
        (Some(table), _) => Ok(DeltaOps::from(table)),
        (None, Some(storage_options)) => {
            DeltaOps::try_from_uri_with_storage_options(location.as_str(), storage_options)
                .await
                .map_write_err()
        }
        (None, None) => DeltaOps::try_from_uri(location.as_str()).await.map_write_err(),
    }
}

async fn write_table(
    location: &TableLocation,
    table: Table,
    mode: WriteMode,
    schema_mode: Option<SchemaMode>,
    partition_by: &[String],
    overrides: &StorageOverrides,
) -> FabricResult<WriteMetrics> {
    register_handlers();
    let storage_options = resolve_storage_options(location, overrides).await?;
    let existing = try_load_table(location, storage_options.as_ref()).await?;
    let num_rows = table.num_rows();

    let save_mode = match (mode, existing.is_some()) {
        (WriteMode::ErrorIfExists, true) => {
            return Err(FabricError::conflict(format!(
                "Delta table already exists: {location}"
            )));
        }
        (WriteMode::Ignore, true) => {
            info!("Delta table {location} already exists, skipping the write");
            return Ok(WriteMetrics::ignored(num_rows));
        }
        (WriteMode::Overwrite, _) => SaveMode::Overwrite,
        (WriteMode::Append, _) => SaveMode::Append,
        (WriteMode::ErrorIfExists, false) | (WriteMode::Ignore, false) => SaveMode::ErrorIfExists,
    };

    let start = Instant::now();
    let ops = delta_ops(location, existing, storage_options).await?;
    let mut builder = ops.write(table.into_write_batches()).with_save_mode(save_mode);
    if !partition_by.is_empty() {
        builder = builder.with_partition_columns(partition_by.to_vec());
    }
    if let Some(schema_mode) = schema_mode {
        builder = builder.with_schema_mode(schema_mode.into());
    }
    let written = builder.await.map_write_err()?;
    let execution_time_ms = elapsed_ms(start);
    info!(
        "wrote {num_rows} rows to Delta table {location} (mode {mode}, version {})",
        written.version()
    );
    Ok(WriteMetrics {
        schema_mode,
        ..WriteMetrics::inserted(num_rows, execution_time_ms, mode.as_str())
    }
    .with_partition_by(partition_by))
}

/// Writes data to a Delta table.
///
/// The table is created when it does not exist. When it does, `mode`
/// decides whether the data replaces or extends the table, or whether the
/// write fails with [`FabricError::Conflict`] or is skipped.
pub async fn write_delta(
    data: impl Into<Frame>,
    location: &str,
    mode: WriteMode,
    options: &WriteOptions,
) -> FabricResult<WriteMetrics> {
    let location = TableLocation::parse(location)?;
    let table = data.into().collect().await?;
    write_table(
        &location,
        table,
        mode,
        options.schema_mode,
        &options.partition_by,
        &options.overrides(),
    )
    .await
}

/// Replaces the contents of a Delta table.
///
/// With [`SchemaMode::Merge`] new columns are added to the table schema,
/// with [`SchemaMode::Overwrite`] the schema is replaced, and with `None`
/// the data must match the existing schema.
pub async fn overwrite(
    location: &str,
    data: impl Into<Frame>,
    schema_mode: Option<SchemaMode>,
    partition_by: impl Into<Columns>,
) -> FabricResult<WriteMetrics> {
    let location = TableLocation::parse(location)?;
    let table = data.into().collect().await?;
    let partition_by = normalize_columns(partition_by);
    write_table(
        &location,
        table,
        WriteMode::Overwrite,
        schema_mode,
        &partition_by,
        &StorageOverrides::default(),
    )
    .await
}

/// Inserts new rows into a Delta table and updates changed ones, matching
/// rows on the primary key columns.
///
/// A matched row is updated only when one of its non-key columns differs,
/// leaving out `predicate_exclusion_columns` from the comparison. Updates
/// never touch `update_exclusion_columns`, which only receive values on
/// insert. Target rows without a match are kept. When the table does not
/// exist, it is created from the data with the given partitioning.
pub async fn upsert(
    location: &str,
    data: impl Into<Frame>,
    primary_key_columns: impl Into<Columns>,
    update_exclusion_columns: impl Into<Columns>,
    predicate_exclusion_columns: impl Into<Columns>,
    partition_by: impl Into<Columns>,
) -> FabricResult<WriteMetrics> {
    let location = TableLocation::parse(location)?;
    let primary_key_columns = normalize_columns(primary_key_columns);
    let update_exclusion_columns = normalize_columns(update_exclusion_columns);
    let predicate_exclusion_columns = normalize_columns(predicate_exclusion_columns);
    let partition_by = normalize_columns(partition_by);
    let table = data.into().collect().await?;

    let plan = UpsertPlan::try_new(
        &table.column_names(),
        &primary_key_columns,
        &update_exclusion_columns,
        &predicate_exclusion_columns,
    )?;

    register_handlers();
    let overrides = StorageOverrides::default();
    let storage_options = resolve_storage_options(&location, &overrides).await?;
    match try_load_table(&location, storage_options.as_ref()).await? {
        Some(target) => merge(&location, target, table, &plan).await,
        None => {
            info!("Delta table {location} does not exist, creating it");
            write_table(
                &location,
                table,
                WriteMode::Overwrite,
                Some(SchemaMode::Overwrite),
                &partition_by,
                &overrides,
            )
            .await
        }
    }
}

async fn merge(
    location: &TableLocation,
    target: DeltaTable,
    source: Table,
    plan: &UpsertPlan,
) -> FabricResult<WriteMetrics> {
    let start = Instant::now();
    let ctx = SessionContext::new();
    let source = source.into_dataframe(&ctx)?;

    let options = &plan.merge_options;
    debug!("merging into {location} on {}", options.predicate);
    let mut builder = DeltaOps::from(target)
        .merge(source, options.predicate.as_str())
        .with_source_alias(&options.source_alias)
        .with_target_alias(&options.target_alias);
    if !plan.update_mapping.is_empty() {
        builder = builder
            .when_matched_update(|update| {
                let update = plan
                    .update_mapping
                    .iter()
                    .fold(update, |update, (target, source)| {
                        update.update(target.as_str(), source.as_str())
                    });
                if plan.update_predicate.is_empty() {
                    update
                } else {
                    update.predicate(plan.update_predicate.as_str())
                }
            })
            .map_write_err()?;
    }
    builder = builder
        .when_not_matched_insert(|insert| {
            plan.insert_columns.iter().fold(insert, |insert, column| {
                insert.set(column.as_str(), format!("{}.{column}", options.source_alias))
            })
        })
        .map_write_err()?;

    let (_, metrics) = builder.await.map_write_err()?;
    info!(
        "merged into Delta table {location}: {} inserted, {} updated",
        metrics.num_target_rows_inserted, metrics.num_target_rows_updated
    );
    Ok(WriteMetrics {
        num_source_rows: metrics.num_source_rows,
        num_target_rows_inserted: metrics.num_target_rows_inserted,
        num_target_rows_updated: metrics.num_target_rows_updated,
        num_target_rows_deleted: metrics.num_target_rows_deleted,
        num_target_rows_copied: metrics.num_target_rows_copied,
        num_output_rows: metrics.num_output_rows,
        execution_time_ms: elapsed_ms(start),
        operation_mode: "merge".to_string(),
        schema_mode: None,
        partition_by: None,
    })
}
