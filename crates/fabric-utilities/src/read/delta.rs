use std::sync::Arc;

use datafusion::prelude::{DataFrame, SessionContext};
use deltalake::{DeltaTable, DeltaTableBuilder};
use fabric_common::error::FabricResult;
use log::debug;

use crate::error::ResultExt;
use crate::read::ReadOptions;
use crate::storage::{register_handlers, resolve_storage_options, TableLocation};
use crate::table::Table;

async fn open_table(location: &TableLocation, options: &ReadOptions) -> FabricResult<DeltaTable> {
    options.validate_delta()?;
    register_handlers();
    let storage_options = resolve_storage_options(location, &options.overrides()).await?;

    let mut builder = DeltaTableBuilder::from_valid_uri(location.as_str()).map_read_err()?;
    if let Some(storage_options) = storage_options {
        builder = builder.with_storage_options(storage_options);
    }
    if let Some(version) = options.version {
        builder = builder.with_version(version);
    }
    if let Some(timestamp) = options.timestamp {
        builder = builder.with_timestamp(timestamp);
    }
    let table = builder.load().await.map_read_err()?;
    debug!(
        "loaded Delta table {location} at version {}",
        table.version()
    );
    Ok(table)
}

/// Opens a Delta table as a lazily evaluated query.
pub async fn scan_delta(location: &str, options: &ReadOptions) -> FabricResult<DataFrame> {
    let location = TableLocation::parse(location)?;
    let table = open_table(&location, options).await?;
    let ctx = SessionContext::new();
    ctx.read_table(Arc::new(table)).map_read_err()
}

/// Reads the full contents of a Delta table.
///
/// The latest version is read unless [`ReadOptions`] asks for a specific
/// version or timestamp.
pub async fn read_delta(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    let df = scan_delta(location, options).await?;
    Table::from_dataframe(df).await
}
