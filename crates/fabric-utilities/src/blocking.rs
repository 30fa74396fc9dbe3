//! Synchronous versions of the library operations.
//!
//! Each call runs the async operation to completion on a runtime created for
//! that call alone. These functions must not be called from within an async
//! runtime.

use std::future::Future;

use fabric_common::error::{FabricError, FabricResult};

use crate::auth::AccessToken;
use crate::read::ReadOptions;
use crate::storage::StorageOptions;
use crate::table::{Frame, Table};
use crate::write::{Columns, SchemaMode, WriteMetrics, WriteMode, WriteOptions};

fn block_on<F: Future>(future: F) -> FabricResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| FabricError::internal(format!("failed to create runtime: {e}")))?;
    Ok(runtime.block_on(future))
}

pub fn get_access_token(audience: &str) -> FabricResult<AccessToken> {
    block_on(crate::auth::get_access_token(audience))?
}

pub fn get_azure_storage_access_token() -> FabricResult<AccessToken> {
    block_on(crate::auth::get_azure_storage_access_token())?
}

pub fn get_storage_options(location: &str) -> FabricResult<Option<StorageOptions>> {
    block_on(crate::storage::get_storage_options(location))?
}

pub fn read_delta(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    block_on(crate::read::read_delta(location, options))?
}

pub fn read_parquet(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    block_on(crate::read::read_parquet(location, options))?
}

pub fn read_parquets(location: &str, options: &ReadOptions) -> FabricResult<Table> {
    block_on(crate::read::read_parquets(location, options))?
}

pub fn write_delta(
    data: impl Into<Frame>,
    location: &str,
    mode: WriteMode,
    options: &WriteOptions,
) -> FabricResult<WriteMetrics> {
    block_on(crate::write::write_delta(data, location, mode, options))?
}

pub fn write_parquet(
    data: impl Into<Frame>,
    location: &str,
    mode: WriteMode,
    options: &WriteOptions,
) -> FabricResult<WriteMetrics> {
    block_on(crate::write::write_parquet(data, location, mode, options))?
}

pub fn overwrite(
    location: &str,
    data: impl Into<Frame>,
    schema_mode: Option<SchemaMode>,
    partition_by: impl Into<Columns>,
) -> FabricResult<WriteMetrics> {
    block_on(crate::write::overwrite(
        location,
        data,
        schema_mode,
        partition_by,
    ))?
}

pub fn upsert(
    location: &str,
    data: impl Into<Frame>,
    primary_key_columns: impl Into<Columns>,
    update_exclusion_columns: impl Into<Columns>,
    predicate_exclusion_columns: impl Into<Columns>,
    partition_by: impl Into<Columns>,
) -> FabricResult<WriteMetrics> {
    block_on(crate::write::upsert(
        location,
        data,
        primary_key_columns,
        update_exclusion_columns,
        predicate_exclusion_columns,
        partition_by,
    ))?
}
