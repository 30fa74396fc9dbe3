//! Authentication and Delta Lake / Parquet IO for Microsoft Fabric.
//!
//! Locations may be local paths, `file://` URLs, or OneLake and Azure
//! storage URLs (`abfss://`). For Azure locations a storage token is
//! acquired from the ambient credentials unless one is passed explicitly.

pub mod auth;
pub mod blocking;
mod error;
pub mod read;
pub mod storage;
pub mod table;
pub mod write;

pub use auth::{get_access_token, get_azure_storage_access_token, AccessToken};
pub use fabric_common::error::{FabricError, FabricResult};
pub use read::{
    read_delta, read_parquet, read_parquets, scan_delta, scan_parquet, scan_parquets, ReadOptions,
};
pub use storage::{get_storage_options, StorageOptions, TableLocation};
pub use table::{Frame, Table};
pub use write::{
    overwrite, upsert, write_delta, write_parquet, Columns, SchemaMode, WriteMetrics, WriteMode,
    WriteOptions,
};
