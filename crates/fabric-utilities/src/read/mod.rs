//! Reading Delta tables and Parquet datasets.
//!
//! Every reader comes in two flavors: `read_*` returns the materialized
//! [`Table`](crate::table::Table) and `scan_*` returns a lazily evaluated
//! DataFusion [`DataFrame`](datafusion::prelude::DataFrame).

mod delta;
mod parquet;

use chrono::{DateTime, Utc};
use fabric_common::error::{FabricError, FabricResult};

pub use self::delta::{read_delta, scan_delta};
pub use self::parquet::{read_parquet, read_parquets, scan_parquet, scan_parquets};

use crate::storage::{StorageOptions, StorageOverrides};

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// The Delta table version to read. The latest version is read when unset.
    pub version: Option<i64>,
    /// Reads the Delta table as of this instant.
    pub timestamp: Option<DateTime<Utc>>,
    /// A storage token to use instead of acquiring one.
    pub bearer_token: Option<String>,
    pub storage_options: StorageOptions,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }

    fn validate_delta(&self) -> FabricResult<()> {
        if self.version.is_some() && self.timestamp.is_some() {
            return Err(FabricError::invalid(
                "a Delta table can be read as of a version or a timestamp, but not both",
            ));
        }
        if self.version.is_some_and(|v| v < 0) {
            return Err(FabricError::invalid("Delta table version must not be negative"));
        }
        Ok(())
    }

    fn validate_files(&self) -> FabricResult<()> {
        if self.version.is_some() || self.timestamp.is_some() {
            return Err(FabricError::invalid(
                "time travel is only supported for Delta tables",
            ));
        }
        Ok(())
    }

    fn overrides(&self) -> StorageOverrides {
        StorageOverrides {
            bearer_token: self.bearer_token.clone(),
            storage_options: self.storage_options.clone(),
        }
    }
}
