//! Writing Delta tables and Parquet datasets.

mod delta;
pub mod merge;
mod parquet;

use std::fmt;
use std::str::FromStr;

use fabric_common::error::FabricError;
use serde::Serialize;

pub use self::delta::{overwrite, upsert, write_delta};
pub use self::merge::Columns;
pub use self::parquet::write_parquet;

use crate::storage::{StorageOptions, StorageOverrides};

/// What to do when the target already holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the existing data.
    Overwrite,
    /// Add to the existing data.
    Append,
    /// Fail with a conflict.
    ErrorIfExists,
    /// Leave the existing data untouched and write nothing.
    Ignore,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
            WriteMode::ErrorIfExists => "error",
            WriteMode::Ignore => "ignore",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "append" => Ok(WriteMode::Append),
            "error" | "errorifexists" | "error_if_exists" => Ok(WriteMode::ErrorIfExists),
            "ignore" => Ok(WriteMode::Ignore),
            _ => Err(FabricError::invalid(format!("unknown write mode: {s}"))),
        }
    }
}

/// How a Delta write treats a schema that differs from the table's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// Add new columns to the table schema.
    Merge,
    /// Replace the table schema.
    Overwrite,
}

impl SchemaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaMode::Merge => "merge",
            SchemaMode::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaMode {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(SchemaMode::Merge),
            "overwrite" => Ok(SchemaMode::Overwrite),
            _ => Err(FabricError::invalid(format!("unknown schema mode: {s}"))),
        }
    }
}

impl From<SchemaMode> for deltalake::operations::write::SchemaMode {
    fn from(mode: SchemaMode) -> Self {
        match mode {
            SchemaMode::Merge => deltalake::operations::write::SchemaMode::Merge,
            SchemaMode::Overwrite => deltalake::operations::write::SchemaMode::Overwrite,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Columns to partition a new table or dataset by.
    pub partition_by: Vec<String>,
    pub schema_mode: Option<SchemaMode>,
    /// A storage token to use instead of acquiring one.
    pub bearer_token: Option<String>,
    pub storage_options: StorageOptions,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition_by(mut self, columns: impl Into<Columns>) -> Self {
        self.partition_by = columns.into().into_inner();
        self
    }

    pub fn with_schema_mode(mut self, mode: SchemaMode) -> Self {
        self.schema_mode = Some(mode);
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

    fn overrides(&self) -> StorageOverrides {
        StorageOverrides {
            bearer_token: self.bearer_token.clone(),
            storage_options: self.storage_options.clone(),
        }
    }
}

/// Statistics about a completed write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteMetrics {
    pub num_source_rows: usize,
    pub num_target_rows_inserted: usize,
    pub num_target_rows_updated: usize,
    pub num_target_rows_deleted: usize,
    pub num_target_rows_copied: usize,
    pub num_output_rows: usize,
    pub execution_time_ms: u64,
    pub operation_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_mode: Option<SchemaMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<Vec<String>>,
}

impl WriteMetrics {
    /// Metrics of a write that stored every source row as a new row.
    pub(crate) fn inserted(num_rows: usize, execution_time_ms: u64, mode: &str) -> Self {
        Self {
            num_source_rows: num_rows,
            num_target_rows_inserted: num_rows,
            num_output_rows: num_rows,
            execution_time_ms,
            operation_mode: mode.to_string(),
            ..Default::default()
        }
    }

    /// Metrics of a write that was skipped because the target exists.
    pub(crate) fn ignored(num_rows: usize) -> Self {
        Self {
            num_source_rows: num_rows,
            operation_mode: WriteMode::Ignore.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn with_partition_by(mut self, partition_by: &[String]) -> Self {
        self.partition_by = (!partition_by.is_empty()).then(|| partition_by.to_vec());
        self
    }
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
