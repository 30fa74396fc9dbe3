use std::fmt;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::util::pretty::pretty_format_batches;
use datafusion::datasource::MemTable;
use datafusion::prelude::{DataFrame, SessionContext};
use fabric_common::error::FabricResult;

use crate::error::ResultExt;

/// A materialized tabular result: a schema and the record batches holding the rows.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Creates a table from batches that all share the given schema.
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, vec![])
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Combines all batches into one.
    pub fn concat(&self) -> FabricResult<RecordBatch> {
        concat_batches(&self.schema, &self.batches).map_read_err()
    }

    /// Batches to hand to a writer. An empty table yields a single empty
    /// batch so that the schema is still known.
    pub(crate) fn into_write_batches(self) -> Vec<RecordBatch> {
        if self.batches.is_empty() {
            vec![RecordBatch::new_empty(self.schema)]
        } else {
            self.batches
        }
    }

    pub(crate) fn into_dataframe(self, ctx: &SessionContext) -> FabricResult<DataFrame> {
        let provider = MemTable::try_new(self.schema, vec![self.batches]).map_read_err()?;
        ctx.read_table(Arc::new(provider)).map_read_err()
    }

    pub(crate) async fn from_dataframe(df: DataFrame) -> FabricResult<Self> {
        let schema = Arc::clone(df.schema().inner());
        let batches = df.collect().await.map_read_err()?;
        Ok(Self::new(schema, batches))
    }
}

impl From<RecordBatch> for Table {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch.schema(), vec![batch])
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match pretty_format_batches(&self.batches) {
            Ok(table) => write!(f, "{table}"),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Data to write: either materialized rows or a lazily evaluated query.
pub enum Frame {
    Eager(Table),
    Lazy(DataFrame),
}

impl Frame {
    /// Materializes the frame, running the query of a lazy frame.
    ///
    /// ```
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// use std::sync::Arc;
    ///
    /// use arrow::array::{Int64Array, RecordBatch};
    /// use arrow::datatypes::{DataType, Field, Schema};
    /// use datafusion::prelude::SessionContext;
    /// use fabric_utilities::table::Frame;
    ///
    /// let batch = RecordBatch::try_new(
    ///     Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)])),
    ///     vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
    /// )
    /// .unwrap();
    ///
    /// // An eager frame is returned as it is.
    /// let table = Frame::from(batch.clone()).collect().await.unwrap();
    /// assert_eq!(table.num_rows(), 3);
    ///
    /// // A lazy frame runs its query.
    /// let ctx = SessionContext::new();
    /// let df = ctx.read_batch(batch).unwrap().limit(0, Some(2)).unwrap();
    /// let table = Frame::from(df).collect().await.unwrap();
    /// assert_eq!(table.num_rows(), 2);
    /// assert_eq!(table.column_names(), vec!["n"]);
    /// # });
    /// ```
    pub async fn collect(self) -> FabricResult<Table> {
        match self {
            Frame::Eager(table) => Ok(table),
            Frame::Lazy(df) => Table::from_dataframe(df).await,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        match self {
            Frame::Eager(table) => Arc::clone(table.schema()),
            Frame::Lazy(df) => Arc::clone(df.schema().inner()),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Eager(table) => f.debug_tuple("Eager").field(table).finish(),
            Frame::Lazy(df) => f.debug_tuple("Lazy").field(df.schema()).finish(),
        }
    }
}

impl From<Table> for Frame {
    fn from(table: Table) -> Self {
        Frame::Eager(table)
    }
}

impl From<RecordBatch> for Frame {
    fn from(batch: RecordBatch) -> Self {
        Frame::Eager(Table::from(batch))
    }
}

impl From<DataFrame> for Frame {
    fn from(df: DataFrame) -> Self {
        Frame::Lazy(df)
    }
}
