use std::path::PathBuf;
use std::sync::Arc;

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub use memory::InMemoryResultSink;

pub mod csv;
pub use csv::{write_csv, CsvResultSink};

pub type ArrowBatch = RecordBatch;
pub type ArrowBatchHandle = Arc<ArrowBatch>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode table {table}: {source}")]
    Encode {
        table: String,
        #[source]
        source: ArrowError,
    },
    #[error("invalid table name '{0}'")]
    InvalidName(String),
    #[error("sink task failed: {0}")]
    Task(String),
}

/// Destination for finished plan tables. Every trial table flows through here.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Append one batch to a logical table, creating it on first use.
    async fn append_table(&self, table: &str, batch: ArrowBatchHandle) -> Result<(), SinkError>;
}

/// Discards everything; used when export is disabled.
pub struct NullResultSink;

#[async_trait]
impl ResultSink for NullResultSink {
    async fn append_table(&self, _table: &str, _batch: ArrowBatchHandle) -> Result<(), SinkError> {
        Ok(())
    }
}
