use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{ArrowBatchHandle, ResultSink, SinkError};

/// Keeps appended batches in memory, keyed by table name.
///
/// Not durable; meant for tests and for callers that summarise in-process.
#[derive(Default)]
pub struct InMemoryResultSink {
    tables: Mutex<BTreeMap<String, Vec<ArrowBatchHandle>>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches appended to `table`, in append order.
    pub async fn get_table(&self, table: &str) -> Vec<ArrowBatchHandle> {
        let inner = self.tables.lock().await;
        inner.get(table).cloned().unwrap_or_default()
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.tables.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn append_table(&self, table: &str, batch: ArrowBatchHandle) -> Result<(), SinkError> {
        let mut inner = self.tables.lock().await;
        inner
            .entry(table.to_string())
            .or_default()
            .push(Arc::clone(&batch));
        Ok(())
    }
}
