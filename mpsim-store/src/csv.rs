use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use arrow::csv::WriterBuilder;
use arrow::error::ArrowError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{ArrowBatch, ArrowBatchHandle, ResultSink, SinkError};

/// Writes each table to `<root>/<table>.csv`.
///
/// The first append of a table (per sink) truncates the file and writes a
/// header; later appends add rows only.
pub struct CsvResultSink {
    root: PathBuf,
    written: Mutex<HashSet<String>>,
}

impl CsvResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `table`. Names must be relative paths without `..`.
    pub fn table_path(&self, table: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(table);
        let plain = !table.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(SinkError::InvalidName(table.to_string()));
        }
        let mut path = self.root.join(relative);
        path.set_extension("csv");
        Ok(path)
    }
}

#[async_trait]
impl ResultSink for CsvResultSink {
    async fn append_table(&self, table: &str, batch: ArrowBatchHandle) -> Result<(), SinkError> {
        let path = self.table_path(table)?;
        // Held across the write so appends to one table never interleave.
        let mut written = self.written.lock().await;
        let header = !written.contains(table);

        let name = table.to_string();
        let rows = batch.num_rows();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_table_file(&target, &batch, header, &name))
            .await
            .map_err(|e| SinkError::Task(e.to_string()))??;

        written.insert(table.to_string());
        debug!(table, rows, path = %path.display(), "table written");
        Ok(())
    }
}

/// Encode `batch` as CSV into any writer, quoting fields where needed.
pub fn write_csv<W: Write>(writer: W, batch: &ArrowBatch, header: bool) -> Result<(), ArrowError> {
    WriterBuilder::new().with_header(header).build(writer).write(batch)
}

fn write_table_file(path: &Path, batch: &ArrowBatch, header: bool, table: &str) -> Result<(), SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!header)
        .truncate(header)
        .open(path)
        .map_err(io_err)?;

    write_csv(file, batch, header).map_err(|source| SinkError::Encode {
        table: table.to_string(),
        source,
    })
}
