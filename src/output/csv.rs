use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::{debug, info};

use super::{Sink, TableSchema};
use crate::analyzers::types::TestResult;

/// Appends batches to `<dir>/<table>.csv`.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, schema: &TableSchema) -> PathBuf {
        self.dir.join(format!("{}.csv", schema.name))
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn append_batch(&self, schema: &TableSchema, rows: &[TestResult]) -> Result<usize> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;

        let path = self.table_path(schema);
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, "Appending CSV batch");

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if !file_exists {
            writer.write_record(schema.header())?;
        }
        for row in rows {
            writer.write_record(schema.render(row))?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = rows.len(), "CSV batch written");
        Ok(rows.len())
    }
}
