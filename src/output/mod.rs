//! Persistence of scored test results.
//!
//! Records are rendered through a [`TableSchema`] and appended to a local CSV
//! table or uploaded to S3 as one object per batch.

pub mod csv;
pub mod s3;
pub mod schema;

use anyhow::Result;
use async_trait::async_trait;

use crate::analyzers::types::TestResult;
pub use schema::{ColumnKind, TableSchema};

pub use self::csv::CsvSink;
pub use self::s3::S3Sink;

/// Append-only destination for a batch of records.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Writes `rows` to the table described by `schema` and returns the number
    /// of rows written.
    async fn append_batch(&self, schema: &TableSchema, rows: &[TestResult]) -> Result<usize>;
}

/// Encodes a batch as a CSV document, header included.
pub fn encode_csv(schema: &TableSchema, rows: &[TestResult]) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(vec![]);
    writer.write_record(schema.header())?;
    for row in rows {
        writer.write_record(schema.render(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV buffer: {}", e.error()))
}
