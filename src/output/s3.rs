use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::info;

use super::{Sink, TableSchema, encode_csv};
use crate::analyzers::types::TestResult;

/// Uploads each batch as one CSV object under
/// `<table>/date=YYYY-MM-DD/<run-id>.csv`, optionally gzip-compressed.
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    gzip: bool,
    run_id: String,
    date: NaiveDate,
}

impl S3Sink {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        gzip: bool,
        run_id: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            gzip,
            run_id: run_id.into(),
            date,
        }
    }

    /// Creates a sink using the ambient AWS configuration.
    pub async fn from_env(bucket: impl Into<String>, gzip: bool, run_id: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(
            aws_sdk_s3::Client::new(&config),
            bucket,
            gzip,
            run_id,
            chrono::Utc::now().date_naive(),
        )
    }

    pub fn object_key(&self, schema: &TableSchema) -> String {
        object_key(&schema.name, self.date, &self.run_id, self.gzip)
    }
}

pub fn object_key(table: &str, date: NaiveDate, run_id: &str, gzip: bool) -> String {
    let ext = if gzip { "csv.gz" } else { "csv" };
    format!("{table}/date={}/{run_id}.{ext}", date.format("%Y-%m-%d"))
}

fn gzip_bytes(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

#[async_trait]
impl Sink for S3Sink {
    async fn append_batch(&self, schema: &TableSchema, rows: &[TestResult]) -> Result<usize> {
        let csv = encode_csv(schema, rows)?;
        let body = if self.gzip { gzip_bytes(&csv)? } else { csv };
        let key = self.object_key(schema);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .with_context(|| format!("uploading s3://{}/{}", self.bucket, key))?;

        info!(bucket = %self.bucket, key = %key, rows = rows.len(), "S3 batch uploaded");
        Ok(rows.len())
    }
}
