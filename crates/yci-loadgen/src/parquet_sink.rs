//! Offline sink: one parquet file per batch.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use tracing::debug;
use yci_core::{iso8601, SyntheticRow};

use crate::sink::{RowError, RowSink, SinkError, TableRef};

pub struct ParquetSink {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RowSink for ParquetSink {
    fn sink_id(&self) -> &'static str {
        "parquet"
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        rows: &[SyntheticRow],
    ) -> Result<Vec<RowError>, SinkError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("batch-{seq:05}.parquet"));
        let batch = rows_to_batch(rows).map_err(|err| SinkError::Unavailable(format!("{err:#}")))?;
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            write_parquet(&target, batch)
        })
        .await
        .map_err(|err| SinkError::Unavailable(err.to_string()))?
        .map_err(|err| SinkError::Unavailable(format!("{err:#}")))?;
        debug!(%table, path = %path.display(), rows = rows.len(), "wrote parquet batch");
        Ok(vec![])
    }
}

fn row_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("comment_id", DataType::Utf8, false),
        Field::new("comment_text", DataType::Utf8, false),
        Field::new("published_at", DataType::Utf8, false),
        Field::new("sentiment_label", DataType::Utf8, false),
        Field::new("ingested_at", DataType::Utf8, false),
    ]))
}

fn rows_to_batch(rows: &[SyntheticRow]) -> Result<RecordBatch> {
    let ids = StringArray::from(
        rows.iter()
            .map(|r| r.comment_id.to_string())
            .collect::<Vec<_>>(),
    );
    let texts = StringArray::from(
        rows.iter()
            .map(|r| r.comment_text.as_str())
            .collect::<Vec<_>>(),
    );
    let published = StringArray::from(
        rows.iter()
            .map(|r| iso8601(&r.published_at))
            .collect::<Vec<_>>(),
    );
    let labels = StringArray::from(
        rows.iter()
            .map(|r| r.sentiment_label.as_str())
            .collect::<Vec<_>>(),
    );
    let ingested = StringArray::from(
        rows.iter()
            .map(|r| iso8601(&r.ingested_at))
            .collect::<Vec<_>>(),
    );

    RecordBatch::try_new(
        row_schema(),
        vec![
            Arc::new(ids),
            Arc::new(texts),
            Arc::new(published),
            Arc::new(labels),
            Arc::new(ingested),
        ],
    )
    .context("building synthetic row record batch")
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}
