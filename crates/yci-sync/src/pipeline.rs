//! Fetch → transform → publish, with each record isolated from its siblings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use yci_adapters::{transform, CommentSource, RawRecord, SourceError, TransformError};
use yci_core::PublishOutcome;

use crate::channel::{Ack, ChannelPublisher, PublishError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetching comments failed: {0}")]
    SourceUnavailable(#[from] SourceError),
}

/// Failure of one record; folded into its `PublishOutcome`, never propagated.
#[derive(Debug, Error)]
pub enum PerRecordFailure {
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub parent_id: String,
    pub max_results: u32,
    /// 1 publishes sequentially.
    pub publish_concurrency: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_fetched: usize,
    pub published_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<PublishOutcome>,
}

impl IngestSummary {
    pub fn is_partial(&self) -> bool {
        self.published_count < self.total_fetched
    }
}

pub struct IngestionPipeline {
    source: Arc<dyn CommentSource>,
    publisher: ChannelPublisher,
    settings: IngestSettings,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn CommentSource>,
        publisher: ChannelPublisher,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Only a failed fetch aborts the run; record-level failures are counted in the summary.
    pub async fn run(&self) -> Result<IngestSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "ingest_run",
            %run_id,
            source = self.source.source_id(),
            parent_id = %self.settings.parent_id
        );
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<IngestSummary, IngestError> {
        let started_at = Utc::now();
        info!(topic = self.publisher.topic(), "comment ingestion started");

        let page = self
            .source
            .fetch_page(&self.settings.parent_id, self.settings.max_results)
            .await
            .inspect_err(|err| error!(error = %err, "failed to fetch comments"))?;
        info!(fetched = page.len(), "retrieved comments from source");

        let pending: Vec<_> = page
            .iter()
            .enumerate()
            .map(|(position, raw)| self.process_record(position, raw))
            .collect();
        let outcomes = stream::iter(pending)
            .buffered(self.settings.publish_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let published_count = outcomes.iter().filter(|o| o.success).count();
        let summary = IngestSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_fetched: page.len(),
            published_count,
            failed_count: outcomes.len() - published_count,
            outcomes,
        };
        info!(
            published = summary.published_count,
            failed = summary.failed_count,
            topic = self.publisher.topic(),
            "comment ingestion finished"
        );
        Ok(summary)
    }

    async fn process_record(&self, position: usize, raw: &RawRecord) -> PublishOutcome {
        match self.try_process(raw).await {
            Ok((record_id, ack)) => {
                debug!(position, record_id = %record_id, message_id = %ack.message_id, "published comment");
                PublishOutcome::published(position, record_id, ack.message_id)
            }
            Err(failure) => {
                let record_id = raw.record_id().map(str::to_string);
                warn!(
                    position,
                    record_id = record_id.as_deref().unwrap_or("<unknown>"),
                    error = %failure,
                    "failed to publish comment"
                );
                PublishOutcome::failed(position, record_id, failure.to_string())
            }
        }
    }

    async fn try_process(&self, raw: &RawRecord) -> Result<(String, Ack), PerRecordFailure> {
        let record = transform(raw)?;
        let ack = self.publisher.publish(&record).await?;
        Ok((record.id, ack))
    }
}
