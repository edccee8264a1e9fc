//! Comment ingestion (fetch → transform → publish) and on-demand sentiment scoring.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use yci_adapters::{CommentSource, FixtureCommentSource, YouTubeCommentSource};
use yci_storage::{BackoffPolicy, HttpClient};

pub mod channel;
pub mod config;
pub mod pipeline;
pub mod sentiment;

pub use channel::{Ack, ChannelError, ChannelPublisher, MessageChannel, PubSubChannel, PublishError};
pub use config::IngestConfig;
pub use pipeline::{IngestError, IngestSettings, IngestSummary, IngestionPipeline, PerRecordFailure};
pub use sentiment::{NaturalLanguageScorer, ScoringError, ScoringService, SentimentScorer};

pub const CRATE_NAME: &str = "yci-sync";

/// The request-path components, wired once per process.
#[derive(Clone)]
pub struct IngestComponents {
    pub pipeline: Arc<IngestionPipeline>,
    pub scorer: SentimentScorer,
}

impl IngestComponents {
    pub fn new(pipeline: IngestionPipeline, scorer: SentimentScorer) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            scorer,
        }
    }

    /// Builds the REST collaborators described by `config` and injects them.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let source: Arc<dyn CommentSource> = match &config.fixture_path {
            Some(path) => Arc::new(FixtureCommentSource::new(path.clone())),
            None => Arc::new(YouTubeCommentSource::new(
                HttpClient::new(config.http_config(BackoffPolicy::none()))
                    .context("building youtube client")?,
                config.youtube_api_base.clone(),
                config.youtube_api_key.clone(),
            )),
        };

        let channel = PubSubChannel::new(
            HttpClient::new(config.http_config(BackoffPolicy::default()))
                .context("building pubsub client")?,
            config.pubsub_api_base.clone(),
            config.project_id.clone(),
        );
        info!(
            project_id = %config.project_id,
            topic = %config.pubsub_topic,
            topic_path = %channel.topic_path(&config.pubsub_topic),
            "using pubsub topic"
        );

        let scoring = NaturalLanguageScorer::new(
            HttpClient::new(config.http_config(BackoffPolicy::none()))
                .context("building language client")?,
            config.language_api_base.clone(),
            config.language_api_key.clone(),
        );

        let pipeline = IngestionPipeline::new(
            source,
            ChannelPublisher::new(Arc::new(channel), config.pubsub_topic.clone()),
            config.ingest_settings(),
        );
        Ok(Self::new(pipeline, SentimentScorer::new(Arc::new(scoring))))
    }
}

pub async fn run_ingest_once_from_env() -> Result<IngestSummary> {
    let config = IngestConfig::from_env()?;
    let components = IngestComponents::from_config(&config)?;
    Ok(components.pipeline.run().await?)
}

/// Cron trigger for the pipeline. A tick that fires while a run is still in flight is skipped.
pub async fn build_ingest_scheduler(
    pipeline: Arc<IngestionPipeline>,
    cron: &str,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let in_flight = Arc::new(Mutex::new(()));
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        let in_flight = in_flight.clone();
        Box::pin(async move {
            let Ok(_guard) = in_flight.try_lock() else {
                warn!("previous scheduled ingestion still running; skipping tick");
                return;
            };
            match pipeline.run().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    published = summary.published_count,
                    fetched = summary.total_fetched,
                    "scheduled ingestion finished"
                ),
                Err(err) => error!(error = %err, "scheduled ingestion failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use yci_adapters::{RawRecord, SourceError};
    use yci_core::SentimentResult;

    struct EmptySource;

    #[async_trait]
    impl CommentSource for EmptySource {
        fn source_id(&self) -> &'static str {
            "empty"
        }

        async fn fetch_page(&self, _: &str, _: u32) -> Result<Vec<RawRecord>, SourceError> {
            Ok(vec![])
        }
    }

    struct NullChannel;

    #[async_trait]
    impl MessageChannel for NullChannel {
        async fn publish(&self, _: &str, _: Vec<u8>) -> Result<Ack, ChannelError> {
            Err(ChannelError::Unavailable("unused".into()))
        }
    }

    struct Neutral;

    #[async_trait]
    impl ScoringService for Neutral {
        async fn analyze(&self, _: &str) -> Result<SentimentResult, ScoringError> {
            Ok(SentimentResult {
                score: 0.0,
                magnitude: 0.0,
            })
        }
    }

    fn pipeline() -> Arc<IngestionPipeline> {
        Arc::new(IngestionPipeline::new(
            Arc::new(EmptySource),
            ChannelPublisher::new(Arc::new(NullChannel), "comments"),
            IngestSettings {
                parent_id: "UC1".into(),
                max_results: 10,
                publish_concurrency: 1,
            },
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_accepts_valid_cron_and_rejects_garbage() {
        assert!(build_ingest_scheduler(pipeline(), "0 */15 * * * *").await.is_ok());
        assert!(build_ingest_scheduler(pipeline(), "every now and then").await.is_err());
    }

    #[tokio::test]
    async fn components_share_one_pipeline() {
        let components = IngestComponents::new(
            IngestionPipeline::new(
                Arc::new(EmptySource),
                ChannelPublisher::new(Arc::new(NullChannel), "comments"),
                IngestSettings {
                    parent_id: "UC1".into(),
                    max_results: 10,
                    publish_concurrency: 1,
                },
            ),
            SentimentScorer::new(Arc::new(Neutral)),
        );
        let cloned = components.clone();
        assert!(Arc::ptr_eq(&components.pipeline, &cloned.pipeline));
        assert_eq!(cloned.pipeline.run().await.unwrap().total_fetched, 0);
        assert_eq!(components.scorer.score("fine").await.unwrap().score, 0.0);
    }

    #[test]
    fn fixture_config_builds_offline_components() {
        let yaml = "channel_id: UC1\npubsub_topic: comments\nfixture_path: fixtures/youtube/comment_threads.json\n";
        let config = IngestConfig::from_yaml(yaml, |_| None).unwrap();
        let components = IngestComponents::from_config(&config).unwrap();
        assert_eq!(components.pipeline.settings().parent_id, "UC1");
    }
}
