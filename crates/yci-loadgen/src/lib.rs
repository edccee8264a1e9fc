//! Synthetic comment load generator: batch sizing, row generation, sinks and the tick loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;
use yci_storage::{parse_env, BackoffPolicy, HttpClient, HttpClientConfig};

pub mod parquet_sink;
pub mod plan;
pub mod rows;
pub mod scheduler;
pub mod sink;

pub use parquet_sink::ParquetSink;
pub use plan::{BatchPlan, PlanError};
pub use rows::{RowGenerator, DEFAULT_MAX_BACKDATE_MINUTES};
pub use scheduler::{compensated_sleep, BatchLoadScheduler, LoadRunSummary, SchedulerState};
pub use sink::{BigQuerySink, RowError, RowSink, SinkError, TableRef, DEFAULT_BIGQUERY_API_BASE};

pub const CRATE_NAME: &str = "yci-loadgen";

const DEFAULT_PROJECT_ID: &str = "ambient-elf-487017-d6";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadgenConfig {
    pub hours: u64,
    pub records_per_hour: u64,
    pub interval_seconds: u64,
    pub max_backdate_minutes: u32,
    pub project_id: String,
    pub dataset: String,
    pub table: String,
    pub bigquery_api_base: String,
    pub access_token: Option<String>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for LoadgenConfig {
    fn default() -> Self {
        Self {
            hours: 5,
            records_per_hour: 1000,
            interval_seconds: 300,
            max_backdate_minutes: DEFAULT_MAX_BACKDATE_MINUTES,
            project_id: DEFAULT_PROJECT_ID.to_string(),
            dataset: "youtube_comments".to_string(),
            table: "comments_train".to_string(),
            bigquery_api_base: DEFAULT_BIGQUERY_API_BASE.to_string(),
            access_token: None,
            user_agent: "yci/0.1".to_string(),
            http_timeout_secs: 20,
        }
    }
}

impl LoadgenConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            hours: parse_env(&env, "YCI_LOADGEN_HOURS", defaults.hours)?,
            records_per_hour: parse_env(&env, "YCI_LOADGEN_RECORDS_PER_HOUR", defaults.records_per_hour)?,
            interval_seconds: parse_env(&env, "YCI_LOADGEN_INTERVAL_SECS", defaults.interval_seconds)?,
            max_backdate_minutes: parse_env(
                &env,
                "YCI_LOADGEN_MAX_BACKDATE_MINUTES",
                defaults.max_backdate_minutes,
            )?,
            project_id: env("GCP_PROJECT").unwrap_or(defaults.project_id),
            dataset: env("YCI_LOADGEN_DATASET").unwrap_or(defaults.dataset),
            table: env("YCI_LOADGEN_TABLE").unwrap_or(defaults.table),
            bigquery_api_base: env("BIGQUERY_API_BASE").unwrap_or(defaults.bigquery_api_base),
            access_token: env("GOOGLE_OAUTH_ACCESS_TOKEN"),
            user_agent: env("YCI_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: parse_env(&env, "YCI_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
        })
    }

    pub fn plan(&self) -> Result<BatchPlan, PlanError> {
        BatchPlan::new(self.hours, self.records_per_hour, self.interval_seconds)
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset, &self.table)
    }

    pub fn bigquery_sink(&self) -> Result<BigQuerySink> {
        let http = HttpClient::new(HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            bearer_token: self.access_token.clone(),
            backoff: BackoffPolicy::default(),
        })
        .context("building bigquery client")?;
        Ok(BigQuerySink::new(http, self.bigquery_api_base.clone()))
    }
}

/// One full load run against `sink` with OS-seeded randomness.
pub async fn run_loadgen(
    config: &LoadgenConfig,
    sink: Arc<dyn RowSink>,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<LoadRunSummary> {
    let plan = config.plan()?;
    info!(
        table = %config.table_ref(),
        batches_per_hour = plan.batches_per_hour,
        records_per_batch = plan.records_per_batch,
        effective_hourly_rate = plan.effective_hourly_rate(),
        "planned synthetic load"
    );
    let mut scheduler = BatchLoadScheduler::new(
        plan,
        config.table_ref(),
        sink,
        RowGenerator::from_entropy(config.max_backdate_minutes),
    );
    if let Some(rx) = shutdown {
        scheduler = scheduler.with_shutdown(rx);
    }
    Ok(scheduler.run().await)
}
