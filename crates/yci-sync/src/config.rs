//! `config.yaml` + environment configuration for ingestion and scoring.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use yci_adapters::DEFAULT_YOUTUBE_API_BASE;
use yci_storage::{parse_env, BackoffPolicy, HttpClientConfig};

use crate::channel::DEFAULT_PUBSUB_API_BASE;
use crate::pipeline::IngestSettings;
use crate::sentiment::DEFAULT_LANGUAGE_API_BASE;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_PROJECT_ID: &str = "ambient-elf-487017-d6";

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    youtube_api_key: Option<String>,
    channel_id: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
    pubsub_topic: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    publish_concurrency: Option<usize>,
    #[serde(default)]
    ingest_cron: Option<String>,
    #[serde(default)]
    fixture_path: Option<PathBuf>,
}

fn default_max_results() -> u32 {
    20
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub youtube_api_key: Option<String>,
    pub language_api_key: Option<String>,
    pub channel_id: String,
    pub max_results: u32,
    pub pubsub_topic: String,
    pub project_id: String,
    pub publish_concurrency: usize,
    pub ingest_cron: Option<String>,
    /// Serve comments from a saved page instead of the YouTube API.
    pub fixture_path: Option<PathBuf>,
    pub access_token: Option<String>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub youtube_api_base: String,
    pub pubsub_api_base: String,
    pub language_api_base: String,
}

impl IngestConfig {
    /// Reads `$YCI_CONFIG` (or `config.yaml`) and applies process environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("YCI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path, |key| std::env::var(key).ok())
    }

    pub fn load(path: impl AsRef<Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text, env).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(yaml: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        let config = Self {
            youtube_api_key: env("YOUTUBE_API_KEY").or(file.youtube_api_key),
            language_api_key: env("LANGUAGE_API_KEY"),
            channel_id: file.channel_id,
            max_results: file.max_results,
            pubsub_topic: file.pubsub_topic,
            project_id: env("GCP_PROJECT")
                .or(file.project_id)
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
            publish_concurrency: file.publish_concurrency.unwrap_or(1),
            ingest_cron: env("YCI_INGEST_CRON").or(file.ingest_cron),
            fixture_path: env("YCI_FIXTURE_PATH").map(PathBuf::from).or(file.fixture_path),
            access_token: env("GOOGLE_OAUTH_ACCESS_TOKEN"),
            user_agent: env("YCI_USER_AGENT").unwrap_or_else(|| "yci/0.1".to_string()),
            http_timeout_secs: parse_env(&env, "YCI_HTTP_TIMEOUT_SECS", 20)?,
            youtube_api_base: env("YOUTUBE_API_BASE")
                .unwrap_or_else(|| DEFAULT_YOUTUBE_API_BASE.to_string()),
            pubsub_api_base: env("PUBSUB_API_BASE")
                .unwrap_or_else(|| DEFAULT_PUBSUB_API_BASE.to_string()),
            language_api_base: env("LANGUAGE_API_BASE")
                .unwrap_or_else(|| DEFAULT_LANGUAGE_API_BASE.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.channel_id.trim().is_empty(), "channel_id must not be empty");
        ensure!(!self.pubsub_topic.trim().is_empty(), "pubsub_topic must not be empty");
        ensure!(self.max_results > 0, "max_results must be positive");
        ensure!(self.publish_concurrency > 0, "publish_concurrency must be positive");
        Ok(())
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            parent_id: self.channel_id.clone(),
            max_results: self.max_results,
            publish_concurrency: self.publish_concurrency,
        }
    }

    pub fn http_config(&self, backoff: BackoffPolicy) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            bearer_token: self.access_token.clone(),
            backoff,
        }
    }
}
