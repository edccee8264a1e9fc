//! Shared HTTP transport for the Google REST collaborators (YouTube, Pub/Sub, Language, BigQuery).

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "yci-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Single attempt; failures go straight back to the caller.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Forwarded verbatim as `Authorization: Bearer ...`; obtaining it is the environment's job.
    pub bearer_token: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            bearer_token: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request(err) if err.is_timeout())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    bearer_token: Option<String>,
    backoff: BackoffPolicy,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            bearer_token: config.bearer_token,
            backoff: config.backoff,
        })
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let body = self
            .send_with_retry("GET", url, || self.authorized(self.client.get(url).query(query)))
            .await?;
        decode(url, &body)
    }

    pub async fn post_json<B, T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        payload: &B,
    ) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self
            .send_with_retry("POST", url, || {
                self.authorized(self.client.post(url).query(query).json(payload))
            })
            .await?;
        decode(url, &body)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // Query strings may hold API keys, so spans only carry the bare url.
    async fn send_with_retry<F>(&self, method: &str, url: &str, build: F) -> Result<Vec<u8>, FetchError>
    where
        F: Fn() -> RequestBuilder,
    {
        let span = info_span!("http_call", method, url);
        async move {
            let mut attempt = 0usize;
            loop {
                match build().send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        if status.is_success() {
                            debug!(status = status.as_u16(), attempt, "http call succeeded");
                            return Ok(resp.bytes().await?.to_vec());
                        }

                        if classify_status(status) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            warn!(status = status.as_u16(), attempt, "retryable http status");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }

                        let body = resp.text().await.unwrap_or_default();
                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                            body,
                        });
                    }
                    Err(err) => {
                        if classify_reqwest_error(&err) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            warn!(error = %err, attempt, "retryable request error");
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(FetchError::Request(err));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Joins a base url and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parses `key` from an environment lookup, falling back to `default` only when it is unset.
pub fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}={raw:?} is not a valid number")),
        None => Ok(default),
    }
}
