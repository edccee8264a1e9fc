//! Sentiment scoring: the service contract, the Cloud Natural Language client, and the scorer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;
use yci_core::SentimentResult;
use yci_storage::{join_url, HttpClient};

pub const DEFAULT_LANGUAGE_API_BASE: &str = "https://language.googleapis.com";

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("comment text must not be empty")]
    InvalidInput,
    #[error("scoring service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<SentimentResult, ScoringError>;
}

#[derive(Debug, Deserialize)]
struct AnalyzeSentimentResponse {
    #[serde(rename = "documentSentiment")]
    document_sentiment: DocumentSentiment,
}

// proto3 JSON drops zero-valued fields, so a neutral document may arrive as `{}`.
#[derive(Debug, Deserialize)]
struct DocumentSentiment {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    magnitude: f64,
}

#[derive(Debug, Clone)]
pub struct NaturalLanguageScorer {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl NaturalLanguageScorer {
    /// `http` should be built with `BackoffPolicy::none()`: one call per request.
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ScoringService for NaturalLanguageScorer {
    async fn analyze(&self, text: &str) -> Result<SentimentResult, ScoringError> {
        let url = join_url(&self.base_url, "v1/documents:analyzeSentiment");
        let query = self
            .api_key
            .iter()
            .map(|key| ("key", key.clone()))
            .collect::<Vec<_>>();
        let body = json!({
            "document": { "type": "PLAIN_TEXT", "content": text },
            "encodingType": "UTF8",
        });
        let response: AnalyzeSentimentResponse = self
            .http
            .post_json(&url, &query, &body)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ScoringError::Unavailable(format!("timed out: {err}"))
                } else {
                    ScoringError::Unavailable(err.to_string())
                }
            })?;
        Ok(SentimentResult {
            score: response.document_sentiment.score,
            magnitude: response.document_sentiment.magnitude,
        })
    }
}

/// Validates input and makes exactly one service call per request.
#[derive(Clone)]
pub struct SentimentScorer {
    service: Arc<dyn ScoringService>,
}

impl SentimentScorer {
    pub fn new(service: Arc<dyn ScoringService>) -> Self {
        Self { service }
    }

    pub async fn score(&self, text: &str) -> Result<SentimentResult, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError::InvalidInput);
        }
        self.service
            .analyze(text)
            .await
            .inspect_err(|err| warn!(error = %err, "could not analyze sentiment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedScore {
        result: Option<SentimentResult>,
        calls: AtomicUsize,
    }

    impl FixedScore {
        fn returning(score: f64, magnitude: f64) -> Self {
            Self {
                result: Some(SentimentResult { score, magnitude }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                result: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScoringService for FixedScore {
        async fn analyze(&self, _text: &str) -> Result<SentimentResult, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .ok_or_else(|| ScoringError::Unavailable("deadline exceeded".into()))
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_calling_the_service() {
        let service = Arc::new(FixedScore::returning(0.8, 0.8));
        let scorer = SentimentScorer::new(service.clone());

        assert!(matches!(scorer.score("").await, Err(ScoringError::InvalidInput)));
        assert!(matches!(scorer.score("   \n").await, Err(ScoringError::InvalidInput)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_fields_map_straight_through() {
        let service = Arc::new(FixedScore::returning(0.8, 1.6));
        let scorer = SentimentScorer::new(service.clone());

        let result = scorer.score("great product").await.unwrap();
        assert_eq!(result.score, 0.8);
        assert_eq!(result.magnitude, 1.6);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_failure_is_unavailable_and_not_retried() {
        let service = Arc::new(FixedScore::failing());
        let scorer = SentimentScorer::new(service.clone());

        let err = scorer.score("meh").await.unwrap_err();
        assert!(matches!(err, ScoringError::Unavailable(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn neutral_response_with_omitted_fields_decodes_to_zero() {
        let parsed: AnalyzeSentimentResponse =
            serde_json::from_str(r#"{"documentSentiment":{},"language":"en"}"#).unwrap();
        assert_eq!(parsed.document_sentiment.score, 0.0);
        assert_eq!(parsed.document_sentiment.magnitude, 0.0);

        let parsed: AnalyzeSentimentResponse = serde_json::from_str(
            r#"{"documentSentiment":{"magnitude":0.9,"score":-0.4},"sentences":[]}"#,
        )
        .unwrap();
        assert_eq!(parsed.document_sentiment.score, -0.4);
    }
}
