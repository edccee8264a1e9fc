//! Message channel contract, the Pub/Sub REST channel, and the per-record publisher.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use yci_core::CanonicalRecord;
use yci_storage::{join_url, HttpClient};

pub const DEFAULT_PUBSUB_API_BASE: &str = "https://pubsub.googleapis.com";

/// Durable acknowledgment from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub message_id: String,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Resolves only once the payload is durably stored.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, ChannelError>;
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(rename = "messageIds", default)]
    message_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PubSubChannel {
    http: HttpClient,
    base_url: String,
    project_id: String,
}

impl PubSubChannel {
    pub fn new(http: HttpClient, base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            project_id: project_id.into(),
        }
    }

    pub fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.project_id, topic)
    }
}

#[async_trait]
impl MessageChannel for PubSubChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, ChannelError> {
        let url = join_url(
            &self.base_url,
            &format!("v1/{}:publish", self.topic_path(topic)),
        );
        let body = json!({ "messages": [{ "data": STANDARD.encode(&payload) }] });
        let response: PublishResponse = self
            .http
            .post_json(&url, &[], &body)
            .await
            .map_err(|err| ChannelError::Unavailable(err.to_string()))?;
        response
            .message_ids
            .into_iter()
            .next()
            .map(|message_id| Ack { message_id })
            .ok_or_else(|| ChannelError::Unavailable("publish returned no message id".into()))
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("encoding payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Publishes canonical records one at a time onto a fixed topic.
#[derive(Clone)]
pub struct ChannelPublisher {
    channel: Arc<dyn MessageChannel>,
    topic: String,
}

impl ChannelPublisher {
    pub fn new(channel: Arc<dyn MessageChannel>, topic: impl Into<String>) -> Self {
        Self {
            channel,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, record: &CanonicalRecord) -> Result<Ack, PublishError> {
        let payload = serde_json::to_vec(&record.to_message())?;
        Ok(self.channel.publish(&self.topic, payload).await?)
    }
}
