//! Core domain model for YCI: canonical comments, publish outcomes, sentiment and synthetic rows.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "yci-core";

/// Normalized `{id, text}` form of a fetched comment.
///
/// `id` is assigned by the source and is the idempotency key downstream consumers dedupe on.
/// Nothing in the pipeline rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub text: String,
}

impl CanonicalRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Wire message carried on the channel for this record.
    pub fn to_message(&self) -> CommentMessage<'_> {
        CommentMessage {
            id: &self.id,
            comment: &self.text,
        }
    }
}

/// JSON payload published per comment: `{"id": ..., "comment": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentMessage<'a> {
    pub id: &'a str,
    pub comment: &'a str,
}

/// Result of attempting to move one fetched record onto the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Index of the record within the fetched page.
    pub position: usize,
    /// Source id, when it could be extracted from the raw record.
    pub record_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    /// Channel-assigned message id on success.
    pub message_id: Option<String>,
}

impl PublishOutcome {
    pub fn published(position: usize, record_id: String, message_id: String) -> Self {
        Self {
            position,
            record_id: Some(record_id),
            success: true,
            error: None,
            message_id: Some(message_id),
        }
    }

    pub fn failed(position: usize, record_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            position,
            record_id,
            success: false,
            error: Some(error.into()),
            message_id: None,
        }
    }
}

/// Polarity + strength as reported by the scoring service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// In `[-1.0, 1.0]`.
    pub score: f64,
    /// `>= 0.0`.
    pub magnitude: f64,
}

impl SentimentResult {
    pub const POSITIVE_THRESHOLD: f64 = 0.2;
    pub const NEGATIVE_THRESHOLD: f64 = -0.2;

    /// Display bucket for the score, printed by `yci score`. `/predict_ui` gets the same
    /// thresholds injected and buckets client-side. Never feeds back into the score.
    pub fn label(&self) -> SentimentLabel {
        if self.score > Self::POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if self.score < Self::NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated row for the analytical sink.
///
/// `published_at <= ingested_at` always holds; `ingested_at` is the batch start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRow {
    pub comment_id: Uuid,
    pub comment_text: String,
    #[serde(with = "rfc3339")]
    pub published_at: DateTime<Utc>,
    pub sentiment_label: SentimentLabel,
    #[serde(with = "rfc3339")]
    pub ingested_at: DateTime<Utc>,
}

/// ISO-8601 with an explicit `+00:00` offset, the shape the sink table expects.
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso8601(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
