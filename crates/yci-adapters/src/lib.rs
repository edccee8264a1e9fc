//! Comment source contracts, the raw-to-canonical transformer, and source implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;
use yci_core::CanonicalRecord;
use yci_storage::{join_url, HttpClient};

pub const CRATE_NAME: &str = "yci-adapters";

pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com";

/// YouTube caps `commentThreads.list` pages at 100 items.
pub const MAX_PAGE_SIZE: u32 = 100;

const ID_PATH: &[&str] = &["snippet", "topLevelComment", "id"];
const TEXT_PATH: &[&str] = &["snippet", "topLevelComment", "snippet", "textDisplay"];

/// One `commentThread` resource exactly as the source returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(JsonValue);

impl RawRecord {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    /// Best-effort identity for logging, available even when the record fails to transform.
    pub fn record_id(&self) -> Option<&str> {
        json_str(&self.0, ID_PATH).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("missing field `{field}` at {path}")]
    MissingField { field: &'static str, path: String },
    #[error("record id is empty")]
    EmptyId,
}

/// Maps a raw record onto `{id, text}`. Pure; the id is copied through untouched.
pub fn transform(raw: &RawRecord) -> Result<CanonicalRecord, TransformError> {
    let id = json_str(raw.as_json(), ID_PATH).ok_or_else(|| TransformError::MissingField {
        field: "id",
        path: ID_PATH.join("."),
    })?;
    if id.is_empty() {
        return Err(TransformError::EmptyId);
    }
    let text = json_str(raw.as_json(), TEXT_PATH).ok_or_else(|| TransformError::MissingField {
        field: "text",
        path: TEXT_PATH.join("."),
    })?;
    Ok(CanonicalRecord::new(id, text))
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(*key)?;
    }
    cur.as_str()
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CommentSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// One page of raw records under `parent_id`, at most `max_results` long.
    async fn fetch_page(
        &self,
        parent_id: &str,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct CommentThreadListResponse {
    #[serde(default)]
    items: Vec<RawRecord>,
}

pub fn clamp_page_size(max_results: u32) -> u32 {
    max_results.clamp(1, MAX_PAGE_SIZE)
}

/// `commentThreads.list` over every thread related to a channel.
#[derive(Debug, Clone)]
pub struct YouTubeCommentSource {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl YouTubeCommentSource {
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn query(&self, parent_id: &str, max_results: u32) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("allThreadsRelatedToChannelId", parent_id.to_string()),
            ("maxResults", clamp_page_size(max_results).to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        query
    }
}

#[async_trait]
impl CommentSource for YouTubeCommentSource {
    fn source_id(&self) -> &'static str {
        "youtube"
    }

    async fn fetch_page(
        &self,
        parent_id: &str,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let url = join_url(&self.base_url, "youtube/v3/commentThreads");
        let response: CommentThreadListResponse = self
            .http
            .get_json(&url, &self.query(parent_id, max_results))
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        Ok(response.items)
    }
}

/// Serves a saved `commentThreads.list` response from disk; for offline runs and tests.
#[derive(Debug, Clone)]
pub struct FixtureCommentSource {
    path: PathBuf,
}

impl FixtureCommentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommentSource for FixtureCommentSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_page(
        &self,
        parent_id: &str,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            SourceError::Unavailable(format!("reading {}: {err}", self.path.display()))
        })?;
        let response: CommentThreadListResponse = serde_json::from_str(&text).map_err(|err| {
            SourceError::Unavailable(format!("parsing {}: {err}", self.path.display()))
        })?;
        let mut items = response.items;
        items.truncate(clamp_page_size(max_results) as usize);
        info!(
            parent_id,
            path = %self.path.display(),
            items = items.len(),
            "served comment page from fixture"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yci_storage::HttpClientConfig;

    fn thread(id: &str, text: &str) -> RawRecord {
        RawRecord::new(json!({
            "kind": "youtube#commentThread",
            "id": format!("thread-{id}"),
            "snippet": {
                "topLevelComment": {
                    "id": id,
                    "snippet": { "textDisplay": text }
                }
            }
        }))
    }

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    #[test]
    fn transform_extracts_top_level_comment() {
        let record = transform(&thread("Ugx1", "great tutorial")).unwrap();
        assert_eq!(record, CanonicalRecord::new("Ugx1", "great tutorial"));
    }

    #[test]
    fn transform_keeps_source_id_stable() {
        let raw = thread("Ugx-stable", "same words");
        let first = transform(&raw).unwrap();
        let second = transform(&raw).unwrap();
        assert_eq!(first.id, "Ugx-stable");
        assert_eq!(first, second);

        // The comment id wins over the enclosing thread id.
        assert_ne!(first.id, raw.as_json()["id"].as_str().unwrap());
    }

    #[test]
    fn transform_rejects_missing_or_empty_fields() {
        let no_comment = RawRecord::new(json!({ "snippet": {} }));
        assert_eq!(
            transform(&no_comment),
            Err(TransformError::MissingField {
                field: "id",
                path: "snippet.topLevelComment.id".into()
            })
        );

        let no_text = RawRecord::new(json!({
            "snippet": { "topLevelComment": { "id": "Ugx2", "snippet": {} } }
        }));
        assert!(matches!(
            transform(&no_text),
            Err(TransformError::MissingField { field: "text", .. })
        ));

        assert_eq!(transform(&thread("", "text")), Err(TransformError::EmptyId));
        assert_eq!(thread("", "text").record_id(), None);
    }

    #[test]
    fn youtube_query_clamps_page_size_and_attaches_key() {
        let http = HttpClient::new(HttpClientConfig::default()).unwrap();
        let source = YouTubeCommentSource::new(http, DEFAULT_YOUTUBE_API_BASE, Some("k".into()));
        let query = source.query("UC123", 500);
        assert!(query.contains(&("allThreadsRelatedToChannelId", "UC123".to_string())));
        assert!(query.contains(&("maxResults", "100".to_string())));
        assert!(query.contains(&("key", "k".to_string())));
        assert_eq!(clamp_page_size(0), 1);
    }

    #[tokio::test]
    async fn fixture_source_serves_items_bounded_by_max_results() {
        let source = FixtureCommentSource::new(
            workspace_root().join("fixtures/youtube/comment_threads.json"),
        );
        let all = source.fetch_page("UC_x5XG1OV2P6uZZ5FSM9Ttw", 50).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].record_id(), Some("UgzQ1a2b3c4d5e6f7g8h9AaABAg"));
        assert_eq!(all[2].record_id(), None);

        let two = source.fetch_page("UC_x5XG1OV2P6uZZ5FSM9Ttw", 2).await.unwrap();
        assert_eq!(two.len(), 2);
    }

    #[tokio::test]
    async fn fixture_source_reports_unreadable_file_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureCommentSource::new(dir.path().join("missing.json"));
        let err = source.fetch_page("UC1", 10).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(msg) if msg.contains("missing.json")));
    }
}
