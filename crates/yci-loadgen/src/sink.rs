//! Row sinks: the insert contract and the BigQuery streaming-insert client.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use yci_core::SyntheticRow;
use yci_storage::{join_url, HttpClient};

pub const DEFAULT_BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// A row the sink refused; `index` is the row's position in the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RowSink: Send + Sync {
    fn sink_id(&self) -> &'static str;

    /// An empty vec means every row was accepted.
    async fn insert_batch(
        &self,
        table: &TableRef,
        rows: &[SyntheticRow],
    ) -> Result<Vec<RowError>, SinkError>;
}

#[derive(Debug, Serialize)]
struct InsertAllRequest<'a> {
    kind: &'static str,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: String,
    json: &'a SyntheticRow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl InsertErrors {
    fn into_row_error(self) -> RowError {
        let message = self
            .errors
            .iter()
            .map(|e| match (&e.reason, &e.message) {
                (Some(reason), Some(message)) => format!("{reason}: {message}"),
                (Some(reason), None) => reason.clone(),
                (None, Some(message)) => message.clone(),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        RowError {
            index: self.index,
            message: if message.is_empty() {
                "row rejected".to_string()
            } else {
                message
            },
        }
    }
}

fn insert_all_request(rows: &[SyntheticRow]) -> InsertAllRequest<'_> {
    InsertAllRequest {
        kind: "bigquery#tableDataInsertAllRequest",
        rows: rows
            .iter()
            .map(|row| InsertRow {
                insert_id: row.comment_id.to_string(),
                json: row,
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct BigQuerySink {
    http: HttpClient,
    base_url: String,
}

impl BigQuerySink {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn insert_all_url(&self, table: &TableRef) -> String {
        join_url(
            &self.base_url,
            &format!(
                "bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
                table.project_id, table.dataset_id, table.table_id
            ),
        )
    }
}

#[async_trait]
impl RowSink for BigQuerySink {
    fn sink_id(&self) -> &'static str {
        "bigquery"
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        rows: &[SyntheticRow],
    ) -> Result<Vec<RowError>, SinkError> {
        // insertAll rejects a request with no rows.
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let response: InsertAllResponse = self
            .http
            .post_json(&self.insert_all_url(table), &[], &insert_all_request(rows))
            .await
            .map_err(|err| SinkError::Unavailable(err.to_string()))?;
        Ok(response
            .insert_errors
            .into_iter()
            .map(InsertErrors::into_row_error)
            .collect())
    }
}
