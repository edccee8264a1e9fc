//! Axum HTTP boundary for ingestion and sentiment scoring.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;
use yci_core::SentimentResult;
use yci_sync::{IngestComponents, IngestError, ScoringError};

pub const CRATE_NAME: &str = "yci-web";
pub const DEFAULT_PORT: u16 = 8080;

const PREDICT_PATH: &str = "/predict_sentiment";

#[derive(Clone)]
pub struct AppState {
    pub components: IngestComponents,
}

impl AppState {
    pub fn new(components: IngestComponents) -> Self {
        Self { components }
    }
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    run_id: Uuid,
    published_count: usize,
    total_fetched: usize,
    failed_count: usize,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    comment: String,
}

#[derive(Template)]
#[template(path = "predict_ui.html")]
struct PredictUiTemplate {
    title: &'static str,
    endpoint: &'static str,
    positive_threshold: f64,
    negative_threshold: f64,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ingest_comments", any(ingest_handler))
        .route(PREDICT_PATH, any(predict_sentiment_handler))
        .route("/predict_ui", get(predict_ui_handler))
        .fallback(ingest_handler)
        .with_state(Arc::new(state))
}

pub fn port_from_env() -> u16 {
    std::env::var("YCI_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn ingest_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.components.pipeline.run().await {
        Ok(summary) => Json(IngestResponse {
            run_id: summary.run_id,
            published_count: summary.published_count,
            total_fetched: summary.total_fetched,
            failed_count: summary.failed_count,
            message: format!(
                "Comments pushed to Pub/Sub ({} messages).",
                summary.published_count
            ),
        })
        .into_response(),
        Err(IngestError::SourceUnavailable(err)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error fetching comments: {err}"),
        ),
    }
}

async fn predict_sentiment_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "POST")],
            "Only POST requests are accepted",
        )
            .into_response();
    }

    let Ok(request) = serde_json::from_slice::<PredictRequest>(&body) else {
        warn!("predict_sentiment request without a comment");
        return json_error(StatusCode::BAD_REQUEST, r#"Missing "comment" in request body"#);
    };

    match state.components.scorer.score(&request.comment).await {
        Ok(SentimentResult { score, magnitude }) => {
            Json(json!({ "score": score, "magnitude": magnitude })).into_response()
        }
        Err(ScoringError::InvalidInput) => {
            json_error(StatusCode::BAD_REQUEST, r#""comment" must not be empty"#)
        }
        Err(ScoringError::Unavailable(_)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to analyze sentiment",
        ),
    }
}

async fn predict_ui_handler() -> Response {
    render_html(PredictUiTemplate {
        title: "Comment Sentiment Predictor",
        endpoint: PREDICT_PATH,
        positive_threshold: SentimentResult::POSITIVE_THRESHOLD,
        negative_threshold: SentimentResult::NEGATIVE_THRESHOLD,
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Server error: {err}")),
        )
            .into_response(),
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
