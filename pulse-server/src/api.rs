//! # HTTP Boundary
//!
//! Decodes inbound metric payloads, hands them to the ingest queue, and
//! exposes the current statistics.
//!
//! | Route          | Success                     | Failure                        |
//! |----------------|-----------------------------|--------------------------------|
//! | `POST /ingest` | 202 `{"status":"accepted"}` | 400 malformed, 503 queue full  |
//! | `GET /stats`   | 200 `AnalysisResult` JSON   |                                |
//! | `GET /metrics` | 200 Prometheus text         | 500 encoder failure            |
//! | `GET /health`  | 200 `ok`                    |                                |
//!
//! Handlers never touch the analyzer's write path; ingestion only enqueues.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

use pulse_common::{AnalysisResult, MetricSample, PulseError};
use pulse_engine::Analyzer;

use crate::dispatcher::IngestHandle;
use crate::metrics::Metrics;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub ingest: IngestHandle,
    pub metrics: Arc<Metrics>,
}

/// Inbound metric payload.
///
/// `timestamp` is epoch milliseconds; absent, `null`, or `0` means "now".
/// Absent `cpu` or `rps` read as `0`; present values must be numbers.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngestPayload {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub rps: f64,
}

impl IngestPayload {
    /// Decodes a JSON body.
    pub fn decode(body: &[u8]) -> Result<Self, PulseError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Converts into an immutable sample.
    pub fn into_sample(self) -> Result<MetricSample, PulseError> {
        MetricSample::from_epoch_millis(self.timestamp.unwrap_or(0), self.cpu, self.rps)
    }
}

/// Acknowledgement body for admitted samples.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Accepted {
    pub status: String,
}

/// Error body for rejected requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps boundary errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(PulseError);

impl From<PulseError> for ApiError {
    fn from(err: PulseError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_REQUEST
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/stats", get(stats))
        .route("/metrics", get(export_metrics))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let sample = IngestPayload::decode(&body)?.into_sample()?;
    state.ingest.try_submit(sample)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            status: "accepted".to_string(),
        }),
    ))
}

async fn stats(State(state): State<AppState>) -> Json<AnalysisResult> {
    Json(state.analyzer.current_result())
}

async fn export_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Counts requests and observes latency per method and matched route.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let start = Instant::now();
    let response = next.run(request).await;
    state.metrics.record_http(&method, &path, start.elapsed());
    response
}
