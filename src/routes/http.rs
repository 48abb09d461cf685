// Handlers: version, timeline, top processes; engine errors -> HTTP status

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::{QueryEngine, RankingQuery, TimelineQuery};
use crate::error::EngineError;
use crate::models::{RankingResponse, TimelineResponse};
use crate::store::{EntityDirectory, SampleStore};
use crate::version::{NAME, VERSION};

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::ResultTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EngineError::StoreUnavailable(_)
            | EngineError::DirectoryUnavailable(_)
            | EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self, "query failed");
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// POST /api/metrics/timeline: aligned multi-entity metric timeline.
/// A dropped connection drops the handler future, whose guard cancels the query.
pub(super) async fn timeline_handler<S: SampleStore, D: EntityDirectory>(
    State(engine): State<Arc<QueryEngine<S, D>>>,
    Json(query): Json<TimelineQuery>,
) -> Result<Json<TimelineResponse>, EngineError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    engine.timeline(&query, &cancel).await.map(Json)
}

/// POST /api/processes/top: top-K processes by average CPU or memory.
pub(super) async fn top_processes_handler<S: SampleStore, D: EntityDirectory>(
    State(engine): State<Arc<QueryEngine<S, D>>>,
    Json(query): Json<RankingQuery>,
) -> Result<Json<RankingResponse>, EngineError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    engine.top_processes(&query, &cancel).await.map(Json)
}
