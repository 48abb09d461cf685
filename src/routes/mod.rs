// HTTP routes

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::QueryEngine;
use crate::store::{EntityDirectory, SampleStore};

pub fn app<S: SampleStore, D: EntityDirectory>(engine: Arc<QueryEngine<S, D>>) -> Router {
    Router::new()
        .route("/", get(|| async { "fleetrate: ok" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/api/metrics/timeline",
            post(http::timeline_handler::<S, D>),
        ) // POST /api/metrics/timeline
        .route(
            "/api/processes/top",
            post(http::top_processes_handler::<S, D>),
        ) // POST /api/processes/top
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(engine)
}
