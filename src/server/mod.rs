//! HTTP surface.
//!
//! Thin axum layer over the [`JobRunner`]: handlers parse input, submit a job
//! and answer `202 Accepted` at once. Polling and downloads read the job
//! table.

pub mod auth;
pub mod handlers;
pub mod response;
pub mod upload;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::job::JobRunner;

/// Headroom above the largest accepted payload for multipart framing and
/// JSON fields.
const BODY_OVERHEAD: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Job submission and lookup.
    pub runner: JobRunner,
    /// Request body cap in bytes.
    pub body_limit: usize,
}

impl AppState {
    /// State whose body cap admits payloads of `max_payload` bytes.
    pub fn new(runner: JobRunner, max_payload: u64) -> Self {
        let body_limit = usize::try_from(max_payload)
            .unwrap_or(usize::MAX)
            .saturating_add(BODY_OVERHEAD);
        Self { runner, body_limit }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/document/file", post(handlers::convert_file))
        .route("/multimedia/audio", post(handlers::convert_audio))
        .route("/multimedia/video", post(handlers::convert_video))
        .route("/web/url", post(handlers::convert_url))
        .route("/web/parent-url", post(handlers::convert_parent_url))
        .route("/web/youtube", post(handlers::convert_youtube))
        .route("/batch", post(handlers::convert_batch))
        .route("/job/:job_id/status", get(handlers::job_status))
        .route("/job/:job_id", axum::routing::delete(handlers::delete_job))
        .route("/download/:job_id/:filename", get(handlers::download))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
