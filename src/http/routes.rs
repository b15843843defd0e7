//! Axum router configuration

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{health_check, ingest_stream, status, stream_file};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // DVR clients fetch playlists and segments cross-origin; HEAD probes
    // are common before a tune.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([
            header::ACCEPT,
            header::RANGE,
            header::CONTENT_TYPE,
            header::ORIGIN,
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        // Health and status endpoints
        .route("/health", get(health_check))
        .route("/status", get(status))
        // Capture ingest: the browser-capture side POSTs the fMP4 stream
        .route("/streams/{stream_id}/ingest", post(ingest_stream))
        // HLS egress: playlist.m3u8, init.mp4, segment{N}.m4s
        .route("/streams/{stream_id}/{file}", get(stream_file))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}
