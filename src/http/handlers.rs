//! HTTP request handlers
//!
//! Implements the per-stream HLS endpoints backed by the segment store,
//! the capture ingest endpoint, and health/status.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MP4_CONTENT_TYPE: &str = "video/mp4";

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    StreamNotFound(String),
    NotFound(String),
    InternalError(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::StreamNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Stream not found: {}", id))
            }
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, body).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Per-stream health snapshots
/// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    let snapshots: Vec<_> = state
        .stream_ids()
        .into_iter()
        .filter_map(|id| state.get_stream(&id))
        .map(|supervisor| supervisor.health())
        .collect();
    Json(snapshots).into_response()
}

/// Capture ingest: the body is a continuous fMP4 byte stream.
/// POST /streams/{stream_id}/ingest
///
/// A second POST for the same stream replaces the running capture
/// (supervised handoff); timestamps and indices carry over.
pub async fn ingest_stream(
    State(state): State<Arc<AppState>>,
    Path(stream_id): Path<String>,
    body: Body,
) -> Response {
    let supervisor = state.get_or_create_stream(&stream_id);
    let (tx, rx) = mpsc::channel::<Bytes>(64);
    supervisor.attach(rx);

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(stream = %stream_id, error = %e, "ingest body error");
                break;
            }
        };
        if tx.send(chunk).await.is_err() {
            // Pipeline went away (stopped or replaced); stop reading.
            break;
        }
    }
    // Dropping the sender closes the source; the pipeline flushes its tail.
    StatusCode::NO_CONTENT.into_response()
}

/// HLS egress dispatch by file name.
/// GET /streams/{stream_id}/{file}
pub async fn stream_file(
    State(state): State<Arc<AppState>>,
    Path((stream_id, file)): Path<(String, String)>,
) -> Response {
    let supervisor = match state.get_stream(&stream_id) {
        Some(supervisor) => supervisor,
        None => return HttpError::StreamNotFound(stream_id).into_response(),
    };
    let store = supervisor.store();

    match file.as_str() {
        "playlist.m3u8" => match store.playlist() {
            Some(playlist) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                playlist,
            )
                .into_response(),
            None => HttpError::NotFound("no playlist yet".to_string()).into_response(),
        },
        // The `v` query string is a cache-buster; the handler always serves
        // the current init.
        "init.mp4" => match store.init_segment() {
            Some(init) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, MP4_CONTENT_TYPE),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from(init.bytes),
            )
                .into_response(),
            None => HttpError::NotFound("no init segment yet".to_string()).into_response(),
        },
        name => match parse_segment_name(name) {
            Some(index) => match store.segment(index) {
                Some(bytes) => (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, MP4_CONTENT_TYPE),
                        // Segments are immutable; they just expire from the
                        // window.
                        (header::CACHE_CONTROL, "max-age=60"),
                    ],
                    Body::from(bytes),
                )
                    .into_response(),
                None => HttpError::NotFound(format!(
                    "segment {} not in window for stream {}",
                    index, stream_id
                ))
                .into_response(),
            },
            None => HttpError::NotFound(format!("unknown file: {}", name)).into_response(),
        },
    }
}

/// Parse `segment{N}.m4s` into its index.
fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix("segment")?
        .strip_suffix(".m4s")?
        .parse()
        .ok()
}
