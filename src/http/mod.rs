//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the per-stream HLS endpoints
//! - Chunked capture ingest
//! - Health and status endpoints
//! - CORS middleware

pub mod handlers;
pub mod routes;

pub use routes::create_router;
