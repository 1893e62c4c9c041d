//! Defines routes for the upload pipeline and file-record operations.
//!
//! ## Structure
//! - **Upload pipeline**
//!   - `POST   /api/upload/chunk`    — stage one chunk (multipart)
//!   - `POST   /api/upload/complete` — merge, push remotely, persist record
//!
//! - **File records**
//!   - `GET    /api/files`       — list the caller's files
//!   - `GET    /api/files/stats` — count of the caller's files
//!   - `DELETE /api/files/{id}`  — remove remote object and record
//!
//! Chunk requests carry large bodies and get a generous timeout; completion
//! does disk plus network work proportional to the whole file and gets a
//! longer one still. Timeouts surface as structured 408 responses.

use crate::{
    errors::AppError,
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{complete_upload, delete_file, file_stats, list_files, upload_chunk},
    },
    services::upload_service::UploadService,
};
use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use std::time::Duration;
use tower::{ServiceBuilder, timeout::TimeoutLayer, timeout::error::Elapsed};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Extra room on top of the chunk ceiling for multipart framing and the
/// metadata fields.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the router for all endpoints.
///
/// The router carries shared state (`UploadService`) to all handlers.
pub fn routes(
    chunk_timeout: Duration,
    complete_timeout: Duration,
    max_chunk_bytes: u64,
) -> Router<UploadService> {
    let chunk_routes = Router::new()
        .route("/upload/chunk", post(upload_chunk))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_error))
                .layer(TimeoutLayer::new(chunk_timeout)),
        )
        .layer(DefaultBodyLimit::max(
            (max_chunk_bytes + MULTIPART_OVERHEAD_BYTES) as usize,
        ));

    let complete_routes = Router::new()
        .route("/upload/complete", post(complete_upload))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_error))
                .layer(TimeoutLayer::new(complete_timeout)),
        );

    let file_routes = Router::new()
        .route("/files", get(list_files))
        .route("/files/stats", get(file_stats))
        .route("/files/{id}", delete(delete_file));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api", chunk_routes.merge(complete_routes).merge(file_routes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Map a route-level timeout onto the structured error payload.
async fn timeout_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::timeout()
    } else {
        AppError::internal(err.to_string())
    }
}
