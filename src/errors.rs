use crate::services::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request-level errors that keeps the message
/// local and tags every failure with a stable machine-readable kind.
///
/// Responses are always `{ "message": ..., "errorKind": ... }`; internals
/// such as backtraces never leave the process.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, kind, and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg)
    }

    /// Shortcut for 401 Unauthorized.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", msg)
    }

    /// Shortcut for 400 Bad Request.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BadRequest", msg)
    }

    /// Produced when a route-level timeout elapses.
    pub fn timeout() -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, "Timeout", "request timed out")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "message": self.message,
            "errorKind": self.kind
        }));

        (self.status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::InvalidFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::ChunkTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::InvalidChunkIndex { .. } => StatusCode::BAD_REQUEST,
            UploadError::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
            UploadError::CompletionInProgress(_) => StatusCode::CONFLICT,
            UploadError::FileNotFound(_) => StatusCode::NOT_FOUND,
            UploadError::RemoteUploadFailed(_) => StatusCode::BAD_GATEWAY,
            UploadError::MergeFailed(_)
            | UploadError::PersistenceError(_)
            | UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UploadError;

    #[test]
    fn upload_errors_map_to_expected_statuses() {
        let cases = [
            (
                AppError::from(UploadError::InvalidFileType("text/html".into())),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "InvalidFileType",
            ),
            (
                AppError::from(UploadError::ChunkTooLarge { size: 10, limit: 5 }),
                StatusCode::PAYLOAD_TOO_LARGE,
                "ChunkTooLarge",
            ),
            (
                AppError::from(UploadError::IncompleteUpload {
                    filename: "a.dcm".into(),
                    missing: 1,
                    total: 3,
                }),
                StatusCode::BAD_REQUEST,
                "IncompleteUpload",
            ),
            (
                AppError::from(UploadError::CompletionInProgress("a.dcm".into())),
                StatusCode::CONFLICT,
                "CompletionInProgress",
            ),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status, status);
            assert_eq!(err.kind, kind);
        }
    }

    #[test]
    fn timeout_is_408() {
        let err = AppError::timeout();
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.kind, "Timeout");
    }
}
