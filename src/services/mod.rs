//! Service layer: the chunked-upload pipeline and its collaborators.
//!
//! Flow: `StagingArea::receive` (many calls) → `UploadService::complete_upload`,
//! which merges staged chunks (`merge_service`), pushes the artifact to the
//! remote object store with retry (`remote_store`), persists the metadata
//! record (`record_service`), and always cleans the session up afterwards.

pub mod merge_service;
pub mod record_service;
pub mod remote_store;
pub mod response_cache;
pub mod staging_service;
pub mod upload_service;

use self::remote_store::RemoteStoreError;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy for the upload pipeline.
///
/// Validation variants surface as 4xx with no retry; `MergeFailed` and
/// `RemoteUploadFailed` have already triggered session cleanup by the time
/// they reach the caller. `PersistenceError` after a successful remote upload
/// means an orphaned remote object and is logged distinctly for
/// reconciliation.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("content type `{0}` is not an accepted DICOM payload")]
    InvalidFileType(String),

    #[error("chunk is {size} bytes, above the {limit}-byte per-chunk ceiling")]
    ChunkTooLarge { size: u64, limit: u64 },

    #[error("chunk index {index} is outside the declared range 0..{total}")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("upload `{filename}` is missing {missing} of {total} chunks")]
    IncompleteUpload {
        filename: String,
        missing: u32,
        total: u32,
    },

    #[error("merging staged chunks failed: {0}")]
    MergeFailed(#[source] io::Error),

    #[error("remote upload failed: {0}")]
    RemoteUploadFailed(#[source] RemoteStoreError),

    #[error("writing the file record failed: {0}")]
    PersistenceError(#[source] sqlx::Error),

    #[error("a completion for `{0}` is already in progress")]
    CompletionInProgress(String),

    #[error("file `{0}` not found")]
    FileNotFound(Uuid),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Stable machine-readable kind, used in the `errorKind` response field.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::InvalidFileType(_) => "InvalidFileType",
            UploadError::ChunkTooLarge { .. } => "ChunkTooLarge",
            UploadError::InvalidChunkIndex { .. } => "InvalidChunkIndex",
            UploadError::IncompleteUpload { .. } => "IncompleteUpload",
            UploadError::MergeFailed(_) => "MergeFailed",
            UploadError::RemoteUploadFailed(_) => "RemoteUploadFailed",
            UploadError::PersistenceError(_) => "PersistenceError",
            UploadError::CompletionInProgress(_) => "CompletionInProgress",
            UploadError::FileNotFound(_) => "NotFound",
            UploadError::Io(_) => "Internal",
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
