//! Represents a fully uploaded file whose payload lives in the remote
//! object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Persisted metadata record for one uploaded DICOM file.
///
/// The record is created only after the reassembled artifact has been
/// durably stored remotely; the payload itself is never kept locally.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Original filename as submitted by the uploader.
    pub filename: String,

    /// Opaque identifier of the durable remote copy.
    pub object_id: String,

    /// Authenticated HTTPS URL of the remote copy.
    pub secure_url: String,

    /// Owner of the file; records are only visible to their owner.
    pub owner_id: Uuid,

    /// Free-form DICOM metadata (patient id, study date, modality, ...).
    pub metadata: Json<Value>,

    /// Results of delegated AI inference runs, if any.
    pub ai_results: Json<Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
