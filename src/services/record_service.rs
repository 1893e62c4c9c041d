//! Persisted `uploaded_files` metadata, backed by SQLite.

use crate::models::{upload::RemoteObjectRef, uploaded_file::UploadedFile};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, filename, object_id, secure_url, owner_id, \
     metadata, ai_results, created_at, updated_at";

/// Create/find/delete operations on `UploadedFile` records, plus the
/// count-by-owner query consumed by the subscription-limit check.
///
/// `commit` is a single insert and is deliberately never retried: the remote
/// upload preceding it is the expensive idempotent step, while a persistence
/// retry after remote success could not be told apart from a fresh commit.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<SqlitePool>,
}

impl RecordStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert the metadata record for a successfully stored artifact.
    pub async fn commit(
        &self,
        owner_id: Uuid,
        filename: &str,
        remote: &RemoteObjectRef,
    ) -> Result<UploadedFile, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, UploadedFile>(&format!(
            "INSERT INTO uploaded_files (
                id, filename, object_id, secure_url, owner_id,
                metadata, ai_results, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SELECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(filename)
        .bind(&remote.object_id)
        .bind(&remote.secure_url)
        .bind(owner_id)
        .bind(Json(json!({})))
        .bind(Json(json!({})))
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await
    }

    /// All records owned by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<UploadedFile>, sqlx::Error> {
        sqlx::query_as::<_, UploadedFile>(&format!(
            "SELECT {SELECT_COLUMNS} FROM uploaded_files
             WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&*self.db)
        .await
    }

    /// Fetch one record, scoped to its owner.
    pub async fn find_owned(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<UploadedFile>, sqlx::Error> {
        sqlx::query_as::<_, UploadedFile>(&format!(
            "SELECT {SELECT_COLUMNS} FROM uploaded_files WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Hard-delete a record. The remote object must already be gone.
    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM uploaded_files WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Number of records an owner holds.
    pub async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM uploaded_files WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&*self.db)
            .await
    }
}
