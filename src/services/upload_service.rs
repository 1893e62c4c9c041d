//! Pipeline orchestration: the "complete" signal and everything after it.
//!
//! Completion for one session is at-most-once-in-flight, guarded by an
//! in-process map of active session keys; two merges racing to delete the
//! same staged chunks must never run. The guard is process-local only, so
//! the engine is single-instance-safe: two instances sharing a staging
//! volume could still race on one session key. Known limitation, kept
//! deliberately.

use crate::context::RequestContext;
use crate::models::upload::{ChunkAck, UploadSession};
use crate::models::uploaded_file::UploadedFile;
use crate::services::merge_service::merge_session;
use crate::services::record_service::RecordStore;
use crate::services::remote_store::{ObjectStore, RetryPolicy, upload_with_retry};
use crate::services::response_cache::ResponseCache;
use crate::services::staging_service::StagingArea;
use crate::services::{UploadError, UploadResult};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::Stream;
use sqlx::SqlitePool;
use std::{io, sync::Arc, time::Duration};
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state: the chunk pipeline and its collaborators.
#[derive(Clone)]
pub struct UploadService {
    pub db: Arc<SqlitePool>,
    pub staging: StagingArea,
    records: RecordStore,
    store: Arc<dyn ObjectStore>,
    cache: ResponseCache,
    retry: RetryPolicy,
    compress: bool,
    in_flight: Arc<DashMap<String, ()>>,
}

impl UploadService {
    pub fn new(
        db: Arc<SqlitePool>,
        staging: StagingArea,
        store: Arc<dyn ObjectStore>,
        retry: RetryPolicy,
        compress: bool,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            records: RecordStore::new(db.clone()),
            db,
            staging,
            store,
            cache: ResponseCache::new(cache_ttl),
            retry,
            compress,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Stage one chunk. Safe to call concurrently across sessions and out
    /// of order within one session.
    pub async fn receive_chunk<S>(
        &self,
        ctx: &RequestContext,
        filename: &str,
        chunk_index: u32,
        total_chunks: u32,
        content_type: Option<&str>,
        payload: S,
    ) -> UploadResult<ChunkAck>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let session = UploadSession {
            owner_id: ctx.owner_id,
            filename: filename.to_string(),
        };
        self.staging
            .receive(&session, chunk_index, total_chunks, content_type, payload)
            .await
    }

    /// Run the full pipeline for a session: merge → remote upload → record.
    ///
    /// Staged state is cleaned up on success and on merge/remote/persistence
    /// failure. An `IncompleteUpload` leaves chunks in place so the caller
    /// can stage the missing pieces and signal completion again.
    pub async fn complete_upload(
        &self,
        ctx: &RequestContext,
        filename: &str,
        total_chunks: u32,
    ) -> UploadResult<UploadedFile> {
        let session = UploadSession {
            owner_id: ctx.owner_id,
            filename: filename.to_string(),
        };
        let _guard = InFlightGuard::try_acquire(&self.in_flight, session.key())
            .ok_or_else(|| UploadError::CompletionInProgress(filename.to_string()))?;

        let result = self.run_pipeline(&session, total_chunks).await;

        match &result {
            Err(UploadError::IncompleteUpload { .. })
            | Err(UploadError::InvalidChunkIndex { .. }) => {}
            _ => self.staging.cleanup(&session).await,
        }
        if result.is_ok() {
            self.cache.invalidate(ctx.owner_id);
        }
        result
    }

    async fn run_pipeline(
        &self,
        session: &UploadSession,
        total_chunks: u32,
    ) -> UploadResult<UploadedFile> {
        let merged = merge_session(&self.staging, session, total_chunks, self.compress).await?;

        // Stable per-session key: retried attempts overwrite the same
        // destination instead of accumulating partial copies.
        let destination_key = format!("dicom/{}", session.key());
        let remote = upload_with_retry(
            self.store.as_ref(),
            &merged,
            &destination_key,
            &self.retry,
        )
        .await
        .map_err(UploadError::RemoteUploadFailed)?;

        match self
            .records
            .commit(session.owner_id, &session.filename, &remote)
            .await
        {
            Ok(record) => {
                info!(
                    owner_id = %session.owner_id,
                    filename = %session.filename,
                    object_id = %remote.object_id,
                    "upload complete"
                );
                Ok(record)
            }
            Err(err) => {
                // The remote copy exists but no record points at it. Logged
                // distinctly so an operator can reconcile.
                error!(
                    object_id = %remote.object_id,
                    secure_url = %remote.secure_url,
                    "orphaned remote object: record write failed after successful remote upload: {}",
                    err
                );
                Err(UploadError::PersistenceError(err))
            }
        }
    }

    /// List the caller's files, newest first, through the read cache.
    pub async fn list_files(&self, ctx: &RequestContext) -> UploadResult<Vec<UploadedFile>> {
        if let Some(files) = self.cache.get(ctx.owner_id) {
            return Ok(files);
        }
        let files = self
            .records
            .list_by_owner(ctx.owner_id)
            .await
            .map_err(UploadError::PersistenceError)?;
        self.cache.put(ctx.owner_id, files.clone());
        Ok(files)
    }

    /// Delete one owned file: remote object first, then the record.
    pub async fn delete_file(&self, ctx: &RequestContext, id: Uuid) -> UploadResult<()> {
        let record = self
            .records
            .find_owned(id, ctx.owner_id)
            .await
            .map_err(UploadError::PersistenceError)?
            .ok_or(UploadError::FileNotFound(id))?;

        self.store
            .destroy(&record.object_id)
            .await
            .map_err(UploadError::RemoteUploadFailed)?;
        self.records
            .delete(record.id)
            .await
            .map_err(UploadError::PersistenceError)?;
        self.cache.invalidate(ctx.owner_id);
        Ok(())
    }

    /// Number of files the caller owns (feeds the subscription-limit check).
    pub async fn file_count(&self, ctx: &RequestContext) -> UploadResult<i64> {
        self.records
            .count_by_owner(ctx.owner_id)
            .await
            .map_err(UploadError::PersistenceError)
    }
}

/// Removes its session key from the in-flight map when dropped, so a
/// panicking or failing completion never wedges the session.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    key: String,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(map: &'a DashMap<String, ()>, key: String) -> Option<Self> {
        match map.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(Self { map, key })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
