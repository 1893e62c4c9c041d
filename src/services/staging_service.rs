//! Per-upload chunk staging on local disk.
//!
//! `StagingArea` owns the staging namespace: each session gets one directory
//! named by its deterministic key, each chunk one file inside it. No other
//! process may touch that namespace while the engine runs. There is no
//! database interaction per chunk; presence on disk is the only session
//! state.

use crate::models::upload::{ChunkAck, UploadSession};
use crate::services::{UploadError, UploadResult};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Content types accepted for chunk payloads. DICOM viewers commonly send
/// raw octet streams, so both are allowed.
const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/dicom", "application/octet-stream"];

/// Filesystem-backed chunk receiver and cleanup policy.
#[derive(Clone, Debug)]
pub struct StagingArea {
    root: PathBuf,
    max_chunk_bytes: u64,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, max_chunk_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_chunk_bytes,
        }
    }

    /// Root of the staging namespace. Used by the readiness probe.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Directory holding all staged state for one session.
    pub(crate) fn session_dir(&self, session: &UploadSession) -> PathBuf {
        self.root.join(session.key())
    }

    /// Deterministic path of one staged chunk.
    pub(crate) fn chunk_path(&self, session: &UploadSession, index: u32) -> PathBuf {
        self.session_dir(session).join(format!("{index}.part"))
    }

    /// Path for the transient merged artifact. Lives inside the session
    /// directory so `cleanup` removes it on every exit path.
    pub(crate) fn merged_path(&self, session: &UploadSession) -> PathBuf {
        self.session_dir(session)
            .join(format!(".merged-{}", Uuid::new_v4()))
    }

    /// Receive one chunk: validate, stream to disk, acknowledge.
    ///
    /// The payload is written to a temporary file and renamed into place, so
    /// a re-sent chunk atomically overwrites the previous copy (retry-safe)
    /// and a failed write never leaves a half-written chunk at the final
    /// path. The size ceiling is enforced while streaming; an oversized
    /// payload is dropped without ever being fully written.
    pub async fn receive<S>(
        &self,
        session: &UploadSession,
        chunk_index: u32,
        total_chunks: u32,
        content_type: Option<&str>,
        payload: S,
    ) -> UploadResult<ChunkAck>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let declared = content_type.unwrap_or("");
        if !ACCEPTED_CONTENT_TYPES
            .iter()
            .any(|accepted| declared.eq_ignore_ascii_case(accepted))
        {
            return Err(UploadError::InvalidFileType(declared.to_string()));
        }

        if total_chunks == 0 || chunk_index >= total_chunks {
            return Err(UploadError::InvalidChunkIndex {
                index: chunk_index,
                total: total_chunks,
            });
        }

        let dir = self.session_dir(session);
        fs::create_dir_all(&dir).await?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut written: u64 = 0;
        pin_mut!(payload);
        while let Some(chunk_res) = payload.next().await {
            let bytes = match chunk_res {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(UploadError::Io(err));
                }
            };
            written += bytes.len() as u64;
            if written > self.max_chunk_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(UploadError::ChunkTooLarge {
                    size: written,
                    limit: self.max_chunk_bytes,
                });
            }
            if let Err(err) = file.write_all(&bytes).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(UploadError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(UploadError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(UploadError::Io(err));
        }

        let final_path = self.chunk_path(session, chunk_index);
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&final_path).await?;
                fs::rename(&tmp_path, &final_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(UploadError::Io(err));
            }
        }

        debug!(
            session = %session.key(),
            chunk_index,
            total_chunks,
            bytes = written,
            "staged chunk"
        );

        Ok(ChunkAck {
            filename: session.filename.clone(),
            chunk_index,
            total_chunks,
        })
    }

    /// Indices in `0..total_chunks` with no staged chunk on disk.
    pub async fn missing_chunks(
        &self,
        session: &UploadSession,
        total_chunks: u32,
    ) -> io::Result<Vec<u32>> {
        let mut missing = Vec::new();
        for index in 0..total_chunks {
            if !fs::try_exists(self.chunk_path(session, index)).await? {
                missing.push(index);
            }
        }
        Ok(missing)
    }

    /// Remove all staged chunks and any merged artifact for a session.
    ///
    /// Called on every exit path of a completion, success or failure, and
    /// safe to call when some or all files are already gone.
    pub async fn cleanup(&self, session: &UploadSession) {
        let dir = self.session_dir(session);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => debug!(session = %session.key(), "removed staging directory"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!(
                session = %session.key(),
                "failed to remove staging directory {}: {}",
                dir.display(),
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn session() -> UploadSession {
        UploadSession {
            owner_id: Uuid::new_v4(),
            filename: "study.dcm".into(),
        }
    }

    fn payload(bytes: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(vec![Ok(Bytes::from_static(bytes))])
    }

    async fn staged(area: &StagingArea, s: &UploadSession, index: u32) -> Vec<u8> {
        fs::read(area.chunk_path(s, index)).await.unwrap()
    }

    #[tokio::test]
    async fn receive_writes_chunk_and_overwrites_on_resend() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 1024);
        let s = session();

        let ack = area
            .receive(&s, 0, 2, Some("application/dicom"), payload(b"first"))
            .await
            .unwrap();
        assert_eq!(ack.chunk_index, 0);
        assert_eq!(ack.total_chunks, 2);
        assert_eq!(staged(&area, &s, 0).await, b"first");

        // idempotent retry replaces the previous copy
        area.receive(&s, 0, 2, Some("application/dicom"), payload(b"second"))
            .await
            .unwrap();
        assert_eq!(staged(&area, &s, 0).await, b"second");
    }

    #[tokio::test]
    async fn receive_rejects_unaccepted_content_type() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 1024);
        let s = session();

        let err = area
            .receive(&s, 0, 1, Some("text/html"), payload(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileType(_)));

        let err = area
            .receive(&s, 0, 1, None, payload(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileType(_)));
    }

    #[tokio::test]
    async fn receive_rejects_oversized_chunk_and_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 4);
        let s = session();

        let err = area
            .receive(&s, 0, 1, Some("application/dicom"), payload(b"too big"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ChunkTooLarge { size: 7, limit: 4 }));

        assert!(!area.chunk_path(&s, 0).exists());
        let mut entries = fs::read_dir(area.session_dir(&s)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_rejects_out_of_range_index() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 1024);
        let s = session();

        let err = area
            .receive(&s, 3, 3, Some("application/dicom"), payload(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidChunkIndex { index: 3, total: 3 }
        ));

        let err = area
            .receive(&s, 0, 0, Some("application/dicom"), payload(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidChunkIndex { index: 0, total: 0 }
        ));
    }

    #[tokio::test]
    async fn missing_chunks_reports_gaps() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 1024);
        let s = session();

        area.receive(&s, 0, 3, Some("application/dicom"), payload(b"a"))
            .await
            .unwrap();
        area.receive(&s, 2, 3, Some("application/dicom"), payload(b"c"))
            .await
            .unwrap();

        assert_eq!(area.missing_chunks(&s, 3).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_tolerates_partial_state() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path(), 1024);
        let s = session();

        area.receive(&s, 0, 2, Some("application/dicom"), payload(b"a"))
            .await
            .unwrap();

        area.cleanup(&s).await;
        assert!(!area.session_dir(&s).exists());

        // second call on an absent session is a no-op, not an error
        area.cleanup(&s).await;
        area.cleanup(&s).await;
    }
}
