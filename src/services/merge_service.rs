//! Reassembly of staged chunks into one merged artifact.
//!
//! Chunks are folded in strictly ascending numeric index order through a
//! single compression transform into one output file. Nothing is buffered
//! whole in memory, so uploads can be far larger than available RAM. Each
//! chunk is deleted immediately after being folded in; a crash mid-merge
//! leaves at most one unconsumed chunk plus a partial output, and the caller
//! retries the whole merge from scratch rather than resuming.

use crate::models::upload::UploadSession;
use crate::services::staging_service::StagingArea;
use crate::services::{UploadError, UploadResult};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use tokio::task;
use tracing::debug;

const ZSTD_LEVEL: i32 = 3;

/// Merge all chunks of a complete session into a single artifact and return
/// its path.
///
/// Fails with `IncompleteUpload` (touching nothing) when any chunk is
/// missing, and with `MergeFailed` (removing the partial output) when a read
/// or write fails mid-stream. The returned artifact lives inside the session
/// directory, so `StagingArea::cleanup` disposes of it on every exit path.
pub async fn merge_session(
    staging: &StagingArea,
    session: &UploadSession,
    total_chunks: u32,
    compress: bool,
) -> UploadResult<PathBuf> {
    if total_chunks == 0 {
        return Err(UploadError::InvalidChunkIndex { index: 0, total: 0 });
    }

    let missing = staging.missing_chunks(session, total_chunks).await?;
    if !missing.is_empty() {
        return Err(UploadError::IncompleteUpload {
            filename: session.filename.clone(),
            missing: missing.len() as u32,
            total: total_chunks,
        });
    }

    // Ascending numeric index is a correctness invariant: lexical path order
    // would interleave 1, 10, 11, 2 and corrupt any file of ten or more
    // chunks.
    let chunks: Vec<PathBuf> = (0..total_chunks)
        .map(|index| staging.chunk_path(session, index))
        .collect();
    let out_path = staging.merged_path(session);

    let blocking_out = out_path.clone();
    task::spawn_blocking(move || run_merge(&chunks, &blocking_out, compress))
        .await
        .map_err(|join_err| UploadError::MergeFailed(io::Error::other(join_err)))?
        .map_err(UploadError::MergeFailed)?;

    debug!(
        session = %session.key(),
        total_chunks,
        compress,
        artifact = %out_path.display(),
        "merged session chunks"
    );

    Ok(out_path)
}

/// Synchronous merge body, run on the blocking pool.
fn run_merge(chunks: &[PathBuf], out_path: &PathBuf, compress: bool) -> io::Result<()> {
    let out = File::create(out_path)?;
    let result = fold_chunks(chunks, out, compress);
    if result.is_err() {
        let _ = std::fs::remove_file(out_path);
    }
    result
}

fn fold_chunks(chunks: &[PathBuf], out: File, compress: bool) -> io::Result<()> {
    let mut sink = MergeSink::new(out, compress)?;
    for path in chunks {
        let mut chunk = File::open(path)?;
        io::copy(&mut chunk, &mut sink)?;
        drop(chunk);
        std::fs::remove_file(path)?;
    }
    let file = sink.finish()?;
    file.sync_all()
}

/// One shared output transform for the whole merge: either a plain buffered
/// copy or a zstd encoder.
enum MergeSink<W: Write> {
    Plain(BufWriter<W>),
    Zstd(zstd::stream::Encoder<'static, W>),
}

impl<W: Write> MergeSink<W> {
    fn new(inner: W, compress: bool) -> io::Result<Self> {
        if compress {
            Ok(MergeSink::Zstd(zstd::stream::Encoder::new(
                inner, ZSTD_LEVEL,
            )?))
        } else {
            Ok(MergeSink::Plain(BufWriter::new(inner)))
        }
    }

    /// Flush all buffered state and hand back the underlying writer.
    fn finish(self) -> io::Result<W> {
        match self {
            MergeSink::Plain(mut writer) => {
                writer.flush()?;
                writer.into_inner().map_err(|err| err.into_error())
            }
            MergeSink::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for MergeSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MergeSink::Plain(writer) => writer.write(buf),
            MergeSink::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MergeSink::Plain(writer) => writer.flush(),
            MergeSink::Zstd(encoder) => encoder.flush(),
        }
    }
}
