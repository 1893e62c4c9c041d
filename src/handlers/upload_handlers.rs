//! HTTP handlers for the chunk pipeline and file records.
//!
//! Chunk payloads are streamed from the multipart body straight into staging
//! storage; nothing is buffered whole in memory.

use crate::{
    context::RequestContext,
    errors::AppError,
    models::{upload::CompleteRequest, uploaded_file::UploadedFile},
    services::upload_service::UploadService,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use std::io;
use uuid::Uuid;

/// `POST /api/upload/chunk`
///
/// Multipart form with `filename`, `index`, and `total` text fields followed
/// by the binary `file` field. Answers `202 Accepted` with a chunk ack; the
/// caller tracks completion from the acks and signals it explicitly.
pub async fn upload_chunk(
    State(service): State<UploadService>,
    ctx: RequestContext,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut filename: Option<String> = None;
    let mut index: Option<u32> = None;
    let mut total: Option<u32> = None;
    let mut ack = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("filename") => filename = Some(text_field(field).await?),
            Some("index") => index = Some(parse_field(&text_field(field).await?, "index")?),
            Some("total") => total = Some(parse_field(&text_field(field).await?, "total")?),
            Some("file") => {
                let (Some(name), Some(idx), Some(tot)) = (filename.as_deref(), index, total)
                else {
                    return Err(AppError::bad_request(
                        "filename, index, and total must precede the file field",
                    ));
                };
                let content_type = field.content_type().map(str::to_string);
                let payload = field_stream(field);
                ack = Some(
                    service
                        .receive_chunk(&ctx, name, idx, tot, content_type.as_deref(), payload)
                        .await?,
                );
            }
            _ => {}
        }
    }

    let ack = ack.ok_or_else(|| AppError::bad_request("missing file field"))?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// `POST /api/upload/complete` — triggers merge, remote upload, and record
/// creation for a fully staged session. `201` with the created record.
pub async fn complete_upload(
    State(service): State<UploadService>,
    ctx: RequestContext,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = service
        .complete_upload(&ctx, &req.filename, req.total_chunks)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /api/files` — the caller's records, newest first.
pub async fn list_files(
    State(service): State<UploadService>,
    ctx: RequestContext,
) -> Result<Json<Vec<UploadedFile>>, AppError> {
    Ok(Json(service.list_files(&ctx).await?))
}

/// `GET /api/files/stats` — how many files the caller owns.
pub async fn file_stats(
    State(service): State<UploadService>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    let count = service.file_count(&ctx).await?;
    Ok(Json(json!({ "count": count })))
}

/// `DELETE /api/files/{id}` — destroy the remote object, then the record.
pub async fn delete_file(
    State(service): State<UploadService>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_file(&ctx, id).await?;
    Ok(Json(json!({ "message": "file deleted" })))
}

async fn text_field(field: Field<'_>) -> Result<String, AppError> {
    let name = field.name().unwrap_or("field").to_string();
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("unreadable `{name}` field: {err}")))
}

fn parse_field(value: &str, name: &str) -> Result<u32, AppError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::bad_request(format!("`{name}` must be a non-negative integer")))
}

/// Adapt a multipart field into the byte stream the staging layer consumes.
fn field_stream(field: Field<'_>) -> impl futures::Stream<Item = io::Result<bytes::Bytes>> + Send {
    futures::stream::try_unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(bytes)) => Ok(Some((bytes, field))),
            Ok(None) => Ok(None),
            Err(err) => Err(io::Error::other(err)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_rejects_non_numeric_values() {
        assert_eq!(parse_field(" 7 ", "index").unwrap(), 7);
        assert!(parse_field("-1", "index").is_err());
        assert!(parse_field("abc", "total").is_err());
    }
}
