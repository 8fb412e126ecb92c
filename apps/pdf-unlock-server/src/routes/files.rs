//! Shared download and delete handling for stored files

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::storage::{validate_id, FileKind, FileStore};

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Stream a stored file of `kind` back to the client
///
/// Ids of another kind are reported as not found.
pub async fn stream_file(store: &FileStore, id: &str, kind: FileKind) -> Result<Response> {
    ensure_kind(id, kind)?;
    let (file, handle) = store.open_file(id).await?;

    tracing::debug!(file_id = %file.id, size_bytes = file.size_bytes, "Streaming file");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(header::CONTENT_LENGTH, file.size_bytes)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.id))
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(ReaderStream::new(handle)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Delete a stored file of `kind`
pub async fn delete_file(store: &FileStore, id: &str, kind: FileKind) -> Result<Json<DeleteResponse>> {
    ensure_kind(id, kind)?;
    store.delete(id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("File {} deleted", id),
    }))
}

fn ensure_kind(id: &str, kind: FileKind) -> Result<()> {
    if validate_id(id) == Some(kind) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("File not found or expired: {}", id)))
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
