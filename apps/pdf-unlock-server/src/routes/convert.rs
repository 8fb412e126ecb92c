//! PDF to PowerPoint conversion routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::files::{delete_file, stream_file, DeleteResponse};
use crate::convert::ConversionRequest;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{FileKind, StoredFile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pdf-to-pptx", post(pdf_to_pptx))
        .route("/list-pptx", get(list_pptx))
        .route("/download-pptx/:name", get(download_pptx))
        .route("/delete-pptx/:name", delete(remove_pptx))
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    #[serde(alias = "source_path")]
    pub pdf_path: Option<String>,
    pub output_name: Option<String>,
    #[serde(default = "default_include_images")]
    pub include_images: bool,
}

fn default_include_images() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub message: String,
    pub file_id: String,
    /// Download URL of the generated presentation
    pub pptx_path: String,
    pub filename: String,
    pub file_size: u64,
    pub slide_count: usize,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PptxEntry {
    #[serde(flatten)]
    pub file: StoredFile,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub pptx_files: Vec<PptxEntry>,
    pub count: usize,
}

fn download_url(state: &AppState, id: &str) -> String {
    state.public_url(&format!("/convert/download-pptx/{}", id))
}

async fn pdf_to_pptx(
    State(state): State<AppState>,
    body: std::result::Result<Json<ConvertBody>, JsonRejection>,
) -> Result<Json<ConvertResponse>> {
    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let source_path = body
        .pdf_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing required field 'pdf_path'".to_string()))?;

    let request = ConversionRequest {
        source_path,
        output_name: body.output_name,
        include_images: body.include_images,
    };
    let outcome = state.converter().convert(&request).await?;
    let file = outcome.file;

    Ok(Json(ConvertResponse {
        success: true,
        message: format!("PowerPoint created successfully: {}", file.id),
        pptx_path: download_url(&state, &file.id),
        filename: file.id.clone(),
        file_id: file.id,
        file_size: file.size_bytes,
        slide_count: outcome.slide_count,
        expires_at: file.expires_at,
    }))
}

async fn list_pptx(State(state): State<AppState>) -> Result<Json<ListResponse>> {
    let pptx_files: Vec<PptxEntry> = state
        .store()
        .list(FileKind::Pptx)
        .await?
        .into_iter()
        .map(|file| PptxEntry {
            download_url: download_url(&state, &file.id),
            file,
        })
        .collect();

    Ok(Json(ListResponse {
        success: true,
        count: pptx_files.len(),
        pptx_files,
    }))
}

async fn download_pptx(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    stream_file(state.store(), &name, FileKind::Pptx).await
}

async fn remove_pptx(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<DeleteResponse>> {
    delete_file(state.store(), &name, FileKind::Pptx).await
}
