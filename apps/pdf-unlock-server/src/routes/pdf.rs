//! PDF unlock/lock, compression and JPEG to PDF routes
//!
//! Uploads arrive as multipart forms. Results are written to the file store
//! and returned as download references.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::files::{delete_file, stream_file, DeleteResponse};
use crate::error::{AppError, Result};
use crate::pdf::{
    images_to_pdf, unlock_automatically, validate_pdf_bytes, CompressionLevel, Margin, Orientation,
    PageLayout, PageSize, PdfSecurityError,
};
use crate::state::AppState;
use crate::storage::{FileKind, StoredFile};

/// Multipart field names accepted for the uploaded document
const FILE_FIELDS: [&str; 2] = ["pdf_file", "file"];

/// Multipart field names accepted for images; the field may repeat
const IMAGE_FIELDS: [&str; 2] = ["jpg_files", "jpg_file"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/unlock-pdf", post(unlock_pdf))
        .route("/unlock-with-password", post(unlock_with_password))
        .route("/lock-pdf", post(lock_pdf))
        .route("/compress-pdf", post(compress_pdf))
        .route("/jpg-to-pdf", post(jpg_to_pdf))
        .route("/download-pdf/:id", get(download_pdf).delete(remove_pdf))
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PdfOperationResponse {
    pub success: bool,
    pub message: String,
    pub file_id: String,
    pub download_url: String,
    pub filename: String,
    pub file_size: u64,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
}

impl PdfOperationResponse {
    fn stored(state: &AppState, file: StoredFile, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            download_url: state.public_url(&format!("/download-pdf/{}", file.id)),
            filename: file.id.clone(),
            file_id: file.id,
            file_size: file.size_bytes,
            expires_at: file.expires_at,
            unlock_method: None,
            password_required: None,
            next_step: None,
            compression_level: None,
            original_size: None,
        }
    }
}

/// Page options echoed back by `/jpg-to-pdf`
#[derive(Debug, Serialize)]
pub struct ImagesToPdfOptions {
    pub page_orientation: &'static str,
    pub page_size: &'static str,
    pub margin: &'static str,
    pub merge_all: bool,
    pub image_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ImagesToPdfResponse {
    /// The merged PDF, or the first one when each image got its own
    #[serde(flatten)]
    pub file: PdfOperationResponse,
    pub conversion_type: &'static str,
    pub options: ImagesToPdfOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PdfOperationResponse>,
}

struct UploadedFile {
    file_name: String,
    data: Bytes,
}

/// A parsed multipart form: uploaded documents and images in arrival order
/// plus text fields
struct UploadForm {
    files: Vec<UploadedFile>,
    images: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = UploadForm {
            files: Vec::new(),
            images: Vec::new(),
            fields: HashMap::new(),
        };

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            let target = if FILE_FIELDS.contains(&name.as_str()) {
                Some((&mut form.files, "document.pdf"))
            } else if IMAGE_FIELDS.contains(&name.as_str()) {
                Some((&mut form.images, "image.jpg"))
            } else {
                None
            };

            if let Some((uploads, fallback_name)) = target {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| fallback_name.to_string());
                let data = field.bytes().await?;
                tracing::debug!(field = %name, file_name = %file_name, size = data.len(), "Received upload");
                uploads.push(UploadedFile { file_name, data });
            } else if !name.is_empty() {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    fn take_file(&mut self) -> Result<UploadedFile> {
        if self.files.is_empty() {
            return Err(AppError::Validation(
                "No file provided. Use field name 'pdf_file' or 'file'".to_string(),
            ));
        }
        Ok(self.files.remove(0))
    }

    fn take_images(&mut self) -> Vec<UploadedFile> {
        std::mem::take(&mut self.images)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("Missing required field '{}'", name)))
    }

    fn optional(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse an optional field, `None` when it is absent or empty
    fn parsed<T: FromStr>(&self, name: &str) -> std::result::Result<Option<T>, T::Err> {
        self.optional(name).map(str::parse).transpose()
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool> {
        match self.optional(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(AppError::Validation(format!(
                    "Field '{}' must be true or false, got '{}'",
                    name, value
                ))),
            },
        }
    }
}

fn stem_of(file_name: &str) -> &str {
    FsPath::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

// ============================================================================
// Handlers
// ============================================================================

/// Unlock an uploaded PDF without a password
///
/// When no password can be found the original is stored anyway, so the
/// client can follow up with `/unlock-with-password` using its id.
async fn unlock_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Json<PdfOperationResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file()?;
    validate_pdf_bytes(&upload.data, state.config().storage.max_upload_bytes)?;

    match unlock_automatically(state.security(), &upload.data).await {
        Ok(unlocked) => {
            let display_name = format!("{}_unlocked.pdf", stem_of(&upload.file_name));
            let file = state.store().put(FileKind::Pdf, &display_name, &unlocked).await?;
            tracing::info!(file_id = %file.id, "PDF unlocked automatically");

            let mut response = PdfOperationResponse::stored(&state, file, "PDF unlocked successfully");
            response.unlock_method = Some("automatic");
            response.password_required = Some(false);
            Ok(Json(response))
        }
        Err(PdfSecurityError::PasswordRequired) => {
            let file = state.store().put(FileKind::Pdf, &upload.file_name, &upload.data).await?;
            tracing::info!(file_id = %file.id, "Automatic unlock failed, original stored");

            let next_step = format!(
                "POST /unlock-with-password with file_id={} and the document password",
                file.id
            );
            let mut response = PdfOperationResponse::stored(
                &state,
                file,
                "The PDF is protected with a password that could not be determined automatically",
            );
            response.success = false;
            response.unlock_method = Some("failed_automatic");
            response.password_required = Some(true);
            response.next_step = Some(next_step);
            Ok(Json(response))
        }
        Err(e) => Err(e.into()),
    }
}

/// Unlock a previously stored PDF with a user-supplied password
async fn unlock_with_password(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PdfOperationResponse>> {
    let form = UploadForm::read(multipart).await?;
    let file_id = form.required("file_id")?;
    let password = form.required("password")?;

    if crate::storage::validate_id(file_id) != Some(FileKind::Pdf) {
        return Err(AppError::NotFound(format!("File not found or expired: {}", file_id)));
    }
    let (original, data) = state.store().read(file_id).await?;
    let unlocked = state.security().unlock(&data, Some(password)).await?;

    let display_name = format!("{}_unlocked.pdf", stem_of(&original.display_name));
    let file = state.store().put(FileKind::Pdf, &display_name, &unlocked).await?;
    tracing::info!(source_id = %original.id, file_id = %file.id, "PDF unlocked with password");

    let mut response = PdfOperationResponse::stored(&state, file, "PDF unlocked successfully");
    response.unlock_method = Some("password");
    response.password_required = Some(false);
    Ok(Json(response))
}

/// Encrypt an uploaded PDF
async fn lock_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Json<PdfOperationResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file()?;
    let password = form.required("password")?;
    let owner_password = form.optional("owner_password");
    validate_pdf_bytes(&upload.data, state.config().storage.max_upload_bytes)?;

    let locked = state.security().lock(&upload.data, password, owner_password).await?;

    let display_name = format!("{}_locked.pdf", stem_of(&upload.file_name));
    let file = state.store().put(FileKind::Pdf, &display_name, &locked).await?;
    tracing::info!(file_id = %file.id, "PDF locked");

    Ok(Json(PdfOperationResponse::stored(&state, file, "PDF locked successfully")))
}

/// Recompress the streams of an uploaded PDF
async fn compress_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Json<PdfOperationResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.take_file()?;
    let level = form
        .parsed::<CompressionLevel>("compression_level")?
        .unwrap_or_default();
    validate_pdf_bytes(&upload.data, state.config().storage.max_upload_bytes)?;

    let compressed = state.compressor().compress(&upload.data, level).await?;

    let display_name = format!("compressed_{}_{}.pdf", level, stem_of(&upload.file_name));
    let file = state.store().put(FileKind::Pdf, &display_name, &compressed).await?;
    tracing::info!(
        file_id = %file.id,
        level = %level,
        original_bytes = upload.data.len(),
        compressed_bytes = compressed.len(),
        "PDF compressed"
    );

    let mut response = PdfOperationResponse::stored(&state, file, "PDF compressed successfully");
    response.compression_level = Some(level.as_str());
    response.original_size = Some(upload.data.len() as u64);
    Ok(Json(response))
}

/// Build PDFs from uploaded JPEG images
///
/// With `merge_all` (the default) every image becomes a page of one PDF;
/// otherwise each image is stored as its own single page PDF.
async fn jpg_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ImagesToPdfResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let uploads = form.take_images();
    if uploads.is_empty() {
        return Err(AppError::Validation(
            "No images provided. Use field name 'jpg_files'".to_string(),
        ));
    }

    let layout = PageLayout {
        size: form.parsed::<PageSize>("page_size")?.unwrap_or_default(),
        orientation: form.parsed::<Orientation>("page_orientation")?.unwrap_or_default(),
        margin: form.parsed::<Margin>("margin")?.unwrap_or_default(),
    };
    let merge_all = form.flag("merge_all", true)?;

    let limit = state.config().storage.max_upload_bytes;
    let total: usize = uploads.iter().map(|u| u.data.len()).sum();
    if total > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "Images total {} bytes, exceeding the {} byte limit",
            total, limit
        )));
    }

    let image_count = uploads.len();
    let groups: Vec<(String, Vec<Bytes>)> = if merge_all {
        let name = match uploads.as_slice() {
            [single] => format!("{}.pdf", stem_of(&single.file_name)),
            _ => format!("merged_{}_images.pdf", image_count),
        };
        vec![(name, uploads.into_iter().map(|u| u.data).collect())]
    } else {
        uploads
            .into_iter()
            .map(|u| (format!("{}.pdf", stem_of(&u.file_name)), vec![u.data]))
            .collect()
    };

    let mut stored = Vec::with_capacity(groups.len());
    for (display_name, images) in groups {
        let pdf = tokio::task::spawn_blocking(move || images_to_pdf(images.as_slice(), layout))
            .await
            .map_err(|e| AppError::Internal(format!("Image conversion task failed: {}", e)))??;
        let file = state.store().put(FileKind::Pdf, &display_name, &pdf).await?;
        stored.push(file);
    }
    tracing::info!(images = image_count, pdfs = stored.len(), "Images converted to PDF");

    let message = if merge_all {
        format!("Converted {} image(s) into one PDF", image_count)
    } else {
        format!("Converted {} image(s) into separate PDFs", image_count)
    };
    let mut responses: Vec<PdfOperationResponse> = stored
        .into_iter()
        .map(|file| PdfOperationResponse::stored(&state, file, message.clone()))
        .collect();
    let file = responses.remove(0);
    if !merge_all {
        responses.insert(0, file.clone());
    }

    Ok(Json(ImagesToPdfResponse {
        file,
        conversion_type: "jpg_to_pdf",
        options: ImagesToPdfOptions {
            page_orientation: layout.orientation.as_str(),
            page_size: layout.size.as_str(),
            margin: layout.margin.as_str(),
            merge_all,
            image_count,
        },
        files: responses,
    }))
}

async fn download_pdf(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    stream_file(state.store(), &id, FileKind::Pdf).await
}

async fn remove_pdf(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DeleteResponse>> {
    delete_file(state.store(), &id, FileKind::Pdf).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of("report.pdf"), "report");
        assert_eq!(stem_of("archive.tar.pdf"), "archive.tar");
        assert_eq!(stem_of("noext"), "noext");
    }

    #[test]
    fn test_form_field_helpers() {
        let mut fields = HashMap::new();
        fields.insert("password".to_string(), "pw".to_string());
        fields.insert("owner_password".to_string(), String::new());
        fields.insert("merge_all".to_string(), "No".to_string());
        fields.insert("page_size".to_string(), "a5".to_string());
        let mut form = UploadForm {
            files: Vec::new(),
            images: Vec::new(),
            fields,
        };

        assert_eq!(form.required("password").unwrap(), "pw");
        assert!(form.optional("owner_password").is_none());
        assert!(matches!(form.required("file_id"), Err(AppError::Validation(_))));
        assert!(matches!(form.take_file(), Err(AppError::Validation(_))));
        assert!(!form.flag("merge_all", true).unwrap());
        assert!(form.flag("missing", true).unwrap());
        assert!(form.parsed::<PageSize>("page_size").is_err());
        assert_eq!(form.parsed::<Margin>("margin").unwrap(), None);

        form.fields.insert("merge_all".to_string(), "maybe".to_string());
        assert!(matches!(form.flag("merge_all", true), Err(AppError::Validation(_))));
    }
}
