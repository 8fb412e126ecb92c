//! Error types for the PDF Unlock server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::convert::ConvertError;
use crate::pdf::{ImagesToPdfError, PdfSecurityError};
use crate::storage::StoreError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => AppError::NotFound(format!("File not found or expired: {}", id)),
            StoreError::Write { .. } => AppError::Write(error.to_string()),
            StoreError::Io(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ConvertError> for AppError {
    fn from(error: ConvertError) -> Self {
        match error {
            ConvertError::SourceNotFound(source) => AppError::SourceNotFound(source),
            ConvertError::UnsupportedFormat(reason) => AppError::UnsupportedFormat(reason),
            ConvertError::SourceTooLarge { .. } => AppError::PayloadTooLarge(error.to_string()),
            ConvertError::ConversionFailed { .. } => AppError::ConversionFailed(error_chain(&error)),
            ConvertError::Store(e) => e.into(),
        }
    }
}

impl From<PdfSecurityError> for AppError {
    fn from(error: PdfSecurityError) -> Self {
        match error {
            PdfSecurityError::InvalidInput(reason) => AppError::Validation(reason),
            PdfSecurityError::TooLarge { .. } => AppError::PayloadTooLarge(error.to_string()),
            PdfSecurityError::PasswordRequired | PdfSecurityError::InvalidPassword => {
                AppError::InvalidPassword(error.to_string())
            }
            PdfSecurityError::ToolFailed { .. } => AppError::ConversionFailed(error.to_string()),
            PdfSecurityError::ToolUnavailable(_) | PdfSecurityError::Io(_) => {
                AppError::Internal(error.to_string())
            }
        }
    }
}

impl From<ImagesToPdfError> for AppError {
    fn from(error: ImagesToPdfError) -> Self {
        match error {
            ImagesToPdfError::NoImages | ImagesToPdfError::InvalidOption { .. } => {
                AppError::Validation(error.to_string())
            }
            ImagesToPdfError::NotJpeg { .. } => AppError::UnsupportedFormat(error.to_string()),
            ImagesToPdfError::Decode { .. } => AppError::ConversionFailed(error_chain(&error)),
            ImagesToPdfError::Encode(_) | ImagesToPdfError::Pdf(_) | ImagesToPdfError::Io(_) => {
                AppError::Internal(error.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(error.body_text())
        } else {
            AppError::Validation(format!("Malformed multipart body: {}", error.body_text()))
        }
    }
}

/// Render an error followed by its sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidPassword(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::ConversionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Write(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::InvalidPassword(_) => "invalid_password",
            AppError::SourceNotFound(_) => "source_not_found",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::ConversionFailed(_) => "conversion_failed",
            AppError::Write(_) => "write_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Write(msg) => {
                tracing::error!("Write error: {}", msg);
                "Failed to write file".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            AppError::ConversionFailed(msg) => {
                tracing::warn!("Conversion failed: {}", msg);
                msg.clone()
            }
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::InvalidPassword(msg)
            | AppError::SourceNotFound(msg)
            | AppError::UnsupportedFormat(msg) => msg.clone(),
        };

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConversionCause, ConversionStage};
    use axum::body::to_bytes;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_json(StoreError::NotFound("a.pdf".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
        assert!(body["message"].as_str().unwrap().contains("a.pdf"));
    }

    #[tokio::test]
    async fn test_internal_errors_are_masked() {
        let (status, body) = body_json(AppError::Internal("disk exploded at /srv".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[test]
    fn test_conversion_error_mapping() {
        let cases = [
            (ConvertError::SourceNotFound("x".into()), StatusCode::NOT_FOUND),
            (ConvertError::UnsupportedFormat("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (ConvertError::SourceTooLarge { limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (
                ConvertError::ConversionFailed {
                    stage: ConversionStage::Assemble,
                    cause: ConversionCause::Io(std::io::Error::new(std::io::ErrorKind::Other, "zip broke")),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(AppError::from(error).status_code(), expected);
        }
    }

    #[test]
    fn test_conversion_failure_keeps_cause() {
        let error = ConvertError::ConversionFailed {
            stage: ConversionStage::Extract,
            cause: ConversionCause::Io(std::io::Error::new(std::io::ErrorKind::Other, "bad xref")),
        };
        match AppError::from(error) {
            AppError::ConversionFailed(msg) => {
                assert!(msg.contains("extract"));
                assert!(msg.contains("bad xref"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_security_error_mapping() {
        assert_eq!(
            AppError::from(PdfSecurityError::InvalidPassword).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(PdfSecurityError::InvalidInput("empty".into())).kind(),
            "validation_error"
        );
        assert_eq!(
            AppError::from(PdfSecurityError::TooLarge { size: 2, limit: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
