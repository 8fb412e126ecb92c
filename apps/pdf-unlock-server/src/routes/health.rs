//! Health check and service index endpoints

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

const SERVICE_NAME: &str = "pdf-unlock-server";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: SERVICE_NAME,
    })
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /health",
            "POST /unlock-pdf",
            "POST /unlock-with-password",
            "POST /lock-pdf",
            "POST /compress-pdf",
            "POST /jpg-to-pdf",
            "GET /download-pdf/{id}",
            "DELETE /download-pdf/{id}",
            "POST /convert/pdf-to-pptx",
            "GET /convert/list-pptx",
            "GET /convert/download-pptx/{name}",
            "DELETE /convert/delete-pptx/{name}",
            "POST /cleanup/start",
            "POST /cleanup/stop",
            "GET /cleanup/status",
            "POST /cleanup/manual",
            "GET /cleanup/config",
        ],
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
}
