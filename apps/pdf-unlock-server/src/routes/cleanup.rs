//! Expiry sweeper control routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::cleanup::{SweepReport, SweeperStatus};
use crate::error::Result;
use crate::state::AppState;
use crate::storage::FileKind;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .route("/manual", post(manual))
        .route("/config", get(config))
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub status: SweeperStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: SweeperStatus,
}

#[derive(Debug, Serialize)]
pub struct ManualResponse {
    pub success: bool,
    pub message: String,
    pub result: SweepReport,
}

#[derive(Debug, Serialize)]
pub struct CleanupConfigView {
    pub pdf_directory: String,
    pub pptx_directory: String,
    pub file_ttl_hours: i64,
    pub interval_secs: u64,
    pub autostart: bool,
    pub service_running: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: CleanupConfigView,
}

async fn start(State(state): State<AppState>) -> Json<ControlResponse> {
    let sweeper = state.sweeper();
    let message = if sweeper.start() {
        format!(
            "Cleanup service started. Files are deleted {} hours after creation.",
            state.store().ttl().num_hours()
        )
    } else {
        "Cleanup service is already running.".to_string()
    };

    Json(ControlResponse {
        success: true,
        message,
        status: sweeper.status(),
    })
}

async fn stop(State(state): State<AppState>) -> Json<ControlResponse> {
    let sweeper = state.sweeper();
    let message = if sweeper.stop().await {
        "Cleanup service stopped."
    } else {
        "Cleanup service is not running."
    };

    Json(ControlResponse {
        success: true,
        message: message.to_string(),
        status: sweeper.status(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: state.sweeper().status(),
    })
}

async fn manual(State(state): State<AppState>) -> Result<Json<ManualResponse>> {
    let report = state.sweeper().manual_sweep().await?;

    Ok(Json(ManualResponse {
        success: true,
        message: format!("Manual cleanup completed. Deleted {} files.", report.deleted.len()),
        result: report,
    }))
}

async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let store = state.store();
    let cleanup = &state.config().cleanup;

    Json(ConfigResponse {
        success: true,
        config: CleanupConfigView {
            pdf_directory: store.kind_dir(FileKind::Pdf).display().to_string(),
            pptx_directory: store.kind_dir(FileKind::Pptx).display().to_string(),
            file_ttl_hours: store.ttl().num_hours(),
            interval_secs: cleanup.interval_secs,
            autostart: cleanup.autostart,
            service_running: state.sweeper().is_running(),
        },
    })
}
