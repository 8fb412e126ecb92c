//! HTTP surface of the PDF Unlock server

pub mod auth;
pub mod cleanup;
pub mod convert;
pub mod files;
pub mod health;
pub mod pdf;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::SecurityConfig;
use crate::state::AppState;

/// Room for multipart boundaries and text fields around the uploaded file
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().storage.max_upload_bytes + FORM_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config().security);

    Router::new()
        .merge(health::router())
        .merge(pdf::router())
        .nest("/convert", convert::router())
        .nest("/cleanup", cleanup::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if security.cors_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
