//! Optional static API key check
//!
//! When `API_KEY` is configured every request outside the health endpoints
//! must carry it in the configured header.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Paths reachable without a key
const PUBLIC_PATHS: [&str; 2] = ["/", "/health"];

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    let security = &state.config().security;
    let Some(expected) = security.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(security.api_key_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(|key| keys_match(key, expected));

    match provided {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            Err(AppError::Unauthorized("Invalid API key".to_string()))
        }
        None => Err(AppError::Unauthorized(format!(
            "Missing API key header '{}'",
            security.api_key_header
        ))),
    }
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secreT", "secret"));
        assert!(!keys_match("secret-longer", "secret"));
        assert!(!keys_match("", "secret"));
    }
}
