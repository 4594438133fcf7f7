//! Credential extraction and enforcement.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use super::AppState;
use crate::errors::ApiError;

/// Rejects requests whose credentials the configured policy does not accept.
///
/// Runs before the handler, so rejected requests never reach the engine.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some((username, secret)) = credentials(request.headers()) else {
        debug!(route = %request.uri().path(), "Request without credentials");
        return ApiError::unauthorized().into_response();
    };

    match state.auth.validate(&username, &secret).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            debug!(route = %request.uri().path(), "Rejected credentials");
            ApiError::unauthorized().into_response()
        }
        Err(e) => {
            warn!(error = %e, "Could not validate credentials");
            ApiError::unauthorized().into_response()
        }
    }
}

/// Reads `Authorization: Basic` (username and secret) or `Authorization:
/// Bearer` (secret only) credentials.
pub fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, payload) = value.trim().split_once(' ')?;
    let payload = payload.trim();

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = STANDARD.decode(payload).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, secret) = decoded.split_once(':')?;
        Some((username.to_string(), secret.to_string()))
    } else if scheme.eq_ignore_ascii_case("bearer") {
        Some((String::new(), payload.to_string()))
    } else {
        None
    }
}
