//! API error wrapper mapping domain failures to HTTP responses.

use axum::Json;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tidegate_core::{EngineError, ResolveError};
use tracing::error;

/// Realm announced in the Basic challenge of 401 responses.
pub const AUTH_REALM: &str = "tidegate";

/// Error answered to an API client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid or missing credentials")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        error!(error = %e, "Engine failure");
        match e {
            EngineError::EngineShutdown => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidMagnet { .. } => Self::invalid_request(e.to_string()),
            ResolveError::MetadataTimeout { .. } => {
                error!(error = %e, "Metadata resolution timed out");
                Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
            ResolveError::Engine(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status.as_u16(),
            error: &self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"tidegate\""),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tidegate_core::InfoHash;

    use super::*;

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::unauthorized().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            &format!("Basic realm=\"{AUTH_REALM}\"")
        );
    }

    #[test]
    fn test_resolve_error_mapping() {
        let invalid: ApiError = ResolveError::InvalidMagnet {
            reason: "empty".to_string(),
        }
        .into();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let timeout: ApiError = ResolveError::MetadataTimeout {
            info_hash: InfoHash::new([0u8; 20]),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let engine: ApiError = ResolveError::Engine(EngineError::AddFailed {
            info_hash: InfoHash::new([0u8; 20]),
            reason: "full".to_string(),
        })
        .into();
        assert_eq!(engine.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_other_statuses_have_no_challenge() {
        let response = ApiError::not_found("missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
