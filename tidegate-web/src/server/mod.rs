//! Router assembly and shared request state.

pub mod auth;
pub mod gateway;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tidegate_core::config::StreamingConfig;
use tidegate_core::{Authenticator, ProgressCallback, TorrentEngine, TorrentResolver};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, error};

use crate::errors::ApiError;
use crate::handlers::{info, metrics, stream};

/// State shared by every request of one gateway.
#[derive(Clone)]
pub struct AppState {
    pub resolver: TorrentResolver,
    pub auth: Arc<Authenticator>,
    pub on_progress: ProgressCallback,
    pub streaming: StreamingConfig,
}

impl AppState {
    pub fn new(
        resolver: TorrentResolver,
        auth: Authenticator,
        on_progress: ProgressCallback,
        streaming: StreamingConfig,
    ) -> Self {
        Self {
            resolver,
            auth: Arc::new(auth),
            on_progress,
            streaming,
        }
    }

    pub fn engine(&self) -> &Arc<dyn TorrentEngine> {
        self.resolver.engine()
    }
}

/// Builds the HTTP API.
///
/// Every route requires credentials; unknown paths answer 404 without
/// consulting the authenticator.
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                route = %request.uri().path(),
                status_code = tracing::field::Empty,
            )
        })
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status_code", response.status().as_u16());
            tracing::debug!(latency_ms = latency.as_millis() as u64, "Response sent");
        });

    Router::new()
        .route("/info", get(info))
        .route("/stream", get(stream))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(trace_layer)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Request handler panicked");
    ApiError::internal("internal server error").into_response()
}
