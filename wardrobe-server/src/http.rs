//! Wardrobe HTTP API
//!
//! Axum server exposing the upload-to-agent relay. Each endpoint has a thin
//! axum handler that delegates to an inner function returning
//! `(StatusCode, serde_json::Value)`, and every failure goes through
//! `error_response`.
//!
//! Endpoints:
//! - GET  /api/health             : liveness check
//! - POST /api/outfits/upload     : store images, ask the agent about them
//! - GET  /api/outfits/suggestions: prompt-only suggestions
//! - GET  /uploads/*              : stored assets (route configurable)

use std::sync::Arc;

use anyhow::Result;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, Request, State};
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use wardrobe_core::api::{
    ErrorBody, HealthResponse, HEALTH_PATH, INTERNAL_DETAILS, SUGGESTIONS_PATH, UPLOAD_PATH,
};
use wardrobe_core::{FileIntake, IntakeError, WardrobeConfig, WardrobeError};

use crate::pipeline::Pipeline;
use crate::upload::receive_upload;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Pipeline,
    pub config: WardrobeConfig,
}

impl HttpState {
    pub fn from_config(config: WardrobeConfig) -> Result<Self, WardrobeError> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self { pipeline, config })
    }
}

/// Build the Axum router with all endpoints, the static asset boundary and
/// the cross-origin policy.
pub fn build_router(state: Arc<HttpState>) -> Router {
    let storage = &state.config.storage;
    let assets = ServeDir::new(state.pipeline.intake().root());
    let route = storage.route_prefix();

    let router = Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(UPLOAD_PATH, post(upload_handler))
        .route(SUGGESTIONS_PATH, get(suggestions_handler));

    let router = if route == "/" {
        router.fallback_service(assets)
    } else {
        router.nest_service(&route, assets)
    };

    router
        .layer(DefaultBodyLimit::max(storage.request_body_limit()))
        .layer(cors_layer(&state.config.http.allowed_origins))
        // Runs before CORS so preflights from unknown origins are refused.
        .layer(middleware::from_fn_with_state(state.clone(), origin_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: WardrobeConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState::from_config(config)?);

    prepare_storage(state.pipeline.intake())?;

    tracing::info!(
        agent = state.pipeline.agent_name(),
        base_url = %state.config.http.base_url(),
        "Relay configured"
    );

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Wardrobe HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Create the upload and previews directories. The server must not start
/// without them.
pub fn prepare_storage(intake: &FileIntake) -> Result<(), WardrobeError> {
    match intake.ensure_dirs() {
        Ok(()) => {
            tracing::info!(dir = %intake.root().display(), "Upload directory ready");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                dir = %intake.root().display(),
                error = %e,
                "Failed to create upload directory"
            );
            Err(e.into())
        }
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct SuggestionsQuery {
    pub prompt: Option<String>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub fn health_inner() -> (StatusCode, serde_json::Value) {
    (StatusCode::OK, to_json(&HealthResponse::ok()))
}

/// Inner upload: runs intake over the multipart body, then the pipeline.
pub async fn upload_inner(state: &HttpState, multipart: Multipart) -> (StatusCode, serde_json::Value) {
    let received = match receive_upload(state.pipeline.intake(), multipart).await {
        Ok(received) => received,
        Err(e) => return error_response(&e),
    };

    tracing::info!(
        files = received.batch.len(),
        prompt = %received.prompt,
        "Upload received"
    );

    match state
        .pipeline
        .upload_and_suggest(received.batch, received.prompt)
        .await
    {
        Ok(body) => (StatusCode::OK, to_json(&body)),
        Err(e) => error_response(&e),
    }
}

/// Inner prompt-only suggestions.
pub async fn suggestions_inner(
    state: &HttpState,
    query: SuggestionsQuery,
) -> (StatusCode, serde_json::Value) {
    match state.pipeline.suggest(query.prompt.as_deref()).await {
        Ok(body) => (StatusCode::OK, to_json(&body)),
        Err(e) => error_response(&e),
    }
}

/// A body that is not multipart at all carries no files.
pub fn rejected_upload_inner(rejection: &MultipartRejection) -> (StatusCode, serde_json::Value) {
    tracing::warn!(reason = %rejection.body_text(), "Upload body is not multipart");
    error_response(&IntakeError::NoFiles.into())
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler() -> impl IntoResponse {
    let (status, body) = health_inner();
    (status, Json(body))
}

pub async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> impl IntoResponse {
    let (status, body) = match multipart {
        Ok(multipart) => upload_inner(&state, multipart).await,
        Err(rejection) => rejected_upload_inner(&rejection),
    };
    (status, Json(body))
}

pub async fn suggestions_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SuggestionsQuery>,
) -> impl IntoResponse {
    let (status, body) = suggestions_inner(&state, query).await;
    (status, Json(body))
}

// ============================================================================
// Cross-origin policy
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

/// Reject requests whose `Origin` is not on the allow-list. Requests without
/// an `Origin` header (same-origin, curl, the terminal client) pass.
async fn origin_guard(State(state): State<Arc<HttpState>>, request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !is_origin_allowed(&state.config.http.allowed_origins, origin) {
            tracing::warn!(origin = %origin, path = %request.uri().path(), "Origin rejected");
            let body = ErrorBody::new(format!("Origin {} is not allowed", origin));
            return (StatusCode::FORBIDDEN, Json(to_json(&body))).into_response();
        }
    }
    next.run(request).await
}

pub fn is_origin_allowed(allowed: &[String], origin: &str) -> bool {
    let origin = origin.trim().trim_end_matches('/');
    allowed
        .iter()
        .any(|a| a.trim().trim_end_matches('/').eq_ignore_ascii_case(origin))
}

// ============================================================================
// Error mapping
// ============================================================================

/// The single error → HTTP mapping for the API.
pub fn error_response(err: &WardrobeError) -> (StatusCode, serde_json::Value) {
    let (status, body) = match err {
        WardrobeError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone())),
        WardrobeError::Intake(IntakeError::TooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, ErrorBody::new(err.to_string()))
        }
        WardrobeError::Intake(IntakeError::Io(_)) => internal_error(),
        WardrobeError::Intake(_) => (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string())),
        WardrobeError::Agent(agent_err) => {
            let details = agent_err
                .diagnostics()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(INTERNAL_DETAILS);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::with_details(agent_err.to_string(), details),
            )
        }
        _ => internal_error(),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, debug = ?err, "Request failed");
    } else {
        tracing::warn!(status = status.as_u16(), error = %err, "Request rejected");
    }

    (status, to_json(&body))
}

fn internal_error() -> (StatusCode, ErrorBody) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody::with_details("Internal server error", INTERNAL_DETAILS),
    )
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response body");
        serde_json::json!({ "error": "Internal server error" })
    })
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
