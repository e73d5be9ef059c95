//! Helpdesk HTTP REST API
//!
//! Axum-based HTTP server exposing the session engine to clients. Runs
//! alongside the Unix socket IPC server on port 8767 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions go through
//! the same router as IPC and are testable without axum dispatch.
//!
//! Endpoints:
//! - GET    /health                  - liveness plus current capacity
//! - GET    /version                 - server version info
//! - POST   /api/session/create      - open a session (`created` / `too_busy`)
//! - PUT    /api/session/prolongate  - keep-alive for a session
//! - PUT    /api/session/ping        - alias of prolongate
//! - DELETE /api/session/:id         - close a session
//! - GET    /api/pool/status         - capacity, backlog and per-agent load

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use helpdesk_core::ipc::{
    CreateSessionCode, HelpdeskRequest, HelpdeskResponse, SessionActionCode, SessionIdRequest,
};
use helpdesk_core::{HelpdeskConfig, SessionManager};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub manager: Arc<SessionManager>,
    pub socket_path: String,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/session/create", post(create_handler))
        .route("/api/session/prolongate", put(prolongate_handler))
        .route("/api/session/ping", put(prolongate_handler))
        .route("/api/session/:id", delete(destroy_handler))
        .route("/api/pool/status", get(status_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    manager: Arc<SessionManager>,
    config: HelpdeskConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState {
        manager,
        socket_path: config.service.socket_path.clone(),
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Helpdesk HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub fn health_inner(manager: &SessionManager, socket_path: &str) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(HelpdeskRequest::Health, manager);
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
                obj.insert("socket".to_string(), serde_json::json!(socket_path));
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Inner version - returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "helpdesk/1",
    })
}

/// Router failures on create still answer 200 with code `failed`, so clients
/// only ever branch on `code`.
pub fn create_inner(manager: &SessionManager) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(HelpdeskRequest::CreateSession, manager);
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => {
            tracing::error!("Create session failed: {}", e);
            (
                StatusCode::OK,
                serde_json::json!({ "code": CreateSessionCode::Failed }),
            )
        }
    }
}

pub fn prolongate_inner(manager: &SessionManager, req: SessionIdRequest) -> (StatusCode, serde_json::Value) {
    let request = HelpdeskRequest::ProlongateSession {
        session_id: req.session_id,
    };
    session_action(manager, request)
}

pub fn destroy_inner(manager: &SessionManager, session_id: Uuid) -> (StatusCode, serde_json::Value) {
    session_action(manager, HelpdeskRequest::DestroySession { session_id })
}

pub fn status_inner(manager: &SessionManager) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(HelpdeskRequest::Status, manager);
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({
                "error": e,
                "status": "error",
            }),
        ),
    }
}

fn session_action(manager: &SessionManager, request: HelpdeskRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, manager);
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => {
            tracing::error!("Session request failed: {}", e);
            (
                StatusCode::OK,
                serde_json::json!({ "code": SessionActionCode::Failed }),
            )
        }
    }
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.manager, &state.socket_path);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = create_inner(&state.manager);
    (status, Json(body))
}

pub async fn prolongate_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SessionIdRequest>,
) -> impl IntoResponse {
    let (status, body) = prolongate_inner(&state.manager, req);
    (status, Json(body))
}

pub async fn destroy_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = destroy_inner(&state.manager, session_id);
    (status, Json(body))
}

pub async fn status_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = status_inner(&state.manager);
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert a router `HelpdeskResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: HelpdeskResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests - call inner functions directly
// ============================================================================
