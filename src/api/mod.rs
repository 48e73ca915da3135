// HTTP and WebSocket APIs

pub mod sessions;
pub mod websocket;

use crate::entity::EntityState;
use crate::filter::{FilterRegistry, RegistryError};
use crate::session::SessionCatalog;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use sessions::create_session_router;
pub use websocket::create_ws_router;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<SessionCatalog>,
    pub registry: Arc<FilterRegistry>,
    /// Raw states forwarded by every filter, fanned out to monitors
    pub monitor: broadcast::Sender<EntityState>,
    /// Capacity of each viewer's update queue
    pub viewer_buffer: usize,
}

/// Full API: session management, ingestion and WebSockets
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .merge(create_session_router(Arc::clone(&state)))
        .merge(create_ws_router(state))
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::NotFound(e.to_string())
    }
}
