use crate::api::{AppError, AppState};
use crate::filter::ChannelSink;
use crate::session::DomainSessionKey;
use crate::subscription::{handle_monitor, ConnectionManager};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Query parameters for viewer WebSocket upgrade
#[derive(Deserialize)]
struct ViewerQuery {
    session: i32,
}

/// Rejects a second connection for a viewer key that is still attached.
///
/// Runs as a tower layer BEFORE WebSocket upgrade extraction.
async fn viewer_guard(
    State(state): State<Arc<AppState>>,
    Path(viewer): Path<String>,
    req: Request,
    next: Next,
) -> Response {
    if state.registry.has_viewer(&viewer) {
        return AppError::Conflict(format!("Viewer '{}' already connected", viewer)).into_response();
    }
    next.run(req).await
}

/// GET /api/viewers/:viewer/ws?session=ID - Viewer WebSocket for one domain session
async fn viewer_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(viewer): Path<String>,
    Query(params): Query<ViewerQuery>,
) -> Response {
    let key = DomainSessionKey(params.session);
    info!(viewer = %viewer, domain_session = %key, "Viewer WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_viewer(socket, state, viewer, key))
}

/// GET /api/ws?session=ID - Viewer WebSocket under a generated viewer key
async fn anonymous_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewerQuery>,
) -> Response {
    let viewer = Uuid::new_v4().to_string();
    let key = DomainSessionKey(params.session);
    info!(viewer = %viewer, domain_session = %key, "Anonymous viewer WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_viewer(socket, state, viewer, key))
}

/// GET /api/monitor/ws - Raw state feed for external monitors
async fn monitor_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Monitor WebSocket upgrade request received");
    let states = state.monitor.subscribe();
    ws.on_upgrade(move |socket| handle_monitor(socket, states))
}

/// Create WebSocket router with the viewer guard applied
pub fn create_ws_router(state: Arc<AppState>) -> Router {
    let named = Router::new()
        .route("/api/viewers/:viewer/ws", get(viewer_ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), viewer_guard));

    Router::new()
        .merge(named)
        .route("/api/ws", get(anonymous_ws_handler))
        .route("/api/monitor/ws", get(monitor_ws_handler))
        .with_state(state)
}

/// Attach the viewer, open its filter and run the connection
async fn handle_viewer(socket: WebSocket, state: Arc<AppState>, viewer: String, key: DomainSessionKey) {
    let (tx, rx) = mpsc::channel(state.viewer_buffer);
    let sink = Arc::new(ChannelSink::new(tx, Some(state.monitor.clone())));

    if !state.registry.attach_viewer(&viewer, sink) {
        warn!(viewer = %viewer, "Viewer attached by a concurrent connection");
        return;
    }

    if let Err(e) = state.registry.create_domain_session_filter(&viewer, key) {
        warn!(viewer = %viewer, error = %e, "Failed to create session filter");
        let _ = state.registry.destroy_viewer(&viewer);
        return;
    }

    ConnectionManager::new(viewer, key, Arc::clone(&state.registry))
        .handle(socket, rx)
        .await;
}
