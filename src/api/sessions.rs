use crate::api::{AppError, AppState};
use crate::entity::EntityState;
use crate::session::{DomainSessionKey, KnowledgeSession};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    domain_session_id: i32,
    name: String,
    has_team: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndSessionResponse {
    domain_session_id: i32,
    filters_destroyed: usize,
}

/// One inbound state with the simulation time it was observed at
#[derive(Deserialize)]
struct EntityStateRequest {
    /// Epoch milliseconds; receive time when absent
    timestamp: Option<i64>,
    state: EntityState,
}

#[derive(Deserialize)]
struct BatchRequest {
    states: Vec<EntityStateRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    accepted: usize,
    /// Filter deliveries summed over the accepted states
    delivered: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleStateResponse {
    role: String,
    state: Option<EntityState>,
    sidc: Option<String>,
}

/// Create router with session lifecycle, ingestion and role query endpoints
pub fn create_session_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sessions", post(register_session))
        .route("/api/sessions/:id", delete(end_session))
        .route("/api/sessions/:id/entity-states", post(ingest_state))
        .route("/api/sessions/:id/entity-states/batch", post(ingest_batch))
        .route("/api/viewers/:viewer/sessions/:id/roles/:role", get(role_state))
        .with_state(state)
}

/// POST /api/sessions - Register a knowledge session
async fn register_session(
    State(state): State<Arc<AppState>>,
    Json(session): Json<KnowledgeSession>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let monitored = state
        .catalog
        .register(session)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            domain_session_id: monitored.key().0,
            name: monitored.session.name.clone(),
            has_team: monitored.team.is_some(),
        }),
    ))
}

/// DELETE /api/sessions/:id - End a session for every viewer
async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<EndSessionResponse>, AppError> {
    let key = DomainSessionKey(id);

    // Filters hide their entities while the session context still exists
    let filters_destroyed = state.registry.end_domain_session(key);
    let known = state.catalog.remove(key).is_some();

    if !known && filters_destroyed == 0 {
        return Err(AppError::NotFound(format!("Unknown domain session {}", key)));
    }

    info!(domain_session = %key, filters_destroyed, "Session ended");

    Ok(Json(EndSessionResponse {
        domain_session_id: id,
        filters_destroyed,
    }))
}

/// POST /api/sessions/:id/entity-states - Ingest one entity state
async fn ingest_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(request): Json<EntityStateRequest>,
) -> Json<IngestResponse> {
    let delivered = deliver(&state, DomainSessionKey(id), request);
    Json(IngestResponse {
        accepted: 1,
        delivered,
    })
}

/// POST /api/sessions/:id/entity-states/batch - Ingest states in order
async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if request.states.is_empty() {
        return Err(AppError::BadRequest(
            "Batch request must contain at least one state".to_string(),
        ));
    }

    let key = DomainSessionKey(id);
    let accepted = request.states.len();
    debug!(domain_session = %key, count = accepted, "Ingesting state batch");

    let delivered = request
        .states
        .into_iter()
        .map(|item| deliver(&state, key, item))
        .sum();

    Ok(Json(IngestResponse { accepted, delivered }))
}

fn deliver(state: &AppState, key: DomainSessionKey, request: EntityStateRequest) -> usize {
    let timestamp = request.timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
    state.registry.handle_entity_update(key, timestamp, request.state)
}

/// GET /api/viewers/:viewer/sessions/:id/roles/:role - Latest state of a role
async fn role_state(
    State(state): State<Arc<AppState>>,
    Path((viewer, id, role)): Path<(String, i32, String)>,
) -> Result<Json<RoleStateResponse>, AppError> {
    let key = DomainSessionKey(id);
    let latest = state.registry.latest_state_for_role(&viewer, key, &role)?;
    let sidc = latest
        .as_ref()
        .and_then(|s| state.registry.context().symbols.sidc(&s.entity_type));

    Ok(Json(RoleStateResponse {
        role,
        state: latest,
        sidc,
    }))
}
