// Integration tests for session registration, state ingestion and role queries

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fieldwatch::api::{create_router, AppState};
use fieldwatch::filter::{ChannelSink, FilterContext, FilterRegistry, FilterSettings, ViewerMessage};
use fieldwatch::geo::Wgs84Converter;
use fieldwatch::session::{DomainSessionKey, SessionCatalog};
use fieldwatch::state::Scheduler;
use fieldwatch::symbol::EchelonSymbolCoder;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    catalog: Arc<SessionCatalog>,
    registry: Arc<FilterRegistry>,
}

fn create_test_app() -> TestApp {
    let catalog = Arc::new(SessionCatalog::new());
    let context = FilterContext {
        sessions: catalog.clone(),
        geo: Arc::new(Wgs84Converter),
        symbols: Arc::new(EchelonSymbolCoder),
        scheduler: Scheduler::current(),
        settings: FilterSettings::default(),
    };
    let registry = Arc::new(FilterRegistry::new(context));
    let (monitor, _) = broadcast::channel(16);

    let router = create_router(AppState {
        catalog: Arc::clone(&catalog),
        registry: Arc::clone(&registry),
        monitor,
        viewer_buffer: 16,
    });

    TestApp {
        router,
        catalog,
        registry,
    }
}

/// Attach a viewer directly and open its filter on session 7
fn attach_viewer(app: &TestApp, viewer: &str) -> mpsc::Receiver<ViewerMessage> {
    let (tx, rx) = mpsc::channel(16);
    app.registry.attach_viewer(viewer, Arc::new(ChannelSink::new(tx, None)));
    app.registry
        .create_domain_session_filter(viewer, DomainSessionKey(7))
        .unwrap();
    rx
}

fn session_json() -> Value {
    json!({
        "name": "Patrol exercise",
        "host": { "domainSessionId": 7, "username": "host", "role": "Alpha" },
        "joined": [],
        "team": {
            "type": "team",
            "name": "Squad",
            "echelon": "squad",
            "units": [
                { "type": "member", "name": "Alpha", "playable": true, "identity": { "marking": "A1" } },
                { "type": "member", "name": "Bravo", "identity": { "marking": "B1" } }
            ]
        }
    })
}

fn state_json(entity_id: u16, marking: &str) -> Value {
    json!({
        "entityId": { "siteId": 1, "applicationId": 3, "entityId": entity_id },
        "marking": { "value": marking },
        "forceId": 1,
        "entityType": {
            "kind": 3, "domain": 1, "country": 225,
            "category": 1, "subcategory": 0, "specific": 0, "extra": 0
        },
        "location": { "x": 6378137.0, "y": 0.0, "z": 0.0 }
    })
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_register_session_returns_201() {
    let app = create_test_app();

    let (status, body) = send(&app.router, "POST", "/api/sessions", Some(session_json())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["domainSessionId"], 7);
    assert_eq!(body["name"], "Patrol exercise");
    assert_eq!(body["hasTeam"], true);
    assert_eq!(app.catalog.len(), 1);
}

#[tokio::test]
async fn test_register_session_rejects_member_root() {
    let app = create_test_app();
    let mut session = session_json();
    session["team"] = json!({ "type": "member", "name": "Solo", "identity": { "marking": "S1" } });

    let (status, body) = send(&app.router, "POST", "/api/sessions", Some(session)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Solo"));
    assert!(app.catalog.is_empty());
}

#[tokio::test]
async fn test_ingest_without_viewers_is_accepted() {
    let app = create_test_app();
    send(&app.router, "POST", "/api/sessions", Some(session_json())).await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states",
        Some(json!({ "timestamp": 1000, "state": state_json(11, "A1") })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["delivered"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_ingest_reaches_attached_viewer() {
    let app = create_test_app();
    send(&app.router, "POST", "/api/sessions", Some(session_json())).await;
    let mut updates = attach_viewer(&app, "alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states",
        Some(json!({ "timestamp": 1000, "state": state_json(11, "A1") })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 1);

    let message = updates.try_recv().unwrap();
    assert_eq!(message.domain_session_id, 7);
    assert_eq!(message.timestamp, 1000);
    assert_eq!(message.update.session_entity_id.entity_id, 11);
    assert_eq!(message.update.role_name.as_deref(), Some("Alpha"));
    assert!(message.update.playable);
    assert!(message.update.active);
}

#[tokio::test(start_paused = true)]
async fn test_batch_ingest_preserves_order() {
    let app = create_test_app();
    send(&app.router, "POST", "/api/sessions", Some(session_json())).await;
    let mut updates = attach_viewer(&app, "alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states/batch",
        Some(json!({
            "states": [
                { "timestamp": 1000, "state": state_json(11, "A1") },
                { "timestamp": 1001, "state": state_json(12, "B1") }
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["delivered"], 2);

    assert_eq!(updates.try_recv().unwrap().update.session_entity_id.entity_id, 11);
    assert_eq!(updates.try_recv().unwrap().update.session_entity_id.entity_id, 12);
}

#[tokio::test]
async fn test_empty_batch_returns_400() {
    let app = create_test_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states/batch",
        Some(json!({ "states": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_end_unknown_session_returns_404() {
    let app = create_test_app();

    let (status, _) = send(&app.router, "DELETE", "/api/sessions/99", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_end_session_destroys_filters() {
    let app = create_test_app();
    send(&app.router, "POST", "/api/sessions", Some(session_json())).await;
    let mut updates = attach_viewer(&app, "alice");
    send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states",
        Some(json!({ "timestamp": 1000, "state": state_json(11, "A1") })),
    )
    .await;
    assert!(updates.try_recv().unwrap().update.active);

    let (status, body) = send(&app.router, "DELETE", "/api/sessions/7", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domainSessionId"], 7);
    assert_eq!(body["filtersDestroyed"], 1);
    assert!(app.catalog.is_empty());
    assert_eq!(app.registry.filter_count(), 0);

    // The cached entity is hidden on the way out
    let hidden = updates.try_recv().unwrap();
    assert!(!hidden.update.active);
    assert_eq!(hidden.update.session_entity_id.entity_id, 11);
}

#[tokio::test]
async fn test_role_query_unknown_viewer_returns_404() {
    let app = create_test_app();

    let (status, body) = send(&app.router, "GET", "/api/viewers/nobody/sessions/7/roles/Alpha", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nobody"));
}

#[tokio::test(start_paused = true)]
async fn test_role_query_returns_latest_state() {
    let app = create_test_app();
    send(&app.router, "POST", "/api/sessions", Some(session_json())).await;
    let _updates = attach_viewer(&app, "alice");

    let (_, before) = send(&app.router, "GET", "/api/viewers/alice/sessions/7/roles/Alpha", None).await;
    assert_eq!(before["role"], "Alpha");
    assert!(before["state"].is_null());

    send(
        &app.router,
        "POST",
        "/api/sessions/7/entity-states",
        Some(json!({ "timestamp": 1000, "state": state_json(11, "A1") })),
    )
    .await;

    let (status, after) = send(&app.router, "GET", "/api/viewers/alice/sessions/7/roles/Alpha", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["state"]["entityId"]["entityId"], 11);
    assert_eq!(after["state"]["marking"]["value"], "A1");
}
